//! Debug Port register layout (ADIv5 SS B2.2).

use bitfield::bitfield;

/// DP register addresses (A[3:2], A0=A1=0 always in SWD).
pub const DP_IDCODE_ABORT: u8 = 0x0;
pub const DP_CTRL_STAT: u8 = 0x4;
pub const DP_SELECT_RESEND: u8 = 0x8;
pub const DP_RDBUFF: u8 = 0xC;

bitfield! {
    /// Written to DP address 0x0 to clear sticky error flags.
    #[derive(Copy, Clone)]
    pub struct Abort(u32);
    impl Debug;
    pub _, set_orunerrclr: 4;
    pub _, set_wderrclr: 3;
    pub _, set_stkerrclr: 2;
    pub _, set_stkcmpclr: 1;
    pub _, set_dapabort: 0;
}

impl From<u32> for Abort {
    fn from(v: u32) -> Self {
        Abort(v)
    }
}

impl From<Abort> for u32 {
    fn from(v: Abort) -> u32 {
        v.0
    }
}

bitfield! {
    /// DP CTRL/STAT, DP address 0x4.
    #[derive(Copy, Clone)]
    pub struct CtrlStat(u32);
    impl Debug;
    pub csyspwrupack, _: 31;
    pub csyspwrupreq, set_csyspwrupreq: 30;
    pub cdbgpwrupack, _: 29;
    pub cdbgpwrupreq, set_cdbgpwrupreq: 28;
    pub sticky_err, _: 5;
    pub sticky_orun, _: 1;
}

impl From<u32> for CtrlStat {
    fn from(v: u32) -> Self {
        CtrlStat(v)
    }
}

impl From<CtrlStat> for u32 {
    fn from(v: CtrlStat) -> u32 {
        v.0
    }
}

bitfield! {
    /// DP SELECT, DP address 0x8 (write); RESEND is the read alias.
    #[derive(Copy, Clone, PartialEq, Eq)]
    pub struct Select(u32);
    impl Debug;
    pub u8, ap_sel, set_ap_sel: 31, 24;
    pub u8, ap_bank_sel, set_ap_bank_sel: 7, 4;
    pub u8, dp_bank_sel, set_dp_bank_sel: 3, 0;
}

impl From<u32> for Select {
    fn from(v: u32) -> Self {
        Select(v)
    }
}

impl From<Select> for u32 {
    fn from(v: Select) -> u32 {
        v.0
    }
}

impl Select {
    pub fn new(ap_sel: u8, ap_bank_sel: u8, dp_bank_sel: u8) -> Self {
        let mut s = Select(0);
        s.set_ap_sel(ap_sel);
        s.set_ap_bank_sel(ap_bank_sel & 0x0F);
        s.set_dp_bank_sel(dp_bank_sel & 0x0F);
        s
    }
}
