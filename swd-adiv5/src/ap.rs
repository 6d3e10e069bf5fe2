//! Access Port register layout, specialised to MEM-AP (ADIv5 SS B2.3).

use bitfield::bitfield;

/// MEM-AP register addresses within the selected APBANKSEL (A[3:2]).
pub const AP_CSW: u8 = 0x00;
pub const AP_TAR: u8 = 0x04;
pub const AP_DRW: u8 = 0x0C;
/// IDR lives at bank 0xF, address 0xFC; used during AP enumeration.
pub const AP_IDR: u8 = 0xFC;
pub const AP_BASE: u8 = 0xF8;
pub const AP_CFG: u8 = 0xF4;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DataSize {
    Byte,
    HalfWord,
    Word,
}

bitfield! {
    /// MEM-AP CSW (Control/Status Word).
    #[derive(Copy, Clone)]
    pub struct Csw(u32);
    impl Debug;
    pub u8, dbg_sw_enable, set_dbg_sw_enable: 31, 31;
    pub u8, prot, set_prot: 30, 24;
    pub spiden, set_spiden: 23;
    pub u8, mode, set_mode: 11, 8;
    pub addr_inc, set_addr_inc: 5, 4;
    pub device_en, set_device_en: 6;
    pub u8, size, set_size: 2, 0;
}

impl From<u32> for Csw {
    fn from(v: u32) -> Self {
        Csw(v)
    }
}

impl From<Csw> for u32 {
    fn from(v: Csw) -> u32 {
        v.0
    }
}

/// Build the CSW value this bridge always uses: auto-increment single,
/// the requested access size, debug software access enabled.
pub fn build_csw(size: DataSize) -> Csw {
    let mut csw = Csw(0x0000_0000);
    csw.set_dbg_sw_enable(1);
    csw.set_addr_inc(0b01); // single auto-increment
    csw.set_size(match size {
        DataSize::Byte => 0b000,
        DataSize::HalfWord => 0b001,
        DataSize::Word => 0b010,
    });
    csw
}

/// AP IDR fields relevant to classifying the AP kind.
#[derive(Copy, Clone, Debug)]
pub struct Idr(pub u32);

impl Idr {
    pub fn is_mem_ap(&self) -> bool {
        // Class field bits [16:13] == 0b1000 identifies a MEM-AP.
        (self.0 >> 13) & 0x0F == 0b1000
    }

    pub fn is_present(&self) -> bool {
        self.0 != 0
    }
}
