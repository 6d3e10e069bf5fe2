//! System Control Space registers used for core control (ADIv7-M/v6-M).

use crate::error::{Result, TargetError};
use bitfield::bitfield;
use std::time::{Duration, Instant};
use swd_adiv5::ArmDebugInterface;

pub const DHCSR: u32 = 0xE000_EDF0;
pub const DCRSR: u32 = 0xE000_EDF4;
pub const DCRDR: u32 = 0xE000_EDF8;

const DEBUG_KEY: u32 = 0xA05F;
const REGISTER_TRANSFER_TIMEOUT: Duration = Duration::from_millis(100);

bitfield! {
    #[derive(Copy, Clone)]
    pub struct Dhcsr(u32);
    impl Debug;
    pub s_reset_st, _: 25;
    pub s_retire_st, _: 24;
    pub s_lockup, _: 19;
    pub s_sleep, _: 18;
    pub s_halt, _: 17;
    pub s_regrdy, _: 16;
    pub c_maskints, set_c_maskints: 3;
    pub c_step, set_c_step: 2;
    pub c_halt, set_c_halt: 1;
    pub c_debugen, set_c_debugen: 0;
}

impl Dhcsr {
    /// Set the debug key required for bits [15:0] to take effect on write.
    pub fn enable_write(&mut self) {
        self.0 = (self.0 & 0x0000_FFFF) | (DEBUG_KEY << 16);
    }
}

impl From<u32> for Dhcsr {
    fn from(v: u32) -> Self {
        Dhcsr(v)
    }
}

impl From<Dhcsr> for u32 {
    fn from(v: Dhcsr) -> u32 {
        v.0
    }
}

bitfield! {
    #[derive(Copy, Clone)]
    pub struct Dcrsr(u32);
    impl Debug;
    pub _, set_regwnr: 16;
    pub _, set_regsel: 6, 0;
}

impl From<u32> for Dcrsr {
    fn from(v: u32) -> Self {
        Dcrsr(v)
    }
}

impl From<Dcrsr> for u32 {
    fn from(v: Dcrsr) -> u32 {
        v.0
    }
}

/// Map an RSP register number to the DCRSR REGSEL field.
///
/// Register 0x19 is the RSP convention's xPSR slot but the core's own
/// register selector for xPSR is 0x10; every other register number maps
/// directly.
pub fn regsel_for_rsp_register(n: u32) -> u32 {
    if n == 0x19 {
        0x10
    } else {
        n
    }
}

fn wait_for_register_transfer(engine: &mut ArmDebugInterface, ap_sel: u8) -> Result<()> {
    let start = Instant::now();
    while start.elapsed() < REGISTER_TRANSFER_TIMEOUT {
        let dhcsr = Dhcsr::from(engine.mem_ap_read_word32(ap_sel, DHCSR)?);
        if dhcsr.s_regrdy() {
            return Ok(());
        }
    }
    Err(TargetError::Timeout)
}

pub fn read_core_register(engine: &mut ArmDebugInterface, ap_sel: u8, rsp_reg: u32) -> Result<u32> {
    let mut dcrsr = Dcrsr::from(0);
    dcrsr.set_regwnr(false);
    dcrsr.set_regsel(regsel_for_rsp_register(rsp_reg));
    engine.mem_ap_write_word32(ap_sel, DCRSR, dcrsr.into())?;
    wait_for_register_transfer(engine, ap_sel)?;
    Ok(engine.mem_ap_read_word32(ap_sel, DCRDR)?)
}

pub fn read_dhcsr(engine: &mut ArmDebugInterface, ap_sel: u8) -> Result<Dhcsr> {
    Ok(Dhcsr::from(engine.mem_ap_read_word32(ap_sel, DHCSR)?))
}

pub fn write_dhcsr(engine: &mut ArmDebugInterface, ap_sel: u8, mut dhcsr: Dhcsr) -> Result<()> {
    dhcsr.enable_write();
    engine.mem_ap_write_word32(ap_sel, DHCSR, dhcsr.into())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn xpsr_alias_maps_0x19_to_0x10() {
        assert_eq!(regsel_for_rsp_register(0x19), 0x10);
        assert_eq!(regsel_for_rsp_register(0x00), 0x00);
        assert_eq!(regsel_for_rsp_register(0x0F), 0x0F);
    }

    #[test]
    fn enable_write_sets_debug_key() {
        let mut dhcsr = Dhcsr::from(0);
        dhcsr.set_c_halt(true);
        dhcsr.enable_write();
        let raw: u32 = dhcsr.into();
        assert_eq!(raw >> 16, DEBUG_KEY);
        assert!(Dhcsr::from(raw).c_halt());
    }
}
