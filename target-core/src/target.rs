//! Target Interface: the capability surface the RSP engine drives.
//!
//! Modelled as a two-variant enum rather than a trait object: `ProbeOnly`
//! covers a session where no System Control Space was discovered (most
//! operations degrade to `Unsupported`), and `Adiv5` covers the normal
//! case where a Cortex-M core was found and can be halted, stepped and
//! inspected.

use crate::error::{Result, TargetError};
use crate::scs::{self, Dhcsr};
use swd_adiv5::ArmDebugInterface;

pub const SIGTRAP: u8 = 0x05;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CoreState {
    Detached,
    Halted,
    Running,
}

/// A target session backed by a discovered SCS on a MEM-AP.
pub struct Adiv5Target {
    engine: ArmDebugInterface,
    sysmem_ap: u8,
    state: CoreState,
    mask_interrupts_on_step: bool,
}

impl Adiv5Target {
    pub fn new(engine: ArmDebugInterface, sysmem_ap: u8) -> Self {
        Adiv5Target {
            engine,
            sysmem_ap,
            state: CoreState::Detached,
            mask_interrupts_on_step: true,
        }
    }

    pub fn engine(&self) -> &ArmDebugInterface {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ArmDebugInterface {
        &mut self.engine
    }

    pub fn state(&self) -> CoreState {
        self.state
    }

    fn write_dhcsr_bits(&mut self, halt: bool, debugen: bool, step: bool) -> Result<()> {
        let mut dhcsr = Dhcsr::from(0);
        dhcsr.set_c_halt(halt);
        dhcsr.set_c_debugen(debugen);
        dhcsr.set_c_step(step);
        dhcsr.set_c_maskints(self.mask_interrupts_on_step && step);
        scs::write_dhcsr(&mut self.engine, self.sysmem_ap, dhcsr)?;
        Ok(())
    }

    pub fn attach(&mut self) -> Result<()> {
        self.write_dhcsr_bits(true, true, false)?;
        self.state = CoreState::Halted;
        Ok(())
    }

    pub fn detach(&mut self) -> Result<()> {
        self.write_dhcsr_bits(false, true, false)?;
        self.state = CoreState::Detached;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        self.write_dhcsr_bits(false, true, false)?;
        self.state = CoreState::Running;
        Ok(())
    }

    pub fn step(&mut self) -> Result<u8> {
        self.write_dhcsr_bits(false, true, true)?;
        let mut dhcsr = scs::read_dhcsr(&mut self.engine, self.sysmem_ap)?;
        let mut spins = 0;
        while !dhcsr.s_halt() && spins < 10_000 {
            dhcsr = scs::read_dhcsr(&mut self.engine, self.sysmem_ap)?;
            spins += 1;
        }
        self.state = CoreState::Halted;
        Ok(SIGTRAP)
    }

    pub fn interrupt(&mut self) -> Result<u8> {
        self.write_dhcsr_bits(true, true, false)?;
        self.state = CoreState::Halted;
        Ok(SIGTRAP)
    }

    pub fn read_register(&mut self, n: u32) -> Result<u32> {
        Ok(scs::read_core_register(&mut self.engine, self.sysmem_ap, n)?)
    }

    /// Grouped with `write_memory`/breakpoints/watchpoints as a
    /// not-yet-implemented path: the register-write side of DCRSR is
    /// exposed so the RSP layer has somewhere to call, but it reports
    /// `Unsupported` until implemented.
    pub fn write_register(&mut self, _n: u32, _value: u32) -> Result<()> {
        Err(TargetError::Unsupported)
    }

    /// Read registers r0..r15 in order; the first failure aborts the
    /// whole read, per the original behaviour this is ported from.
    pub fn read_generic_registers(&mut self) -> Result<[u32; 16]> {
        let mut regs = [0u32; 16];
        for (n, slot) in regs.iter_mut().enumerate() {
            *slot = self.read_register(n as u32)?;
        }
        Ok(regs)
    }

    /// Read `len` bytes of memory starting at `address`, returning the
    /// number of bytes actually filled. A failed word read aborts the
    /// remainder of the read silently, matching the legacy behaviour
    /// this is ported from: the caller sees a short read, not an error.
    pub fn read_memory(&mut self, address: u32, len: usize, out: &mut Vec<u8>) -> usize {
        out.clear();
        let whole_words = len / 4;
        let mut addr = address;
        for _ in 0..whole_words {
            match self.engine.mem_ap_read_word32(self.sysmem_ap, addr) {
                Ok(word) => out.extend_from_slice(&word.to_le_bytes()),
                Err(_) => return out.len(),
            }
            addr = addr.wrapping_add(4);
        }
        let tail = len - whole_words * 4;
        if tail > 0 {
            match self.engine.mem_ap_read_word32(self.sysmem_ap, addr) {
                Ok(word) => out.extend_from_slice(&word.to_le_bytes()[..tail]),
                Err(_) => return out.len(),
            }
        }
        out.len()
    }

    pub fn write_memory(&mut self, _address: u32, _data: &[u8]) -> Result<()> {
        Err(TargetError::Unsupported)
    }

    pub fn set_break_point(&mut self, _address: u32) -> Result<()> {
        Err(TargetError::Unsupported)
    }

    pub fn unset_break_point(&mut self, _address: u32) -> Result<()> {
        Err(TargetError::Unsupported)
    }

    pub fn set_watch_point(&mut self, _address: u32, _len: u32, _kind: u8) -> Result<()> {
        Err(TargetError::Unsupported)
    }

    pub fn unset_watch_point(&mut self, _address: u32, _len: u32, _kind: u8) -> Result<()> {
        Err(TargetError::Unsupported)
    }

    pub fn monitor(&mut self, _command: &str) -> Result<String> {
        Ok(String::new())
    }
}

/// A session where no SCS was discovered on the target; nearly every
/// capability reports `Unsupported` rather than attempting a transfer
/// that has nowhere to land.
pub struct ProbeOnlyTarget {
    engine: ArmDebugInterface,
}

impl ProbeOnlyTarget {
    pub fn new(engine: ArmDebugInterface) -> Self {
        ProbeOnlyTarget { engine }
    }

    pub fn engine(&self) -> &ArmDebugInterface {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut ArmDebugInterface {
        &mut self.engine
    }
}

/// The Target Interface seen by the RSP engine: either a fully
/// discovered ADIv5/Cortex-M target, or a bare probe connection with no
/// addressable core.
pub enum Target {
    ProbeOnly(ProbeOnlyTarget),
    Adiv5(Adiv5Target),
}

impl Target {
    pub fn attach(&mut self) -> Result<()> {
        match self {
            Target::Adiv5(t) => t.attach(),
            Target::ProbeOnly(_) => Err(TargetError::TargetNotFound),
        }
    }

    pub fn detach(&mut self) -> Result<()> {
        match self {
            Target::Adiv5(t) => t.detach(),
            Target::ProbeOnly(_) => Ok(()),
        }
    }

    pub fn resume(&mut self) -> Result<()> {
        match self {
            Target::Adiv5(t) => t.resume(),
            Target::ProbeOnly(_) => Err(TargetError::TargetNotFound),
        }
    }

    pub fn step(&mut self) -> Result<u8> {
        match self {
            Target::Adiv5(t) => t.step(),
            Target::ProbeOnly(_) => Err(TargetError::TargetNotFound),
        }
    }

    pub fn interrupt(&mut self) -> Result<u8> {
        match self {
            Target::Adiv5(t) => t.interrupt(),
            Target::ProbeOnly(_) => Ok(SIGTRAP),
        }
    }

    pub fn read_register(&mut self, n: u32) -> Result<u32> {
        match self {
            Target::Adiv5(t) => t.read_register(n),
            Target::ProbeOnly(_) => Err(TargetError::Unsupported),
        }
    }

    pub fn write_register(&mut self, n: u32, value: u32) -> Result<()> {
        match self {
            Target::Adiv5(t) => t.write_register(n, value),
            Target::ProbeOnly(_) => Err(TargetError::Unsupported),
        }
    }

    pub fn read_generic_registers(&mut self) -> Result<[u32; 16]> {
        match self {
            Target::Adiv5(t) => t.read_generic_registers(),
            Target::ProbeOnly(_) => Err(TargetError::Unsupported),
        }
    }

    pub fn read_memory(&mut self, address: u32, len: usize, out: &mut Vec<u8>) -> usize {
        match self {
            Target::Adiv5(t) => t.read_memory(address, len, out),
            Target::ProbeOnly(_) => {
                out.clear();
                0
            }
        }
    }

    pub fn write_memory(&mut self, address: u32, data: &[u8]) -> Result<()> {
        match self {
            Target::Adiv5(t) => t.write_memory(address, data),
            Target::ProbeOnly(_) => Err(TargetError::Unsupported),
        }
    }

    pub fn set_break_point(&mut self, address: u32) -> Result<()> {
        match self {
            Target::Adiv5(t) => t.set_break_point(address),
            Target::ProbeOnly(_) => Err(TargetError::Unsupported),
        }
    }

    pub fn unset_break_point(&mut self, address: u32) -> Result<()> {
        match self {
            Target::Adiv5(t) => t.unset_break_point(address),
            Target::ProbeOnly(_) => Err(TargetError::Unsupported),
        }
    }

    pub fn set_watch_point(&mut self, address: u32, len: u32, kind: u8) -> Result<()> {
        match self {
            Target::Adiv5(t) => t.set_watch_point(address, len, kind),
            Target::ProbeOnly(_) => Err(TargetError::Unsupported),
        }
    }

    pub fn unset_watch_point(&mut self, address: u32, len: u32, kind: u8) -> Result<()> {
        match self {
            Target::Adiv5(t) => t.unset_watch_point(address, len, kind),
            Target::ProbeOnly(_) => Err(TargetError::Unsupported),
        }
    }

    pub fn monitor(&mut self, command: &str) -> Result<String> {
        match self {
            Target::Adiv5(t) => t.monitor(command),
            Target::ProbeOnly(_) => Ok(String::new()),
        }
    }
}

/// The capability surface `rsp_engine` drives, mirroring `Target`'s
/// inherent methods. Lets the RSP dispatch/session code be written
/// generically and exercised against a mock target in tests, without
/// turning `Target` itself into a trait object.
pub trait TargetOps {
    fn attach(&mut self) -> Result<()>;
    fn detach(&mut self) -> Result<()>;
    fn resume(&mut self) -> Result<()>;
    fn step(&mut self) -> Result<u8>;
    fn interrupt(&mut self) -> Result<u8>;
    fn read_register(&mut self, n: u32) -> Result<u32>;
    fn write_register(&mut self, n: u32, value: u32) -> Result<()>;
    fn read_generic_registers(&mut self) -> Result<[u32; 16]>;
    fn read_memory(&mut self, address: u32, len: usize, out: &mut Vec<u8>) -> usize;
    fn write_memory(&mut self, address: u32, data: &[u8]) -> Result<()>;
    fn set_break_point(&mut self, address: u32) -> Result<()>;
    fn unset_break_point(&mut self, address: u32) -> Result<()>;
    fn set_watch_point(&mut self, address: u32, len: u32, kind: u8) -> Result<()>;
    fn unset_watch_point(&mut self, address: u32, len: u32, kind: u8) -> Result<()>;
    fn monitor(&mut self, command: &str) -> Result<String>;
}

impl TargetOps for Target {
    fn attach(&mut self) -> Result<()> {
        Target::attach(self)
    }

    fn detach(&mut self) -> Result<()> {
        Target::detach(self)
    }

    fn resume(&mut self) -> Result<()> {
        Target::resume(self)
    }

    fn step(&mut self) -> Result<u8> {
        Target::step(self)
    }

    fn interrupt(&mut self) -> Result<u8> {
        Target::interrupt(self)
    }

    fn read_register(&mut self, n: u32) -> Result<u32> {
        Target::read_register(self, n)
    }

    fn write_register(&mut self, n: u32, value: u32) -> Result<()> {
        Target::write_register(self, n, value)
    }

    fn read_generic_registers(&mut self) -> Result<[u32; 16]> {
        Target::read_generic_registers(self)
    }

    fn read_memory(&mut self, address: u32, len: usize, out: &mut Vec<u8>) -> usize {
        Target::read_memory(self, address, len, out)
    }

    fn write_memory(&mut self, address: u32, data: &[u8]) -> Result<()> {
        Target::write_memory(self, address, data)
    }

    fn set_break_point(&mut self, address: u32) -> Result<()> {
        Target::set_break_point(self, address)
    }

    fn unset_break_point(&mut self, address: u32) -> Result<()> {
        Target::unset_break_point(self, address)
    }

    fn set_watch_point(&mut self, address: u32, len: u32, kind: u8) -> Result<()> {
        Target::set_watch_point(self, address, len, kind)
    }

    fn unset_watch_point(&mut self, address: u32, len: u32, kind: u8) -> Result<()> {
        Target::unset_watch_point(self, address, len, kind)
    }

    fn monitor(&mut self, command: &str) -> Result<String> {
        Target::monitor(self, command)
    }
}
