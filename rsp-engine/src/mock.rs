//! A scripted [`target_core::TargetOps`] target for dispatch/session
//! tests, standing in for a discovered Cortex-M core without touching
//! any real transport.

use std::collections::HashMap;

use target_core::{Result, TargetError, TargetOps};

#[derive(Default)]
pub struct MockTarget {
    pub attached: bool,
    pub halted: bool,
    pub registers: [u32; 16],
    pub xpsr: u32,
    pub memory: HashMap<u32, u8>,
    pub monitor_log: Vec<String>,
}

impl TargetOps for MockTarget {
    fn attach(&mut self) -> Result<()> {
        self.attached = true;
        Ok(())
    }

    fn detach(&mut self) -> Result<()> {
        self.attached = false;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.halted = false;
        Ok(())
    }

    fn step(&mut self) -> Result<u8> {
        self.halted = true;
        Ok(0x05)
    }

    fn interrupt(&mut self) -> Result<u8> {
        self.halted = true;
        Ok(0x05)
    }

    fn read_register(&mut self, n: u32) -> Result<u32> {
        if n == 0x19 {
            Ok(self.xpsr)
        } else {
            Ok(*self.registers.get(n as usize).unwrap_or(&0))
        }
    }

    fn write_register(&mut self, _n: u32, _value: u32) -> Result<()> {
        Err(TargetError::Unsupported)
    }

    fn read_generic_registers(&mut self) -> Result<[u32; 16]> {
        Ok(self.registers)
    }

    fn read_memory(&mut self, address: u32, len: usize, out: &mut Vec<u8>) -> usize {
        out.clear();
        for i in 0..len {
            match self.memory.get(&(address + i as u32)) {
                Some(&b) => out.push(b),
                None => break,
            }
        }
        out.len()
    }

    fn write_memory(&mut self, _address: u32, _data: &[u8]) -> Result<()> {
        Err(TargetError::Unsupported)
    }

    fn set_break_point(&mut self, _address: u32) -> Result<()> {
        Err(TargetError::Unsupported)
    }

    fn unset_break_point(&mut self, _address: u32) -> Result<()> {
        Err(TargetError::Unsupported)
    }

    fn set_watch_point(&mut self, _address: u32, _len: u32, _kind: u8) -> Result<()> {
        Err(TargetError::Unsupported)
    }

    fn unset_watch_point(&mut self, _address: u32, _len: u32, _kind: u8) -> Result<()> {
        Err(TargetError::Unsupported)
    }

    fn monitor(&mut self, command: &str) -> Result<String> {
        self.monitor_log.push(command.to_string());
        Ok(String::new())
    }
}
