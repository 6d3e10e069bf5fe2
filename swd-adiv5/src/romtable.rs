//! ROM table walking (ADIv5 SS D2) over a MEM-AP.

use crate::component::{ComponentId, PeripheralId};
use crate::engine::ArmDebugInterface;
use crate::error::{ArmError, Result};

/// A CoreSight component discovered while walking a ROM table.
#[derive(Clone, Debug)]
pub struct DiscoveredComponent {
    pub ap_sel: u8,
    pub base_address: u32,
    pub component_id: ComponentId,
    pub peripheral_id: PeripheralId,
}

const MAX_ROM_TABLE_DEPTH: u32 = 4;

/// Recursively walk a ROM table rooted at `table_base` on the given AP,
/// collecting every non-table component found. Terminates on the first
/// all-zero entry at each level, and refuses to recurse past
/// `MAX_ROM_TABLE_DEPTH`.
pub fn walk_rom_table(
    engine: &mut ArmDebugInterface,
    ap_sel: u8,
    table_base: u32,
    depth: u32,
    out: &mut Vec<DiscoveredComponent>,
) -> Result<()> {
    if depth > MAX_ROM_TABLE_DEPTH {
        return Err(ArmError::RomTableTooDeep);
    }

    let mut offset = 0u32;
    loop {
        let entry = engine.mem_ap_read_word32(ap_sel, table_base + offset)?;
        if entry == 0 {
            break;
        }

        let present = entry & 0x1 != 0;
        let format_32bit = entry & 0x2 != 0;
        if present && format_32bit {
            // Address offset occupies bits [31:12], signed, scaled by 4 KiB.
            let signed_offset = (entry as i32) & !0xFFF;
            let component_address = (table_base as i64 + signed_offset as i64) as u32;
            identify_and_record(engine, ap_sel, component_address, depth, out)?;
        }

        offset += 4;
    }
    Ok(())
}

fn identify_and_record(
    engine: &mut ArmDebugInterface,
    ap_sel: u8,
    base_address: u32,
    depth: u32,
    out: &mut Vec<DiscoveredComponent>,
) -> Result<()> {
    let peripheral_id = PeripheralId::read(engine, ap_sel, base_address)?;
    let component_id = ComponentId::read(engine, ap_sel, base_address)?;

    if component_id.is_rom_table() {
        walk_rom_table(engine, ap_sel, base_address, depth + 1, out)?;
    } else {
        out.push(DiscoveredComponent {
            ap_sel,
            base_address,
            component_id,
            peripheral_id,
        });
    }
    Ok(())
}
