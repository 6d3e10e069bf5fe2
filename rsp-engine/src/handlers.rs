//! Dispatch table: one function per RSP command letter, translating the
//! payload into calls on a [`target_core::TargetOps`] target and
//! formatting the reply payload.
//!
//! This is a pure function of `(payload, target, session state)` ->
//! reply; framing, acks and retransmission live in [`crate::session`].

use std::collections::HashMap;

use target_core::{TargetError, TargetOps};

/// Per-connection state the RSP layer keeps that the target itself has
/// no notion of: whether the implicit first-query attach has happened
/// yet, and the `H<op><id>` thread-id bookkeeping (retained, never
/// interpreted -- this is a single-core target).
#[derive(Debug, Default)]
pub struct SessionState {
    pub attached: bool,
    pub thread_ids: HashMap<char, i64>,
}

/// What a dispatched command wants sent back to the debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Wrap `payload` in a `$...#cc` envelope and send it.
    Reply(String),
    /// Send nothing now; a reply (if any) will be driven by a later
    /// event, e.g. `c` (continue) only replies once the target halts.
    NoReply,
}

/// Render a [`TargetError`] as the single byte RSP renders as `E<hh>`.
/// The mapping is this bridge's own: the wire format only requires two
/// hex digits, it imposes no meaning on the value.
fn error_code(err: &TargetError) -> u8 {
    match err {
        TargetError::TargetNotFound => 0x01,
        TargetError::Timeout => 0x02,
        TargetError::Unsupported => 0x03,
        TargetError::Arm(_) => 0x04,
    }
}

fn error_reply(err: &TargetError) -> DispatchOutcome {
    DispatchOutcome::Reply(format!("E{:02x}", error_code(err)))
}

fn encode_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn decode_hex_bytes(hex: &str) -> Option<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return None;
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).ok())
        .collect()
}

fn le_hex_u32(value: u32) -> String {
    encode_hex(&value.to_le_bytes())
}

/// Dispatch one packet payload. `payload` is the raw bytes between `$`
/// and `#`, which for every command except `X` is plain ASCII.
pub fn dispatch<T: TargetOps>(payload: &[u8], target: &mut T, state: &mut SessionState) -> DispatchOutcome {
    let Some(&first) = payload.first() else {
        return DispatchOutcome::Reply(String::new());
    };

    if first == b'X' {
        return handle_write_memory_binary(payload, target);
    }

    // Every other command is ASCII; a non-ASCII byte anywhere means the
    // debugger sent something we don't recognise.
    let Ok(payload) = std::str::from_utf8(payload) else {
        return DispatchOutcome::Reply(String::new());
    };

    match first {
        b'q' => handle_query(payload, target, state),
        b'?' => DispatchOutcome::Reply("S05".into()),
        b'c' => handle_continue(payload, target),
        b's' => handle_step(payload, target),
        b'H' => handle_set_thread(payload, state),
        b'g' => handle_read_general_registers(target),
        b'G' => handle_write_general_registers(payload, target),
        b'p' => handle_read_register(payload, target),
        b'P' => handle_write_register(payload, target),
        b'm' => handle_read_memory(payload, target),
        b'M' => handle_write_memory(payload, target),
        b'D' => {
            let _ = target.detach();
            DispatchOutcome::Reply("OK".into())
        }
        b'Z' | b'z' => handle_break_watch(payload, target),
        _ => DispatchOutcome::Reply(String::new()),
    }
}

/// The remote debugger's very first packet of a session is always a
/// query; this is the earliest safe moment to halt the core without
/// racing the debugger's own startup sequence. Known race: a debugger
/// whose first byte is `+` or an interrupt instead of a query packet
/// would skip this -- kept as-is, the RSP wire format offers no
/// handshake that would let us tell the difference up front.
fn handle_query<T: TargetOps>(payload: &str, target: &mut T, state: &mut SessionState) -> DispatchOutcome {
    if !state.attached && target.attach().is_ok() {
        state.attached = true;
    }

    if payload.starts_with("qSupported:") {
        DispatchOutcome::Reply("PacketSize=3fff;Qbtrace:off-;Qbtrace:bts-".into())
    } else if payload.starts_with("qTStatus") || payload.starts_with("qXfer") {
        DispatchOutcome::Reply(String::new())
    } else if payload.starts_with("qOffsets") {
        DispatchOutcome::Reply("Text=0;Data=0;Bss=0".into())
    } else if payload.starts_with("qSymbol:") {
        DispatchOutcome::Reply("OK".into())
    } else if payload == "qC" {
        DispatchOutcome::Reply("QC-1".into())
    } else if payload.starts_with("qAttached") {
        DispatchOutcome::Reply("1".into())
    } else if let Some(hex) = payload.strip_prefix("qRcmd,") {
        handle_monitor(hex, target)
    } else {
        DispatchOutcome::Reply(String::new())
    }
}

fn handle_monitor<T: TargetOps>(hex: &str, target: &mut T) -> DispatchOutcome {
    let Some(bytes) = decode_hex_bytes(hex) else {
        return DispatchOutcome::Reply("E01".into());
    };
    let command = String::from_utf8_lossy(&bytes).into_owned();
    match target.monitor(&command) {
        Ok(output) if output.is_empty() => DispatchOutcome::Reply("OK".into()),
        Ok(output) => DispatchOutcome::Reply(output),
        Err(err) => error_reply(&err),
    }
}

/// Parse the optional hex address prefix shared by `c[addr]`/`s[addr]`.
/// The PC update is routed through `write_register`, which is currently
/// an unimplemented stub; this mirrors the original `setCurrentPC`,
/// which is itself a no-op.
fn maybe_set_pc<T: TargetOps>(payload: &str, target: &mut T) {
    if payload.len() > 1 {
        if let Ok(addr) = u32::from_str_radix(&payload[1..], 16) {
            let _ = target.write_register(15, addr);
        }
    }
}

fn handle_continue<T: TargetOps>(payload: &str, target: &mut T) -> DispatchOutcome {
    maybe_set_pc(payload, target);
    let _ = target.resume();
    DispatchOutcome::NoReply
}

fn handle_step<T: TargetOps>(payload: &str, target: &mut T) -> DispatchOutcome {
    maybe_set_pc(payload, target);
    match target.step() {
        Ok(signal) => DispatchOutcome::Reply(format!("S{signal:02x}")),
        Err(err) => error_reply(&err),
    }
}

fn handle_set_thread(payload: &str, state: &mut SessionState) -> DispatchOutcome {
    if payload.len() < 3 {
        return DispatchOutcome::Reply("E01".into());
    }
    let op = payload.as_bytes()[1] as char;
    match i64::from_str_radix(&payload[2..], 16) {
        Ok(id) => {
            state.thread_ids.insert(op, id);
            DispatchOutcome::Reply("OK".into())
        }
        Err(_) => DispatchOutcome::Reply("E01".into()),
    }
}

fn handle_read_general_registers<T: TargetOps>(target: &mut T) -> DispatchOutcome {
    match target.read_generic_registers() {
        Ok(regs) => DispatchOutcome::Reply(regs.iter().map(|&r| le_hex_u32(r)).collect()),
        Err(err) => error_reply(&err),
    }
}

fn handle_write_general_registers<T: TargetOps>(payload: &str, target: &mut T) -> DispatchOutcome {
    let Some(bytes) = decode_hex_bytes(&payload[1..]) else {
        return DispatchOutcome::Reply("E01".into());
    };
    if bytes.len() % 4 != 0 {
        return DispatchOutcome::Reply("E01".into());
    }
    for (n, chunk) in bytes.chunks_exact(4).enumerate() {
        let value = u32::from_le_bytes(chunk.try_into().unwrap());
        if let Err(err) = target.write_register(n as u32, value) {
            return error_reply(&err);
        }
    }
    DispatchOutcome::Reply("OK".into())
}

fn handle_read_register<T: TargetOps>(payload: &str, target: &mut T) -> DispatchOutcome {
    match u32::from_str_radix(&payload[1..], 16) {
        Ok(n) => match target.read_register(n) {
            Ok(value) => DispatchOutcome::Reply(le_hex_u32(value)),
            Err(err) => error_reply(&err),
        },
        Err(_) => DispatchOutcome::Reply("E01".into()),
    }
}

fn handle_write_register<T: TargetOps>(payload: &str, target: &mut T) -> DispatchOutcome {
    let Some((n_str, val_str)) = payload[1..].split_once('=') else {
        return DispatchOutcome::Reply("E01".into());
    };
    match (u32::from_str_radix(n_str, 16), u32::from_str_radix(val_str, 16)) {
        (Ok(n), Ok(value)) => match target.write_register(n, value) {
            Ok(()) => DispatchOutcome::Reply("OK".into()),
            Err(err) => error_reply(&err),
        },
        _ => DispatchOutcome::Reply("E01".into()),
    }
}

fn parse_addr_len(rest: &str) -> Option<(u32, usize)> {
    let (addr_str, len_str) = rest.split_once(',')?;
    Some((
        u32::from_str_radix(addr_str, 16).ok()?,
        usize::from_str_radix(len_str, 16).ok()?,
    ))
}

fn handle_read_memory<T: TargetOps>(payload: &str, target: &mut T) -> DispatchOutcome {
    match parse_addr_len(&payload[1..]) {
        Some((addr, len)) => {
            let mut buf = Vec::new();
            target.read_memory(addr, len, &mut buf);
            DispatchOutcome::Reply(encode_hex(&buf))
        }
        None => DispatchOutcome::Reply("E01".into()),
    }
}

fn handle_write_memory<T: TargetOps>(payload: &str, target: &mut T) -> DispatchOutcome {
    let Some((header, hex_data)) = payload[1..].split_once(':') else {
        return DispatchOutcome::Reply("E01".into());
    };
    let Some((addr, len)) = parse_addr_len(header) else {
        return DispatchOutcome::Reply("E01".into());
    };
    let Some(bytes) = decode_hex_bytes(hex_data) else {
        return DispatchOutcome::Reply("E01".into());
    };
    if bytes.len() != len {
        return DispatchOutcome::Reply("E01".into());
    }
    match target.write_memory(addr, &bytes) {
        Ok(()) => DispatchOutcome::Reply("OK".into()),
        Err(err) => error_reply(&err),
    }
}

fn handle_write_memory_binary<T: TargetOps>(payload: &[u8], target: &mut T) -> DispatchOutcome {
    let rest = &payload[1..];
    let Some(colon) = rest.iter().position(|&b| b == b':') else {
        return DispatchOutcome::Reply("E01".into());
    };
    let Ok(header) = std::str::from_utf8(&rest[..colon]) else {
        return DispatchOutcome::Reply("E01".into());
    };
    let Some((addr, len)) = parse_addr_len(header) else {
        return DispatchOutcome::Reply("E01".into());
    };
    let data = &rest[colon + 1..];
    if data.len() != len {
        return DispatchOutcome::Reply("E01".into());
    }
    match target.write_memory(addr, data) {
        Ok(()) => DispatchOutcome::Reply("OK".into()),
        Err(err) => error_reply(&err),
    }
}

/// `Z<kind>,<addr>,<len>` / `z<kind>,<addr>,<len>`. Kind 0-1 select a
/// software/hardware breakpoint, 2-4 a write/read/access watchpoint.
///
/// The original C++ this is ported from dispatches BOTH `Z` and `z` to
/// `setWatchPoint` for kinds 2-4 -- `z` never actually clears a
/// watchpoint. That is fixed here: `z` calls the unset path.
fn handle_break_watch<T: TargetOps>(payload: &str, target: &mut T) -> DispatchOutcome {
    let is_set = payload.as_bytes()[0] == b'Z';
    let mut parts = payload[1..].splitn(3, ',');
    let (Some(kind_str), Some(addr_str), Some(len_field)) =
        (parts.next(), parts.next(), parts.next())
    else {
        return DispatchOutcome::Reply("E01".into());
    };
    // GDB may append `;cond_expr` after the length; ignore it.
    let len_str = len_field.split(';').next().unwrap_or(len_field);

    let Ok(kind) = kind_str.parse::<u8>() else {
        return DispatchOutcome::Reply("E01".into());
    };
    let (Ok(addr), Ok(len)) = (
        u32::from_str_radix(addr_str, 16),
        u32::from_str_radix(len_str, 16),
    ) else {
        return DispatchOutcome::Reply("E01".into());
    };

    let result = match kind {
        0 | 1 if is_set => target.set_break_point(addr),
        0 | 1 => target.unset_break_point(addr),
        2..=4 if is_set => target.set_watch_point(addr, len, kind),
        2..=4 => target.unset_watch_point(addr, len, kind),
        _ => return DispatchOutcome::Reply(String::new()),
    };

    match result {
        Ok(()) => DispatchOutcome::Reply("OK".into()),
        // Breakpoints/watchpoints are not yet implemented; per RSP
        // convention "not supported" is an empty reply, not an error
        // packet.
        Err(TargetError::Unsupported) => DispatchOutcome::Reply(String::new()),
        Err(err) => error_reply(&err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_hex_matches_expected_digits() {
        assert_eq!(encode_hex(&[0x00, 0x01, 0x0a, 0xff]), "00010aff");
    }

    #[test]
    fn decode_hex_bytes_round_trips() {
        let bytes = vec![0xDE, 0xAD, 0xBE, 0xEF];
        assert_eq!(decode_hex_bytes(&encode_hex(&bytes)), Some(bytes));
    }

    #[test]
    fn decode_hex_bytes_rejects_odd_length() {
        assert_eq!(decode_hex_bytes("abc"), None);
    }

    #[test]
    fn le_hex_u32_is_little_endian() {
        assert_eq!(le_hex_u32(0x21000000), "00000021");
    }

    #[test]
    fn parse_addr_len_splits_on_comma() {
        assert_eq!(parse_addr_len("20000000,6"), Some((0x2000_0000, 6)));
        assert_eq!(parse_addr_len("nope"), None);
    }

    #[test]
    fn error_code_is_stable_per_kind() {
        assert_eq!(error_code(&TargetError::TargetNotFound), 0x01);
        assert_eq!(error_code(&TargetError::Unsupported), 0x03);
    }

    #[test]
    fn read_register_aliases_xpsr_at_0x19() {
        let mut target = crate::mock::MockTarget {
            xpsr: 0x2100_0000,
            ..Default::default()
        };
        let outcome = dispatch(b"p19", &mut target, &mut SessionState::default());
        assert_eq!(outcome, DispatchOutcome::Reply("00000021".into()));
    }

    #[test]
    fn read_memory_replies_with_exact_tail() {
        let mut target = crate::mock::MockTarget::default();
        for (i, &b) in [0x00u8, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07].iter().enumerate() {
            target.memory.insert(0x2000_0000 + i as u32, b);
        }
        let outcome = dispatch(b"m20000000,6", &mut target, &mut SessionState::default());
        assert_eq!(outcome, DispatchOutcome::Reply("000102030405".into()));
    }

    #[test]
    fn unsupported_breakpoint_is_an_empty_reply_not_an_error() {
        let mut target = crate::mock::MockTarget::default();
        let outcome = dispatch(b"Z0,20001000,2", &mut target, &mut SessionState::default());
        assert_eq!(outcome, DispatchOutcome::Reply(String::new()));
    }
}
