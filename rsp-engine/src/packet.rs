//! Byte-level RSP framing: `$payload#cc` envelopes, `+`/`-` acks, and the
//! bare 0x03 interrupt byte.
//!
//! The parser is a pure state machine fed one byte at a time; it never
//! touches a transport or a target, which is what makes the checksum and
//! framing properties (round-trip, single-bit-corruption rejection)
//! trivial to unit test.

/// A literal 0x03 outside any packet is the debugger's interrupt request.
const INTERRUPT_BYTE: u8 = 0x03;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    SearchingDollar,
    AccumulatingPayload,
    ExpectingCk1,
    ExpectingCk2,
}

/// One parsed unit of the wire protocol, yielded as soon as enough bytes
/// have been consumed to recognise it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// A complete `$...#cc` packet whose checksum matched. `payload` is
    /// the raw bytes between `$` and `#`.
    Packet(Vec<u8>),
    /// A complete packet whose checksum did not match.
    ChecksumMismatch,
    /// The peer acknowledged the most recently sent packet.
    Ack,
    /// The peer asked for the most recently sent packet to be resent.
    Nack,
    /// A bare 0x03 received outside any packet.
    Interrupt,
}

/// Sum of `payload` bytes, mod 256, as required by the RSP wire format.
pub fn checksum(payload: &[u8]) -> u8 {
    payload.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Build the wire bytes for one outbound packet: `$` + payload + `#` +
/// two lowercase hex checksum digits.
pub fn build_packet(payload: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 4);
    out.push(b'$');
    out.extend_from_slice(payload.as_bytes());
    out.push(b'#');
    out.extend_from_slice(format!("{:02x}", checksum(payload.as_bytes())).as_bytes());
    out
}

fn hex_digit(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte - b'0'),
        b'a'..=b'f' => Some(byte - b'a' + 10),
        b'A'..=b'F' => Some(byte - b'A' + 10),
        _ => None,
    }
}

/// Incremental RSP packet reader, fed one byte at a time.
#[derive(Debug)]
pub struct Parser {
    state: State,
    payload: Vec<u8>,
    running_checksum: u8,
    ck1_digit: u8,
}

impl Default for Parser {
    fn default() -> Self {
        Parser {
            state: State::SearchingDollar,
            payload: Vec::new(),
            running_checksum: 0,
            ck1_digit: 0,
        }
    }
}

impl Parser {
    pub fn new() -> Self {
        Parser::default()
    }

    /// Feed one byte into the state machine, returning an event if this
    /// byte completed one.
    pub fn feed_byte(&mut self, byte: u8) -> Option<ParseEvent> {
        match self.state {
            State::SearchingDollar => match byte {
                b'$' => {
                    self.payload.clear();
                    self.running_checksum = 0;
                    self.state = State::AccumulatingPayload;
                    None
                }
                b'+' => Some(ParseEvent::Ack),
                b'-' => Some(ParseEvent::Nack),
                INTERRUPT_BYTE => Some(ParseEvent::Interrupt),
                _ => None,
            },
            State::AccumulatingPayload => {
                if byte == b'#' {
                    self.state = State::ExpectingCk1;
                } else {
                    self.payload.push(byte);
                    self.running_checksum = self.running_checksum.wrapping_add(byte);
                }
                None
            }
            State::ExpectingCk1 => match hex_digit(byte) {
                Some(d) => {
                    self.ck1_digit = d;
                    self.state = State::ExpectingCk2;
                    None
                }
                None => {
                    // Not a hex digit where one is required: give up on
                    // this packet and resynchronise.
                    self.state = State::SearchingDollar;
                    Some(ParseEvent::ChecksumMismatch)
                }
            },
            State::ExpectingCk2 => {
                self.state = State::SearchingDollar;
                match hex_digit(byte) {
                    Some(d) => {
                        let received = (self.ck1_digit << 4) | d;
                        if received == self.running_checksum {
                            Some(ParseEvent::Packet(std::mem::take(&mut self.payload)))
                        } else {
                            Some(ParseEvent::ChecksumMismatch)
                        }
                    }
                    None => Some(ParseEvent::ChecksumMismatch),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(parser: &mut Parser, bytes: &[u8]) -> Vec<ParseEvent> {
        bytes.iter().filter_map(|&b| parser.feed_byte(b)).collect()
    }

    #[test]
    fn checksum_round_trip() {
        let payload = b"qSupported:multiprocess+";
        let packet = build_packet(std::str::from_utf8(payload).unwrap());

        let mut parser = Parser::new();
        let events = feed_all(&mut parser, &packet);
        assert_eq!(events, vec![ParseEvent::Packet(payload.to_vec())]);
    }

    #[test]
    fn single_bit_checksum_corruption_yields_mismatch_and_no_packet() {
        let mut packet = build_packet("OK");
        // Flip a bit in the low checksum digit.
        let last = packet.len() - 1;
        packet[last] ^= 0x01;

        let mut parser = Parser::new();
        let events = feed_all(&mut parser, &packet);
        assert_eq!(events, vec![ParseEvent::ChecksumMismatch]);
    }

    #[test]
    fn ack_and_nack_recognised_outside_a_packet() {
        let mut parser = Parser::new();
        assert_eq!(parser.feed_byte(b'+'), Some(ParseEvent::Ack));
        assert_eq!(parser.feed_byte(b'-'), Some(ParseEvent::Nack));
    }

    #[test]
    fn interrupt_byte_recognised_outside_a_packet() {
        let mut parser = Parser::new();
        assert_eq!(parser.feed_byte(0x03), Some(ParseEvent::Interrupt));
    }

    #[test]
    fn interrupt_byte_inside_a_payload_is_just_data() {
        // A 0x03 that happens to appear inside a payload (after '$', before
        // '#') is ordinary payload data, not an interrupt.
        let mut parser = Parser::new();
        parser.feed_byte(b'$');
        assert_eq!(parser.feed_byte(0x03), None);
    }

    #[test]
    fn empty_payload_checksum_is_00() {
        let packet = build_packet("");
        assert_eq!(packet, b"$#00");
    }

    #[test]
    fn resync_after_malformed_checksum_digit() {
        let mut parser = Parser::new();
        let events = feed_all(&mut parser, b"$OK#gg");
        assert_eq!(events, vec![ParseEvent::ChecksumMismatch]);
        // The next well-formed packet parses normally; state resynchronised.
        let events = feed_all(&mut parser, &build_packet("S05"));
        assert_eq!(events, vec![ParseEvent::Packet(b"S05".to_vec())]);
    }
}
