//! Drives one debugger connection: reads bytes, feeds the [`packet`]
//! state machine, and turns the events it yields into acks, resends and
//! dispatched replies.

use std::io::{Read, Write};

use target_core::TargetOps;
use tracing::{debug, trace, warn};

use crate::error::Result;
use crate::handlers::{self, DispatchOutcome, SessionState};
use crate::packet::{build_packet, ParseEvent, Parser};

const ACK: &[u8] = b"+";
const NACK: &[u8] = b"-";

/// One RSP connection. Owns the framing state machine and enough of the
/// last outbound packet to resend it on a `-`.
pub struct Session<R, W> {
    reader: R,
    writer: W,
    parser: Parser,
    last_outbound: Vec<u8>,
    state: SessionState,
}

impl<R: Read, W: Write> Session<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Session {
            reader,
            writer,
            parser: Parser::new(),
            last_outbound: Vec::new(),
            state: SessionState::default(),
        }
    }

    /// Run until the connection is closed (a zero-length read) or an I/O
    /// error occurs. One byte at a time: CMSIS-DAP transfers are small
    /// enough that batching reads buys nothing here.
    pub fn run<T: TargetOps>(&mut self, target: &mut T) -> Result<()> {
        let mut byte = [0u8; 1];
        loop {
            let n = self.reader.read(&mut byte)?;
            if n == 0 {
                debug!("debugger closed the connection");
                return Ok(());
            }

            if let Some(event) = self.parser.feed_byte(byte[0]) {
                self.handle_event(event, target)?;
            }
        }
    }

    fn handle_event<T: TargetOps>(&mut self, event: ParseEvent, target: &mut T) -> Result<()> {
        match event {
            ParseEvent::Ack => {
                trace!("peer acked");
                Ok(())
            }
            ParseEvent::Nack => {
                warn!("peer nacked, resending last packet");
                self.resend()
            }
            ParseEvent::ChecksumMismatch => {
                warn!("checksum mismatch, sending nack");
                self.writer.write_all(NACK)?;
                self.writer.flush()?;
                Ok(())
            }
            ParseEvent::Interrupt => {
                self.writer.write_all(ACK)?;
                self.writer.flush()?;
                if let Ok(signal) = target.interrupt() {
                    self.send_reply(&format!("S{signal:02x}"))?;
                }
                Ok(())
            }
            ParseEvent::Packet(payload) => {
                self.writer.write_all(ACK)?;
                self.writer.flush()?;
                match handlers::dispatch(&payload, target, &mut self.state) {
                    DispatchOutcome::Reply(reply) => self.send_reply(&reply),
                    DispatchOutcome::NoReply => Ok(()),
                }
            }
        }
    }

    fn send_reply(&mut self, payload: &str) -> Result<()> {
        let packet = build_packet(payload);
        self.writer.write_all(&packet)?;
        self.writer.flush()?;
        // Only remember it as resendable once it's actually gone out.
        self.last_outbound = packet;
        Ok(())
    }

    fn resend(&mut self) -> Result<()> {
        if self.last_outbound.is_empty() {
            return Ok(());
        }
        self.writer.write_all(&self.last_outbound)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::mock::MockTarget;
    use crate::packet::build_packet;

    #[test]
    fn first_query_attaches_and_question_mark_replies_s05() {
        let mut input = Vec::new();
        input.extend_from_slice(&build_packet("qSupported:multiprocess+"));
        input.extend_from_slice(&build_packet("?"));

        let mut target = MockTarget::default();
        let mut output = Vec::new();
        let mut session = Session::new(Cursor::new(input), &mut output);
        session.run(&mut target).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(b"+");
        expected.extend_from_slice(&build_packet("PacketSize=3fff;Qbtrace:off-;Qbtrace:bts-"));
        expected.extend_from_slice(b"+");
        expected.extend_from_slice(&build_packet("S05"));

        assert_eq!(output, expected);
        assert!(target.attached);
    }

    #[test]
    fn nack_resends_the_exact_last_packet() {
        let mut input = Vec::new();
        input.extend_from_slice(&build_packet("D"));
        input.push(b'-');

        let mut target = MockTarget::default();
        let mut output = Vec::new();
        let mut session = Session::new(Cursor::new(input), &mut output);
        session.run(&mut target).unwrap();

        let mut expected = Vec::new();
        expected.extend_from_slice(b"+");
        expected.extend_from_slice(&build_packet("OK"));
        expected.extend_from_slice(&build_packet("OK"));

        assert_eq!(output, expected);
    }
}
