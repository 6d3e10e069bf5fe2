//! CMSIS-DAP vendor HID commands.
//!
//! Each command is a `(Request, Response)` pair tied together by a single
//! byte identifying the command. `send_command` builds the outgoing HID
//! report, performs one write/read round trip through [`crate::probe::transact`]
//! and parses the response.

use crate::error::{CmsisDapError, Result};
use scroll::{Pread, LE};

/// CMSIS-DAP command identifiers (DAP_* in the vendor spec).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandId {
    Info = 0x00,
    Led = 0x01,
    Connect = 0x02,
    Disconnect = 0x03,
    TransferConfigure = 0x04,
    Transfer = 0x05,
    WriteAbort = 0x08,
    ResetTarget = 0x0A,
    SwjPins = 0x10,
    SwjClock = 0x11,
    SwjSequence = 0x12,
    SwdConfigure = 0x13,
}

/// A request that can be serialised into a HID report buffer.
pub trait Request {
    const COMMAND_ID: CommandId;
    /// Serialise into `buffer`, returning the number of bytes written.
    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize>;
}

/// A response parsed out of the bytes that follow the command echo byte.
pub trait Response: Sized {
    fn from_bytes(buffer: &[u8]) -> Result<Self>;
}

// ---------------------------------------------------------------------
// INFO (0x00)
// ---------------------------------------------------------------------

#[derive(Copy, Clone, Debug, Default)]
pub struct CapabilitiesRequest;

#[derive(Copy, Clone, Debug, Default)]
pub struct Capabilities {
    pub swd_implemented: bool,
    pub jtag_implemented: bool,
}

impl Request for CapabilitiesRequest {
    const COMMAND_ID: CommandId = CommandId::Info;
    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize> {
        buffer[0] = 0xF0;
        Ok(1)
    }
}

impl Response for Capabilities {
    fn from_bytes(buffer: &[u8]) -> Result<Self> {
        if buffer[0] == 0 {
            return Err(CmsisDapError::NotEnoughData);
        }
        let info = buffer[1];
        Ok(Capabilities {
            swd_implemented: info & 0x01 != 0,
            jtag_implemented: info & 0x02 != 0,
        })
    }
}

macro_rules! info_string_command {
    ($request:ident, $response:ident, $subcommand:expr) => {
        #[derive(Copy, Clone, Debug, Default)]
        pub struct $request;

        #[derive(Clone, Debug, Default)]
        pub struct $response(pub String);

        impl Request for $request {
            const COMMAND_ID: CommandId = CommandId::Info;
            fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize> {
                buffer[0] = $subcommand;
                Ok(1)
            }
        }

        impl Response for $response {
            fn from_bytes(buffer: &[u8]) -> Result<Self> {
                let len = buffer[0] as usize;
                if len == 0 {
                    return Ok($response(String::new()));
                }
                // Trailing NUL terminator is included in `len`.
                let text_len = len.saturating_sub(1);
                let bytes = &buffer[1..1 + text_len];
                let text = std::str::from_utf8(bytes)
                    .map_err(|_| CmsisDapError::NotEnoughData)?
                    .to_owned();
                Ok($response(text))
            }
        }
    };
}

info_string_command!(VendorNameRequest, VendorName, 0x01);
info_string_command!(ProductNameRequest, ProductName, 0x02);
info_string_command!(FirmwareVersionRequest, FirmwareVersion, 0x04);

#[derive(Copy, Clone, Debug, Default)]
pub struct PacketCountRequest;

#[derive(Copy, Clone, Debug, Default)]
pub struct PacketCount(pub u8);

impl Request for PacketCountRequest {
    const COMMAND_ID: CommandId = CommandId::Info;
    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize> {
        buffer[0] = 0xFE;
        Ok(1)
    }
}

impl Response for PacketCount {
    fn from_bytes(buffer: &[u8]) -> Result<Self> {
        if buffer[0] != 0x01 {
            return Err(CmsisDapError::NotEnoughData);
        }
        Ok(PacketCount(buffer[1]))
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct PacketSizeRequest;

#[derive(Copy, Clone, Debug, Default)]
pub struct PacketSize(pub u16);

impl Request for PacketSizeRequest {
    const COMMAND_ID: CommandId = CommandId::Info;
    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize> {
        buffer[0] = 0xFF;
        Ok(1)
    }
}

impl Response for PacketSize {
    fn from_bytes(buffer: &[u8]) -> Result<Self> {
        if buffer[0] != 0x02 {
            return Err(CmsisDapError::NotEnoughData);
        }
        let value = buffer[1..3]
            .pread_with::<u16>(0, LE)
            .map_err(|_| CmsisDapError::NotEnoughData)?;
        Ok(PacketSize(value))
    }
}

// ---------------------------------------------------------------------
// LED (0x01)
// ---------------------------------------------------------------------

#[derive(Copy, Clone, Debug)]
pub enum LedKind {
    Connect = 0x00,
    Running = 0x01,
}

#[derive(Copy, Clone, Debug)]
pub struct LedRequest {
    pub led: LedKind,
    pub on: bool,
}

impl Request for LedRequest {
    const COMMAND_ID: CommandId = CommandId::Led;
    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize> {
        buffer[0] = self.led as u8;
        buffer[1] = self.on as u8;
        Ok(2)
    }
}

#[derive(Copy, Clone, Debug)]
pub struct LedResponse;

impl Response for LedResponse {
    fn from_bytes(buffer: &[u8]) -> Result<Self> {
        if buffer[0] != 0x00 {
            return Err(CmsisDapError::DapResponse);
        }
        Ok(LedResponse)
    }
}

// ---------------------------------------------------------------------
// CONNECT (0x02) / DISCONNECT (0x03)
// ---------------------------------------------------------------------

#[derive(Copy, Clone, Debug)]
pub enum ConnectMode {
    Default = 0x00,
    Swd = 0x01,
    Jtag = 0x02,
}

#[derive(Copy, Clone, Debug)]
pub struct ConnectRequest(pub ConnectMode);

impl Request for ConnectRequest {
    const COMMAND_ID: CommandId = CommandId::Connect;
    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize> {
        buffer[0] = self.0 as u8;
        Ok(1)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ConnectResponse {
    InitFailed,
    Swd,
    Jtag,
}

impl Response for ConnectResponse {
    fn from_bytes(buffer: &[u8]) -> Result<Self> {
        match buffer[0] {
            0x00 => Ok(ConnectResponse::InitFailed),
            0x01 => Ok(ConnectResponse::Swd),
            0x02 => Ok(ConnectResponse::Jtag),
            got => Err(CmsisDapError::UnexpectedAnswer {
                expected: 0x01,
                got,
            }),
        }
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct DisconnectRequest;

impl Request for DisconnectRequest {
    const COMMAND_ID: CommandId = CommandId::Disconnect;
    fn to_bytes(&self, _buffer: &mut [u8]) -> Result<usize> {
        Ok(0)
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct DisconnectResponse;

impl Response for DisconnectResponse {
    fn from_bytes(buffer: &[u8]) -> Result<Self> {
        if buffer[0] != 0x00 {
            return Err(CmsisDapError::DapResponse);
        }
        Ok(DisconnectResponse)
    }
}

// ---------------------------------------------------------------------
// TRANSFER_CONFIGURE (0x04)
// ---------------------------------------------------------------------

#[derive(Copy, Clone, Debug)]
pub struct TransferConfigureRequest {
    pub idle_cycles: u8,
    pub wait_retry: u16,
    pub match_retry: u16,
}

impl Request for TransferConfigureRequest {
    const COMMAND_ID: CommandId = CommandId::TransferConfigure;
    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize> {
        buffer[0] = self.idle_cycles;
        buffer[1..3].copy_from_slice(&self.wait_retry.to_le_bytes());
        buffer[3..5].copy_from_slice(&self.match_retry.to_le_bytes());
        Ok(5)
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct TransferConfigureResponse;

impl Response for TransferConfigureResponse {
    fn from_bytes(buffer: &[u8]) -> Result<Self> {
        if buffer[0] != 0x00 {
            return Err(CmsisDapError::DapResponse);
        }
        Ok(TransferConfigureResponse)
    }
}

// ---------------------------------------------------------------------
// TRANSFER (0x05) - the DP/AP register access primitive.
// ---------------------------------------------------------------------

/// One DP or AP register to read or write in a single `TRANSFER` command.
#[derive(Copy, Clone, Debug)]
pub struct TransferAddress {
    pub is_ap: bool,
    /// bits A[3:2] of the register address (A0=A1=0 always, per ADIv5).
    pub a2: bool,
    pub a3: bool,
}

impl TransferAddress {
    pub fn new(is_ap: bool, register_address: u8) -> Self {
        TransferAddress {
            is_ap,
            a2: register_address & 0x04 != 0,
            a3: register_address & 0x08 != 0,
        }
    }
}

#[derive(Copy, Clone, Debug)]
enum InnerOp {
    Read,
    Write(u32),
}

#[derive(Copy, Clone, Debug)]
struct InnerTransfer {
    address: TransferAddress,
    op: InnerOp,
}

impl InnerTransfer {
    fn to_bytes(&self, buffer: &mut [u8]) -> usize {
        let rnw = matches!(self.op, InnerOp::Read);
        buffer[0] = (self.address.is_ap as u8)
            | (rnw as u8) << 1
            | (self.address.a2 as u8) << 2
            | (self.address.a3 as u8) << 3;
        if let InnerOp::Write(data) = self.op {
            buffer[1..5].copy_from_slice(&data.to_le_bytes());
            5
        } else {
            1
        }
    }
}

/// A batch of DP/AP register transfers sent as a single `DAP_Transfer` command.
///
/// In this bridge a `TransferRequest` always carries exactly one register
/// access: the single-threaded, single-core model has no use for batching
/// multiple transfers per HID round trip, unlike the wider probe-rs driver
/// this is grounded on.
#[derive(Copy, Clone, Debug)]
pub struct TransferRequest {
    transfer: InnerTransfer,
}

impl TransferRequest {
    pub fn read(address: TransferAddress) -> Self {
        TransferRequest {
            transfer: InnerTransfer {
                address,
                op: InnerOp::Read,
            },
        }
    }

    pub fn write(address: TransferAddress, data: u32) -> Self {
        TransferRequest {
            transfer: InnerTransfer {
                address,
                op: InnerOp::Write(data),
            },
        }
    }

    /// The register this transfer targets. Exposed so a mock transport
    /// can tell transfers apart by address (e.g. to count TAR writes)
    /// without needing access to the private wire encoding.
    pub fn address(&self) -> TransferAddress {
        self.transfer.address
    }
}

impl Request for TransferRequest {
    const COMMAND_ID: CommandId = CommandId::Transfer;
    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize> {
        buffer[0] = 0; // DAP index, ignored in SWD mode.
        buffer[1] = 1; // transfer count
        let written = self.transfer.to_bytes(&mut buffer[2..]);
        Ok(2 + written)
    }
}

/// Acknowledge field returned for the last (here: only) transfer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Ack {
    Ok,
    Wait,
    Fault,
    NoAck,
}

impl Ack {
    fn from_bits(bits: u8) -> Ack {
        match bits {
            1 => Ack::Ok,
            2 => Ack::Wait,
            4 => Ack::Fault,
            _ => Ack::NoAck,
        }
    }
}

#[derive(Copy, Clone, Debug)]
pub struct TransferResponse {
    pub ack: Ack,
    pub protocol_error: bool,
    pub data: Option<u32>,
}

impl Response for TransferResponse {
    fn from_bytes(buffer: &[u8]) -> Result<Self> {
        if buffer.len() < 2 {
            return Err(CmsisDapError::NotEnoughData);
        }
        let completed = buffer[0];
        let status = buffer[1];
        let ack = Ack::from_bits(status & 0x07);
        let protocol_error = status & 0x08 != 0;

        let data = if completed == 1 && ack == Ack::Ok && buffer.len() >= 6 {
            Some(
                buffer[2..6]
                    .pread_with::<u32>(0, LE)
                    .map_err(|_| CmsisDapError::NotEnoughData)?,
            )
        } else {
            None
        };

        Ok(TransferResponse {
            ack,
            protocol_error,
            data,
        })
    }
}

// ---------------------------------------------------------------------
// WRITE_ABORT (0x08)
// ---------------------------------------------------------------------

#[derive(Copy, Clone, Debug)]
pub struct WriteAbortRequest {
    pub abort: u32,
}

impl Request for WriteAbortRequest {
    const COMMAND_ID: CommandId = CommandId::WriteAbort;
    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize> {
        buffer[0] = 0; // DAP index
        buffer[1..5].copy_from_slice(&self.abort.to_le_bytes());
        Ok(5)
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct WriteAbortResponse;

impl Response for WriteAbortResponse {
    fn from_bytes(buffer: &[u8]) -> Result<Self> {
        if buffer[0] != 0x00 {
            return Err(CmsisDapError::DapResponse);
        }
        Ok(WriteAbortResponse)
    }
}

// ---------------------------------------------------------------------
// RESET_TARGET (0x0A)
// ---------------------------------------------------------------------

#[derive(Copy, Clone, Debug, Default)]
pub struct ResetTargetRequest;

impl Request for ResetTargetRequest {
    const COMMAND_ID: CommandId = CommandId::ResetTarget;
    fn to_bytes(&self, _buffer: &mut [u8]) -> Result<usize> {
        Ok(0)
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct ResetTargetResponse;

impl Response for ResetTargetResponse {
    fn from_bytes(_buffer: &[u8]) -> Result<Self> {
        Ok(ResetTargetResponse)
    }
}

// ---------------------------------------------------------------------
// SWJ_PINS (0x10) / SWJ_CLOCK (0x11) / SWJ_SEQUENCE (0x12)
// ---------------------------------------------------------------------

#[derive(Copy, Clone, Debug)]
pub struct SwjPinsRequest {
    pub pin_output: u8,
    pub pin_select: u8,
    pub wait_us: u32,
}

impl Request for SwjPinsRequest {
    const COMMAND_ID: CommandId = CommandId::SwjPins;
    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize> {
        buffer[0] = self.pin_output;
        buffer[1] = self.pin_select;
        buffer[2..6].copy_from_slice(&self.wait_us.to_le_bytes());
        Ok(6)
    }
}

#[derive(Copy, Clone, Debug)]
pub struct SwjPinsResponse(pub u8);

impl Response for SwjPinsResponse {
    fn from_bytes(buffer: &[u8]) -> Result<Self> {
        Ok(SwjPinsResponse(buffer[0]))
    }
}

#[derive(Copy, Clone, Debug)]
pub struct SwjClockRequest {
    pub clock_hz: u32,
}

impl Request for SwjClockRequest {
    const COMMAND_ID: CommandId = CommandId::SwjClock;
    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize> {
        buffer[0..4].copy_from_slice(&self.clock_hz.to_le_bytes());
        Ok(4)
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct SwjClockResponse;

impl Response for SwjClockResponse {
    fn from_bytes(buffer: &[u8]) -> Result<Self> {
        if buffer[0] != 0x00 {
            return Err(CmsisDapError::DapResponse);
        }
        Ok(SwjClockResponse)
    }
}

/// A raw sequence of SWCLK/SWDIO edges, MSB-first within each byte, sent
/// LSB-first byte order, as required for the JTAG-to-SWD magic sequence
/// and the idle/line-reset sequences during initialisation.
#[derive(Clone, Debug)]
pub struct SwjSequenceRequest {
    pub bit_count: u16,
    pub data: Vec<u8>,
}

impl SwjSequenceRequest {
    pub fn new(bit_count: u16, data: Vec<u8>) -> Self {
        SwjSequenceRequest { bit_count, data }
    }
}

impl Request for SwjSequenceRequest {
    const COMMAND_ID: CommandId = CommandId::SwjSequence;
    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize> {
        // 0 in the count byte means 256 bits, per the CMSIS-DAP spec.
        let count_byte = if self.bit_count == 256 {
            0
        } else {
            self.bit_count as u8
        };
        buffer[0] = count_byte;
        buffer[1..1 + self.data.len()].copy_from_slice(&self.data);
        Ok(1 + self.data.len())
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct SwjSequenceResponse;

impl Response for SwjSequenceResponse {
    fn from_bytes(buffer: &[u8]) -> Result<Self> {
        if buffer[0] != 0x00 {
            return Err(CmsisDapError::DapResponse);
        }
        Ok(SwjSequenceResponse)
    }
}

// ---------------------------------------------------------------------
// SWD_CONFIGURE (0x13)
// ---------------------------------------------------------------------

#[derive(Copy, Clone, Debug)]
pub struct SwdConfigureRequest {
    pub turnaround_cycles: u8,
    pub data_phase: bool,
}

impl Request for SwdConfigureRequest {
    const COMMAND_ID: CommandId = CommandId::SwdConfigure;
    fn to_bytes(&self, buffer: &mut [u8]) -> Result<usize> {
        buffer[0] = (self.turnaround_cycles & 0x03) | ((self.data_phase as u8) << 2);
        Ok(1)
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct SwdConfigureResponse;

impl Response for SwdConfigureResponse {
    fn from_bytes(buffer: &[u8]) -> Result<Self> {
        if buffer[0] != 0x00 {
            return Err(CmsisDapError::DapResponse);
        }
        Ok(SwdConfigureResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_address_splits_a2_a3() {
        let addr = TransferAddress::new(false, 0x8); // DP SELECT
        assert!(!addr.a2);
        assert!(addr.a3);

        let addr = TransferAddress::new(true, 0x4); // AP register bank byte 0x4
        assert!(addr.a2);
        assert!(!addr.a3);
    }

    #[test]
    fn transfer_request_read_encodes_ap_bit() {
        let mut buffer = [0u8; 8];
        let req = TransferRequest::read(TransferAddress::new(true, 0x0));
        let n = req.to_bytes(&mut buffer).unwrap();
        assert_eq!(n, 3); // dap_index, count, one read byte
        assert_eq!(buffer[2] & 0x01, 1); // APnDP bit set
        assert_eq!(buffer[2] & 0x02, 0x02); // RnW bit set for read
    }

    #[test]
    fn transfer_request_write_appends_data() {
        let mut buffer = [0u8; 8];
        let req = TransferRequest::write(TransferAddress::new(false, 0x4), 0xDEAD_BEEF);
        let n = req.to_bytes(&mut buffer).unwrap();
        assert_eq!(n, 7);
        assert_eq!(&buffer[3..7], &0xDEAD_BEEFu32.to_le_bytes());
    }

    #[test]
    fn transfer_response_parses_fault_without_data() {
        let buffer = [0x01u8, 0x04]; // completed=1, ack=FAULT
        let resp = TransferResponse::from_bytes(&buffer).unwrap();
        assert_eq!(resp.ack, Ack::Fault);
        assert!(resp.data.is_none());
    }

    #[test]
    fn swj_sequence_256_bits_encodes_as_zero_count() {
        let mut buffer = [0u8; 40];
        let req = SwjSequenceRequest::new(256, vec![0xFFu8; 32]);
        req.to_bytes(&mut buffer).unwrap();
        assert_eq!(buffer[0], 0);
    }
}
