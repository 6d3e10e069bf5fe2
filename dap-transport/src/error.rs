use thiserror::Error;

/// Everything that can go wrong while talking to a CMSIS-DAP probe over HID.
#[derive(Debug, Error)]
pub enum CmsisDapError {
    #[error("no CMSIS-DAP probe found")]
    ProbeNotFound,

    #[error("failed to open HID device")]
    OpenFailed(#[source] hidapi::HidError),

    #[error("HID write failed")]
    WriteFailed(#[source] hidapi::HidError),

    #[error("HID read failed")]
    ReadFailed(#[source] hidapi::HidError),

    #[error("timed out waiting for a response from the probe")]
    Timeout,

    #[error("request of {0} bytes exceeds the negotiated packet size")]
    BufferTooSmall(usize),

    #[error("probe responded to the wrong command (expected {expected:#04x}, got {got:#04x})")]
    UnexpectedAnswer { expected: u8, got: u8 },

    #[error("probe reported an error for this transfer")]
    DapResponse,

    #[error("probe returned fewer bytes than the response needs")]
    NotEnoughData,

    #[error("probe rejected the requested SWD connect mode")]
    ConnectFailed,

    #[error(transparent)]
    Hid(#[from] hidapi::HidError),
}

pub type Result<T> = std::result::Result<T, CmsisDapError>;
