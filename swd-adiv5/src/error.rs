use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArmError {
    #[error("target responded FAULT to a DP/AP transfer")]
    AckFault,

    #[error("target kept responding WAIT past the probe's retry budget")]
    AckWait,

    #[error("probe reported a protocol error on the SWD line")]
    ProtocolError,

    #[error("AP {0} does not exist")]
    ApNotFound(u8),

    #[error("ROM table recursion exceeded the depth limit")]
    RomTableTooDeep,

    #[error(transparent)]
    Transport(#[from] dap_transport::CmsisDapError),
}

pub type Result<T> = std::result::Result<T, ArmError>;
