use thiserror::Error;

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("no System Control Space was found on this target")]
    TargetNotFound,

    #[error("timed out waiting for the core to acknowledge a register transfer")]
    Timeout,

    #[error("this operation is not supported")]
    Unsupported,

    #[error(transparent)]
    Arm(#[from] swd_adiv5::ArmError),
}

pub type Result<T> = std::result::Result<T, TargetError>;
