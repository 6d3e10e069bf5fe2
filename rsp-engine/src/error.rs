use thiserror::Error;

#[derive(Debug, Error)]
pub enum RspError {
    #[error("I/O error on the debugger transport")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RspError>;
