use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("device not connected")]
    NotConnected,
    #[error("{0} not supported by the selected device")]
    Unsupported(&'static str),
    #[error("device failure: {0}")]
    Failed(String),
}
