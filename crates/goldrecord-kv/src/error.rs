use thiserror::Error;

#[derive(Debug, Error)]
pub enum KvError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("value at key {0} was not valid UTF-8/JSON for this operation")]
    InvalidValue(String),
}
