use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("read_mac: MAC verification failure (wrong password, parameters, or corrupted container)")]
    MacVerificationFailure,

    #[error("invalid container: {0}")]
    InvalidContainer(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_io_cause_appears_once_in_chain() {
        let err = EngineError::from(std::io::Error::other("pipe closed"));
        assert_eq!(err.to_string(), "I/O error");
        assert_eq!(err.source().map(|s| s.to_string()).as_deref(), Some("pipe closed"));
    }
}
