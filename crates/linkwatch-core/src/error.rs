use thiserror::Error;

#[derive(Debug, Error)]
pub enum LinkError {
    #[error("serial port error: {0}")]
    Port(#[from] serialport::Error),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serial service disconnected")]
    Disconnected,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("config parse error: {0}")]
    Config(#[from] serde_json::Error),
}

impl LinkError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, LinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_messages() {
        assert_eq!(LinkError::Disconnected.to_string(), "serial service disconnected");
        assert_eq!(
            LinkError::invalid_config("hold_ms must be positive").to_string(),
            "invalid configuration: hold_ms must be positive"
        );
    }

    #[test]
    fn converts_from_io() {
        let err: LinkError = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow").into();
        assert!(matches!(err, LinkError::Io(_)));
    }
}
