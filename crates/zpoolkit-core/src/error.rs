use thiserror::Error;

/// Result alias for pool operations.
pub type ZpoolResult<T> = Result<T, ZpoolError>;

#[derive(Error, Debug)]
pub enum ZpoolError {
    #[error("[ZP1000] io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[ZP1001] toml config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("[ZP1002] yaml config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("[ZP1100] configuration error: {0}")]
    InvalidConfig(String),

    #[error("[ZP1200] pool not found: {0}")]
    PoolNotFound(String),

    #[error("[ZP1300] failed to parse `{field}` value `{value}`")]
    Parse { field: String, value: String },

    #[error("[ZP2000] command error: {0}")]
    Command(String),
}

impl ZpoolError {
    pub fn code(&self) -> &'static str {
        match self {
            ZpoolError::Io(_) => "ZP1000",
            ZpoolError::Toml(_) => "ZP1001",
            ZpoolError::Yaml(_) => "ZP1002",
            ZpoolError::InvalidConfig(_) => "ZP1100",
            ZpoolError::PoolNotFound(_) => "ZP1200",
            ZpoolError::Parse { .. } => "ZP1300",
            ZpoolError::Command(_) => "ZP2000",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_carries_code() {
        let err = ZpoolError::Command("zpool import exited with code 1".into());
        assert_eq!(err.code(), "ZP2000");
        assert!(err.to_string().starts_with("[ZP2000]"));

        let err = ZpoolError::Parse {
            field: "size".into(),
            value: "lots".into(),
        };
        assert_eq!(err.code(), "ZP1300");
        assert!(err.to_string().contains("`lots`"));
    }
}
