use thiserror::Error;

/// Why a check could not be turned into controller options
#[derive(Debug, Error)]
pub enum CheckerError {
    #[error("checker with name not registered: {0}")]
    Unknown(String),

    /// The check is malformed
    #[error("{checker} checker: validation error: {source:#}")]
    Validation {
        checker: String,
        #[source]
        source: anyhow::Error,
    },

    /// The check is valid but no prober could be built from it
    #[error("{checker} checker: provisioning error: {source:#}")]
    Provisioning {
        checker: String,
        #[source]
        source: anyhow::Error,
    },
}

impl CheckerError {
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Unknown(_))
    }

    pub fn is_provisioning(&self) -> bool {
        matches!(self, Self::Provisioning { .. })
    }
}
