use std::io::Error as IoError;

use checkup::rpc::RpcError;
use thiserror::Error;

use crate::{config::ConfigError, diff::DiffError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Diff(#[from] DiffError),
    #[error("{agent}: {source}")]
    Rpc {
        agent: String,
        #[source]
        source: RpcError,
    },
    #[error("no agents configured")]
    NoAgents,
    #[error("{0} check(s) could not be applied")]
    Incomplete(usize),
    #[error("failed to encode output: {0}")]
    Encode(#[from] serde_json::Error),
}
