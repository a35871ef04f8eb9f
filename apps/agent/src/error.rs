use std::io::Error as IoError;

use checkup::{CheckerError, ControllerError, RegistryError};
use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0:#}")]
    Io(#[from] IoError),
    #[error("Address parsing error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("{0}")]
    Agent(#[from] AgentError),
}

/// Failures while building or changing the agent's set of checks
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("alert service configured twice: {0}")]
    DuplicateAlertService(String),
    #[error("alert service not configured: {0}")]
    UnknownAlertService(String),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error("metrics backend: {0:#}")]
    Exporter(#[source] anyhow::Error),
    #[error("{service} alerter: {source:#}")]
    Alerter {
        service: String,
        #[source]
        source: anyhow::Error,
    },
    #[error(transparent)]
    Checker(#[from] CheckerError),
    #[error(transparent)]
    Controller(#[from] ControllerError),
    #[error("check {index}: {source}")]
    ConfigCheck {
        index: usize,
        #[source]
        source: Box<AgentError>,
    },
}
