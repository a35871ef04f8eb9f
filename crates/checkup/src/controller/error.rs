use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ControllerError {
    #[error("controller id cannot be empty")]
    EmptyId,
    #[error("{0} should be > 0")]
    InvalidInterval(&'static str),
    #[error("manager is closed")]
    ManagerClosed,
    #[error("controllers did not stop within {0:?}")]
    ShutdownTimeout(Duration),
}
