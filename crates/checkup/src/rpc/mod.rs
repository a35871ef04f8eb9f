//! Agent RPC messages and transport.
//!
//! Every call is one TCP connection carrying one JSON request and one JSON
//! response, each terminated by the sender shutting down its write half.

mod client;
mod codec;
mod server;

use std::{collections::BTreeMap, fmt, io, time::Duration};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{checker::Check, controller::ControllerStatus};

pub use client::AgentClient;
pub use codec::MAX_MESSAGE_SIZE;
pub use server::serve;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoolResponse {
    pub successful: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl BoolResponse {
    pub fn ok() -> Self {
        Self { successful: true, error: None }
    }

    pub fn failed(err: impl fmt::Display) -> Self {
        Self { successful: false, error: Some(err.to_string()) }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckId {
    pub id: String,
}

/// Ids of the scheduled checks, sorted
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckList {
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManagerStats {
    pub controllers: BTreeMap<String, ControllerStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params")]
pub enum Request {
    PushCheck(Check),
    RemoveCheck(CheckId),
    ListChecks,
    GetManagerStats,
}

impl Request {
    pub fn method(&self) -> &'static str {
        match self {
            Self::PushCheck(_) => "PushCheck",
            Self::RemoveCheck(_) => "RemoveCheck",
            Self::ListChecks => "ListChecks",
            Self::GetManagerStats => "GetManagerStats",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body")]
pub enum Response {
    Bool(BoolResponse),
    CheckList(CheckList),
    ManagerStats(ManagerStats),
    Error(String),
}

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("connection error: {0}")]
    Io(#[from] io::Error),

    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("message exceeds {0} bytes")]
    TooLarge(usize),

    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    #[error("remote error: {0}")]
    Remote(String),

    #[error("unexpected response to {0}")]
    UnexpectedResponse(&'static str),
}

/// Operations an agent offers to central
#[async_trait]
pub trait AgentService: Send + Sync {
    /// Install or replace the check's controller, all or nothing
    async fn push_check(&self, check: Check) -> Result<BoolResponse, RpcError>;

    /// Removing an unknown id is not an error
    async fn remove_check(&self, id: CheckId) -> Result<BoolResponse, RpcError>;

    async fn list_checks(&self) -> Result<CheckList, RpcError>;

    async fn get_manager_stats(&self) -> Result<ManagerStats, RpcError>;
}

/// Run one request against a service
pub async fn dispatch<S: AgentService + ?Sized>(service: &S, request: Request) -> Response {
    let handled = match request {
        Request::PushCheck(check) => service.push_check(check).await.map(Response::Bool),
        Request::RemoveCheck(id) => service.remove_check(id).await.map(Response::Bool),
        Request::ListChecks => service.list_checks().await.map(Response::CheckList),
        Request::GetManagerStats => service.get_manager_stats().await.map(Response::ManagerStats),
    };
    handled.unwrap_or_else(|err| Response::Error(err.to_string()))
}
