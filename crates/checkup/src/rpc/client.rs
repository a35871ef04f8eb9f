use std::time::Duration;

use async_trait::async_trait;
use tokio::{net::TcpStream, time::timeout};

use super::{
    codec::{read_message, write_message},
    AgentService, BoolResponse, CheckId, CheckList, ManagerStats, Request, Response, RpcError,
};
use crate::{checker::Check, DEFAULT_RPC_TIMEOUT};

/// Talks to one agent, a new connection per call
#[derive(Debug, Clone)]
pub struct AgentClient {
    address: String,
    timeout: Duration,
}

impl AgentClient {
    pub fn new(address: impl Into<String>) -> Self {
        Self { address: address.into(), timeout: DEFAULT_RPC_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn call(&self, request: Request) -> Result<Response, RpcError> {
        let exchange = async {
            let mut stream = TcpStream::connect(&self.address).await?;
            write_message(&mut stream, &request).await?;
            read_message::<Response, _>(&mut stream).await
        };

        match timeout(self.timeout, exchange).await {
            Err(_elapsed) => Err(RpcError::Timeout(self.timeout)),
            Ok(Ok(Response::Error(err))) => Err(RpcError::Remote(err)),
            Ok(response) => response,
        }
    }
}

#[async_trait]
impl AgentService for AgentClient {
    async fn push_check(&self, check: Check) -> Result<BoolResponse, RpcError> {
        match self.call(Request::PushCheck(check)).await? {
            Response::Bool(response) => Ok(response),
            _ => Err(RpcError::UnexpectedResponse("PushCheck")),
        }
    }

    async fn remove_check(&self, id: CheckId) -> Result<BoolResponse, RpcError> {
        match self.call(Request::RemoveCheck(id)).await? {
            Response::Bool(response) => Ok(response),
            _ => Err(RpcError::UnexpectedResponse("RemoveCheck")),
        }
    }

    async fn list_checks(&self) -> Result<CheckList, RpcError> {
        match self.call(Request::ListChecks).await? {
            Response::CheckList(list) => Ok(list),
            _ => Err(RpcError::UnexpectedResponse("ListChecks")),
        }
    }

    async fn get_manager_stats(&self) -> Result<ManagerStats, RpcError> {
        match self.call(Request::GetManagerStats).await? {
            Response::ManagerStats(stats) => Ok(stats),
            _ => Err(RpcError::UnexpectedResponse("GetManagerStats")),
        }
    }
}
