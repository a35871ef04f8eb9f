use async_trait::async_trait;
use checkup::{
    rpc::{AgentService, BoolResponse, CheckId, CheckList, ManagerStats, RpcError},
    Check,
};
use tracing::warn;

use crate::agent::Agent;

#[async_trait]
impl AgentService for Agent {
    async fn push_check(&self, check: Check) -> Result<BoolResponse, RpcError> {
        match self.add_check(&check).await {
            Ok(()) => Ok(BoolResponse::ok()),
            Err(err) => {
                warn!(check_id = %check.id, "rejected pushed check: {err}");
                Ok(BoolResponse::failed(err))
            }
        }
    }

    async fn remove_check(&self, id: CheckId) -> Result<BoolResponse, RpcError> {
        self.remove_check(&id.id).await;
        Ok(BoolResponse::ok())
    }

    async fn list_checks(&self) -> Result<CheckList, RpcError> {
        let mut ids: Vec<String> = self.manager().list_controllers().await.into_keys().collect();
        ids.sort();
        Ok(CheckList { ids })
    }

    async fn get_manager_stats(&self) -> Result<ManagerStats, RpcError> {
        let controllers = self.manager().stats().await.into_iter().collect();
        Ok(ManagerStats { controllers })
    }
}
