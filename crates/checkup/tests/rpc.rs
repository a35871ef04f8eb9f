//! Agent RPC over a real socket.

use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use checkup::{
    controller::{ConfigStatus, ControllerStatus, RunStatus},
    rpc::{serve, AgentClient, AgentService, BoolResponse, CheckId, CheckList, ManagerStats, RpcError},
    Check, Component,
};
use tokio::{net::TcpListener, sync::Mutex};
use tokio_util::sync::CancellationToken;

/// Keeps pushed checks in a list
#[derive(Default)]
struct Recorder {
    checks: Mutex<Vec<Check>>,
}

#[async_trait]
impl AgentService for Recorder {
    async fn push_check(&self, check: Check) -> Result<BoolResponse, RpcError> {
        if check.interval.is_zero() {
            return Ok(BoolResponse::failed("interval should be > 0"));
        }
        self.checks.lock().await.push(check);
        Ok(BoolResponse::ok())
    }

    async fn remove_check(&self, id: CheckId) -> Result<BoolResponse, RpcError> {
        self.checks.lock().await.retain(|check| check.id != id.id);
        Ok(BoolResponse::ok())
    }

    async fn list_checks(&self) -> Result<CheckList, RpcError> {
        let mut ids: Vec<String> = self.checks.lock().await.iter().map(|c| c.id.clone()).collect();
        ids.sort();
        Ok(CheckList { ids })
    }

    async fn get_manager_stats(&self) -> Result<ManagerStats, RpcError> {
        let controllers = self
            .checks
            .lock()
            .await
            .iter()
            .map(|check| {
                let status = ControllerStatus {
                    name: check.name.clone(),
                    config: ConfigStatus {
                        error_retry: true,
                        should_back_off: true,
                        interval: check.interval,
                    },
                    run: RunStatus::default(),
                };
                (check.id.clone(), status)
            })
            .collect::<BTreeMap<_, _>>();
        Ok(ManagerStats { controllers })
    }
}

fn check(id: &str, interval: Duration) -> Check {
    Check {
        id: id.into(),
        name: format!("{id} name"),
        interval,
        timeout: Duration::from_secs(1),
        input: Component::new("TCP", ""),
        output: Component::new("TIMEOUT", ""),
        target: Component::new("ADDRESS", "localhost:80"),
        payloads: vec![],
        alerts: vec![],
    }
}

async fn start() -> (AgentClient, CancellationToken) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let token = CancellationToken::new();
    tokio::spawn(serve(listener, Arc::new(Recorder::default()), token.clone()));
    (AgentClient::new(address).with_timeout(Duration::from_secs(2)), token)
}

#[tokio::test]
async fn test_rpc_round_trip() {
    let _ = tracing_subscriber::fmt::try_init();
    let (client, token) = start().await;

    assert!(client.push_check(check("b", Duration::from_secs(5))).await.unwrap().successful);
    assert!(client.push_check(check("a", Duration::from_secs(5))).await.unwrap().successful);

    let rejected = client.push_check(check("c", Duration::ZERO)).await.unwrap();
    assert!(!rejected.successful);
    assert_eq!(rejected.error.as_deref(), Some("interval should be > 0"));

    assert_eq!(client.list_checks().await.unwrap().ids, vec!["a", "b"]);

    let stats = client.get_manager_stats().await.unwrap();
    assert_eq!(stats.controllers["a"].name, "a name");
    assert_eq!(stats.controllers["a"].config.interval, Duration::from_secs(5));

    assert!(client.remove_check(CheckId { id: "a".into() }).await.unwrap().successful);
    assert!(client.remove_check(CheckId { id: "a".into() }).await.unwrap().successful);
    assert_eq!(client.list_checks().await.unwrap().ids, vec!["b"]);

    token.cancel();
}

#[tokio::test]
async fn test_unreachable_agent_is_an_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    drop(listener);

    let client = AgentClient::new(address);
    assert!(matches!(client.list_checks().await, Err(RpcError::Io(_))));
}
