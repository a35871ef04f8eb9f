use std::collections::HashSet;

use checkup::rpc::{AgentService, CheckId};
use tracing::{debug, info, warn};

use crate::diff::CheckDiff;

/// An agent and the check ids it was last seen running
struct Load<'a, S> {
    name: &'a str,
    service: &'a S,
    checks: HashSet<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub check_id: String,
    pub agent: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub check_id: String,
    pub reason: String,
}

/// What happened to every entry of a diff
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub removed: Vec<String>,
    pub placed: Vec<Placement>,
    pub failed: Vec<Failure>,
    /// Agents whose checks could not be listed, left out of the placement
    pub unreachable: Vec<String>,
}

impl ApplyReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn fail(&mut self, check_id: &str, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(%check_id, "{reason}");
        self.failed.push(Failure { check_id: check_id.to_string(), reason });
    }
}

/// Apply `diff` to a fleet of agents given as `(name, service)` pairs.
///
/// Removals go to every reachable agent. Each addition goes to the agent
/// already running a check with that id, otherwise to the agent with the
/// fewest checks, the earliest one on a tie.
pub async fn apply<S: AgentService>(agents: &[(String, S)], diff: &CheckDiff) -> ApplyReport {
    let mut report = ApplyReport::default();

    let mut loads = Vec::with_capacity(agents.len());
    for (name, service) in agents {
        match service.list_checks().await {
            Ok(list) => loads.push(Load { name, service, checks: list.ids.into_iter().collect() }),
            Err(err) => {
                warn!(agent = %name, "agent unreachable: {err}");
                report.unreachable.push(name.clone());
            }
        }
    }

    for id in &diff.removals {
        let mut removed = true;
        for load in &mut loads {
            match load.service.remove_check(CheckId { id: id.clone() }).await {
                Ok(response) if response.successful => {
                    load.checks.remove(id);
                }
                Ok(response) => {
                    removed = false;
                    report.fail(id, format!("{}: {}", load.name, response.error.unwrap_or_default()));
                }
                Err(err) => {
                    removed = false;
                    report.fail(id, format!("{}: {err}", load.name));
                }
            }
        }
        if removed {
            debug!(check_id = %id, "check removed");
            report.removed.push(id.clone());
        }
    }

    for check in &diff.additions {
        let Some(load) = pick(&mut loads, &check.id) else {
            report.fail(&check.id, "no reachable agent");
            continue;
        };

        match load.service.push_check(check.clone()).await {
            Ok(response) if response.successful => {
                load.checks.insert(check.id.clone());
                info!(check_id = %check.id, agent = %load.name, "check placed");
                report.placed.push(Placement { check_id: check.id.clone(), agent: load.name.to_string() });
            }
            Ok(response) => {
                let reason = response.error.unwrap_or_else(|| "rejected".to_string());
                report.fail(&check.id, format!("{}: {reason}", load.name));
            }
            Err(err) => report.fail(&check.id, format!("{}: {err}", load.name)),
        }
    }

    report
}

fn pick<'l, 'a, S>(loads: &'l mut [Load<'a, S>], check_id: &str) -> Option<&'l mut Load<'a, S>> {
    if let Some(index) = loads.iter().position(|load| load.checks.contains(check_id)) {
        return loads.get_mut(index);
    }
    // min_by_key keeps the first of equal elements
    loads.iter_mut().min_by_key(|load| load.checks.len())
}
