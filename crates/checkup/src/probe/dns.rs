//! DNS prober.

use std::{io, net::IpAddr, sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use tokio::net::lookup_host;
use tokio_util::sync::CancellationToken;

use super::{race, Clock, ProbeResult};

/// Resolves host names to addresses
#[async_trait]
pub trait Resolve: Send + Sync {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>>;
}

/// The operating system's resolver.
///
/// Lookups run on the blocking pool and cannot be interrupted; a lookup that
/// outlives its probe finishes in the background.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemResolver;

#[async_trait]
impl Resolve for SystemResolver {
    async fn resolve(&self, host: &str) -> io::Result<Vec<IpAddr>> {
        Ok(lookup_host((host, 0)).await?.map(|addr| addr.ip()).collect())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DnsResponse {
    /// Resolved addresses in resolver order without duplicates
    pub addresses: Vec<IpAddr>,
}

#[derive(Clone)]
pub struct DnsProber {
    host: String,
    resolver: Arc<dyn Resolve>,
    timeout: Duration,
}

impl DnsProber {
    pub fn new(host: impl Into<String>, resolver: Arc<dyn Resolve>, timeout: Duration) -> Self {
        Self { host: host.into(), resolver, timeout }
    }

    pub async fn probe(&self, token: &CancellationToken) -> Result<ProbeResult<DnsResponse>> {
        let clock = Clock::start(self.timeout);

        let resolver = Arc::clone(&self.resolver);
        let host = self.host.clone();
        let lookup = async move { resolver.resolve(&host).await };

        match race(token, clock.deadline(), lookup).await?.settle("resolve") {
            Ok(resolved) => {
                let mut addresses: Vec<IpAddr> = Vec::with_capacity(resolved.len());
                for address in resolved {
                    if !addresses.contains(&address) {
                        addresses.push(address);
                    }
                }
                Ok(clock.finish(DnsResponse { addresses }))
            }
            Err(interrupt) => clock.interrupted(interrupt),
        }
    }
}

impl std::fmt::Debug for DnsProber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DnsProber")
            .field("host", &self.host)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::Outcome;

    struct Slow;

    #[async_trait]
    impl Resolve for Slow {
        async fn resolve(&self, _host: &str) -> io::Result<Vec<IpAddr>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![])
        }
    }

    struct Repeating;

    #[async_trait]
    impl Resolve for Repeating {
        async fn resolve(&self, _host: &str) -> io::Result<Vec<IpAddr>> {
            let ip: IpAddr = "10.0.0.1".parse().unwrap();
            Ok(vec![ip, ip, "10.0.0.2".parse().unwrap()])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lookups_time_out() {
        let prober = DnsProber::new("slow.test", Arc::new(Slow), Duration::from_millis(300));
        let result = prober.probe(&CancellationToken::new()).await.unwrap();

        assert_eq!(result.outcome, Outcome::Timeout);
        assert_eq!(result.duration, Duration::from_millis(300));
    }

    #[tokio::test]
    async fn duplicate_addresses_are_dropped() {
        let prober = DnsProber::new("twice.test", Arc::new(Repeating), Duration::from_secs(1));
        let result = prober.probe(&CancellationToken::new()).await.unwrap();

        let addresses = &result.response().unwrap().addresses;
        assert_eq!(addresses.len(), 2);
    }

    #[tokio::test]
    async fn system_resolver_knows_localhost() {
        let addresses = SystemResolver.resolve("localhost").await.unwrap();
        assert!(addresses.iter().any(IpAddr::is_loopback));
    }
}
