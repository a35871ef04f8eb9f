//! UDP prober.
//!
//! Sends every message as one datagram and waits for one reply datagram each.

use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use anyhow::{Context, Result};
use tokio::net::{lookup_host, UdpSocket};
use tokio_util::sync::CancellationToken;

use super::{message_text, race, Clock, ProbeResult, MAX_MESSAGE_SIZE};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UdpResponse {
    pub messages: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct UdpProber {
    address: String,
    messages: Vec<String>,
    timeout: Duration,
}

impl UdpProber {
    pub fn new(address: impl Into<String>, messages: Vec<String>, timeout: Duration) -> Self {
        Self { address: address.into(), messages, timeout }
    }

    pub async fn probe(&self, token: &CancellationToken) -> Result<ProbeResult<UdpResponse>> {
        let clock = Clock::start(self.timeout);
        let deadline = clock.deadline();

        let address = self.address.clone();
        let resolve = async move {
            lookup_host(address).await?.next().ok_or_else(|| {
                io::Error::new(io::ErrorKind::NotFound, "no address resolved")
            })
        };
        let remote = match race(token, deadline, resolve).await?.settle("resolve") {
            Ok(remote) => remote,
            Err(interrupt) => return clock.interrupted(interrupt),
        };

        let local: SocketAddr = match remote {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };
        let socket = UdpSocket::bind(local).await.context("cannot bind UDP socket")?;
        if let Err(err) = socket.connect(remote).await {
            return Ok(clock.failed(format!("connect: {err}")));
        }
        let socket = Arc::new(socket);

        let mut replies = Vec::with_capacity(self.messages.len());
        for message in &self.messages {
            let sender = Arc::clone(&socket);
            let payload = message.clone().into_bytes();
            let send = async move { sender.send(&payload).await };
            if let Err(interrupt) = race(token, deadline, send).await?.settle("send") {
                return clock.interrupted(interrupt);
            }

            let receiver = Arc::clone(&socket);
            let receive = async move {
                let mut buf = vec![0; MAX_MESSAGE_SIZE];
                let read = receiver.recv(&mut buf).await?;
                buf.truncate(read);
                Ok::<_, io::Error>(buf)
            };
            match race(token, deadline, receive).await?.settle("receive") {
                Ok(received) => replies.push(message_text(&received)),
                Err(interrupt) => return clock.interrupted(interrupt),
            }
        }

        Ok(clock.finish(UdpResponse { messages: replies }))
    }
}
