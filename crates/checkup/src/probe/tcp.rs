//! TCP prober.
//!
//! Connects to `host:port`, then for every message writes it and reads one
//! reply on the same connection. The replies line up with the messages, a
//! connection closed by the peer leaves the remaining replies empty.

use std::{io, time::Duration};

use anyhow::Result;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::TcpStream,
};
use tokio_util::sync::CancellationToken;

use super::{message_text, race, Clock, ProbeResult, MAX_MESSAGE_SIZE};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TcpResponse {
    pub messages: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct TcpProber {
    address: String,
    messages: Vec<String>,
    timeout: Duration,
}

impl TcpProber {
    pub fn new(address: impl Into<String>, messages: Vec<String>, timeout: Duration) -> Self {
        Self { address: address.into(), messages, timeout }
    }

    pub async fn probe(&self, token: &CancellationToken) -> Result<ProbeResult<TcpResponse>> {
        let clock = Clock::start(self.timeout);
        let deadline = clock.deadline();

        let connect = TcpStream::connect(self.address.clone());
        let mut stream = match race(token, deadline, connect).await?.settle("connect") {
            Ok(stream) => stream,
            Err(interrupt) => return clock.interrupted(interrupt),
        };

        let mut replies = vec![String::new(); self.messages.len()];
        for (index, message) in self.messages.iter().enumerate() {
            let payload = message.clone().into_bytes();
            let send = async move {
                stream.write_all(&payload).await?;
                stream.flush().await?;
                Ok::<_, io::Error>(stream)
            };
            stream = match race(token, deadline, send).await?.settle("send") {
                Ok(stream) => stream,
                Err(interrupt) => return clock.interrupted(interrupt),
            };

            let receive = async move {
                let mut buf = vec![0; MAX_MESSAGE_SIZE];
                let read = stream.read(&mut buf).await?;
                buf.truncate(read);
                Ok::<_, io::Error>((stream, buf))
            };
            let (returned, received) = match race(token, deadline, receive).await?.settle("receive") {
                Ok(received) => received,
                Err(interrupt) => return clock.interrupted(interrupt),
            };

            if received.is_empty() {
                // closed by the peer
                break;
            }
            replies[index] = message_text(&received);
            stream = returned;
        }

        Ok(clock.finish(TcpResponse { messages: replies }))
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::{TcpListener, TcpSocket};

    use super::*;
    use crate::probe::Outcome;

    /// Replies with each received chunk upper-cased, closes after `limit` replies
    async fn shouting_server(limit: usize) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            for _ in 0..limit {
                let read = socket.read(&mut buf).await.unwrap();
                let reply = String::from_utf8_lossy(&buf[..read]).to_uppercase();
                socket.write_all(reply.as_bytes()).await.unwrap();
            }
            socket.shutdown().await.unwrap();
            let _ = socket.read_to_end(&mut Vec::new()).await;
        });

        address
    }

    #[tokio::test]
    async fn replies_follow_message_order() {
        let address = shouting_server(2).await;
        let prober = TcpProber::new(address, vec!["ping".into(), "pong".into()], Duration::from_secs(2));

        let result = prober.probe(&CancellationToken::new()).await.unwrap();
        assert_eq!(result.outcome, Outcome::Response(TcpResponse { messages: vec!["PING".into(), "PONG".into()] }));
    }

    #[tokio::test]
    async fn closed_connection_leaves_remaining_replies_empty() {
        let address = shouting_server(1).await;
        let messages = vec!["one".into(), "two".into(), "three".into()];
        let prober = TcpProber::new(address, messages, Duration::from_secs(2));

        let result = prober.probe(&CancellationToken::new()).await.unwrap();
        let response = result.response().unwrap();
        assert_eq!(response.messages, vec!["ONE".to_string(), String::new(), String::new()]);
    }

    #[tokio::test]
    async fn refused_connections_are_failures() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let prober = TcpProber::new(address, vec![], Duration::from_secs(2));
        let result = prober.probe(&CancellationToken::new()).await.unwrap();
        assert!(matches!(result.outcome, Outcome::Failed(reason) if reason.starts_with("connect")));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn unanswered_connects_time_out() {
        // never accepts, once the backlog is full further handshakes are dropped
        let socket = TcpSocket::new_v4().unwrap();
        socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let listener = socket.listen(0).unwrap();
        let address = listener.local_addr().unwrap();

        let mut queued = Vec::new();
        for _ in 0..8 {
            let connect = tokio::time::timeout(Duration::from_millis(50), TcpStream::connect(address));
            if let Ok(Ok(stream)) = connect.await {
                queued.push(stream);
            }
        }

        let prober = TcpProber::new(address.to_string(), vec!["ping".into()], Duration::from_millis(300));
        let result = prober.probe(&CancellationToken::new()).await.unwrap();
        assert!(result.timeout(), "{:?}", result.outcome);
        assert_eq!(result.duration, Duration::from_millis(300));

        drop(queued);
        drop(listener);
    }
}
