//! WebSocket prober.
//!
//! Performs the opening handshake, then sends every message and waits for the
//! next data frame after each one. A rejected handshake still yields the
//! server's status code, headers and body.

use std::time::Duration;

use anyhow::{Context, Result};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        client::IntoClientRequest,
        http::HeaderMap,
        Error as WsError, Message,
    },
    MaybeTlsStream, WebSocketStream,
};
use tokio_util::sync::CancellationToken;
use url::Url;

use super::{race, Clock, ProbeResult};
use crate::checker::components::Header;

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WsResponse {
    pub status_code: u16,
    pub headers: HeaderMap,
    pub body: String,
    pub messages: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct WsProber {
    url: Url,
    headers: Vec<Header>,
    messages: Vec<String>,
    timeout: Duration,
}

impl WsProber {
    pub fn new(
        url: Url,
        headers: Vec<Header>,
        messages: Vec<String>,
        timeout: Duration,
    ) -> Self {
        Self { url, headers, messages, timeout }
    }

    pub async fn probe(&self, token: &CancellationToken) -> Result<ProbeResult<WsResponse>> {
        let clock = Clock::start(self.timeout);
        let deadline = clock.deadline();

        let mut request =
            self.url.as_str().into_client_request().context("cannot build handshake request")?;
        for (name, value) in &self.headers {
            request.headers_mut().append(name.clone(), value.clone());
        }

        let (mut socket, handshake) = match race(token, deadline, connect_async(request)).await? {
            super::Raced::Done(Err(WsError::Http(rejected))) => {
                return Ok(clock.finish(WsResponse {
                    status_code: rejected.status().as_u16(),
                    headers: rejected.headers().clone(),
                    body: body_text(rejected.body()),
                    messages: Vec::new(),
                }));
            }
            raced => match raced.settle("handshake") {
                Ok(connected) => connected,
                Err(interrupt) => return clock.interrupted(interrupt),
            },
        };

        let mut response = WsResponse {
            status_code: handshake.status().as_u16(),
            headers: handshake.headers().clone(),
            body: body_text(handshake.body()),
            messages: vec![String::new(); self.messages.len()],
        };

        for (index, message) in self.messages.iter().enumerate() {
            let frame = Message::Text(message.clone());
            let send = async move { socket.send(frame).await.map(|()| socket) };
            socket = match race(token, deadline, send).await?.settle("send") {
                Ok(socket) => socket,
                Err(interrupt) => return clock.interrupted(interrupt),
            };

            let (returned, received) = match race(token, deadline, next_text(socket)).await?.settle("receive") {
                Ok(received) => received,
                Err(interrupt) => return clock.interrupted(interrupt),
            };
            let Some(text) = received else {
                // closed by the peer
                break;
            };
            response.messages[index] = text;
            socket = returned;
        }

        Ok(clock.finish(response))
    }
}

/// Wait for the next data frame, `None` once the peer closed the connection
async fn next_text(mut socket: Socket) -> Result<(Socket, Option<String>), WsError> {
    while let Some(frame) = socket.next().await {
        match frame? {
            Message::Text(text) => return Ok((socket, Some(text))),
            Message::Binary(bytes) => {
                return Ok((socket, Some(String::from_utf8_lossy(&bytes).into_owned())));
            }
            Message::Close(_) => return Ok((socket, None)),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }
    Ok((socket, None))
}

fn body_text<B: AsRef<[u8]>>(body: &Option<B>) -> String {
    body.as_ref().map(|body| String::from_utf8_lossy(body.as_ref()).into_owned()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;
    use crate::probe::Outcome;

    async fn echo_server() -> Url {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut socket = tokio_tungstenite::accept_async(stream).await.unwrap();
            while let Some(Ok(message)) = socket.next().await {
                if message.is_text() && socket.send(message).await.is_err() {
                    break;
                }
            }
        });

        Url::parse(&format!("ws://{address}/")).unwrap()
    }

    #[tokio::test]
    async fn echoes_messages_in_order() {
        let url = echo_server().await;
        let prober = WsProber::new(url, vec![], vec!["first".into(), "second".into()], Duration::from_secs(2));

        let result = prober.probe(&CancellationToken::new()).await.unwrap();
        let response = result.response().unwrap();
        assert_eq!(response.status_code, 101);
        assert_eq!(response.messages, vec!["first".to_string(), "second".to_string()]);
    }

    #[tokio::test]
    async fn rejected_handshakes_report_the_status() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        tokio::spawn(async move {
            use tokio::io::{AsyncReadExt, AsyncWriteExt};

            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 2048];
            let _ = stream.read(&mut buf).await.unwrap();
            stream
                .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 4\r\nConnection: close\r\n\r\nnope")
                .await
                .unwrap();
        });

        let url = Url::parse(&format!("ws://{address}/missing")).unwrap();
        let prober = WsProber::new(url, vec![], vec!["hello".into()], Duration::from_secs(2));

        let result = prober.probe(&CancellationToken::new()).await.unwrap();
        match result.outcome {
            Outcome::Response(response) => {
                assert_eq!(response.status_code, 404);
                assert!(response.messages.is_empty());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
    }
}
