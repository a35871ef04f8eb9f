use std::{io, net::SocketAddr, sync::Arc};

use tokio::{
    net::{TcpListener, TcpStream},
    time::timeout,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::{
    codec::{read_message, write_message},
    dispatch, AgentService, Request, Response, RpcError,
};
use crate::DEFAULT_RPC_TIMEOUT;

/// Accept connections until `token` is cancelled, one task per connection
pub async fn serve<S>(listener: TcpListener, service: Arc<S>, token: CancellationToken) -> io::Result<()>
where
    S: AgentService + ?Sized + 'static,
{
    info!(address = %listener.local_addr()?, "agent RPC server listening");

    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        warn!("accept failed: {err}");
                        continue;
                    }
                };
                let service = Arc::clone(&service);
                tokio::spawn(async move {
                    if let Err(err) = handle(stream, peer, service.as_ref()).await {
                        warn!(%peer, "RPC call failed: {err}");
                    }
                });
            }
        }
    }

    info!("agent RPC server stopped");
    Ok(())
}

#[instrument(skip_all, fields(%peer))]
async fn handle<S>(mut stream: TcpStream, peer: SocketAddr, service: &S) -> Result<(), RpcError>
where
    S: AgentService + ?Sized,
{
    let request = match timeout(DEFAULT_RPC_TIMEOUT, read_message::<Request, _>(&mut stream)).await {
        Err(_elapsed) => return Err(RpcError::Timeout(DEFAULT_RPC_TIMEOUT)),
        Ok(Err(err @ (RpcError::Codec(_) | RpcError::TooLarge(_)))) => {
            let response = Response::Error(format!("invalid request: {err}"));
            write_message(&mut stream, &response).await?;
            return Err(err);
        }
        Ok(request) => request?,
    };

    let method = request.method();
    debug!(method, "handling RPC call");
    let response = dispatch(service, request).await;
    if let Response::Error(err) = &response {
        warn!(method, "RPC call returned an error: {err}");
    }
    write_message(&mut stream, &response).await
}
