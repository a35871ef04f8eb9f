//! JSON framing: one value per direction, ended by shutting down the write half.

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::RpcError;

/// Largest request or response accepted
pub const MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

pub(crate) async fn read_message<T, R>(io: &mut R) -> Result<T, RpcError>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    io.take(MAX_MESSAGE_SIZE as u64 + 1).read_to_end(&mut buf).await?;
    if buf.len() > MAX_MESSAGE_SIZE {
        return Err(RpcError::TooLarge(MAX_MESSAGE_SIZE));
    }

    Ok(serde_json::from_slice(&buf)?)
}

pub(crate) async fn write_message<T, W>(io: &mut W, message: &T) -> Result<(), RpcError>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let encoded = serde_json::to_vec(message)?;
    io.write_all(&encoded).await?;
    io.shutdown().await?;
    Ok(())
}
