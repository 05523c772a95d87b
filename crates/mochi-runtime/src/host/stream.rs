use mochi_core::{EntityId, Headers, Value as HostValue, WireMessageType};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::error::RuntimeError;
use crate::host::context::HostContext;
use crate::host::file;

/// Opens a stream to `to_entity`, performs the sender side of the
/// challenge/headers/content handshake (spec §4.7), and keeps the
/// underlying duplex open under an integer id for further raw
/// reads/writes — `stream.open(to, service, event, content) -> int`.
pub async fn open(
    ctx: &HostContext,
    to_entity: EntityId,
    service: &str,
    event: &str,
    content: HostValue,
) -> Result<u64, RuntimeError> {
    let mut io = ctx
        .peers
        .stream(to_entity)
        .await
        .map_err(|e| RuntimeError::Remote(e.to_string()))?;

    let challenge = mochi_wire::read_challenge(&mut io)
        .await
        .map_err(|e| RuntimeError::Remote(e.to_string()))?;

    let headers = Headers {
        message_type: WireMessageType::Msg,
        from: ctx.entity,
        to: to_entity,
        service: service.to_string(),
        event: event.to_string(),
        id: Uuid::new_v4(),
        ack_id: None,
        signature: Vec::new(),
    };
    let signature = mochi_wire::sign_headers(&ctx.signing_key, &headers, &challenge);
    let headers = Headers { signature, ..headers };

    mochi_wire::write_headers(&mut io, &headers)
        .await
        .map_err(|e| RuntimeError::Remote(e.to_string()))?;
    mochi_wire::write_content(&mut io, &content)
        .await
        .map_err(|e| RuntimeError::Remote(e.to_string()))?;

    Ok(ctx.open_streams.lock().insert(io))
}

pub async fn read_raw(ctx: &HostContext, id: u64, max_bytes: usize) -> Result<Vec<u8>, RuntimeError> {
    let mut buffer = vec![0u8; max_bytes];
    let n = {
        let mut guard = ctx.open_streams.lock();
        let io = guard
            .get_mut(id)
            .ok_or_else(|| RuntimeError::Argument(format!("no open stream {id}")))?;
        io.read(&mut buffer).await.map_err(|e| RuntimeError::Io(e.to_string()))?
    };
    buffer.truncate(n);
    Ok(buffer)
}

pub async fn write_raw(ctx: &HostContext, id: u64, data: &[u8]) -> Result<(), RuntimeError> {
    let mut guard = ctx.open_streams.lock();
    let io = guard
        .get_mut(id)
        .ok_or_else(|| RuntimeError::Argument(format!("no open stream {id}")))?;
    io.write_all(data).await.map_err(|e| RuntimeError::Io(e.to_string()))
}

pub fn close(ctx: &HostContext, id: u64) -> Result<(), RuntimeError> {
    ctx.open_streams
        .lock()
        .remove(id)
        .map(|_| ())
        .ok_or_else(|| RuntimeError::Argument(format!("no open stream {id}")))
}

pub async fn read_to_file(ctx: &HostContext, id: u64, path: &str, max_bytes: usize) -> Result<u64, RuntimeError> {
    let data = read_raw(ctx, id, max_bytes).await?;
    let len = data.len() as u64;
    file::write(ctx, path, &data).await?;
    Ok(len)
}

pub async fn write_from_file(ctx: &HostContext, id: u64, path: &str) -> Result<(), RuntimeError> {
    let data = file::read(ctx, path).await?;
    write_raw(ctx, id, &data).await
}
