use chrono::{DateTime, Duration, Utc};
use mochi_core::{EntityId, MessageType, Value as HostValue};
use uuid::Uuid;

use crate::error::RuntimeError;
use crate::host::context::HostContext;

/// Queue lifetime for a script-enqueued message before it is given up on,
/// matching the daemon's default undelivered-message expiry.
const DEFAULT_TTL: Duration = Duration::days(7);

/// `message.send(to, service, event, content, data?)` (spec §4.8): a
/// one-shot outbound enqueue, delivered asynchronously by the queue worker.
#[allow(clippy::too_many_arguments)]
pub async fn send(
    ctx: &HostContext,
    to_entity: EntityId,
    service: &str,
    event: &str,
    content: HostValue,
    data: Option<Vec<u8>>,
) -> Result<Uuid, RuntimeError> {
    let expires: DateTime<Utc> = Utc::now() + DEFAULT_TTL;
    ctx.queue
        .enqueue(
            MessageType::Direct,
            None,
            ctx.entity,
            to_entity,
            service,
            event,
            &content,
            data,
            None,
            expires,
        )
        .await
        .map_err(|e| RuntimeError::Remote(e.to_string()))
}
