use std::sync::Arc;

use async_trait::async_trait;
use mochi_core::{Headers, Message, WireMessageType};
use mochi_crypto::EntityKeyPair;
use mochi_peers::PeerPool;
use mochi_queue::{PeerSender, QueueError};
use mochi_wire::{read_headers, sign_headers, write_content, write_headers};

/// Wires the queue worker's delivery seam to `mochi-peers`/`mochi-wire`.
/// Unlike `mochi-runtime::host::stream::open`, which leaves the stream
/// open under a handle for further script-driven raw I/O, delivery here is
/// one-shot: after writing headers and content it reads back the reply and
/// only acks the queue row on a verified `ack`.
pub struct PeerPoolSender {
    peers: Arc<PeerPool>,
    node_key: Arc<EntityKeyPair>,
}

impl PeerPoolSender {
    pub fn new(peers: Arc<PeerPool>, node_key: Arc<EntityKeyPair>) -> Self {
        PeerPoolSender { peers, node_key }
    }
}

#[async_trait]
impl PeerSender for PeerPoolSender {
    async fn send(&self, message: &Message) -> Result<(), QueueError> {
        let mut io = self
            .peers
            .stream(message.to_entity)
            .await
            .map_err(|e| QueueError::Delivery(e.to_string()))?;

        let challenge = mochi_wire::read_challenge(&mut io)
            .await
            .map_err(|e| QueueError::Delivery(e.to_string()))?;

        let headers = Headers {
            message_type: WireMessageType::Msg,
            from: message.from_entity,
            to: message.to_entity,
            service: message.service.clone(),
            event: message.event.clone(),
            id: message.id,
            ack_id: None,
            signature: Vec::new(),
        };
        let signature = sign_headers(&self.node_key, &headers, &challenge);
        let headers = Headers { signature, ..headers };

        write_headers(&mut io, &headers)
            .await
            .map_err(|e| QueueError::Delivery(e.to_string()))?;
        write_content(&mut io, &message.content)
            .await
            .map_err(|e| QueueError::Delivery(e.to_string()))?;

        let reply = read_headers(&mut io)
            .await
            .map_err(|e| QueueError::Delivery(e.to_string()))?;

        match reply.message_type {
            WireMessageType::Ack if reply.ack_id == Some(message.id) => Ok(()),
            WireMessageType::Ack => Err(QueueError::Delivery(format!(
                "ack for unexpected message id {:?}",
                reply.ack_id
            ))),
            WireMessageType::Nack => Err(QueueError::Delivery("peer nacked delivery".into())),
            WireMessageType::Msg => Err(QueueError::Delivery("peer replied with a msg, not ack/nack".into())),
        }
    }
}
