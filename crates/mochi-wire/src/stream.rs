use async_trait::async_trait;
use ciborium::value::Value as Cbor;
use mochi_core::{EntityId, Headers, Value, WireMessageType};
use mochi_crypto::{header_sign::SigningTuple, sign_tuple, verify_tuple, EntityKeyPair};
use rand::RngCore;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use uuid::Uuid;

use crate::error::WireError;
use crate::frame::{read_frame, write_frame};
use crate::headers::{decode_headers, encode_headers};
use crate::limits::{CHALLENGE_LEN, CONTENT_MAX_BYTES, HEADERS_MAX_BYTES, SEGMENT_DEADLINE};

/// Enforces spec §4.7's per-segment read deadline: a peer that stalls
/// mid-handshake ties up a stream slot indefinitely without this.
async fn with_deadline<T>(
    fut: impl std::future::Future<Output = Result<T, WireError>>,
) -> Result<T, WireError> {
    tokio::time::timeout(SEGMENT_DEADLINE, fut)
        .await
        .unwrap_or(Err(WireError::Timeout))
}

/// Resolves a public key for signature verification. Backed by the
/// directory store in the daemon; kept as a trait here so `mochi-wire`
/// stays transport/storage-agnostic. Async because the daemon's
/// implementation is a database read, not an in-memory lookup.
#[async_trait]
pub trait DirectoryLookup: Send + Sync {
    async fn public_material_of(&self, entity: &EntityId) -> Option<[u8; 32]>;
}

/// Generates the receiver-side challenge and sends it raw (not framed),
/// per spec §4.7: "Receiver: on accept, generate a fresh 16-byte challenge,
/// send it raw, then read headers."
pub async fn accept_challenge<S: AsyncWrite + Unpin>(io: &mut S) -> Result<[u8; CHALLENGE_LEN], WireError> {
    let mut challenge = [0u8; CHALLENGE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut challenge);
    io.write_all(&challenge).await?;
    Ok(challenge)
}

/// Sender-side: read the challenge first, then send headers.
pub async fn read_challenge<S: AsyncRead + Unpin>(io: &mut S) -> Result<[u8; CHALLENGE_LEN], WireError> {
    let mut challenge = [0u8; CHALLENGE_LEN];
    io.read_exact(&mut challenge).await?;
    Ok(challenge)
}

pub fn sign_headers(keypair: &EntityKeyPair, headers: &Headers, challenge: &[u8]) -> Vec<u8> {
    let id = headers.id.to_string();
    let ack_id = headers.ack_id.map(|id| id.to_string()).unwrap_or_default();
    let tuple = signing_tuple(headers, &id, &ack_id, challenge);
    sign_tuple(keypair, &tuple)
}

fn verify_headers(public_material: &[u8; 32], headers: &Headers, challenge: &[u8]) -> bool {
    let id = headers.id.to_string();
    let ack_id = headers.ack_id.map(|id| id.to_string()).unwrap_or_default();
    let tuple = signing_tuple(headers, &id, &ack_id, challenge);
    verify_tuple(public_material, &tuple, &headers.signature).is_ok()
}

fn signing_tuple<'a>(headers: &'a Headers, id: &'a str, ack_id: &'a str, challenge: &'a [u8]) -> SigningTuple<'a> {
    SigningTuple {
        message_type: match headers.message_type {
            WireMessageType::Msg => "msg",
            WireMessageType::Ack => "ack",
            WireMessageType::Nack => "nack",
        },
        from: headers.from,
        to: headers.to,
        service: &headers.service,
        event: &headers.event,
        id,
        ack_id,
        challenge,
    }
}

pub async fn write_headers<S: AsyncWrite + Unpin>(io: &mut S, headers: &Headers) -> Result<(), WireError> {
    write_frame(io, &encode_headers(headers)).await
}

pub async fn read_headers<S: AsyncRead + Unpin>(io: &mut S) -> Result<Headers, WireError> {
    let value: Cbor = read_frame(io, HEADERS_MAX_BYTES).await?;
    decode_headers(&value)
}

pub async fn write_content<S: AsyncWrite + Unpin>(io: &mut S, content: &Value) -> Result<(), WireError> {
    write_frame(io, &content.to_json()).await
}

pub async fn read_content<S: AsyncRead + Unpin>(io: &mut S) -> Result<Value, WireError> {
    let json: serde_json::Value = read_frame(io, CONTENT_MAX_BYTES).await?;
    Ok(Value::from_json(&json))
}

/// A fully received `msg` frame, with verification outcome attached rather
/// than mutating `headers.from` — callers decide per-event whether
/// verification-failed traffic should be treated as anonymous (spec §9's
/// explicit opt-in policy), not the wire layer.
pub struct AcceptedMessage {
    pub headers: Headers,
    pub content: Value,
    pub verified: bool,
}

/// Runs the receiver side of a `msg` exchange: challenge, headers, content,
/// verification. Does not send the `ack`/`nack` reply; callers do that
/// after routing succeeds or fails.
pub async fn accept_message<S: AsyncRead + AsyncWrite + Unpin>(
    io: &mut S,
    directory: &dyn DirectoryLookup,
) -> Result<AcceptedMessage, WireError> {
    let challenge = accept_challenge(io).await?;
    let headers = with_deadline(read_headers(io)).await?;
    let content = with_deadline(read_content(io)).await?;

    let verified = match directory.public_material_of(&headers.from).await {
        Some(public_material) => verify_headers(&public_material, &headers, &challenge),
        None => false,
    };

    Ok(AcceptedMessage {
        headers,
        content,
        verified,
    })
}

pub async fn send_ack<S: AsyncWrite + Unpin>(
    io: &mut S,
    keypair: &EntityKeyPair,
    from: EntityId,
    to: EntityId,
    msg_id: Uuid,
) -> Result<(), WireError> {
    send_terminal(io, keypair, from, to, msg_id, WireMessageType::Ack).await
}

pub async fn send_nack<S: AsyncWrite + Unpin>(
    io: &mut S,
    keypair: &EntityKeyPair,
    from: EntityId,
    to: EntityId,
    msg_id: Uuid,
) -> Result<(), WireError> {
    send_terminal(io, keypair, from, to, msg_id, WireMessageType::Nack).await
}

/// `ack`/`nack` reuse the stream's existing authenticated transport rather
/// than a fresh challenge, per spec §4.7 ("no new challenge: the underlying
/// transport is assumed to provide confidentiality and integrity").
async fn send_terminal<S: AsyncWrite + Unpin>(
    io: &mut S,
    keypair: &EntityKeyPair,
    from: EntityId,
    to: EntityId,
    msg_id: Uuid,
    message_type: WireMessageType,
) -> Result<(), WireError> {
    let headers = Headers {
        message_type,
        from,
        to,
        service: String::new(),
        event: String::new(),
        id: Uuid::new_v4(),
        ack_id: Some(msg_id),
        signature: Vec::new(),
    };
    let signature = sign_headers(keypair, &headers, &[]);
    let headers = Headers { signature, ..headers };
    write_headers(io, &headers).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tokio::io::duplex;

    struct MapDirectory(HashMap<EntityId, [u8; 32]>);

    #[async_trait]
    impl DirectoryLookup for MapDirectory {
        async fn public_material_of(&self, entity: &EntityId) -> Option<[u8; 32]> {
            self.0.get(entity).copied()
        }
    }

    #[tokio::test]
    async fn msg_round_trip_verifies_signature() {
        let keypair = EntityKeyPair::generate();
        let from = keypair.entity_id();
        let to = EntityId([9u8; 32]);

        let (mut server, mut client) = duplex(64 * 1024);

        let directory = MapDirectory(HashMap::from([(from, keypair.public_material())]));

        let server_task = tokio::spawn(async move { accept_message(&mut server, &directory).await });

        let challenge = read_challenge(&mut client).await.unwrap();
        let headers = Headers {
            message_type: WireMessageType::Msg,
            from,
            to,
            service: "feeds".into(),
            event: "post/create".into(),
            id: Uuid::new_v4(),
            ack_id: None,
            signature: Vec::new(),
        };
        let signature = sign_headers(&keypair, &headers, &challenge);
        let headers = Headers { signature, ..headers };
        write_headers(&mut client, &headers).await.unwrap();
        write_content(&mut client, &Value::String("hi".into())).await.unwrap();

        let accepted = server_task.await.unwrap().unwrap();
        assert!(accepted.verified);
        assert_eq!(accepted.content, Value::String("hi".into()));
    }

    #[tokio::test]
    async fn unknown_sender_is_unverified() {
        let keypair = EntityKeyPair::generate();
        let from = keypair.entity_id();
        let to = EntityId([9u8; 32]);

        let (mut server, mut client) = duplex(64 * 1024);
        let directory = MapDirectory(HashMap::new());

        let server_task = tokio::spawn(async move { accept_message(&mut server, &directory).await });

        let challenge = read_challenge(&mut client).await.unwrap();
        let headers = Headers {
            message_type: WireMessageType::Msg,
            from,
            to,
            service: "feeds".into(),
            event: "post/create".into(),
            id: Uuid::new_v4(),
            ack_id: None,
            signature: Vec::new(),
        };
        let signature = sign_headers(&keypair, &headers, &challenge);
        let headers = Headers { signature, ..headers };
        write_headers(&mut client, &headers).await.unwrap();
        write_content(&mut client, &Value::None).await.unwrap();

        let accepted = server_task.await.unwrap().unwrap();
        assert!(!accepted.verified);
    }
}
