use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;
use crate::value::Value;

/// Local account. Exclusively owns its directory of per-app databases and
/// files; destruction cascades to its entities and files.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub role: UserRole,
    pub timezone: String,
    pub language: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UserRole {
    User,
    Administrator,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Privacy {
    Public,
    Private,
}

/// An addressable identity owned by a user. `id` is a 32-byte opaque value;
/// `fingerprint` is derived from the public signing material by `mochi-crypto`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Entity {
    pub id: EntityId,
    pub fingerprint: String,
    pub user: i64,
    pub class: String,
    pub name: String,
    pub privacy: Privacy,
    /// Present only for entities this node holds signing material for.
    pub signing_material: Option<EncryptedKey>,
    pub published: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub [u8; 32]);

impl EntityId {
    pub fn to_hex(&self) -> String {
        hex_encode(&self.0)
    }

    pub fn from_hex(value: &str) -> Result<Self, CoreError> {
        if value.len() != 64 {
            return Err(CoreError::Argument(format!(
                "entity id must be 64 hex characters, got {}",
                value.len()
            )));
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            let chunk = &value[i * 2..i * 2 + 2];
            *byte = u8::from_str_radix(chunk, 16)
                .map_err(|_| CoreError::Argument(format!("invalid hex in entity id: {chunk}")))?;
        }
        Ok(EntityId(bytes))
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        out.push_str(&format!("{b:02x}"));
    }
    out
}

/// Encrypted-at-rest private signing key, produced by `mochi-crypto`'s
/// PBKDF2 + AES-256-GCM envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EncryptedKey {
    pub ciphertext: Vec<u8>,
    pub salt: Vec<u8>,
    pub nonce: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppKind {
    Internal,
    Script,
}

/// A unit of installed functionality. Internal apps bypass permission
/// checks; script apps run under the sandboxed runtime and may have several
/// loaded versions, of which at most one is `active` per user session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct App {
    pub id: String,
    pub kind: AppKind,
    pub versions: Vec<AppVersion>,
    pub active_version: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppVersion {
    pub label: String,
    pub icon_set: Vec<String>,
    pub url_paths: Vec<String>,
    pub services: Vec<String>,
    pub events: Vec<String>,
    pub database_file: String,
    pub role_requirement: UserRole,
    pub declared_permissions: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Direct,
    Broadcast,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Sent,
    Failed,
    Dead,
}

/// Outbound queue row. Owned by the queue; created by senders, deleted on
/// ack or after permanent failure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub message_type: MessageType,
    pub target_peer: Option<String>,
    pub from_entity: EntityId,
    pub to_entity: EntityId,
    pub service: String,
    pub event: String,
    pub content: Value,
    pub data_blob: Option<Vec<u8>>,
    pub file: Option<String>,
    pub attempts: u32,
    pub next_retry: DateTime<Utc>,
    pub status: MessageStatus,
    pub last_error: Option<String>,
    pub expires: DateTime<Utc>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WireMessageType {
    Msg,
    Ack,
    Nack,
}

/// Wire headers. The signature covers a deterministic serialization of the
/// other fields plus the per-stream challenge (see `mochi-wire`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Headers {
    pub message_type: WireMessageType,
    pub from: EntityId,
    pub to: EntityId,
    pub service: String,
    pub event: String,
    pub id: Uuid,
    pub ack_id: Option<Uuid>,
    pub signature: Vec<u8>,
}

/// A due or pending scheduled callback. `interval_seconds > 0` means
/// recurring; `0` means one-shot, deleted on claim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScheduledEvent {
    pub id: Uuid,
    pub user: i64,
    pub app: String,
    pub due_unix: i64,
    pub event_name: String,
    pub data_blob: Option<Vec<u8>>,
    pub interval_seconds: i64,
    pub created: DateTime<Utc>,
}

impl ScheduledEvent {
    pub fn is_recurring(&self) -> bool {
        self.interval_seconds > 0
    }
}

/// `(user, app_id, permission_name, object)` grant. `object` is empty for
/// static permissions; for dynamic `url:<host>` permissions it holds the
/// host (or `*`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionGrant {
    pub user: i64,
    pub app_id: String,
    pub permission_name: String,
    pub object: String,
    pub granted: bool,
}

/// Transient fixed-window rate-limit counter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub key: String,
    pub count: u64,
    pub reset_unix: i64,
}

/// Arbitrary app-defined event payload delivered to a script handler,
/// carried as a `Value::Map` so apps can shape their own data without a
/// schema registered anywhere in the core.
pub type EventData = BTreeMap<String, Value>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_formats_as_hex() {
        let id = EntityId([0u8; 32]);
        assert_eq!(id.to_hex().len(), 64);
        assert!(id.to_hex().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn scheduled_event_recurrence_flag() {
        let base = ScheduledEvent {
            id: Uuid::nil(),
            user: 1,
            app: "notes".into(),
            due_unix: 0,
            event_name: "tick".into(),
            data_blob: None,
            interval_seconds: 0,
            created: Utc::now(),
        };
        assert!(!base.is_recurring());
        let recurring = ScheduledEvent {
            interval_seconds: 60,
            ..base
        };
        assert!(recurring.is_recurring());
    }
}
