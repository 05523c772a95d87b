use mochi_core::{EntityId, Value};
use uuid::Uuid;

/// An inbound external call (e.g. UI), carrying `(user, owner, database,
/// web-context)` per spec §4.6.
#[derive(Debug, Clone)]
pub struct Action {
    pub user: i64,
    pub owner: i64,
    pub path: String,
    pub params: Value,
}

/// An inbound peer or scheduler event, carrying `(user=owner, msg_id,
/// from_entity, content, data, stream?)`. `from_entity` is `None` both for
/// scheduler-sourced events (`source = "schedule"`, `from = nil`) and for
/// peer events whose signature failed to verify and whose event opted into
/// anonymous delivery.
#[derive(Debug, Clone)]
pub struct Event {
    pub user: i64,
    pub msg_id: Option<Uuid>,
    pub from_entity: Option<EntityId>,
    pub service: String,
    pub event_name: String,
    pub content: Value,
    pub data: Value,
    pub source: EventSource,
    pub stream: Option<mochi_core::StreamId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    Peer,
    Schedule,
    Local,
}

/// Per-event delivery policy an app sets at registration time (spec §9).
/// `allow_anonymous` opts an event in to receiving peer traffic whose
/// signature failed verification, with `from_entity` cleared to `None`
/// rather than rejected outright — the default is to reject unverified
/// traffic, matching spec §4.7's "the receiver nacks the message" baseline.
#[derive(Debug, Clone, Copy, Default)]
pub struct EventRoute {
    pub allow_anonymous: bool,
}
