use std::sync::Arc;

use mochi_core::Value;
use mochi_crypto::EntityKeyPair;
use mochi_peers::{IncomingSession, QuicListener};
use mochi_registry::{AppRegistry, Event, EventSource};
use mochi_wire::{accept_message, send_ack, send_nack};
use tracing::{info, warn};

use crate::entity_directory::EntityDirectory;

/// Runs the inbound peer accept loop (spec §4.7/§4.9): binds nothing itself
/// (the listener is already bound by the caller), accepts connections, and
/// for every child stream runs the receiver side of the `msg` handshake,
/// resolves the target app + owning user, dispatches the event, and
/// replies with `ack`/`nack`.
pub async fn run(
    listener: QuicListener,
    directory: Arc<EntityDirectory>,
    registry: Arc<AppRegistry>,
    node_key: Arc<EntityKeyPair>,
) {
    loop {
        match listener.accept().await {
            None => {
                info!("peer listener closed, accept loop exiting");
                return;
            }
            Some(Err(e)) => {
                warn!(error = %e, "failed to accept inbound peer connection");
                continue;
            }
            Some(Ok(session)) => {
                let directory = directory.clone();
                let registry = registry.clone();
                let node_key = node_key.clone();
                tokio::spawn(serve_connection(session, directory, registry, node_key));
            }
        }
    }
}

async fn serve_connection(
    session: IncomingSession,
    directory: Arc<EntityDirectory>,
    registry: Arc<AppRegistry>,
    node_key: Arc<EntityKeyPair>,
) {
    loop {
        match session.accept_stream().await {
            None => return,
            Some(Err(e)) => {
                warn!(error = %e, "inbound peer connection closed with an error");
                return;
            }
            Some(Ok(mut stream)) => {
                let directory = directory.clone();
                let registry = registry.clone();
                let node_key = node_key.clone();
                tokio::spawn(async move {
                    if let Err(e) = serve_stream(&mut stream, &directory, &registry, &node_key).await {
                        warn!(error = %e, "inbound peer stream handling failed");
                    }
                });
            }
        }
    }
}

async fn serve_stream(
    stream: &mut Box<dyn mochi_peers::Duplex>,
    directory: &EntityDirectory,
    registry: &AppRegistry,
    node_key: &EntityKeyPair,
) -> anyhow::Result<()> {
    let accepted = accept_message(stream, directory).await?;
    let headers = &accepted.headers;

    let Some(app_id) = registry.app_for_service(&headers.service) else {
        warn!(service = %headers.service, "inbound message for unknown service, nacking");
        send_nack(stream, node_key, headers.to, headers.from, headers.id).await?;
        return Ok(());
    };

    let Some(owner) = directory.owner_of(headers.to).await? else {
        warn!(to = %headers.to, "inbound message for unowned entity, nacking");
        send_nack(stream, node_key, headers.to, headers.from, headers.id).await?;
        return Ok(());
    };

    // Spec §9's explicit opt-in: unverified traffic is delivered with
    // `from_entity` cleared only for events that declared
    // `allow_anonymous`; everything else is nacked outright.
    let route = registry.event_route(&app_id, &headers.event);
    let from_entity = if accepted.verified {
        Some(headers.from)
    } else if route.allow_anonymous {
        None
    } else {
        warn!(event = %headers.event, from = %headers.from, "unverified message rejected by event route");
        send_nack(stream, node_key, headers.to, headers.from, headers.id).await?;
        return Ok(());
    };

    let event = Event {
        user: owner,
        msg_id: Some(headers.id),
        from_entity,
        service: headers.service.clone(),
        event_name: headers.event.clone(),
        content: accepted.content,
        data: Value::None,
        source: EventSource::Peer,
        stream: None,
    };

    match registry.dispatch_event(&app_id, event).await {
        Ok(()) => send_ack(stream, node_key, headers.to, headers.from, headers.id).await?,
        Err(e) => {
            warn!(error = %e, "event dispatch failed, nacking");
            send_nack(stream, node_key, headers.to, headers.from, headers.id).await?;
        }
    }

    Ok(())
}
