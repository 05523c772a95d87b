use ciborium::value::Value as Cbor;
use mochi_core::{EntityId, Headers, WireMessageType};
use uuid::Uuid;

use crate::error::WireError;

/// Converts [`Headers`] to the exact CBOR map shape spec §6 fixes: text
/// fields for `type/from/to/service/event/id/ack_id`, bytes for
/// `signature`. Hand-built rather than derived so field encodings match the
/// wire contract precisely (a derived `Serialize` would encode `Vec<u8>` as
/// a CBOR array of integers, not a byte string).
pub fn encode_headers(headers: &Headers) -> Cbor {
    Cbor::Map(vec![
        (Cbor::Text("type".into()), Cbor::Text(message_type_str(headers.message_type).into())),
        (Cbor::Text("from".into()), Cbor::Text(headers.from.to_hex())),
        (Cbor::Text("to".into()), Cbor::Text(headers.to.to_hex())),
        (Cbor::Text("service".into()), Cbor::Text(headers.service.clone())),
        (Cbor::Text("event".into()), Cbor::Text(headers.event.clone())),
        (Cbor::Text("id".into()), Cbor::Text(headers.id.to_string())),
        (
            Cbor::Text("ack_id".into()),
            Cbor::Text(headers.ack_id.map(|id| id.to_string()).unwrap_or_default()),
        ),
        (Cbor::Text("signature".into()), Cbor::Bytes(headers.signature.clone())),
    ])
}

pub fn decode_headers(value: &Cbor) -> Result<Headers, WireError> {
    let pairs = value
        .as_map()
        .ok_or_else(|| WireError::Codec("headers frame is not a map".into()))?;

    let get_text = |key: &str| -> Option<&str> {
        pairs
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .and_then(|(_, v)| v.as_text())
    };
    let get_bytes = |key: &str| -> Option<&[u8]> {
        pairs
            .iter()
            .find(|(k, _)| k.as_text() == Some(key))
            .and_then(|(_, v)| v.as_bytes())
            .map(|b| b.as_slice())
    };

    let message_type = parse_message_type(
        get_text("type").ok_or_else(|| WireError::Codec("missing 'type'".into()))?,
    )?;
    let from = parse_entity_id(get_text("from").ok_or_else(|| WireError::Codec("missing 'from'".into()))?)?;
    let to = parse_entity_id(get_text("to").ok_or_else(|| WireError::Codec("missing 'to'".into()))?)?;
    let service = get_text("service").unwrap_or_default().to_string();
    let event = get_text("event").unwrap_or_default().to_string();
    let id = Uuid::parse_str(get_text("id").ok_or_else(|| WireError::Codec("missing 'id'".into()))?)
        .map_err(|e| WireError::Codec(e.to_string()))?;
    let ack_id = get_text("ack_id")
        .filter(|s| !s.is_empty())
        .map(Uuid::parse_str)
        .transpose()
        .map_err(|e| WireError::Codec(e.to_string()))?;
    let signature = get_bytes("signature").unwrap_or_default().to_vec();

    Ok(Headers {
        message_type,
        from,
        to,
        service,
        event,
        id,
        ack_id,
        signature,
    })
}

fn message_type_str(t: WireMessageType) -> &'static str {
    match t {
        WireMessageType::Msg => "msg",
        WireMessageType::Ack => "ack",
        WireMessageType::Nack => "nack",
    }
}

fn parse_message_type(s: &str) -> Result<WireMessageType, WireError> {
    match s {
        "msg" => Ok(WireMessageType::Msg),
        "ack" => Ok(WireMessageType::Ack),
        "nack" => Ok(WireMessageType::Nack),
        other => Err(WireError::Codec(format!("unknown message type '{other}'"))),
    }
}

fn parse_entity_id(hex: &str) -> Result<EntityId, WireError> {
    if hex.len() != 64 {
        return Err(WireError::Codec("entity id must be 32 bytes hex".into()));
    }
    let mut bytes = [0u8; 32];
    for i in 0..32 {
        bytes[i] = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16)
            .map_err(|e| WireError::Codec(e.to_string()))?;
    }
    Ok(EntityId(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_decode_round_trips() {
        let headers = Headers {
            message_type: WireMessageType::Msg,
            from: EntityId([1u8; 32]),
            to: EntityId([2u8; 32]),
            service: "feeds".into(),
            event: "post/create".into(),
            id: Uuid::new_v4(),
            ack_id: None,
            signature: vec![9, 9, 9],
        };
        let encoded = encode_headers(&headers);
        let decoded = decode_headers(&encoded).unwrap();
        assert_eq!(decoded.from, headers.from);
        assert_eq!(decoded.service, headers.service);
        assert_eq!(decoded.signature, headers.signature);
        assert_eq!(decoded.ack_id, None);
    }
}
