use mochi_core::EntityId;

use crate::error::CryptoError;
use crate::keys::{verify, EntityKeyPair};

/// The seven logical fields covered by a wire signature, plus the per-stream
/// challenge, per spec §6: `[type, from, to, service, event, id, ack_id,
/// challenge]`. `ack_id` is empty for `msg` headers.
pub struct SigningTuple<'a> {
    pub message_type: &'a str,
    pub from: EntityId,
    pub to: EntityId,
    pub service: &'a str,
    pub event: &'a str,
    pub id: &'a str,
    pub ack_id: &'a str,
    pub challenge: &'a [u8],
}

/// CBOR-deterministic encoding of the signing tuple as a definite-length
/// array. `ciborium`'s canonical writer already sorts map keys and emits
/// definite lengths, so encoding the tuple as a plain array is sufficient
/// for determinism here — there are no maps to reorder.
pub fn canonical_encode(tuple: &SigningTuple<'_>) -> Vec<u8> {
    use ciborium::value::Value as CborValue;

    let array = CborValue::Array(vec![
        CborValue::Text(tuple.message_type.to_string()),
        CborValue::Text(tuple.from.to_hex()),
        CborValue::Text(tuple.to.to_hex()),
        CborValue::Text(tuple.service.to_string()),
        CborValue::Text(tuple.event.to_string()),
        CborValue::Text(tuple.id.to_string()),
        CborValue::Text(tuple.ack_id.to_string()),
        CborValue::Bytes(tuple.challenge.to_vec()),
    ]);

    let mut buf = Vec::new();
    ciborium::ser::into_writer(&array, &mut buf).expect("in-memory CBOR encode cannot fail");
    buf
}

pub fn sign_tuple(keypair: &EntityKeyPair, tuple: &SigningTuple<'_>) -> Vec<u8> {
    keypair.sign(&canonical_encode(tuple)).to_vec()
}

pub fn verify_tuple(
    public_material: &[u8; 32],
    tuple: &SigningTuple<'_>,
    signature: &[u8],
) -> Result<(), CryptoError> {
    verify(public_material, &canonical_encode(tuple), signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple<'a>(challenge: &'a [u8]) -> SigningTuple<'a> {
        SigningTuple {
            message_type: "msg",
            from: EntityId([1u8; 32]),
            to: EntityId([2u8; 32]),
            service: "feeds",
            event: "post/create",
            id: "M1",
            ack_id: "",
            challenge,
        }
    }

    #[test]
    fn sign_and_verify_holds_iff_correct_key() {
        let keypair = EntityKeyPair::generate();
        let challenge = b"challenge-bytes";
        let tuple = tuple(challenge);
        let signature = sign_tuple(&keypair, &tuple);
        verify_tuple(&keypair.public_material(), &tuple, &signature).unwrap();
    }

    #[test]
    fn verify_rejects_tampered_field() {
        let keypair = EntityKeyPair::generate();
        let challenge = b"challenge-bytes";
        let original = tuple(challenge);
        let signature = sign_tuple(&keypair, &original);

        let mut tampered = tuple(challenge);
        tampered.event = "post/delete";
        let err = verify_tuple(&keypair.public_material(), &tampered, &signature).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidSignature(_)));
    }

    #[test]
    fn encoding_is_deterministic() {
        let tuple_a = tuple(b"same-challenge");
        let tuple_b = tuple(b"same-challenge");
        assert_eq!(canonical_encode(&tuple_a), canonical_encode(&tuple_b));
    }
}
