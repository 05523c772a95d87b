pub mod envelope;
pub mod error;
pub mod header_sign;
pub mod keys;

pub use envelope::{decrypt_secret_key, encrypt_secret_key};
pub use error::CryptoError;
pub use header_sign::{canonical_encode, sign_tuple, verify_tuple, SigningTuple};
pub use keys::{fingerprint_id, verify, EntityKeyPair};
