//! Stream-level wire protocol: bounded CBOR framing, header signing, and the
//! challenge/headers/content/ack handshake described in spec §4.7.

pub mod dedup;
pub mod error;
pub mod frame;
pub mod headers;
pub mod limits;
pub mod stream;

pub use dedup::DedupSet;
pub use error::WireError;
pub use frame::{read_frame, write_frame};
pub use headers::{decode_headers, encode_headers};
pub use stream::{
    accept_challenge, accept_message, read_challenge, read_content, read_headers, send_ack,
    send_nack, sign_headers, write_content, write_headers, AcceptedMessage, DirectoryLookup,
};
