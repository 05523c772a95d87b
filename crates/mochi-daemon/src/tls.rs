use std::sync::Arc;
use std::time::SystemTime;

/// Peer authenticity in this core comes from `mochi-wire`'s Ed25519
/// header signing, verified against the directory's recorded fingerprints
/// (spec §4.7) — not from the QUIC transport's TLS certificates, which
/// only need to provide confidentiality in transit. This verifier accepts
/// any certificate so the transport layer does not duplicate a trust
/// decision the application layer already makes correctly.
struct AcceptAnyServerCert;

impl rustls::client::ServerCertVerifier for AcceptAnyServerCert {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::Certificate,
        _intermediates: &[rustls::Certificate],
        _server_name: &rustls::ServerName,
        _scts: &mut dyn Iterator<Item = &[u8]>,
        _ocsp_response: &[u8],
        _now: SystemTime,
    ) -> Result<rustls::client::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::ServerCertVerified::assertion())
    }
}

pub fn client_config() -> quinn::ClientConfig {
    let crypto = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(AcceptAnyServerCert))
        .with_no_client_auth();
    quinn::ClientConfig::new(Arc::new(crypto))
}

/// Builds a QUIC server config around a fresh self-signed certificate.
/// Like the client side, this exists purely for transport confidentiality:
/// no client certificate is requested, since peer identity is established
/// by `mochi-wire`'s signed challenge/headers handshake once the stream is
/// open, not by TLS. A real deployment could pin a persistent certificate
/// instead, but nothing in this core's trust model depends on it being
/// stable across restarts.
pub fn server_config() -> anyhow::Result<quinn::ServerConfig> {
    let cert = rcgen::generate_simple_self_signed(vec!["mochi-peer".to_string()])?;
    let cert_der = cert.serialize_der()?;
    let key_der = cert.serialize_private_key_der();

    let crypto = rustls::ServerConfig::builder()
        .with_safe_defaults()
        .with_no_client_auth()
        .with_single_cert(vec![rustls::Certificate(cert_der)], rustls::PrivateKey(key_der))?;

    Ok(quinn::ServerConfig::with_crypto(Arc::new(crypto)))
}
