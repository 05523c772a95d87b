use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};
use mochi_core::{EncryptedKey, Value};
use mochi_crypto::{decrypt_secret_key, encrypt_secret_key, EntityKeyPair};
use mochi_store::Store;
use tracing::warn;

const SETTINGS_KEY: &str = "node_identity";

/// Loads this process's own Ed25519 identity from `settings.db`, generating
/// and persisting one on first boot. The secret is encrypted at rest with
/// `mochi-crypto`'s PBKDF2/AES-256-GCM envelope (mirrors how
/// `mochi-core::EncryptedKey` is used for per-user signing material)
/// keyed by `MOCHI_NODE_KEY_PASSPHRASE`. Without a passphrase configured a
/// fresh, unpersisted identity is generated every boot — fine for local
/// development, never for a node that peers need to keep recognizing.
pub async fn load_or_generate(settings: &Store) -> Result<Arc<EntityKeyPair>> {
    let passphrase = env::var("MOCHI_NODE_KEY_PASSPHRASE").ok();

    let Some(passphrase) = passphrase else {
        warn!("MOCHI_NODE_KEY_PASSPHRASE not set; generating an ephemeral node identity");
        return Ok(Arc::new(EntityKeyPair::generate()));
    };

    let row = settings
        .row("SELECT value FROM settings WHERE key = ?", &[Value::String(SETTINGS_KEY.into())])
        .await
        .context("failed to read node identity from settings store")?;

    if let Some(row) = row {
        let raw = row
            .get("value")
            .and_then(Value::as_str)
            .context("node identity row missing value")?;
        let envelope: EncryptedKey =
            serde_json::from_str(raw).context("stored node identity is not valid JSON")?;
        let secret = decrypt_secret_key(&envelope, &passphrase)
            .context("failed to decrypt node identity; wrong MOCHI_NODE_KEY_PASSPHRASE?")?;
        return Ok(Arc::new(EntityKeyPair::from_bytes(&secret)));
    }

    let keypair = EntityKeyPair::generate();
    let envelope = encrypt_secret_key(&keypair.secret_bytes(), &passphrase)
        .context("failed to encrypt newly generated node identity")?;
    let serialized = serde_json::to_string(&envelope).context("failed to serialize node identity envelope")?;
    settings
        .exec(
            "INSERT INTO settings (key, value) VALUES (?, ?)",
            &[Value::String(SETTINGS_KEY.into()), Value::String(serialized)],
        )
        .await
        .context("failed to persist newly generated node identity")?;

    Ok(Arc::new(keypair))
}
