use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use mochi_ratelimit::RateLimitConfig;
use mochi_runtime::RuntimeConfig;

/// Process-wide configuration, read once at startup per spec §6. Mirrors
/// `cave-daemon::server::AppConfig::from_env`'s per-key `env::var(...)`
/// style, scoped down to the handful of keys this core actually needs: the
/// bigger workspace/isolation/audit surface `cave-daemon` configures
/// belongs to the sandboxed-process runtime it wraps, which this project
/// has no equivalent of.
#[derive(Debug, Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub peer_listen_addr: SocketAddr,
    pub data_dir: PathBuf,
    pub runtime: RuntimeConfig,
    pub url_rate_limit: RateLimitConfig,
    pub p2p_send_rate_limit: RateLimitConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let listen_addr = env::var("MOCHI_ADMIN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8090".to_string())
            .parse()
            .context("invalid MOCHI_ADMIN_ADDR")?;

        let peer_listen_addr = env::var("MOCHI_PEER_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:4433".to_string())
            .parse()
            .context("invalid MOCHI_PEER_ADDR")?;

        let data_dir = env::var("MOCHI_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.mochi_data"));

        let base_runtime = RuntimeConfig::default();
        let runtime = RuntimeConfig {
            concurrency: env_parse("MOCHI_STARLARK_CONCURRENCY").unwrap_or(base_runtime.concurrency),
            timeout: env_parse::<u64>("MOCHI_STARLARK_TIMEOUT_SECONDS")
                .map(Duration::from_secs)
                .unwrap_or(base_runtime.timeout),
            file_max_storage_bytes: env_parse("MOCHI_FILE_MAX_STORAGE_BYTES")
                .unwrap_or(base_runtime.file_max_storage_bytes),
            url_max_response_bytes: env_parse("MOCHI_URL_MAX_RESPONSE_BYTES")
                .unwrap_or(base_runtime.url_max_response_bytes),
            step_cap: base_runtime.step_cap,
        };

        let url_rate_limit = RateLimitConfig::new(
            env_parse("MOCHI_RATE_LIMIT_URL_COUNT").unwrap_or(mochi_ratelimit::URL_FETCH_LIMIT.limit),
            env_parse("MOCHI_RATE_LIMIT_URL_WINDOW_SECONDS")
                .unwrap_or(mochi_ratelimit::URL_FETCH_LIMIT.window.as_secs()),
        );
        let p2p_send_rate_limit = RateLimitConfig::new(
            env_parse("MOCHI_RATE_LIMIT_P2P_SEND_COUNT").unwrap_or(mochi_ratelimit::P2P_SEND_LIMIT.limit),
            env_parse("MOCHI_RATE_LIMIT_P2P_SEND_WINDOW_SECONDS")
                .unwrap_or(mochi_ratelimit::P2P_SEND_LIMIT.window.as_secs()),
        );

        Ok(Config {
            listen_addr,
            peer_listen_addr,
            data_dir,
            runtime,
            url_rate_limit,
            p2p_send_rate_limit,
        })
    }

    pub fn users_db(&self) -> PathBuf {
        self.data_dir.join("users.db")
    }

    pub fn directory_db(&self) -> PathBuf {
        self.data_dir.join("directory.db")
    }

    pub fn peers_db(&self) -> PathBuf {
        self.data_dir.join("peers.db")
    }

    pub fn queue_db(&self) -> PathBuf {
        self.data_dir.join("queue.db")
    }

    pub fn schedule_db(&self) -> PathBuf {
        self.data_dir.join("schedule.db")
    }

    pub fn settings_db(&self) -> PathBuf {
        self.data_dir.join("settings.db")
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}
