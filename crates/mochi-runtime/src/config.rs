use std::time::Duration;

/// Bounds read from `mochi-daemon::config` (spec §6): `starlark.concurrency`,
/// `starlark.timeout`, `file.max_storage`, `url.max_response`.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub concurrency: usize,
    pub timeout: Duration,
    pub file_max_storage_bytes: u64,
    pub url_max_response_bytes: u64,
    pub step_cap: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            concurrency: 32,
            timeout: Duration::from_secs(60),
            file_max_storage_bytes: 10 * 1024 * 1024 * 1024,
            url_max_response_bytes: 100 * 1024 * 1024,
            step_cap: 10_000_000,
        }
    }
}
