use rand::RngCore;

use crate::error::RuntimeError;

/// Side-effect-free utility builtins (spec §4.4): clock, randomness, id
/// generation, basic validators, and markdown rendering. None of these
/// touch `HostContext` state beyond the step/cancellation tick, which
/// callers in `builtins.rs` apply uniformly before dispatch.

pub fn now_unix_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    buf
}

pub fn random_int(min: i64, max: i64) -> Result<i64, RuntimeError> {
    if min >= max {
        return Err(RuntimeError::Argument("random.int requires min < max".into()));
    }
    Ok(rand::Rng::gen_range(&mut rand::thread_rng(), min..max))
}

pub fn new_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn is_email(value: &str) -> bool {
    let Some((local, domain)) = value.split_once('@') else {
        return false;
    };
    !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
}

pub fn is_url(value: &str) -> bool {
    reqwest::Url::parse(value).is_ok()
}

pub fn markdown_to_html(source: &str) -> String {
    let parser = pulldown_cmark::Parser::new(source);
    let mut html = String::new();
    pulldown_cmark::html::push_html(&mut html, parser);
    html
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation() {
        assert!(is_email("a@example.com"));
        assert!(!is_email("not-an-email"));
        assert!(!is_email("a@.com"));
    }

    #[test]
    fn markdown_renders_basic_emphasis() {
        let html = markdown_to_html("*hi*");
        assert!(html.contains("<em>hi</em>"));
    }

    #[test]
    fn random_int_rejects_empty_range() {
        assert!(random_int(5, 5).is_err());
    }
}
