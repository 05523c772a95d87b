use std::collections::HashMap;

use mochi_core::Value as HostValue;
use reqwest::Method;

use crate::error::RuntimeError;
use crate::host::context::HostContext;

/// `url.get/post/put/patch/delete(url, headers?, body?)` (spec §4.4):
/// gated by the app's `url:<host>` grant, rate-limited per app id, and
/// response-size-capped.
pub async fn request(
    ctx: &HostContext,
    method: Method,
    target: &str,
    headers: HashMap<String, String>,
    body: Option<Vec<u8>>,
) -> Result<HostValue, RuntimeError> {
    let parsed = reqwest::Url::parse(target).map_err(|e| RuntimeError::Argument(e.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| RuntimeError::Argument("url has no host".into()))?
        .to_string();

    ctx.permissions
        .check(
            ctx.is_internal,
            ctx.role,
            &ctx.app_id,
            &format!("url:{host}"),
            &host,
            &ctx.permission_defs,
        )
        .await
        .map_err(|e| RuntimeError::Permission(e.to_string()))?;

    if !ctx.url_limiter.allow(&ctx.app_id).await {
        return Err(RuntimeError::Remote(format!("rate limit exceeded for host {host}")));
    }

    let mut request = ctx.http_client.request(method, parsed);
    for (name, value) in &headers {
        request = request.header(name, value);
    }
    if let Some(body) = body {
        request = request.body(body);
    }

    let response = request.send().await.map_err(|e| RuntimeError::Remote(e.to_string()))?;
    let status = response.status().as_u16() as i64;
    let response_headers: std::collections::BTreeMap<String, HostValue> = response
        .headers()
        .iter()
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                HostValue::String(value.to_str().unwrap_or_default().to_string()),
            )
        })
        .collect();

    let limit = ctx.config.url_max_response_bytes;
    if let Some(len) = response.content_length() {
        if len > limit {
            return Err(RuntimeError::Remote(format!("response exceeded {limit} byte cap")));
        }
    }
    let body = response.bytes().await.map_err(|e| RuntimeError::Remote(e.to_string()))?;
    if body.len() as u64 > limit {
        return Err(RuntimeError::Remote(format!("response exceeded {limit} byte cap")));
    }

    let mut out = std::collections::BTreeMap::new();
    out.insert("status".to_string(), HostValue::Int(status));
    out.insert("headers".to_string(), HostValue::Map(response_headers));
    out.insert("body".to_string(), HostValue::Bytes(body.to_vec()));
    Ok(HostValue::Map(out))
}
