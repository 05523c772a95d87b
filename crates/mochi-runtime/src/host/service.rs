use mochi_core::Value as HostValue;

use crate::error::RuntimeError;
use crate::host::context::HostContext;

/// `service.call(service, function, params)` (spec §4.4/§4.6): dispatches
/// into another app's registered service handler, reusing the registry's
/// own recursion-depth enforcement rather than re-implementing it here.
pub async fn call(
    ctx: &HostContext,
    service: &str,
    function: &str,
    params: HostValue,
) -> Result<HostValue, RuntimeError> {
    ctx.registry
        .call_service(service, function, params, ctx.depth)
        .await
        .map_err(|e| RuntimeError::Remote(e.to_string()))
}
