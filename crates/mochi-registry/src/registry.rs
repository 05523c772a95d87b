use std::collections::HashMap;
use std::sync::Arc;

use mochi_core::{AppKind, Value};
use parking_lot::RwLock;
use tracing::instrument;

use crate::error::RegistryError;
use crate::handler::{ActionHandler, EventHandler, ServiceHandler};
use crate::types::{Action, Event, EventRoute};

/// Default fallback key: a handler registered under the empty name is tried
/// when a specific `event` or `function` is not found, per spec §4.6.
pub const DEFAULT_HANDLER_KEY: &str = "";

pub const MAX_SERVICE_CALL_DEPTH: u32 = 1000;

/// One installed app's handler surface. Script apps wire their handlers
/// through `mochi-runtime`'s namespace adapters; internal apps register
/// host-compiled implementations directly at process start.
pub struct AppEntry {
    pub id: String,
    pub kind: AppKind,
    pub paths: HashMap<String, Arc<dyn ActionHandler>>,
    pub events: HashMap<String, Arc<dyn EventHandler>>,
    pub event_routes: HashMap<String, EventRoute>,
    pub services: HashMap<String, Arc<dyn ServiceHandler>>,
}

impl AppEntry {
    pub fn new(id: impl Into<String>, kind: AppKind) -> Self {
        AppEntry {
            id: id.into(),
            kind,
            paths: HashMap::new(),
            events: HashMap::new(),
            event_routes: HashMap::new(),
            services: HashMap::new(),
        }
    }

    pub fn with_path(mut self, path: impl Into<String>, handler: Arc<dyn ActionHandler>) -> Self {
        self.paths.insert(path.into(), handler);
        self
    }

    /// Registers `name` with the default route (unverified peer traffic is
    /// rejected, not delivered anonymously).
    pub fn with_event(mut self, name: impl Into<String>, handler: Arc<dyn EventHandler>) -> Self {
        let name = name.into();
        self.events.insert(name.clone(), handler);
        self.event_routes.insert(name, EventRoute::default());
        self
    }

    /// Registers `name` with an explicit [`EventRoute`], e.g. to opt in to
    /// `allow_anonymous` delivery of unverified peer traffic.
    pub fn with_event_route(
        mut self,
        name: impl Into<String>,
        handler: Arc<dyn EventHandler>,
        route: EventRoute,
    ) -> Self {
        let name = name.into();
        self.events.insert(name.clone(), handler);
        self.event_routes.insert(name, route);
        self
    }

    pub fn with_service(mut self, name: impl Into<String>, handler: Arc<dyn ServiceHandler>) -> Self {
        self.services.insert(name.into(), handler);
        self
    }
}

/// Process-wide app map and dispatcher, protected by a reader/writer lock
/// per spec §4.6. `service_providers` maps a declared service name to the
/// app id that provides it, mirroring how `paths`/`events` resolve within
/// a single app's entry.
#[derive(Clone)]
pub struct AppRegistry {
    apps: Arc<RwLock<HashMap<String, AppEntry>>>,
    service_providers: Arc<RwLock<HashMap<String, String>>>,
}

impl Default for AppRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AppRegistry {
    pub fn new() -> Self {
        AppRegistry {
            apps: Arc::new(RwLock::new(HashMap::new())),
            service_providers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn register(&self, entry: AppEntry) {
        let mut providers = self.service_providers.write();
        for service_name in entry.services.keys() {
            providers.insert(service_name.clone(), entry.id.clone());
        }
        self.apps.write().insert(entry.id.clone(), entry);
    }

    pub fn unregister(&self, app_id: &str) {
        if let Some(entry) = self.apps.write().remove(app_id) {
            let mut providers = self.service_providers.write();
            for service_name in entry.services.keys() {
                if providers.get(service_name).map(String::as_str) == Some(app_id) {
                    providers.remove(service_name);
                }
            }
        }
    }

    pub fn app_kind(&self, app_id: &str) -> Option<AppKind> {
        self.apps.read().get(app_id).map(|e| e.kind)
    }

    pub fn has_event(&self, app_id: &str, event_name: &str) -> bool {
        self.apps
            .read()
            .get(app_id)
            .map(|entry| entry.events.contains_key(event_name) || entry.events.contains_key(DEFAULT_HANDLER_KEY))
            .unwrap_or(false)
    }

    /// Resolves a declared service name to its providing app id, the same
    /// lookup `call_service` uses internally — exposed read-only so inbound
    /// peer routing (which only has a `service` name off the wire, not an
    /// app id) can find the target app before calling [`Self::dispatch_event`].
    pub fn app_for_service(&self, service: &str) -> Option<String> {
        self.service_providers.read().get(service).cloned()
    }

    /// The delivery policy `app_id` declared for `event_name`, falling back
    /// to the default handler's route and finally to "reject unverified
    /// traffic" if neither is registered.
    pub fn event_route(&self, app_id: &str, event_name: &str) -> EventRoute {
        self.apps
            .read()
            .get(app_id)
            .and_then(|entry| {
                entry
                    .event_routes
                    .get(event_name)
                    .or_else(|| entry.event_routes.get(DEFAULT_HANDLER_KEY))
            })
            .copied()
            .unwrap_or_default()
    }

    /// Action dispatch: resolves `path -> app + handler` by scanning every
    /// registered app's path table (paths are unique across the whole
    /// registry in practice, since the app installer rejects collisions at
    /// install time).
    #[instrument(skip(self, action))]
    pub async fn dispatch_action(&self, path: &str, action: Action) -> Result<Value, RegistryError> {
        let handler = {
            let apps = self.apps.read();
            apps.values()
                .find_map(|entry| entry.paths.get(path).cloned())
        };
        let handler = handler.ok_or_else(|| RegistryError::PathNotFound(path.to_string()))?;
        handler.handle(action).await.map_err(RegistryError::from)
    }

    /// Event dispatch: `app_id` and the event's owning user are assumed
    /// already resolved upstream (via the directory's entity -> owner
    /// lookup); this only resolves `event name -> handler-or-default`
    /// within that app.
    #[instrument(skip(self, event))]
    pub async fn dispatch_event(&self, app_id: &str, event: Event) -> Result<(), RegistryError> {
        let handler = {
            let apps = self.apps.read();
            let entry = apps
                .get(app_id)
                .ok_or_else(|| RegistryError::AppNotFound(app_id.to_string()))?;
            entry
                .events
                .get(event.event_name.as_str())
                .or_else(|| entry.events.get(DEFAULT_HANDLER_KEY))
                .cloned()
                .ok_or_else(|| {
                    RegistryError::EventNotFound(event.event_name.clone(), app_id.to_string())
                })?
        };
        handler.handle(event).await.map_err(RegistryError::from)
    }

    /// Intra-node service call with recursion-depth enforcement. `depth` is
    /// the caller's current depth; the callee runs at `depth + 1`.
    #[instrument(skip(self, params))]
    pub async fn call_service(
        &self,
        service: &str,
        function: &str,
        params: Value,
        depth: u32,
    ) -> Result<Value, RegistryError> {
        if depth >= MAX_SERVICE_CALL_DEPTH {
            return Err(RegistryError::RecursionExceeded(depth));
        }

        let handler = {
            let providers = self.service_providers.read();
            let app_id = providers
                .get(service)
                .ok_or_else(|| RegistryError::ServiceNotFound(service.to_string()))?
                .clone();
            let apps = self.apps.read();
            apps.get(&app_id)
                .and_then(|entry| entry.services.get(service))
                .cloned()
                .ok_or_else(|| RegistryError::ServiceNotFound(service.to_string()))?
        };

        handler
            .call(function, params, depth + 1)
            .await
            .map_err(RegistryError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mochi_core::CoreError;

    struct EchoAction;

    #[async_trait]
    impl ActionHandler for EchoAction {
        async fn handle(&self, action: Action) -> Result<Value, CoreError> {
            Ok(action.params)
        }
    }

    struct RecursiveService {
        registry: AppRegistry,
    }

    #[async_trait]
    impl ServiceHandler for RecursiveService {
        async fn call(&self, _function: &str, params: Value, depth: u32) -> Result<Value, CoreError> {
            self.registry
                .call_service("recurse", "again", params, depth)
                .await
                .map_err(CoreError::from)
        }
    }

    #[tokio::test]
    async fn dispatch_action_resolves_registered_path() {
        let registry = AppRegistry::new();
        registry.register(
            AppEntry::new("notes", AppKind::Internal).with_path("/notes/list", Arc::new(EchoAction)),
        );

        let result = registry
            .dispatch_action(
                "/notes/list",
                Action {
                    user: 1,
                    owner: 1,
                    path: "/notes/list".into(),
                    params: Value::Int(7),
                },
            )
            .await
            .unwrap();
        assert_eq!(result, Value::Int(7));
    }

    #[tokio::test]
    async fn dispatch_action_unknown_path_errors() {
        let registry = AppRegistry::new();
        let err = registry
            .dispatch_action(
                "/missing",
                Action {
                    user: 1,
                    owner: 1,
                    path: "/missing".into(),
                    params: Value::None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::PathNotFound(_)));
    }

    #[test]
    fn event_route_defaults_to_rejecting_anonymous() {
        struct NoopEvent;
        #[async_trait]
        impl EventHandler for NoopEvent {
            async fn handle(&self, _event: Event) -> Result<(), CoreError> {
                Ok(())
            }
        }

        let registry = AppRegistry::new();
        registry.register(
            AppEntry::new("feeds", AppKind::Internal)
                .with_event("post/create", Arc::new(NoopEvent))
                .with_event_route(
                    "post/anon",
                    Arc::new(NoopEvent),
                    crate::types::EventRoute { allow_anonymous: true },
                ),
        );

        assert!(!registry.event_route("feeds", "post/create").allow_anonymous);
        assert!(registry.event_route("feeds", "post/anon").allow_anonymous);
        assert!(!registry.event_route("feeds", "post/unregistered").allow_anonymous);
    }

    #[test]
    fn app_for_service_resolves_registered_provider() {
        struct NoopService;
        #[async_trait]
        impl ServiceHandler for NoopService {
            async fn call(&self, _function: &str, params: Value, _depth: u32) -> Result<Value, CoreError> {
                Ok(params)
            }
        }

        let registry = AppRegistry::new();
        registry.register(
            AppEntry::new("feeds", AppKind::Internal).with_service("feeds", Arc::new(NoopService)),
        );

        assert_eq!(registry.app_for_service("feeds").as_deref(), Some("feeds"));
        assert_eq!(registry.app_for_service("missing"), None);
    }

    #[tokio::test]
    async fn service_call_recursion_is_capped() {
        let registry = AppRegistry::new();
        let handler = Arc::new(RecursiveService {
            registry: registry.clone(),
        });
        registry.register(
            AppEntry::new("loop", AppKind::Internal).with_service("recurse", handler),
        );

        let err = registry
            .call_service("recurse", "again", Value::None, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, RegistryError::RecursionExceeded(_)));
    }
}
