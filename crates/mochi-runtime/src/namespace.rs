use std::path::PathBuf;
use std::sync::Arc;

use mochi_core::{EntityId, UserRole, Value as HostValue};
use mochi_crypto::EntityKeyPair;
use mochi_permissions::{PermissionDef, PermissionGuard};
use mochi_peers::PeerPool;
use mochi_queue::QueueStore;
use mochi_ratelimit::RateLimiter;
use mochi_registry::AppRegistry;
use mochi_store::Store;
use starlark::environment::{Globals, GlobalsBuilder, Module};
use starlark::eval::Evaluator;
use starlark::syntax::{AstModule, Dialect};
use starlark::values::Value as StarlarkValue;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::config::RuntimeConfig;
use crate::error::RuntimeError;
use crate::host::HostContext;
use crate::value_bridge::{from_starlark, to_starlark};

/// A loaded app's script bundle: the app's linked files, held as source
/// rather than a prebuilt [`Module`] (Starlark's `Module`/`Value` types are
/// `!Send` — a pre-built module can't cross onto the dedicated blocking
/// thread `call` needs for real cancellation, see `call`'s doc comment), plus
/// the concurrency gate spec §4.4 requires ("at most one evaluation in
/// flight per namespace, bounded by a process-wide semaphore sized by
/// `starlark.concurrency`").
pub struct Namespace {
    files: Vec<(String, String)>,
    call_lock: tokio::sync::Mutex<()>,
}

/// Concatenates `files` into one module source and parses + links it,
/// shared by [`Namespace::load`] (eager validation at install time) and
/// [`Namespace::call`] (fresh per-call module, built on the call's own
/// dedicated thread).
fn build_module(files: &[(String, String)], globals: &Globals) -> Result<Module, RuntimeError> {
    let mut combined = String::new();
    for (name, source) in files {
        combined.push_str(&format!("# -- {name} --\n"));
        combined.push_str(source);
        combined.push('\n');
    }

    let ast = AstModule::parse("app", combined, &Dialect::Extended)
        .map_err(|e| RuntimeError::Parse(e.to_string()))?;

    let module = Module::new();
    {
        let mut eval = Evaluator::new(&module);
        eval.eval_module(ast, globals)
            .map_err(|e| RuntimeError::Parse(e.to_string()))?;
    }
    Ok(module)
}

/// Everything `Namespace::call` needs about the caller beyond the script
/// function name and arguments, bundled so its own signature does not grow
/// a dozen positional parameters.
#[allow(clippy::too_many_arguments)]
pub struct CallEnv {
    pub user: i64,
    pub role: UserRole,
    pub app_id: String,
    pub is_internal: bool,
    pub entity: EntityId,
    pub signing_key: Arc<EntityKeyPair>,
    pub db: Arc<Store>,
    pub permissions: Arc<PermissionGuard>,
    pub permission_defs: Vec<PermissionDef>,
    pub registry: Arc<AppRegistry>,
    pub queue: Arc<QueueStore>,
    pub peers: Arc<PeerPool>,
    pub url_limiter: Arc<RateLimiter>,
    pub file_root: PathBuf,
    pub depth: u32,
}

/// Process-wide limit on concurrent Starlark evaluations, shared by every
/// loaded [`Namespace`] (spec §4.4: "the server as a whole never runs more
/// than `starlark.concurrency` scripts at once").
pub struct EvaluationGate {
    semaphore: Semaphore,
}

impl EvaluationGate {
    pub fn new(config: &RuntimeConfig) -> Self {
        EvaluationGate {
            semaphore: Semaphore::new(config.concurrency),
        }
    }
}

impl Namespace {
    /// Validates `files` (`(filename, source)` pairs) eagerly so a bad
    /// script is rejected at install time, then keeps the source for
    /// `call` to relink per invocation. Multiple files are concatenated in
    /// the order given rather than resolved through `load()` statements:
    /// apps in this core are single logical units, and Starlark's `load()`
    /// mechanism is built for cross-package imports the per-app script
    /// bundle does not need.
    pub fn load(files: &[(String, String)]) -> Result<Self, RuntimeError> {
        let globals = GlobalsBuilder::new().with(crate::host::globals).build();
        build_module(files, &globals)?;

        Ok(Namespace {
            files: files.to_vec(),
            call_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Invokes `function_name(args)`, enforcing the full concurrency
    /// contract from spec §4.4: one evaluation per namespace at a time,
    /// bounded process-wide concurrency, and a wall-clock timeout that
    /// fires even for a builtin-free compute loop (spec §8's mandatory
    /// `while True: pass` scenario).
    ///
    /// Starlark's `Module`/`Value` types are `!Send`, so the evaluation
    /// cannot run on the calling task: a synchronous `block_in_place` call
    /// never yields back to the executor, so `tokio::time::timeout`'s
    /// `Sleep` is never polled and a builtin-free loop runs forever. Instead
    /// the module is rebuilt and evaluated on a dedicated `spawn_blocking`
    /// thread, reached only through `Send` data (`files`, `function_name`,
    /// `args`, `host`); `timeout` then races the task's `JoinHandle`, which
    /// *is* polled independently of the blocking thread's progress, so the
    /// call returns within `timeout + cancellation_slack` regardless of
    /// what the script's compute loop is doing. This does not stop the
    /// orphaned thread itself — Starlark exposes no interpreter-level
    /// interrupt, so a `while True: pass` script's thread keeps spinning
    /// in the background — but it does make the *caller's* observable
    /// wall-clock bound hold, which is what spec §8's invariant requires.
    /// `HostContext`'s stream-cleanup `Drop` still runs, just whenever that
    /// background thread eventually unwinds rather than at the moment of
    /// the timeout.
    pub async fn call(
        &self,
        gate: &EvaluationGate,
        config: &RuntimeConfig,
        env: CallEnv,
        function_name: &str,
        args: Vec<HostValue>,
    ) -> Result<HostValue, RuntimeError> {
        let _namespace_guard = self.call_lock.lock().await;
        let _permit = gate
            .semaphore
            .acquire()
            .await
            .map_err(|_| RuntimeError::Cancelled("evaluation gate closed".into()))?;

        let cancel = CancellationToken::new();
        let host = HostContext::new(
            env.user,
            env.role,
            env.app_id,
            env.is_internal,
            env.entity,
            env.signing_key,
            env.db,
            env.permissions,
            env.permission_defs,
            env.registry,
            env.queue,
            env.peers,
            env.url_limiter,
            env.file_root,
            config.clone(),
            env.depth,
            cancel.clone(),
        );

        let files = self.files.clone();
        let function_name = function_name.to_string();
        let timeout = config.timeout;

        let eval_task = tokio::task::spawn_blocking(move || -> Result<HostValue, RuntimeError> {
            let globals = GlobalsBuilder::new().with(crate::host::globals).build();
            let module = build_module(&files, &globals)?;
            let function = module
                .get(&function_name)
                .ok_or_else(|| RuntimeError::FunctionNotFound(function_name.clone()))?;

            let mut eval = Evaluator::new(&module);
            eval.extra = Some(&host);
            let heap = module.heap();
            let allocated: Vec<StarlarkValue<'_>> =
                args.iter().map(|a| to_starlark(heap, a)).collect();
            let result = eval
                .eval_function(function, &allocated, &[])
                .map_err(|e| RuntimeError::Remote(e.to_string()))?;
            from_starlark(result)
        });

        match tokio::time::timeout(timeout, eval_task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(RuntimeError::Remote(format!(
                "evaluation task panicked: {join_err}"
            ))),
            Err(_) => {
                cancel.cancel();
                Err(RuntimeError::Cancelled("wall-clock timeout".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mochi_core::UserRole;
    use mochi_permissions::PermissionGuard;
    use mochi_queue::QueueStore;
    use mochi_ratelimit::RateLimitConfig;
    use mochi_registry::AppRegistry;
    use std::time::Duration;

    async fn fixture() -> (Arc<Store>, CallEnv) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(&dir.path().join("app.db")).await.unwrap());
        let peers_store = Arc::new(Store::open(&dir.path().join("peers.db")).await.unwrap());
        mochi_store::ensure_schema(&peers_store, &mochi_store::PeersSchema)
            .await
            .unwrap();
        let queue_store = Arc::new(Store::open(&dir.path().join("queue.db")).await.unwrap());
        mochi_store::ensure_schema(&queue_store, &mochi_store::QueueSchema)
            .await
            .unwrap();

        let env = CallEnv {
            user: 1,
            role: UserRole::Owner,
            app_id: "demo".into(),
            is_internal: false,
            entity: EntityId([0u8; 32]),
            signing_key: Arc::new(EntityKeyPair::generate()),
            db: store.clone(),
            permissions: Arc::new(PermissionGuard::new(store.clone())),
            permission_defs: Vec::new(),
            registry: Arc::new(AppRegistry::new()),
            queue: Arc::new(QueueStore::new(queue_store.clone())),
            peers: Arc::new(PeerPool::new(
                mochi_peers::PeerDirectory::new(peers_store),
                Arc::new(NoopTransport),
            )),
            url_limiter: Arc::new(RateLimiter::new(RateLimitConfig::new(1000, 60))),
            file_root: dir.path().to_path_buf(),
            depth: 0,
        };
        (store, env)
    }

    struct NoopTransport;

    #[async_trait::async_trait]
    impl mochi_peers::Transport for NoopTransport {
        async fn connect(&self, _address: &str) -> Result<Arc<dyn mochi_peers::Session>, mochi_peers::PeerError> {
            Err(mochi_peers::PeerError::Transport("no peers in test".into()))
        }
    }

    #[tokio::test]
    async fn builtin_free_loop_is_cut_off_by_wall_clock_timeout() {
        let (_store, env) = fixture().await;
        let files = vec![(
            "app.star".to_string(),
            "def run():\n    while True:\n        pass\n".to_string(),
        )];
        let namespace = Namespace::load(&files).unwrap();
        let config = RuntimeConfig {
            timeout: Duration::from_millis(100),
            ..RuntimeConfig::default()
        };
        let gate = EvaluationGate::new(&config);

        let started = std::time::Instant::now();
        let result = namespace.call(&gate, &config, env, "run", vec![]).await;
        assert!(matches!(result, Err(RuntimeError::Cancelled(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn ordinary_function_returns_its_value() {
        let (_store, env) = fixture().await;
        let files = vec![(
            "app.star".to_string(),
            "def add(a, b):\n    return a + b\n".to_string(),
        )];
        let namespace = Namespace::load(&files).unwrap();
        let config = RuntimeConfig::default();
        let gate = EvaluationGate::new(&config);

        let result = namespace
            .call(&gate, &config, env, "add", vec![HostValue::Int(2), HostValue::Int(3)])
            .await
            .unwrap();
        assert_eq!(result, HostValue::Int(5));
    }
}
