//! The bridge handle: registrations plus the engine lifecycle.
//!
//! # State Machine
//! ```text
//! Uninitialized → Initializing → Running → Stopped
//!                      ↑                      │
//!                      └── any registration ──┘
//! ```
//!
//! # Design Decisions
//! - One mutex serializes start, stop and every registration, so a
//!   registration racing first start can neither be lost nor double-start
//! - Registrations live in the registry, not in the engine; a restart keeps
//!   them all
//! - The registry is published through `ArcSwap`; in-flight requests keep
//!   the snapshot they started with
//! - Settings (port, thread pool, static root) are read at start; changes
//!   made while running apply on the next start
//! - Start installs the configured tracing subscriber unless the host
//!   application already installed one

use std::error::Error;
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use arc_swap::ArcSwap;
use axum::http::Method;
use tokio::runtime::Runtime;

use crate::config::{load_config, validate_config, BridgeConfig, ConfigError, ThreadPoolConfig};
use crate::dispatch::handler::{
    exception_fn, filter_fn, route_fn, ErrorKind, HandlerError, IntoBody,
};
use crate::error::{BridgeError, BridgeResult};
use crate::http::server::{EngineState, HttpServer};
use crate::http::session::{self, SessionStore};
use crate::http::static_files::StaticFiles;
use crate::http::{Request, Response};
use crate::lifecycle::runtime;
use crate::lifecycle::shutdown::Shutdown;
use crate::net;
use crate::observability::{logging, metrics};
use crate::routing::{FilterPhase, RouteRegistry};

/// Lifecycle state of a bridge, as reported by [`Bridge::state`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Uninitialized,
    Initializing,
    Running,
    Stopped,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ServerState::Uninitialized => "uninitialized",
            ServerState::Initializing => "initializing",
            ServerState::Running => "running",
            ServerState::Stopped => "stopped",
        };
        f.write_str(text)
    }
}

/// A started engine: its runtime, listener address and shutdown trigger.
struct RunningServer {
    runtime: Option<Runtime>,
    shutdown: Shutdown,
    local_addr: SocketAddr,
    finished: mpsc::Receiver<()>,
}

impl RunningServer {
    fn stop(mut self, grace: Duration) {
        self.shutdown.trigger();
        match self.finished.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {}
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    grace_ms = grace.as_millis() as u64,
                    "Graceful shutdown timed out; dropping open connections"
                );
            }
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        // Never block here: the owner may be dropped inside an async context.
        if let Some(runtime) = self.runtime.take() {
            self.shutdown.trigger();
            runtime.shutdown_background();
        }
    }
}

enum LifecycleState {
    Uninitialized,
    Initializing,
    Running(RunningServer),
    Stopped,
}

impl LifecycleState {
    fn public(&self) -> ServerState {
        match self {
            LifecycleState::Uninitialized => ServerState::Uninitialized,
            LifecycleState::Initializing => ServerState::Initializing,
            LifecycleState::Running(_) => ServerState::Running,
            LifecycleState::Stopped => ServerState::Stopped,
        }
    }
}

struct Controller {
    config: BridgeConfig,
    state: LifecycleState,
}

struct BridgeInner {
    registry: Arc<ArcSwap<RouteRegistry>>,
    sessions: Arc<SessionStore>,
    controller: Mutex<Controller>,
}

/// Handle to one bridge instance. Cloning shares the instance.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

impl Default for Bridge {
    fn default() -> Self {
        Self::new()
    }
}

impl Bridge {
    /// A bridge with default settings (port 7070 on all interfaces).
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        tracing::info!("Spark bridge is igniting");
        Self {
            inner: Arc::new(BridgeInner {
                registry: Arc::new(ArcSwap::from_pointee(RouteRegistry::new())),
                sessions: Arc::new(SessionStore::new()),
                controller: Mutex::new(Controller {
                    config,
                    state: LifecycleState::Uninitialized,
                }),
            }),
        }
    }

    /// A bridge configured from a TOML file.
    ///
    /// The `[observability]` log settings take effect at start, when the
    /// bridge installs its subscriber unless one is already set.
    pub fn from_config_file(path: impl AsRef<Path>) -> BridgeResult<Self> {
        Ok(Self::with_config(load_config(path.as_ref())?))
    }

    fn lock(&self) -> MutexGuard<'_, Controller> {
        self.inner
            .controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // === Settings ===

    /// Copy of the current settings.
    pub fn config(&self) -> BridgeConfig {
        self.lock().config.clone()
    }

    fn configure(&self, setting: &'static str, apply: impl FnOnce(&mut BridgeConfig)) {
        let mut controller = self.lock();
        if matches!(controller.state, LifecycleState::Running(_)) {
            tracing::warn!(setting, "Server already running; change applies on next start");
        }
        apply(&mut controller.config);
    }

    pub fn port(&self, port: u16) {
        self.configure("port", |config| config.server.port = port);
    }

    pub fn ip_address(&self, host: impl Into<String>) {
        let host = host.into();
        self.configure("ip_address", move |config| config.server.host = host);
    }

    /// Worker pool handed to the engine at start.
    pub fn thread_pool(&self, min_threads: usize, max_threads: usize, idle_timeout_ms: u64) {
        let pool = ThreadPoolConfig {
            min_threads,
            max_threads,
            idle_timeout_ms,
        };
        self.configure("thread_pool", move |config| config.thread_pool = pool);
    }

    /// Directory served for unmatched GET/HEAD requests.
    pub fn external_static_location(&self, location: impl Into<String>) {
        let location = location.into();
        self.configure("static_files", move |config| {
            config.static_files.external_location = Some(location)
        });
    }

    // === Registration ===

    fn register(
        &self,
        update: impl FnOnce(&mut RouteRegistry) -> BridgeResult<()>,
    ) -> BridgeResult<()> {
        let mut controller = self.lock();
        let mut registry = RouteRegistry::clone(&self.inner.registry.load());
        update(&mut registry)?;
        self.inner.registry.store(Arc::new(registry));
        self.ensure_running(&mut controller)
    }

    /// Register a route for `method`. Legacy `:name` parameters are accepted.
    pub fn route<F, T>(&self, method: Method, path: &str, route: F) -> BridgeResult<()>
    where
        F: Fn(&mut Request, &mut Response) -> Result<T, HandlerError> + Send + Sync + 'static,
        T: IntoBody,
    {
        let handler = route_fn(route);
        self.register(|registry| registry.add_route(method, path, handler))
    }

    pub fn get<F, T>(&self, path: &str, route: F) -> BridgeResult<()>
    where
        F: Fn(&mut Request, &mut Response) -> Result<T, HandlerError> + Send + Sync + 'static,
        T: IntoBody,
    {
        self.route(Method::GET, path, route)
    }

    pub fn post<F, T>(&self, path: &str, route: F) -> BridgeResult<()>
    where
        F: Fn(&mut Request, &mut Response) -> Result<T, HandlerError> + Send + Sync + 'static,
        T: IntoBody,
    {
        self.route(Method::POST, path, route)
    }

    pub fn put<F, T>(&self, path: &str, route: F) -> BridgeResult<()>
    where
        F: Fn(&mut Request, &mut Response) -> Result<T, HandlerError> + Send + Sync + 'static,
        T: IntoBody,
    {
        self.route(Method::PUT, path, route)
    }

    pub fn delete<F, T>(&self, path: &str, route: F) -> BridgeResult<()>
    where
        F: Fn(&mut Request, &mut Response) -> Result<T, HandlerError> + Send + Sync + 'static,
        T: IntoBody,
    {
        self.route(Method::DELETE, path, route)
    }

    pub fn patch<F, T>(&self, path: &str, route: F) -> BridgeResult<()>
    where
        F: Fn(&mut Request, &mut Response) -> Result<T, HandlerError> + Send + Sync + 'static,
        T: IntoBody,
    {
        self.route(Method::PATCH, path, route)
    }

    pub fn options<F, T>(&self, path: &str, route: F) -> BridgeResult<()>
    where
        F: Fn(&mut Request, &mut Response) -> Result<T, HandlerError> + Send + Sync + 'static,
        T: IntoBody,
    {
        self.route(Method::OPTIONS, path, route)
    }

    pub fn head<F, T>(&self, path: &str, route: F) -> BridgeResult<()>
    where
        F: Fn(&mut Request, &mut Response) -> Result<T, HandlerError> + Send + Sync + 'static,
        T: IntoBody,
    {
        self.route(Method::HEAD, path, route)
    }

    fn filter<F>(&self, phase: FilterPhase, path: &str, filter: F) -> BridgeResult<()>
    where
        F: Fn(&mut Request, &mut Response) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        let handler = filter_fn(filter);
        self.register(|registry| registry.add_filter(phase, path, handler))
    }

    /// Filter run before the route for requests matching `path`.
    pub fn before<F>(&self, path: &str, filter: F) -> BridgeResult<()>
    where
        F: Fn(&mut Request, &mut Response) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.filter(FilterPhase::Before, path, filter)
    }

    /// Filter run before the route for every request.
    pub fn before_all<F>(&self, filter: F) -> BridgeResult<()>
    where
        F: Fn(&mut Request, &mut Response) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.filter(FilterPhase::Before, "/*", filter)
    }

    pub fn after<F>(&self, path: &str, filter: F) -> BridgeResult<()>
    where
        F: Fn(&mut Request, &mut Response) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.filter(FilterPhase::After, path, filter)
    }

    pub fn after_all<F>(&self, filter: F) -> BridgeResult<()>
    where
        F: Fn(&mut Request, &mut Response) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.filter(FilterPhase::After, "/*", filter)
    }

    /// Handle failures of type `E` raised by filters and routes.
    ///
    /// `E` matches when it is the raised error or any error in its
    /// `source()` chain; the outermost match decides.
    pub fn exception<E, F>(&self, handler: F) -> BridgeResult<()>
    where
        E: Error + 'static,
        F: Fn(&E, &mut Request, &mut Response) + Send + Sync + 'static,
    {
        let handler = exception_fn(handler);
        self.register(|registry| {
            registry.add_exception_handler(ErrorKind::of::<E>(), handler);
            Ok(())
        })
    }

    /// Route invoked (with status 404) when nothing matched.
    pub fn not_found<F, T>(&self, route: F) -> BridgeResult<()>
    where
        F: Fn(&mut Request, &mut Response) -> Result<T, HandlerError> + Send + Sync + 'static,
        T: IntoBody,
    {
        let handler = route_fn(route);
        self.register(|registry| {
            registry.set_not_found(handler);
            Ok(())
        })
    }

    /// Route invoked (with status 500) for failures no exception handler took.
    pub fn internal_server_error<F, T>(&self, route: F) -> BridgeResult<()>
    where
        F: Fn(&mut Request, &mut Response) -> Result<T, HandlerError> + Send + Sync + 'static,
        T: IntoBody,
    {
        let handler = route_fn(route);
        self.register(|registry| {
            registry.set_internal_error(handler);
            Ok(())
        })
    }

    // === Lifecycle ===

    /// Start the engine. A no-op while running.
    pub fn start(&self) -> BridgeResult<()> {
        let mut controller = self.lock();
        self.ensure_running(&mut controller)
    }

    /// Alias of [`Bridge::start`]; returns once the listener is bound.
    pub fn await_initialization(&self) -> BridgeResult<()> {
        self.start()
    }

    /// Stop the engine, waiting up to the configured grace period for
    /// in-flight requests. A no-op unless running.
    pub fn stop(&self) {
        let mut controller = self.lock();
        let grace = Duration::from_millis(controller.config.server.shutdown_grace_ms);
        match std::mem::replace(&mut controller.state, LifecycleState::Stopped) {
            LifecycleState::Running(server) => {
                let addr = server.local_addr;
                server.stop(grace);
                tracing::info!(address = %addr, "Bridge stopped");
            }
            previous => controller.state = previous,
        }
    }

    pub fn state(&self) -> ServerState {
        self.lock().state.public()
    }

    pub fn is_running(&self) -> bool {
        self.state() == ServerState::Running
    }

    /// Address the engine is listening on, while running.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.lock().state {
            LifecycleState::Running(server) => Some(server.local_addr),
            _ => None,
        }
    }

    /// Engine session store shared by every request.
    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    fn ensure_running(&self, controller: &mut Controller) -> BridgeResult<()> {
        if matches!(controller.state, LifecycleState::Running(_)) {
            return Ok(());
        }

        let previous = std::mem::replace(&mut controller.state, LifecycleState::Initializing);
        match self.launch(&controller.config) {
            Ok(server) => {
                controller.state = LifecycleState::Running(server);
                Ok(())
            }
            Err(error) => {
                tracing::error!(error = %error, "Bridge failed to start");
                controller.state = previous;
                Err(error)
            }
        }
    }

    fn launch(&self, config: &BridgeConfig) -> BridgeResult<RunningServer> {
        validate_config(config).map_err(ConfigError::Validation)?;
        logging::init(&config.observability);

        let (std_listener, local_addr) = net::bind(&config.server)?;
        let runtime = runtime::build(&config.thread_pool)?;

        let static_files = config
            .static_files
            .external_location
            .as_deref()
            .and_then(StaticFiles::configure);

        let server = HttpServer::new(EngineState {
            registry: Arc::clone(&self.inner.registry),
            sessions: Arc::clone(&self.inner.sessions),
            static_files,
            limits: config.limits.clone(),
            cookie_name: Arc::from(config.session.cookie_name.as_str()),
            local_port: local_addr.port(),
        });

        let shutdown = Shutdown::new();
        let signal = shutdown.signal();
        let (finished_tx, finished) = mpsc::channel();

        {
            let _guard = runtime.enter();
            let listener = match tokio::net::TcpListener::from_std(std_listener) {
                Ok(listener) => listener,
                Err(error) => {
                    drop(_guard);
                    runtime.shutdown_background();
                    return Err(BridgeError::Bind {
                        addr: local_addr,
                        source: error,
                    });
                }
            };

            if config.observability.metrics_enabled {
                match config.observability.metrics_address.parse() {
                    Ok(addr) => metrics::init_metrics(addr),
                    Err(_) => tracing::error!(
                        metrics_address = %config.observability.metrics_address,
                        "Failed to parse metrics address"
                    ),
                }
            }

            if config.session.idle_timeout_secs > 0 {
                let max_idle = Duration::from_secs(config.session.idle_timeout_secs);
                runtime.spawn(session::run_eviction(
                    Arc::clone(&self.inner.sessions),
                    max_idle,
                    eviction_interval(max_idle),
                    shutdown.signal(),
                ));
            }

            runtime.spawn(async move {
                if let Err(error) = server.run(listener, signal).await {
                    tracing::error!(error = %error, "HTTP server failed");
                }
                let _ = finished_tx.send(());
            });
        }

        tracing::info!(
            address = %local_addr,
            min_threads = config.thread_pool.min_threads,
            max_threads = config.thread_pool.max_threads,
            "Bridge running"
        );
        Ok(RunningServer {
            runtime: Some(runtime),
            shutdown,
            local_addr,
            finished,
        })
    }
}

/// Sweep a few times per timeout, at most once a minute and at least once a second.
fn eviction_interval(max_idle: Duration) -> Duration {
    (max_idle / 4).clamp(Duration::from_secs(1), Duration::from_secs(60))
}

impl fmt::Debug for Bridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bridge")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ephemeral() -> Bridge {
        let mut config = BridgeConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.server.shutdown_grace_ms = 200;
        config.thread_pool = ThreadPoolConfig {
            min_threads: 1,
            max_threads: 4,
            idle_timeout_ms: 1_000,
        };
        Bridge::with_config(config)
    }

    #[test]
    fn registration_starts_the_server() {
        let bridge = ephemeral();
        assert_eq!(bridge.state(), ServerState::Uninitialized);

        bridge
            .get("/ping", |_: &mut Request, _: &mut Response| Ok::<_, HandlerError>("pong"))
            .unwrap();
        assert_eq!(bridge.state(), ServerState::Running);
        assert!(bridge.local_addr().is_some());

        bridge.stop();
        assert_eq!(bridge.state(), ServerState::Stopped);
        assert!(bridge.local_addr().is_none());
    }

    #[test]
    fn start_and_stop_are_idempotent() {
        let bridge = ephemeral();
        bridge.stop();
        assert_eq!(bridge.state(), ServerState::Uninitialized);

        bridge.start().unwrap();
        let addr = bridge.local_addr();
        bridge.start().unwrap();
        assert_eq!(bridge.local_addr(), addr);

        bridge.stop();
        bridge.stop();
        assert_eq!(bridge.state(), ServerState::Stopped);
    }

    #[test]
    fn registration_after_stop_restarts_and_keeps_routes() {
        let bridge = ephemeral();
        bridge
            .get("/a", |_: &mut Request, _: &mut Response| Ok::<_, HandlerError>("a"))
            .unwrap();
        bridge.stop();

        bridge
            .get("/b", |_: &mut Request, _: &mut Response| Ok::<_, HandlerError>("b"))
            .unwrap();
        assert!(bridge.is_running());
        assert_eq!(bridge.inner.registry.load().routes().len(), 2);
        bridge.stop();
    }

    #[test]
    fn invalid_pattern_is_not_registered() {
        let bridge = ephemeral();
        let result = bridge.get("no-leading-slash", |_: &mut Request, _: &mut Response| {
            Ok::<_, HandlerError>(())
        });
        assert!(matches!(result, Err(BridgeError::InvalidPattern { .. })));
        assert_eq!(bridge.state(), ServerState::Uninitialized);
    }

    #[test]
    fn invalid_thread_pool_fails_start() {
        let bridge = ephemeral();
        bridge.thread_pool(8, 2, 1_000);
        let result = bridge.start();
        assert!(matches!(result, Err(BridgeError::Config(ConfigError::Validation(_)))));
        assert_eq!(bridge.state(), ServerState::Uninitialized);
    }

    #[test]
    fn missing_static_root_still_starts() {
        let bridge = ephemeral();
        bridge.external_static_location("/no/such/dir/for/static/files");
        bridge.start().unwrap();
        assert!(bridge.is_running());
        bridge.stop();
    }

    #[test]
    fn start_installs_a_subscriber() {
        let bridge = ephemeral();
        bridge.start().unwrap();
        assert!(tracing::dispatcher::has_been_set());
        bridge.stop();
    }

    #[test]
    fn occupied_port_reports_a_bind_error() {
        let first = ephemeral();
        first.start().unwrap();
        let port = first.local_addr().unwrap().port();

        let second = ephemeral();
        second.port(port);
        let error = second.start().unwrap_err();
        assert!(matches!(error, BridgeError::Bind { addr, .. } if addr.port() == port));
        assert!(error.to_string().starts_with("failed to bind"));
        first.stop();
    }

    #[test]
    fn eviction_interval_is_clamped() {
        assert_eq!(eviction_interval(Duration::from_secs(1)), Duration::from_secs(1));
        assert_eq!(eviction_interval(Duration::from_secs(40)), Duration::from_secs(10));
        assert_eq!(eviction_interval(Duration::from_secs(1_800)), Duration::from_secs(60));
    }

    #[test]
    fn settings_changed_while_running_apply_on_restart() {
        let bridge = ephemeral();
        bridge.start().unwrap();
        bridge.port(0);
        bridge.ip_address("127.0.0.1");
        assert!(bridge.is_running());
        bridge.stop();
        assert_eq!(bridge.config().server.port, 0);
    }
}
