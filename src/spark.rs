//! Process-wide default bridge with free-function registration.
//!
//! Legacy call sites register against one shared instance:
//!
//! ```no_run
//! use spark_bridge::spark::{self, get};
//! use spark_bridge::{HandlerError, Request, Response};
//!
//! spark::port(8080);
//! get("/hello/:name", |req: &mut Request, _: &mut Response| {
//!     Ok::<_, HandlerError>(format!("Hello {}", req.param("name").unwrap_or("world")))
//! })?;
//! # Ok::<(), spark_bridge::BridgeError>(())
//! ```
//!
//! Everything here forwards to [`instance()`]; code that wants its own
//! instance should hold a [`Bridge`] instead.

use std::error::Error;
use std::sync::OnceLock;

use crate::dispatch::handler::{HandlerError, IntoBody};
use crate::error::BridgeResult;
use crate::http::{Request, Response};
use crate::lifecycle::Bridge;

static INSTANCE: OnceLock<Bridge> = OnceLock::new();

/// The shared bridge, created with default settings on first use.
pub fn instance() -> &'static Bridge {
    INSTANCE.get_or_init(Bridge::new)
}

pub fn port(port: u16) {
    instance().port(port);
}

pub fn ip_address(host: &str) {
    instance().ip_address(host);
}

pub fn thread_pool(min_threads: usize, max_threads: usize, idle_timeout_ms: u64) {
    instance().thread_pool(min_threads, max_threads, idle_timeout_ms);
}

/// Static-file settings of the shared bridge.
#[derive(Debug, Clone, Copy)]
pub struct StaticFilesSettings {
    bridge: &'static Bridge,
}

impl StaticFilesSettings {
    /// Serve files from a directory on disk. A missing directory is logged
    /// at start and otherwise ignored.
    pub fn external_location(&self, location: &str) {
        self.bridge.external_static_location(location);
    }
}

pub fn static_files() -> StaticFilesSettings {
    StaticFilesSettings { bridge: instance() }
}

macro_rules! route_functions {
    ($($name:ident),*) => {
        $(
            pub fn $name<F, T>(path: &str, route: F) -> BridgeResult<()>
            where
                F: Fn(&mut Request, &mut Response) -> Result<T, HandlerError>
                    + Send
                    + Sync
                    + 'static,
                T: IntoBody,
            {
                instance().$name(path, route)
            }
        )*
    };
}

route_functions!(get, post, put, delete, patch, options, head);

pub fn before<F>(path: &str, filter: F) -> BridgeResult<()>
where
    F: Fn(&mut Request, &mut Response) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    instance().before(path, filter)
}

pub fn before_all<F>(filter: F) -> BridgeResult<()>
where
    F: Fn(&mut Request, &mut Response) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    instance().before_all(filter)
}

pub fn after<F>(path: &str, filter: F) -> BridgeResult<()>
where
    F: Fn(&mut Request, &mut Response) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    instance().after(path, filter)
}

pub fn after_all<F>(filter: F) -> BridgeResult<()>
where
    F: Fn(&mut Request, &mut Response) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    instance().after_all(filter)
}

pub fn exception<E, F>(handler: F) -> BridgeResult<()>
where
    E: Error + 'static,
    F: Fn(&E, &mut Request, &mut Response) + Send + Sync + 'static,
{
    instance().exception(handler)
}

pub fn not_found<F, T>(route: F) -> BridgeResult<()>
where
    F: Fn(&mut Request, &mut Response) -> Result<T, HandlerError> + Send + Sync + 'static,
    T: IntoBody,
{
    instance().not_found(route)
}

pub fn internal_server_error<F, T>(route: F) -> BridgeResult<()>
where
    F: Fn(&mut Request, &mut Response) -> Result<T, HandlerError> + Send + Sync + 'static,
    T: IntoBody,
{
    instance().internal_server_error(route)
}

pub fn await_initialization() -> BridgeResult<()> {
    instance().await_initialization()
}

pub fn stop() {
    instance().stop();
}
