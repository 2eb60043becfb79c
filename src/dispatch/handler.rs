//! Handler signatures shared by the registry and the dispatcher.

use std::any::{type_name, TypeId};
use std::borrow::Cow;
use std::error::Error;
use std::sync::Arc;

use thiserror::Error;

use crate::http::{Request, Response};

/// Error type returned by application filters and routes.
///
/// Any `std::error::Error + Send + Sync` converts into it with `?`.
pub type HandlerError = Box<dyn Error + Send + Sync + 'static>;

/// Result of a route invocation: an optional body.
pub type RouteResult = Result<Option<String>, HandlerError>;

pub(crate) type RouteFn = dyn Fn(&mut Request, &mut Response) -> RouteResult + Send + Sync;
pub(crate) type FilterFn =
    dyn Fn(&mut Request, &mut Response) -> Result<(), HandlerError> + Send + Sync;
pub(crate) type ExceptionFn =
    dyn Fn(&(dyn Error + 'static), &mut Request, &mut Response) + Send + Sync;

/// Values a route may return as its response body.
///
/// `()` and `None` leave the body untouched.
pub trait IntoBody {
    fn into_body(self) -> Option<String>;
}

impl IntoBody for String {
    fn into_body(self) -> Option<String> {
        Some(self)
    }
}

impl IntoBody for &str {
    fn into_body(self) -> Option<String> {
        Some(self.to_string())
    }
}

impl IntoBody for Cow<'_, str> {
    fn into_body(self) -> Option<String> {
        Some(self.into_owned())
    }
}

impl IntoBody for () {
    fn into_body(self) -> Option<String> {
        None
    }
}

impl IntoBody for serde_json::Value {
    fn into_body(self) -> Option<String> {
        Some(self.to_string())
    }
}

impl<T: IntoBody> IntoBody for Option<T> {
    fn into_body(self) -> Option<String> {
        self.and_then(IntoBody::into_body)
    }
}

pub(crate) fn route_fn<F, T>(route: F) -> Arc<RouteFn>
where
    F: Fn(&mut Request, &mut Response) -> Result<T, HandlerError> + Send + Sync + 'static,
    T: IntoBody,
{
    Arc::new(move |request: &mut Request, response: &mut Response| {
        route(request, response).map(IntoBody::into_body)
    })
}

pub(crate) fn filter_fn<F>(filter: F) -> Arc<FilterFn>
where
    F: Fn(&mut Request, &mut Response) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    Arc::new(filter)
}

/// A failure kind an exception handler is registered against.
///
/// A kind matches an error when the error, or any error in its `source()`
/// chain, is of the kind's concrete type.
#[derive(Clone, Copy)]
pub struct ErrorKind {
    type_id: TypeId,
    name: &'static str,
    probe: fn(&(dyn Error + 'static)) -> bool,
}

impl ErrorKind {
    pub fn of<E: Error + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<E>(),
            name: type_name::<E>(),
            probe: |error| error.is::<E>(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// True when `error` itself is of this kind (its sources are not inspected).
    pub fn is_instance(&self, error: &(dyn Error + 'static)) -> bool {
        (self.probe)(error)
    }
}

impl std::fmt::Debug for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

pub(crate) fn exception_fn<E, F>(handler: F) -> Arc<ExceptionFn>
where
    E: Error + 'static,
    F: Fn(&E, &mut Request, &mut Response) + Send + Sync + 'static,
{
    Arc::new(move |error: &(dyn Error + 'static), request: &mut Request, response: &mut Response| {
        // The registry only routes errors whose kind probe matched.
        if let Some(error) = error.downcast_ref::<E>() {
            handler(error, request, response);
        }
    })
}

/// A filter, route or handler panicked; the panic payload is kept as text.
#[derive(Debug, Error)]
#[error("handler panicked: {message}")]
pub struct HandlerPanic {
    pub message: String,
}

impl HandlerPanic {
    pub(crate) fn from_payload(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self { message }
    }
}
