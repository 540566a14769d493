//! Per-request handle exposing the inbound [`Request`] view and a deferred
//! response builder, plus a typed user-data slot.
//!
//! A [`Context`] is created fresh for every inbound request dispatched
//! through a [`Router`](crate::Router): it owns a cheap clone of the parsed
//! [`Request`] (the request's fields are already zero-copy references into
//! the connection's read buffer, so cloning only copies pointers/enums, no
//! bytes), a slot for request-scoped user data, and the CORS `origin`
//! annotation described in the crate's filter chain. Exactly one response
//! may be written per [`Context`]; writing a second one is a logic error
//! and is reported as a debug-mode panic, matching the single-write
//! invariant [`Response`] itself already enforces.

use crate::{Method, Request, StatusCode, WriteBuffer};
use std::any::Any;

#[doc(hidden)]
/// Marker returned by [`Context::response`] and its shortcuts, proving a
/// response was recorded. Analogous to [`Handled`](crate::Handled), but for
/// the router layer: the real [`Handled`](crate::Handled) is only produced
/// once [`Router`](crate::Router) replays the recorded response onto the
/// connection's actual [`Response`](crate::Response) builder.
pub struct Responded(());

pub(crate) struct Pending {
    pub(crate) status: StatusCode,
    pub(crate) content_type: Option<String>,
    pub(crate) keep_alive: Option<bool>,
    pub(crate) headers: Vec<(String, String)>,
    pub(crate) body: Vec<u8>,
}

impl Pending {
    /// Used only if a filter claims `Responded` without ever calling into
    /// [`Context::response`] — a misbehaving filter, not a reachable path
    /// for any filter shipped in this crate.
    pub(crate) fn fallback_error() -> Self {
        Self {
            status: StatusCode::InternalServerError,
            content_type: Some("text/plain".to_owned()),
            keep_alive: None,
            headers: Vec::new(),
            body: b"Internal Server Error".to_vec(),
        }
    }
}

/// Per-request handle passed to route handlers and filters.
///
/// See the [module docs](self) for the lifecycle. Handlers build their
/// response through [`response`](Self::response) (or one of the
/// status-named shortcuts below) rather than through
/// [`Response`](crate::Response) directly, so that outbound filters (e.g.
/// CORS) get a chance to contribute headers before anything is written to
/// the wire.
pub struct Context {
    request: Request,
    user_data: Option<Box<dyn Any + Send>>,
    origin: Option<String>,
    pending: Option<Pending>,
}

impl Context {
    #[inline]
    pub(crate) fn new(request: &Request) -> Self {
        Self {
            request: request.clone(),
            user_data: None,
            origin: None,
            pending: None,
        }
    }

    /// The inbound request this context was created for.
    #[inline]
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// The request's method. Shorthand for `ctx.request().method()`.
    #[inline]
    pub fn method(&self) -> Method {
        self.request.method()
    }

    /// Attaches a typed value to this request, replacing any previous one.
    ///
    /// Unlike [`ConnectionData`](crate::ConnectionData), this slot is
    /// scoped to a single request/[`Context`] and is dropped once the
    /// response is written.
    #[inline]
    pub fn set_user_data<T: Any + Send>(&mut self, value: T) {
        self.user_data = Some(Box::new(value));
    }

    /// Retrieves the attached user data if present and of type `T`.
    #[inline]
    pub fn try_get_user_data<T: Any + Send>(&self) -> Option<&T> {
        self.user_data.as_ref().and_then(|value| value.downcast_ref())
    }

    /// Retrieves the attached user data mutably if present and of type `T`.
    #[inline]
    pub fn try_get_user_data_mut<T: Any + Send>(&mut self) -> Option<&mut T> {
        self.user_data.as_mut().and_then(|value| value.downcast_mut())
    }

    /// Records the CORS-verified origin for this request. Used by
    /// [`CorsFilter`](crate::CorsFilter); crate-private because the
    /// annotation is meaningless outside the filter chain that produced it.
    #[inline]
    pub(crate) fn set_origin(&mut self, origin: impl Into<String>) {
        self.origin = Some(origin.into());
    }

    #[inline]
    pub(crate) fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    /// Records a response with a status and body, using the request's
    /// keep-alive flag and no extra headers or explicit content type.
    #[inline]
    #[track_caller]
    pub fn response<T: WriteBuffer>(&mut self, status: StatusCode, body: T) -> Responded {
        self.response_with(status, Some(body), None, None, &[])
    }

    /// Records a response with full control over its content type,
    /// keep-alive override and extra headers.
    ///
    /// # Panics
    /// In debug builds, panics if a response was already recorded for this
    /// [`Context`] (at most one response may be written per context).
    #[track_caller]
    pub fn response_with<T: WriteBuffer>(
        &mut self,
        status: StatusCode,
        body: Option<T>,
        content_type: Option<&str>,
        keep_alive: Option<bool>,
        headers: &[(&str, &str)],
    ) -> Responded {
        debug_assert!(
            self.pending.is_none(),
            "at most one response may be written per Context"
        );

        let mut buffer = Vec::new();
        if let Some(body) = body {
            body.write_to(&mut buffer);
        }

        self.pending = Some(Pending {
            status,
            content_type: content_type.map(str::to_owned),
            keep_alive,
            headers: headers
                .iter()
                .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
                .collect(),
            body: buffer,
        });

        Responded(())
    }

    /// Appends a header to the already-recorded response. Used by outbound
    /// filters; a no-op if no response has been recorded yet.
    #[inline]
    pub(crate) fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        if let Some(pending) = &mut self.pending {
            pending.headers.push((name.into(), value.into()));
        }
    }

    #[inline]
    pub(crate) fn take_pending(&mut self) -> Option<Pending> {
        self.pending.take()
    }
}

macro_rules! status_shortcuts {
    ($($(#[$docs:meta])* $name:ident => $variant:ident;)*) => {
        impl Context { $(
            $(#[$docs])*
            #[inline]
            #[track_caller]
            pub fn $name<T: WriteBuffer>(&mut self, body: T) -> Responded {
                self.response(StatusCode::$variant, body)
            }
        )* }
    };
}

status_shortcuts! {
    /// Shortcut for `response(StatusCode::Ok, body)`.
    ok => Ok;
    /// Shortcut for `response(StatusCode::Created, body)`.
    created => Created;
    /// Shortcut for `response(StatusCode::Accepted, body)`.
    accepted => Accepted;
    /// Shortcut for `response(StatusCode::NoContent, body)`.
    no_content => NoContent;
    /// Shortcut for `response(StatusCode::BadRequest, body)`.
    bad_request => BadRequest;
    /// Shortcut for `response(StatusCode::Unauthorized, body)`.
    unauthorized => Unauthorized;
    /// Shortcut for `response(StatusCode::Forbidden, body)`.
    forbidden => Forbidden;
    /// Shortcut for `response(StatusCode::NotFound, body)`.
    not_found => NotFound;
    /// Shortcut for `response(StatusCode::MethodNotAllowed, body)`.
    method_not_allowed => MethodNotAllowed;
    /// Shortcut for `response(StatusCode::Conflict, body)`.
    conflict => Conflict;
    /// Shortcut for `response(StatusCode::UnprocessableEntity, body)`.
    unprocessable_entity => UnprocessableEntity;
    /// Shortcut for `response(StatusCode::PayloadTooLarge, body)`.
    payload_too_large => PayloadTooLarge;
    /// Shortcut for `response(StatusCode::TooManyRequests, body)`.
    too_many_requests => TooManyRequests;
    /// Shortcut for `response(StatusCode::InternalServerError, body)`.
    internal_server_error => InternalServerError;
    /// Shortcut for `response(StatusCode::NotImplemented, body)`.
    not_implemented => NotImplemented;
    /// Shortcut for `response(StatusCode::ServiceUnavailable, body)`.
    service_unavailable => ServiceUnavailable;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::ReqLimits;

    #[test]
    fn user_data_roundtrip() {
        let mut ctx = Context::new(&Request::new(&ReqLimits::default()));
        assert!(ctx.try_get_user_data::<u32>().is_none());

        ctx.set_user_data(42u32);
        assert_eq!(ctx.try_get_user_data::<u32>(), Some(&42));
        assert_eq!(ctx.try_get_user_data::<String>(), None);

        *ctx.try_get_user_data_mut::<u32>().unwrap() += 1;
        assert_eq!(ctx.try_get_user_data::<u32>(), Some(&43));
    }

    #[test]
    fn response_records_pending() {
        let mut ctx = Context::new(&Request::new(&ReqLimits::default()));
        ctx.ok("hello");

        let pending = ctx.take_pending().unwrap();
        assert_eq!(pending.status, StatusCode::Ok);
        assert_eq!(pending.body, b"hello");
    }

    #[test]
    #[should_panic(expected = "at most one response may be written per Context")]
    fn double_response_panics() {
        let mut ctx = Context::new(&Request::new(&ReqLimits::default()));
        ctx.ok("first");
        ctx.ok("second");
    }
}
