//! Request/response filter chain, and a CORS implementation built on it.
//!
//! A [`Filter`] gets two hooks into a [`Router`](crate::Router)'s pipeline:
//! [`on_incoming_request`](Filter::on_incoming_request), which runs before
//! route dispatch and can short-circuit the request with its own response
//! (an auth gate, a preflight responder, a rate limiter), and
//! [`on_outgoing_response`](Filter::on_outgoing_response), which runs for
//! every response regardless of where it came from (a route handler, a
//! filter short-circuit, or the router's own 404/405/400) and can only add
//! headers, not replace the body or status.
//!
//! Filters run in registration order on the way in, and in the same order
//! on the way out — there is no automatic reversal, matching the mental
//! model of a plain ordered list rather than a call stack.

use crate::{context::Context, Method, StatusCode};

/// The result of a filter's inbound hook.
pub enum FilterOutcome {
    /// Let the request continue to the next filter, then to route dispatch.
    Passed,
    /// The filter has already recorded a response on the [`Context`]
    /// (typically via [`Context::response`] or one of its shortcuts);
    /// remaining filters' inbound hooks and route dispatch are skipped, but
    /// every filter's outbound hook still runs.
    Responded,
}

/// A hook into the inbound/outbound request pipeline of a
/// [`Router`](crate::Router).
///
/// Both methods have no-op default implementations so a filter that only
/// cares about one direction doesn't need to implement the other.
pub trait Filter: Send + Sync + 'static {
    /// Runs before route dispatch. Returning [`FilterOutcome::Responded`]
    /// after recording a response on `ctx` short-circuits the pipeline.
    #[inline]
    fn on_incoming_request(&self, ctx: &mut Context) -> FilterOutcome {
        let _ = ctx;
        FilterOutcome::Passed
    }

    /// Runs once a response has been recorded on `ctx`, for every request
    /// that reaches this filter's position in the chain (including ones
    /// this same filter short-circuited). May only add headers.
    #[inline]
    fn on_outgoing_response(&self, ctx: &mut Context) {
        let _ = ctx;
    }
}

/// Configuration for [`CorsFilter`].
///
/// The empty [`Default`] allows nothing: no origins, no extra headers, no
/// methods. A real deployment sets at least [`allow_origins`](Self::allow_origins)
/// (or [`allow_any_origins`](Self::allow_any_origins)) and
/// [`allow_methods`](Self::allow_methods).
#[derive(Debug, Clone, Default)]
pub struct CorsOptions {
    /// Origins allowed to make cross-origin requests, compared after
    /// normalizing scheme/host case and stripping the default port for
    /// that scheme (`:80` for `http`, `:443` for `https`).
    pub allow_origins: Vec<String>,
    /// Reflects the verified origin and accepts every origin, ignoring
    /// [`allow_origins`](Self::allow_origins). Mutually exclusive with
    /// sending credentials under the Fetch spec; this crate does not
    /// enforce that, callers must not combine the two.
    pub allow_any_origins: bool,
    /// Methods allowed for cross-origin requests.
    pub allow_methods: Vec<Method>,
    /// Request headers allowed in a preflight's
    /// `Access-Control-Request-Headers`, compared case-insensitively.
    pub allow_headers: Vec<String>,
    /// Accepts every requested header, ignoring [`allow_headers`](Self::allow_headers).
    pub allow_any_headers: bool,
    /// Response headers exposed to cross-origin scripts via
    /// `Access-Control-Expose-Headers`.
    pub expose_headers: Vec<String>,
    /// Value of `Access-Control-Max-Age`, in seconds.
    pub max_age: u64,
    /// Whether to send `Access-Control-Allow-Credentials: true`.
    pub allow_credentials: bool,
}

/// Implements the CORS preflight and simple-request contract on top of the
/// [`Filter`] chain.
///
/// Preflight (`OPTIONS` with `Access-Control-Request-Method`) is answered
/// directly by [`on_incoming_request`](Filter::on_incoming_request): a
/// disallowed origin, method, or header yields `403 Forbidden`; a malformed
/// preflight (missing `Access-Control-Request-Method`, or one carrying a
/// body) yields `400 Bad Request`. A simple cross-origin request (any other
/// method with an `Origin` header) is rejected with `403` if the origin
/// isn't allowed, otherwise passed through with the verified origin
/// recorded on the [`Context`] for [`on_outgoing_response`](Filter::on_outgoing_response)
/// to annotate.
pub struct CorsFilter {
    options: CorsOptions,
}

impl CorsFilter {
    /// Builds a filter from the given options.
    pub fn new(options: CorsOptions) -> Self {
        Self { options }
    }

    fn verify_origin(&self, origin: &str) -> Option<String> {
        let normalized = normalize_origin(origin);
        if self.options.allow_any_origins {
            return Some(normalized);
        }
        self.options
            .allow_origins
            .iter()
            .map(|allowed| normalize_origin(allowed))
            .find(|allowed| *allowed == normalized)
    }

    fn handle_preflight(&self, ctx: &mut Context, origin: &str) -> FilterOutcome {
        let Some(requested_method) = ctx
            .request()
            .header(b"access-control-request-method")
            .and_then(|value| std::str::from_utf8(value).ok())
        else {
            ctx.bad_request("missing Access-Control-Request-Method");
            return FilterOutcome::Responded;
        };

        if ctx.request().body().is_some_and(|body| !body.is_empty()) {
            ctx.payload_too_large("preflight request must not carry a body");
            return FilterOutcome::Responded;
        }

        let Some(verified_origin) = self.verify_origin(origin) else {
            ctx.forbidden("origin not allowed");
            return FilterOutcome::Responded;
        };

        let Some(method) = parse_method(requested_method) else {
            ctx.forbidden("method not allowed");
            return FilterOutcome::Responded;
        };
        if !self.options.allow_methods.contains(&method) {
            ctx.forbidden("method not allowed");
            return FilterOutcome::Responded;
        }

        if !self.options.allow_any_headers {
            if let Some(requested_headers) = ctx
                .request()
                .header(b"access-control-request-headers")
                .and_then(|value| std::str::from_utf8(value).ok())
            {
                for header in requested_headers.split(',').map(str::trim) {
                    if header.is_empty() {
                        continue;
                    }
                    let allowed = self
                        .options
                        .allow_headers
                        .iter()
                        .any(|candidate| candidate.eq_ignore_ascii_case(header));
                    if !allowed {
                        ctx.forbidden("header not allowed");
                        return FilterOutcome::Responded;
                    }
                }
            }
        }

        ctx.set_origin(verified_origin);
        ctx.response_with::<&str>(StatusCode::Ok, None, None, None, &[]);
        FilterOutcome::Responded
    }
}

impl Filter for CorsFilter {
    fn on_incoming_request(&self, ctx: &mut Context) -> FilterOutcome {
        let origin = ctx
            .request()
            .header(b"origin")
            .and_then(|value| std::str::from_utf8(value).ok())
            .map(str::to_owned);

        let Some(origin) = origin else {
            if ctx.method() == Method::Options {
                ctx.response_with::<&str>(StatusCode::Ok, None, None, None, &[("allow", "*")]);
                return FilterOutcome::Responded;
            }
            return FilterOutcome::Passed;
        };

        if ctx.method() == Method::Options
            && ctx
                .request()
                .header(b"access-control-request-method")
                .is_some()
        {
            return self.handle_preflight(ctx, &origin);
        }

        match self.verify_origin(&origin) {
            Some(verified) => {
                ctx.set_origin(verified);
                FilterOutcome::Passed
            }
            None => {
                ctx.forbidden("origin not allowed");
                FilterOutcome::Responded
            }
        }
    }

    fn on_outgoing_response(&self, ctx: &mut Context) {
        let Some(origin) = ctx.origin().map(str::to_owned) else {
            return;
        };

        let allow_origin = if self.options.allow_any_origins {
            "*".to_owned()
        } else {
            origin
        };
        ctx.add_header("access-control-allow-origin", allow_origin);

        if !self.options.allow_methods.is_empty() {
            let methods = self
                .options
                .allow_methods
                .iter()
                .map(Method::as_str)
                .collect::<Vec<_>>()
                .join(",");
            ctx.add_header("access-control-allow-methods", methods);
        }

        if self.options.allow_any_headers {
            ctx.add_header("access-control-allow-headers", "*");
        } else if !self.options.allow_headers.is_empty() {
            ctx.add_header("access-control-allow-headers", self.options.allow_headers.join(","));
        }

        if !self.options.expose_headers.is_empty() {
            ctx.add_header("access-control-expose-headers", self.options.expose_headers.join(","));
        }

        if self.options.max_age > 0 {
            ctx.add_header("access-control-max-age", self.options.max_age.to_string());
        }

        if self.options.allow_credentials {
            ctx.add_header("access-control-allow-credentials", "true");
        }
    }
}

fn parse_method(name: &str) -> Option<Method> {
    match name {
        "GET" => Some(Method::Get),
        "PUT" => Some(Method::Put),
        "POST" => Some(Method::Post),
        "HEAD" => Some(Method::Head),
        "PATCH" => Some(Method::Patch),
        "DELETE" => Some(Method::Delete),
        "OPTIONS" => Some(Method::Options),
        _ => None,
    }
}

/// Lower-cases scheme and host, strips a default port (`80` for `http`,
/// `443` for `https`) so `http://example.com` and `http://example.com:80`
/// compare equal.
fn normalize_origin(origin: &str) -> String {
    let lower = origin.to_ascii_lowercase();

    for (scheme, default_port) in [("http://", ":80"), ("https://", ":443")] {
        if let Some(rest) = lower.strip_prefix(scheme) {
            let trimmed = rest.strip_suffix(default_port).unwrap_or(rest);
            return format!("{scheme}{trimmed}");
        }
    }

    lower
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_scheme_and_default_port() {
        assert_eq!(normalize_origin("HTTP://Example.COM:80"), "http://example.com");
        assert_eq!(normalize_origin("https://example.com:443"), "https://example.com");
        assert_eq!(normalize_origin("https://example.com:8443"), "https://example.com:8443");
    }

    #[test]
    fn verify_origin_matches_after_normalization() {
        let filter = CorsFilter::new(CorsOptions {
            allow_origins: vec!["http://example.com".to_owned()],
            ..Default::default()
        });

        assert_eq!(
            filter.verify_origin("http://example.com:80"),
            Some("http://example.com".to_owned())
        );
        assert_eq!(filter.verify_origin("http://evil.com"), None);
    }

    #[test]
    fn allow_any_origins_reflects_whatever_was_sent() {
        let filter = CorsFilter::new(CorsOptions {
            allow_any_origins: true,
            ..Default::default()
        });

        assert_eq!(
            filter.verify_origin("http://anything.example"),
            Some("http://anything.example".to_owned())
        );
    }
}
