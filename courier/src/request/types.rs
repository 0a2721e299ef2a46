/**
 * Core request and response types shared by the builder, the dispatcher,
 * and the transfer engines.
 *
 * A `TransferSpec` is the immutable, fully built description of one HTTP
 * exchange. It is what the dispatcher hands to the engine; the completion
 * callback never travels with it, because callbacks are dispatcher state.
 *
 * A `TransferResult` is what a completion callback receives: the HTTP
 * status if a response arrived, a `TransportError` if the exchange failed
 * below the HTTP layer, and the received body bytes.
 */
use std::time::Duration;

use serde::de::DeserializeOwned;
use thiserror::Error;

// ---------------------------------------------------------------------------
// Method
// ---------------------------------------------------------------------------

/**
 * The HTTP request methods the dispatcher knows how to label.
 *
 * The engine receives the method as part of the `TransferSpec` and maps it
 * onto whatever its underlying HTTP client expects.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
    Patch,
    Options,
}

impl Method {
    /// The canonical wire spelling, e.g. `"GET"`.
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
            Method::Patch => "PATCH",
            Method::Options => "OPTIONS",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// TransferSpec — the built, immutable request configuration
// ---------------------------------------------------------------------------

/**
 * Everything the engine needs to perform one exchange.
 *
 * Built once by the `RequestBuilder` and immutable from submission on.
 * Headers keep insertion order; the dispatcher never inspects them.
 */
#[derive(Debug, Clone)]
pub struct TransferSpec {
    pub method: Method,

    /// Target URL. The only field the facade validates: an empty target is
    /// rejected synchronously at submit time.
    pub url: String,

    /// `(name, value)` pairs in insertion order.
    pub headers: Vec<(String, String)>,

    /// Outgoing body, if any. `None` means "no body", not "empty body".
    pub body: Option<Vec<u8>>,

    /// Per-request overall deadline. `None` falls back to the engine's
    /// configured default.
    pub timeout: Option<Duration>,
}

impl TransferSpec {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            timeout: None,
        }
    }
}

// ---------------------------------------------------------------------------
// TransportError
// ---------------------------------------------------------------------------

/**
 * A below-HTTP failure for a single transfer: connect failure, timeout,
 * TLS problem, aborted body read.
 *
 * Never raised as an `Err` to the submitter. It travels inside the
 * `TransferResult` delivered to the completion callback, which is the only
 * channel per-transfer failures use. The numeric error-code space belongs
 * to whichever engine performed the exchange, so the dispatcher carries an
 * opaque message.
 */
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transfer failed: {0}")]
pub struct TransportError(pub String);

// ---------------------------------------------------------------------------
// TransferResult — what a completion callback receives
// ---------------------------------------------------------------------------

/**
 * The outcome of one transfer, delivered exactly once to the request's
 * completion callback on the worker thread.
 *
 * Non-2xx statuses are results, not errors: `status` is `Some(..)` whenever
 * a response line arrived, and `error` is `Some(..)` only when the exchange
 * failed below the HTTP layer.
 */
#[derive(Debug, Clone)]
pub struct TransferResult {
    /// HTTP status code, if a response arrived.
    pub status: Option<u16>,

    /// Transport-level failure, if the exchange never produced a response.
    pub error: Option<TransportError>,

    /// Received body bytes. Empty on failure or bodiless responses.
    pub body: Vec<u8>,
}

impl TransferResult {
    /// A completed exchange: a response arrived with `status` and `body`.
    pub fn success(status: u16, body: Vec<u8>) -> Self {
        Self {
            status: Some(status),
            error: None,
            body,
        }
    }

    /// A failed exchange: no usable response, only a transport error.
    pub fn failure(error: TransportError) -> Self {
        Self {
            status: None,
            error: Some(error),
            body: Vec::new(),
        }
    }

    /**
     * `true` when the exchange completed without a transport error and the
     * server answered with a 2xx status.
     */
    pub fn is_success(&self) -> bool {
        self.error.is_none() && matches!(self.status, Some(code) if (200..300).contains(&code))
    }

    /// The body as text, with invalid UTF-8 replaced.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Deserializes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

// ---------------------------------------------------------------------------
// CompletionFn
// ---------------------------------------------------------------------------

/**
 * A completion callback.
 *
 * `FnOnce` is deliberate: the "fires at most once" invariant is enforced by
 * the type system, not by a runtime flag. Callbacks run synchronously on
 * the worker thread, so they must be `Send` but never need `Sync`.
 */
pub type CompletionFn = Box<dyn FnOnce(TransferResult) + Send + 'static>;
