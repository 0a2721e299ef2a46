/**
 * Fluent request construction.
 *
 * A `RequestBuilder` accumulates the target, headers, body, timeout, and
 * completion callback, then either submits directly (when it was created
 * from a `Client`) or produces an immutable `Request` for the caller to
 * submit later. Once built, a request never changes again; `Client::submit`
 * consumes it by value, so resubmission is unrepresentable.
 */
use std::time::Duration;

use serde::Serialize;

use crate::client::{Client, SubmitError};
use crate::request::types::{CompletionFn, Method, TransferResult, TransferSpec};

/// `Content-Type` header attached by [`RequestBuilder::with_json`].
const CONTENT_TYPE_JSON: &str = "application/json; charset=utf-8";

// ---------------------------------------------------------------------------
// Request — the built, submittable unit
// ---------------------------------------------------------------------------

/**
 * A fully built request: the immutable transfer configuration plus the
 * completion callback that will fire exactly once on the worker thread.
 *
 * Produced by [`RequestBuilder::build`] and consumed by `Client::submit`.
 */
pub struct Request {
    pub(crate) spec: TransferSpec,
    pub(crate) callback: Option<CompletionFn>,
}

impl Request {
    /// The transfer configuration this request carries.
    pub fn spec(&self) -> &TransferSpec {
        &self.spec
    }
}

// ---------------------------------------------------------------------------
// RequestBuilder
// ---------------------------------------------------------------------------

/**
 * Chainable configuration for one HTTP exchange.
 *
 * Created from a client (`client.get(url)`, `client.request(method, url)`)
 * or detached (`RequestBuilder::new`). A detached builder can only
 * `build()`; calling `submit()` on it reports `SubmitError::Detached`.
 *
 * # Example
 * ```no_run
 * # let client = courier::Client::new();
 * client
 *     .get("https://example.com/status")
 *     .accept_json()
 *     .header("X-Client", "courier")
 *     .on_complete(|result| println!("HTTP {:?}", result.status))
 *     .submit()
 *     .unwrap();
 * ```
 */
pub struct RequestBuilder<'c> {
    client: Option<&'c Client>,
    spec: TransferSpec,
    callback: Option<CompletionFn>,
}

impl<'c> RequestBuilder<'c> {
    /// A builder not bound to any client. Finish with [`build`](Self::build).
    pub fn new(method: Method, url: impl Into<String>) -> RequestBuilder<'static> {
        RequestBuilder {
            client: None,
            spec: TransferSpec::new(method, url),
            callback: None,
        }
    }

    pub(crate) fn bound(client: &'c Client, method: Method, url: impl Into<String>) -> Self {
        Self {
            client: Some(client),
            spec: TransferSpec::new(method, url),
            callback: None,
        }
    }

    /// Appends one header. Headers keep insertion order.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.spec.headers.push((name.into(), value.into()));
        self
    }

    /// Declares the outgoing body as JSON.
    pub fn with_json(self) -> Self {
        self.header("Content-Type", CONTENT_TYPE_JSON)
    }

    /// Asks the server for a JSON response.
    pub fn accept_json(self) -> Self {
        self.header("Accept", "application/json")
    }

    /// Sets the raw outgoing body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.spec.body = Some(body.into());
        self
    }

    /**
     * Serializes `value` as the JSON body and sets the JSON content type
     * unless the caller already provided one.
     */
    pub fn json<T: Serialize>(mut self, value: &T) -> Result<Self, serde_json::Error> {
        self.spec.body = Some(serde_json::to_vec(value)?);
        let has_content_type = self
            .spec
            .headers
            .iter()
            .any(|(name, _)| name.eq_ignore_ascii_case("content-type"));
        if !has_content_type {
            self = self.with_json();
        }
        Ok(self)
    }

    /// Overall deadline for this request, overriding the engine default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.spec.timeout = Some(timeout);
        self
    }

    /**
     * Registers the completion callback.
     *
     * It fires exactly once, on the worker thread, with the transfer's
     * result. Requests without a callback are legal; their results are
     * simply discarded on completion.
     */
    pub fn on_complete(mut self, callback: impl FnOnce(TransferResult) + Send + 'static) -> Self {
        self.callback = Some(Box::new(callback));
        self
    }

    /// Freezes the builder into an immutable [`Request`].
    pub fn build(self) -> Request {
        Request {
            spec: self.spec,
            callback: self.callback,
        }
    }

    /**
     * Builds and submits in one step. Fire and forget: the call returns as
     * soon as the request is queued; the outcome arrives via the callback.
     */
    pub fn submit(self) -> Result<(), SubmitError> {
        match self.client {
            Some(client) => {
                let request = Request {
                    spec: self.spec,
                    callback: self.callback,
                };
                client.submit(request)
            }
            None => Err(SubmitError::Detached),
        }
    }
}
