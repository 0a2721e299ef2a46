/**
 * Request model — what callers hand to the dispatcher.
 *
 * - `types` — methods, the immutable `TransferSpec`, results, callbacks
 * - `builder` — the fluent `RequestBuilder` and built `Request`
 */

pub mod builder;
pub mod types;

pub use builder::{Request, RequestBuilder};
pub use types::{CompletionFn, Method, TransferResult, TransferSpec, TransportError};
