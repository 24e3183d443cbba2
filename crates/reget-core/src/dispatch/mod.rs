//! Response delivery: how a request is handed to a transport and how
//! the response comes back.
//!
//! A [`Dispatch`] implementation drives a [`ResponseHandler`] through
//! `on_connect`, optionally `on_upgrade`, then `on_headers`, zero or more
//! `on_data`, and exactly one terminal `on_complete` or `on_error`. The retry
//! and cache layers are decorators over this trait; they may substitute
//! headers, answer without calling through, or re-issue the inner call.
//!
//! A handler applies backpressure by returning `false` from `on_data` and
//! later calling [`FlowHandle::resume`] on the handle it got with the headers.

mod abort;
mod flow;
mod request;

#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};

use crate::error::HttpError;

pub use abort::AbortHandle;
pub use flow::FlowHandle;
pub use request::{OnceBody, RequestBody, RequestOptions, Retry};

/// Ordered response callbacks for a single dispatch.
pub trait ResponseHandler: Send {
    /// Called once the request is in flight; `abort` cancels it.
    fn on_connect(&mut self, abort: AbortHandle);

    /// Protocol upgrade (101). Terminal: no further callbacks follow.
    fn on_upgrade(&mut self, _status: StatusCode, _headers: &HeaderMap) {}

    /// Response head. `flow` resumes delivery after `on_data` returned false.
    fn on_headers(&mut self, status: StatusCode, headers: &HeaderMap, flow: &FlowHandle);

    /// Body chunk. Return `false` to pause until `flow.resume()` is called.
    fn on_data(&mut self, chunk: Bytes) -> bool;

    fn on_complete(&mut self, trailers: &HeaderMap);

    fn on_error(&mut self, err: HttpError);
}

/// Something that can send a request and deliver its response.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Dispatch `request`, returning once the terminal callback has run.
    async fn dispatch(&self, request: RequestOptions, handler: &mut dyn ResponseHandler);
}

#[async_trait]
impl<D: Dispatch + ?Sized> Dispatch for std::sync::Arc<D> {
    async fn dispatch(&self, request: RequestOptions, handler: &mut dyn ResponseHandler) {
        (**self).dispatch(request, handler).await
    }
}
