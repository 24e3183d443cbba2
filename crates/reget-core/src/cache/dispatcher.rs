//! `Dispatch` decorator that answers from, and feeds, a [`CacheStore`].

use async_trait::async_trait;
use bytes::Bytes;
use http::header::CACHE_CONTROL;
use http::{HeaderMap, Method, StatusCode};

use super::db::CacheStore;
use super::types::{CacheEntry, CacheKey};
use crate::dispatch::{AbortHandle, Dispatch, FlowHandle, RequestOptions, ResponseHandler};
use crate::error::HttpError;

/// Serves GET/HEAD requests from the store when a live, matching entry
/// exists; otherwise calls through and offers the response for admission.
pub struct CacheDispatcher<D> {
    inner: D,
    store: CacheStore,
}

impl<D> CacheDispatcher<D> {
    pub fn new(inner: D, store: CacheStore) -> Self {
        Self { inner, store }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }
}

/// GET/HEAD without `Cache-Control: no-store` on the request.
fn cacheable_request(req: &RequestOptions) -> bool {
    if req.method != Method::GET && req.method != Method::HEAD {
        return false;
    }
    !req.headers
        .get_all(CACHE_CONTROL)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .any(|d| d.trim().eq_ignore_ascii_case("no-store"))
}

async fn serve(entry: CacheEntry, request: &RequestOptions, handler: &mut dyn ResponseHandler) {
    let abort = AbortHandle::linked(request.signal.as_ref());
    handler.on_connect(abort.clone());
    if abort.is_aborted() {
        handler.on_error(abort.take_reason());
        return;
    }
    let value = entry.value;
    handler.on_headers(value.status, &value.headers, &request.flow);
    if let Some(body) = value.body.filter(|b| !b.is_empty()) {
        if request.method != Method::HEAD {
            request.flow.deliver(&mut *handler, body, &abort).await;
        }
    }
    if abort.is_aborted() {
        handler.on_error(abort.take_reason());
        return;
    }
    handler.on_complete(&HeaderMap::new());
}

#[async_trait]
impl<D: Dispatch> Dispatch for CacheDispatcher<D> {
    async fn dispatch(&self, request: RequestOptions, handler: &mut dyn ResponseHandler) {
        if !cacheable_request(&request) {
            return self.inner.dispatch(request, handler).await;
        }

        let key = CacheKey::from_request(&request);
        match self.store.lookup(&key).await {
            Ok(Some(entry)) => return serve(entry, &request, handler).await,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!("cache lookup for {} failed: {}", key.url(), e);
                handler.on_connect(AbortHandle::linked(request.signal.as_ref()));
                handler.on_error(e.into());
                return;
            }
        }

        let (response, trailers) = {
            let mut admitting = AdmittingHandler {
                downstream: &mut *handler,
                response: None,
                saw_body: false,
                completed: None,
            };
            self.inner.dispatch(request, &mut admitting).await;
            let response = if admitting.saw_body {
                None
            } else {
                admitting.response.take()
            };
            (response, admitting.completed.take())
        };

        let Some(trailers) = trailers else { return };
        if let Some((status, headers)) = response {
            if let Err(e) = self.store.admit_and_store(&key, status, &headers).await {
                tracing::warn!("cache write for {} failed: {}", key.url(), e);
            }
        }
        handler.on_complete(&trailers);
    }
}

/// Forwards everything except `on_complete`, which is held until the
/// admission write has finished.
struct AdmittingHandler<'a> {
    downstream: &'a mut dyn ResponseHandler,
    response: Option<(StatusCode, HeaderMap)>,
    saw_body: bool,
    completed: Option<HeaderMap>,
}

impl ResponseHandler for AdmittingHandler<'_> {
    fn on_connect(&mut self, abort: AbortHandle) {
        self.downstream.on_connect(abort);
    }

    fn on_upgrade(&mut self, status: StatusCode, headers: &HeaderMap) {
        self.downstream.on_upgrade(status, headers);
    }

    fn on_headers(&mut self, status: StatusCode, headers: &HeaderMap, flow: &FlowHandle) {
        self.response = Some((status, headers.clone()));
        self.downstream.on_headers(status, headers, flow);
    }

    fn on_data(&mut self, chunk: Bytes) -> bool {
        if !chunk.is_empty() {
            self.saw_body = true;
        }
        self.downstream.on_data(chunk)
    }

    fn on_complete(&mut self, trailers: &HeaderMap) {
        self.completed = Some(trailers.clone());
    }

    fn on_error(&mut self, err: HttpError) {
        self.downstream.on_error(err);
    }
}
