//! Scripted in-process dispatcher and recording handler for tests.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode};

use super::{AbortHandle, Dispatch, FlowHandle, RequestOptions, ResponseHandler};
use crate::error::HttpError;
use crate::retry::{TransportError, TransportErrorKind};

/// One scripted response.
#[derive(Debug, Clone)]
pub(crate) struct Script {
    /// Fail before headers with this error.
    pub connect_error: Option<HttpError>,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub chunks: Vec<Bytes>,
    /// Terminal error after the chunks; `None` completes normally.
    pub end_error: Option<HttpError>,
    /// Answer with `on_upgrade` instead of headers and body.
    pub upgrade: bool,
}

impl Script {
    pub fn ok(status: u16, headers: &[(&str, &str)], chunks: &[&[u8]]) -> Self {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.append(
                http::header::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        Self {
            connect_error: None,
            status: StatusCode::from_u16(status).unwrap(),
            headers: map,
            chunks: chunks.iter().map(|c| Bytes::copy_from_slice(c)).collect(),
            end_error: None,
            upgrade: false,
        }
    }

    pub fn upgrade(headers: &[(&str, &str)]) -> Self {
        let mut s = Self::ok(101, headers, &[]);
        s.upgrade = true;
        s
    }

    pub fn then_fail(mut self, err: HttpError) -> Self {
        self.end_error = Some(err);
        self
    }

    pub fn refused() -> Self {
        let mut s = Self::ok(200, &[], &[]);
        s.connect_error = Some(reset(TransportErrorKind::ConnectionRefused));
        s
    }
}

pub(crate) fn reset(kind: TransportErrorKind) -> HttpError {
    HttpError::Transport(TransportError::new(kind, "scripted"))
}

/// Plays back scripts in order, repeating the last one once exhausted.
#[derive(Clone, Default)]
pub(crate) struct MockDispatcher {
    scripts: Arc<Mutex<Vec<Script>>>,
    cursor: Arc<Mutex<usize>>,
    pub requests: Arc<Mutex<Vec<RequestOptions>>>,
}

impl MockDispatcher {
    pub fn new(scripts: Vec<Script>) -> Self {
        Self {
            scripts: Arc::new(Mutex::new(scripts)),
            ..Default::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn request(&self, i: usize) -> RequestOptions {
        self.requests.lock().unwrap()[i].clone()
    }

    fn next_script(&self) -> Script {
        let scripts = self.scripts.lock().unwrap();
        let mut cursor = self.cursor.lock().unwrap();
        let idx = (*cursor).min(scripts.len() - 1);
        *cursor += 1;
        scripts[idx].clone()
    }
}

#[async_trait]
impl Dispatch for MockDispatcher {
    async fn dispatch(&self, request: RequestOptions, handler: &mut dyn ResponseHandler) {
        let abort = AbortHandle::linked(request.signal.as_ref());
        if let Some(body) = &request.body {
            if body.take().is_none() {
                self.requests.lock().unwrap().push(request);
                handler.on_error(HttpError::BodyDisturbed);
                return;
            }
        }
        let flow = request.flow.clone();
        self.requests.lock().unwrap().push(request);
        let script = self.next_script();

        handler.on_connect(abort.clone());
        if let Some(err) = script.connect_error {
            handler.on_error(err);
            return;
        }
        if abort.is_aborted() {
            handler.on_error(abort.take_reason());
            return;
        }
        if script.upgrade {
            handler.on_upgrade(script.status, &script.headers);
            return;
        }
        handler.on_headers(script.status, &script.headers, &flow);
        for chunk in script.chunks {
            if abort.is_aborted() {
                handler.on_error(abort.take_reason());
                return;
            }
            flow.deliver(&mut *handler, chunk, &abort).await;
            tokio::task::yield_now().await;
        }
        if abort.is_aborted() {
            handler.on_error(abort.take_reason());
            return;
        }
        match script.end_error {
            Some(err) => handler.on_error(err),
            None => handler.on_complete(&HeaderMap::new()),
        }
    }
}

/// Records every callback for assertions.
#[derive(Debug, Default)]
pub(crate) struct Recorder {
    pub connects: usize,
    pub upgrades: usize,
    pub headers: Vec<(StatusCode, HeaderMap)>,
    pub body: Vec<u8>,
    pub completed: bool,
    pub error: Option<HttpError>,
    pub abort: Option<AbortHandle>,
    /// Abort with this reason once the body reaches the given length.
    pub abort_at: Option<(usize, HttpError)>,
}

impl ResponseHandler for Recorder {
    fn on_connect(&mut self, abort: AbortHandle) {
        self.connects += 1;
        self.abort = Some(abort);
    }

    fn on_upgrade(&mut self, _status: StatusCode, _headers: &HeaderMap) {
        self.upgrades += 1;
    }

    fn on_headers(&mut self, status: StatusCode, headers: &HeaderMap, _flow: &FlowHandle) {
        self.headers.push((status, headers.clone()));
    }

    fn on_data(&mut self, chunk: Bytes) -> bool {
        self.body.extend_from_slice(&chunk);
        let reached = matches!(&self.abort_at, Some((at, _)) if self.body.len() >= *at);
        if reached {
            if let (Some((_, reason)), Some(abort)) = (self.abort_at.take(), &self.abort) {
                abort.abort(reason);
            }
        }
        true
    }

    fn on_complete(&mut self, _trailers: &HeaderMap) {
        self.completed = true;
    }

    fn on_error(&mut self, err: HttpError) {
        self.error = Some(err);
    }
}
