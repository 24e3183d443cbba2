//! Application boundary: collect a dispatched response into memory.

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};

use crate::dispatch::{AbortHandle, Dispatch, FlowHandle, RequestOptions, ResponseHandler};
use crate::error::{HttpError, StatusError};

/// A complete response.
#[derive(Debug, Clone)]
pub struct Response {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl Response {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

#[derive(Default)]
struct Collector {
    head: Option<(StatusCode, HeaderMap)>,
    body: BytesMut,
    result: Option<Result<(), HttpError>>,
}

impl ResponseHandler for Collector {
    fn on_connect(&mut self, _abort: AbortHandle) {}

    fn on_upgrade(&mut self, status: StatusCode, headers: &HeaderMap) {
        self.head = Some((status, headers.clone()));
        self.result = Some(Ok(()));
    }

    fn on_headers(&mut self, status: StatusCode, headers: &HeaderMap, _flow: &FlowHandle) {
        self.head = Some((status, headers.clone()));
    }

    fn on_data(&mut self, chunk: Bytes) -> bool {
        self.body.extend_from_slice(&chunk);
        true
    }

    fn on_complete(&mut self, _trailers: &HeaderMap) {
        self.result.get_or_insert(Ok(()));
    }

    fn on_error(&mut self, err: HttpError) {
        self.result.get_or_insert(Err(err));
    }
}

/// Dispatch `request` and buffer the whole response. Statuses >= 400 come
/// back as [`StatusError`] with the body decoded when it is JSON or text.
pub async fn fetch<D: Dispatch + ?Sized>(
    dispatcher: &D,
    request: RequestOptions,
) -> Result<Response, HttpError> {
    let mut collector = Collector::default();
    dispatcher.dispatch(request, &mut collector).await;

    collector.result.unwrap_or(Err(HttpError::Cancelled))?;
    let (status, headers) = collector.head.ok_or(HttpError::Cancelled)?;
    let body = collector.body.freeze();

    if status.as_u16() >= 400 {
        return Err(StatusError::new(status, headers).with_body(&body).into());
    }
    Ok(Response {
        status,
        headers,
        body,
    })
}
