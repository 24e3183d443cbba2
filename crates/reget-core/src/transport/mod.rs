//! libcurl-backed [`Dispatch`] implementation.
//!
//! Each dispatch runs one `curl::easy::Easy` transfer on the blocking pool and
//! streams its headers and body back over a bounded channel. While the handler
//! has paused delivery the channel fills and libcurl stops reading; a pause
//! longer than the low-speed window fails the transfer like a stall.
//! Redirects are not followed.

mod parse;
mod transfer;

use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, StatusCode};
use tokio::sync::mpsc;

use crate::dispatch::{AbortHandle, Dispatch, RequestOptions, ResponseHandler};
use crate::error::HttpError;
use crate::retry::{TransportError, TransportErrorKind};
use transfer::{Event, Transfer};

/// Body chunks buffered between libcurl and the handler.
const CHANNEL_DEPTH: usize = 16;

/// Timeouts applied to every transfer.
#[derive(Debug, Clone, Copy)]
pub struct CurlOptions {
    pub connect_timeout: Duration,
    /// Bytes per second below which a transfer counts as stalled.
    pub low_speed_limit: u32,
    /// How long a transfer may stay stalled before it fails.
    pub low_speed_time: Duration,
    /// Hard wall-clock limit; None means unlimited.
    pub timeout: Option<Duration>,
}

/// Sends requests with libcurl.
#[derive(Debug, Clone, Default)]
pub struct CurlTransport {
    options: CurlOptions,
}

impl CurlTransport {
    pub fn new(options: CurlOptions) -> Self {
        Self { options }
    }
}

#[async_trait]
impl Dispatch for CurlTransport {
    async fn dispatch(&self, request: RequestOptions, handler: &mut dyn ResponseHandler) {
        let abort = AbortHandle::linked(request.signal.as_ref());
        handler.on_connect(abort.clone());
        if abort.is_aborted() {
            handler.on_error(abort.take_reason());
            return;
        }

        let body = match &request.body {
            None => None,
            Some(b) => match b.take() {
                Some(bytes) => Some(bytes),
                None => {
                    handler.on_error(HttpError::BodyDisturbed);
                    return;
                }
            },
        };
        let url = request.url();
        tracing::debug!("{} {}", request.method, url);

        let job = Transfer {
            url,
            method: request.method.clone(),
            headers: request.headers.clone(),
            body,
            options: self.options,
        };
        let (tx, mut rx) = mpsc::channel(CHANNEL_DEPTH);
        let token = abort.token().clone();
        let task = tokio::task::spawn_blocking(move || job.run(&token, &tx));

        while let Some(event) = rx.recv().await {
            if abort.is_aborted() {
                break;
            }
            match event {
                Event::Headers(status, headers) if status == StatusCode::SWITCHING_PROTOCOLS => {
                    handler.on_upgrade(status, &headers);
                    abort.abort(HttpError::Cancelled);
                    let _ = task.await;
                    return;
                }
                Event::Headers(status, headers) => {
                    handler.on_headers(status, &headers, &request.flow)
                }
                Event::Data(chunk) => request.flow.deliver(&mut *handler, chunk, &abort).await,
            }
        }
        // Unblocks a sender parked on a full channel after an abort.
        drop(rx);

        let outcome = task.await;
        if abort.is_aborted() {
            handler.on_error(abort.take_reason());
            return;
        }
        match outcome {
            Ok(Ok(())) => handler.on_complete(&HeaderMap::new()),
            Ok(Err(e)) => handler.on_error(e),
            Err(join) => handler.on_error(HttpError::Transport(TransportError::new(
                TransportErrorKind::Other,
                format!("transfer task failed: {}", join),
            ))),
        }
    }
}
