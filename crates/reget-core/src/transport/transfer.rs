//! One blocking libcurl transfer, reported as events over a channel.

use std::time::Duration;

use bytes::Bytes;
use curl::easy::{Easy, List};
use http::{HeaderMap, Method, StatusCode};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::parse::HeaderBlock;
use super::CurlOptions;
use crate::error::HttpError;
use crate::retry::{classify_curl_error, TransportError, TransportErrorKind};

/// What the blocking side reports while a transfer runs.
#[derive(Debug)]
pub(crate) enum Event {
    Headers(StatusCode, HeaderMap),
    Data(Bytes),
}

/// Everything a transfer needs, owned so it can move into `spawn_blocking`.
pub(crate) struct Transfer {
    pub url: String,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub options: CurlOptions,
}

fn curl_err(e: curl::Error) -> HttpError {
    HttpError::Transport(TransportError::new(classify_curl_error(&e), e.to_string()))
}

impl Transfer {
    /// Run to completion, sending events on `tx`. Returns once libcurl is done;
    /// cancelling `token` makes it stop at the next progress tick.
    pub(crate) fn run(
        self,
        token: &CancellationToken,
        tx: &mpsc::Sender<Event>,
    ) -> Result<(), HttpError> {
        let mut easy = Easy::new();
        easy.url(&self.url).map_err(curl_err)?;
        easy.follow_location(false).map_err(curl_err)?;
        easy.connect_timeout(self.options.connect_timeout)
            .map_err(curl_err)?;
        easy.low_speed_limit(self.options.low_speed_limit)
            .map_err(curl_err)?;
        easy.low_speed_time(self.options.low_speed_time)
            .map_err(curl_err)?;
        if let Some(t) = self.options.timeout {
            easy.timeout(t).map_err(curl_err)?;
        }
        easy.progress(true).map_err(curl_err)?;

        match self.method {
            Method::GET => easy.get(true).map_err(curl_err)?,
            Method::HEAD => easy.nobody(true).map_err(curl_err)?,
            _ => {}
        }

        let mut list = List::new();
        for (name, value) in &self.headers {
            let line = format!(
                "{}: {}",
                name.as_str(),
                String::from_utf8_lossy(value.as_bytes())
            );
            list.append(&line).map_err(curl_err)?;
        }
        let mut body = self.body.unwrap_or_default();
        if !body.is_empty() || self.method == Method::POST || self.method == Method::PUT {
            easy.upload(true).map_err(curl_err)?;
            easy.in_filesize(body.len() as u64).map_err(curl_err)?;
            // libcurl otherwise waits for `100 Continue` before sending.
            list.append("Expect:").map_err(curl_err)?;
        }
        if self.method != Method::GET && self.method != Method::HEAD {
            // `upload` implies PUT.
            easy.custom_request(self.method.as_str()).map_err(curl_err)?;
        }
        easy.http_headers(list).map_err(curl_err)?;

        let mut block = HeaderBlock::default();
        let mut saw_headers = false;
        let result = {
            let mut transfer = easy.transfer();
            transfer
                .header_function(|line| {
                    if let Some((status, headers)) = block.push_line(line) {
                        saw_headers = true;
                        if tx.blocking_send(Event::Headers(status, headers)).is_err() {
                            return false;
                        }
                    }
                    true
                })
                .map_err(curl_err)?;
            transfer
                .write_function(|data| {
                    if token.is_cancelled() {
                        return Ok(0);
                    }
                    match tx.blocking_send(Event::Data(Bytes::copy_from_slice(data))) {
                        Ok(()) => Ok(data.len()),
                        // Receiver gone: the caller stopped listening.
                        Err(_) => Ok(0),
                    }
                })
                .map_err(curl_err)?;
            transfer
                .read_function(|buf| {
                    let n = buf.len().min(body.len());
                    buf[..n].copy_from_slice(&body.split_to(n));
                    Ok(n)
                })
                .map_err(curl_err)?;
            transfer
                .progress_function(|_, _, _, _| !token.is_cancelled())
                .map_err(curl_err)?;
            transfer.perform()
        };

        match result {
            Ok(()) if saw_headers => Ok(()),
            Ok(()) => Err(HttpError::Transport(TransportError::new(
                TransportErrorKind::SocketClosed,
                "response ended without headers",
            ))),
            Err(e) if token.is_cancelled() => {
                tracing::debug!("transfer of {} stopped: {}", self.url, e);
                Err(HttpError::Cancelled)
            }
            Err(e) => Err(curl_err(e)),
        }
    }
}

/// Connect within 30s; give up when throughput stays under 1 KiB/s for 60s.
impl Default for CurlOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
            timeout: None,
        }
    }
}
