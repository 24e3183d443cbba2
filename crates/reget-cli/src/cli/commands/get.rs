//! `reget get <url>` – fetch through retry/resume and the cache.

use anyhow::{Context, Result};
use http::header::{HeaderName, HeaderValue};
use http::Method;
use reget_core::cache::CacheDispatcher;
use reget_core::config::RegetConfig;
use reget_core::dispatch::RequestOptions;
use reget_core::response::{fetch, Response};
use reget_core::resume::RetryDispatcher;
use reget_core::transport::CurlTransport;
use std::io::Write;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use super::open_store;

/// Split `Name: value` into a typed header pair.
pub(crate) fn parse_header(raw: &str) -> Result<(HeaderName, HeaderValue)> {
    let (name, value) = raw
        .split_once(':')
        .with_context(|| format!("header {:?} is not `Name: value`", raw))?;
    let name = HeaderName::from_bytes(name.trim().as_bytes())
        .with_context(|| format!("invalid header name in {:?}", raw))?;
    let value = HeaderValue::from_str(value.trim())
        .with_context(|| format!("invalid header value in {:?}", raw))?;
    Ok((name, value))
}

pub async fn run_get(
    cfg: &RegetConfig,
    url: &str,
    method: &str,
    headers: &[String],
    output: Option<&Path>,
    no_cache: bool,
) -> Result<()> {
    let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
        .with_context(|| format!("invalid method {:?}", method))?;
    let mut request = RequestOptions::from_url(method, url)?;
    for raw in headers {
        let (name, value) = parse_header(raw)?;
        request.headers.append(name, value);
    }

    // Ctrl-C cancels the request, including any pending backoff.
    let signal = CancellationToken::new();
    request.signal = Some(signal.clone());
    let on_interrupt = signal.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let retrying = RetryDispatcher::new(CurlTransport::default(), cfg.retry.policy());
    let result = if cfg.cache.enabled && !no_cache {
        let store = open_store(&cfg.cache).await?;
        let stack = CacheDispatcher::new(retrying, store.clone());
        let result = fetch(&stack, request).await;
        store.close().await;
        result
    } else {
        fetch(&retrying, request).await
    };
    signal.cancel();

    let response = result.with_context(|| format!("request to {} failed", url))?;
    write_response(&response, output)
}

fn write_response(response: &Response, output: Option<&Path>) -> Result<()> {
    eprintln!("HTTP {}", response.status);
    if let Some(location) = response.headers.get(http::header::LOCATION) {
        eprintln!("Location: {}", String::from_utf8_lossy(location.as_bytes()));
    }
    match output {
        Some(path) => {
            std::fs::write(path, &response.body)
                .with_context(|| format!("writing {}", path.display()))?;
            eprintln!("wrote {} bytes to {}", response.body.len(), path.display());
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&response.body)?;
            stdout.flush()?;
        }
    }
    Ok(())
}
