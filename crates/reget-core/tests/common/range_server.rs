//! Minimal HTTP/1.1 server for integration tests.
//!
//! Serves one static body with a strong ETag. Honors `Range: bytes=a-b` and
//! `If-Match`, and can misbehave on the first GET (cut the body short, answer
//! with a status, or change the ETag afterwards) to exercise resume paths.
//! `/moved` answers a cacheable bodiless 301 and `/missing` a text 404.

use std::io::{Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

#[derive(Debug, Clone, Copy)]
pub struct RangeServerOptions {
    /// Strong validator sent with every body response.
    pub etag: &'static str,
    /// Validator used after the first GET, simulating a changed resource.
    pub etag_after_first: Option<&'static str>,
    /// Close the first GET after this many body bytes (full Content-Length is still declared).
    pub cut_first_after: Option<usize>,
    /// Answer the first GET with this status (and `Retry-After: 0`) instead of the body.
    pub first_status: Option<u16>,
}

impl Default for RangeServerOptions {
    fn default() -> Self {
        Self {
            etag: "\"v1\"",
            etag_after_first: None,
            cut_first_after: None,
            first_status: None,
        }
    }
}

/// Running server: base URL plus the raw request heads it has seen.
#[derive(Clone)]
pub struct RangeServer {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl RangeServer {
    pub fn hits(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    /// Value of `name` in the `i`th request, if sent.
    pub fn request_header(&self, i: usize, name: &str) -> Option<String> {
        let requests = self.requests.lock().unwrap();
        requests[i].lines().skip(1).find_map(|line| {
            let (k, v) = line.split_once(':')?;
            k.trim()
                .eq_ignore_ascii_case(name)
                .then(|| v.trim().to_string())
        })
    }
}

/// Starts a server in a background thread serving `body`. The server runs
/// until the process exits.
pub fn start(body: Vec<u8>) -> RangeServer {
    start_with_options(body, RangeServerOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: RangeServerOptions) -> RangeServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let requests = Arc::new(Mutex::new(Vec::new()));
    let gets = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&requests);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let body = Arc::clone(&body);
            let seen = Arc::clone(&seen);
            let gets = Arc::clone(&gets);
            thread::spawn(move || handle(stream, &body, opts, &seen, &gets));
        }
    });
    RangeServer {
        url: format!("http://127.0.0.1:{}", port),
        requests,
    }
}

fn handle(
    mut stream: TcpStream,
    body: &[u8],
    opts: RangeServerOptions,
    seen: &Mutex<Vec<String>>,
    gets: &AtomicUsize,
) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) => return,
        Ok(n) => n,
        Err(_) => return,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s.to_string(),
        Err(_) => return,
    };
    seen.lock().unwrap().push(request.clone());
    let req = parse_request(&request);

    match req.path {
        "/moved" => {
            let _ = stream.write_all(
                b"HTTP/1.1 301 Moved Permanently\r\n\
                  Location: /file\r\n\
                  Cache-Control: public, max-age=60\r\n\
                  Content-Length: 0\r\n\r\n",
            );
            return;
        }
        "/missing" => {
            let _ = stream.write_all(
                b"HTTP/1.1 404 Not Found\r\n\
                  Content-Type: text/plain\r\n\
                  Content-Length: 9\r\n\r\nnot found",
            );
            return;
        }
        _ => {}
    }
    if !req.method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 0\r\n\r\n");
        return;
    }

    let nth = gets.fetch_add(1, Ordering::SeqCst);
    if nth == 0 {
        if let Some(code) = opts.first_status {
            let head = format!(
                "HTTP/1.1 {} Busy\r\nRetry-After: 0\r\nContent-Length: 0\r\n\r\n",
                code
            );
            let _ = stream.write_all(head.as_bytes());
            return;
        }
    }
    let etag = match opts.etag_after_first {
        Some(changed) if nth > 0 => changed,
        _ => opts.etag,
    };

    if let Some(want) = req.if_match {
        if want != etag {
            let _ = stream.write_all(
                b"HTTP/1.1 412 Precondition Failed\r\nContent-Length: 0\r\n\r\n",
            );
            return;
        }
    }

    let total = body.len() as u64;
    let (status, content_range, slice) = match req.range {
        Some((start, end_incl)) => {
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start > end_incl {
                let _ = stream.write_all(
                    format!(
                        "HTTP/1.1 416 Range Not Satisfiable\r\nContent-Range: bytes */{}\r\nContent-Length: 0\r\n\r\n",
                        total
                    )
                    .as_bytes(),
                );
                return;
            }
            let slice = &body[start as usize..=end_incl as usize];
            (
                "206 Partial Content",
                Some(format!("bytes {}-{}/{}", start, end_incl, total)),
                slice,
            )
        }
        None => ("200 OK", None, body),
    };

    let mut head = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nETag: {}\r\nAccept-Ranges: bytes\r\n",
        status,
        slice.len(),
        etag
    );
    if let Some(cr) = content_range {
        head.push_str(&format!("Content-Range: {}\r\n", cr));
    }
    head.push_str("\r\n");
    let _ = stream.write_all(head.as_bytes());

    match opts.cut_first_after {
        Some(cut) if nth == 0 && cut < slice.len() => {
            let _ = stream.write_all(&slice[..cut]);
            let _ = stream.flush();
            let _ = stream.shutdown(Shutdown::Both);
        }
        _ => {
            let _ = stream.write_all(slice);
        }
    }
}

struct ParsedRequest<'a> {
    method: &'a str,
    path: &'a str,
    /// `(start, end_inclusive)`; open-ended ranges use `u64::MAX`.
    range: Option<(u64, u64)>,
    if_match: Option<&'a str>,
}

fn parse_request(request: &str) -> ParsedRequest<'_> {
    let mut lines = request.lines();
    let mut first = lines.next().unwrap_or("").split_whitespace();
    let method = first.next().unwrap_or("");
    let path = first.next().unwrap_or("/");
    let mut range = None;
    let mut if_match = None;
    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.trim().eq_ignore_ascii_case("if-match") {
            if_match = Some(value);
        }
        if name.trim().eq_ignore_ascii_case("range") && value.to_lowercase().starts_with("bytes=") {
            if let Some((a, b)) = value[6..].trim().split_once('-') {
                let start = a.trim().parse::<u64>().unwrap_or(0);
                let end_incl = match b.trim() {
                    "" => u64::MAX,
                    end => end.parse::<u64>().unwrap_or(0),
                };
                range = Some((start, end_incl));
            }
        }
    }
    ParsedRequest {
        method,
        path,
        range,
        if_match,
    }
}
