//! reget core: a resuming, caching HTTP client layer.
//!
//! Requests flow through the [`dispatch::Dispatch`] contract. The
//! [`resume::RetryDispatcher`] retries failures and splices interrupted bodies
//! back together with conditional range requests; the
//! [`cache::CacheDispatcher`] answers repeat requests from a persistent store.
//! [`transport::CurlTransport`] sends the actual requests.

pub mod config;
pub mod logging;

pub mod cache;
pub mod clock;
pub mod dispatch;
pub mod error;
pub mod range;
pub mod response;
pub mod resume;
pub mod retry;
pub mod transport;
