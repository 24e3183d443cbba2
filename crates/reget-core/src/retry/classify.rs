//! Classify HTTP statuses, transport failures and curl errors into retry kinds.

use http::StatusCode;

use super::error::TransportErrorKind;
use super::policy::ErrorKind;
use crate::error::HttpError;

/// Classify an HTTP status code for retry decisions.
pub fn classify_status(status: StatusCode) -> ErrorKind {
    match status.as_u16() {
        420 | 429 | 502 | 503 | 504 => ErrorKind::Throttled,
        _ => ErrorKind::Other,
    }
}

/// Classify a transport failure for retry decisions.
pub fn classify_transport(kind: TransportErrorKind) -> ErrorKind {
    match kind {
        TransportErrorKind::ConnectionReset
        | TransportErrorKind::ConnectionRefused
        | TransportErrorKind::HostUnreachable
        | TransportErrorKind::NetworkDown
        | TransportErrorKind::NameResolution
        | TransportErrorKind::BrokenPipe
        | TransportErrorKind::SocketClosed => ErrorKind::Connection,
        TransportErrorKind::Timeout | TransportErrorKind::Other => ErrorKind::Other,
    }
}

/// Map a curl error onto a transport failure kind.
pub fn classify_curl_error(e: &curl::Error) -> TransportErrorKind {
    if e.is_operation_timedout() {
        return TransportErrorKind::Timeout;
    }
    if e.is_couldnt_resolve_host() || e.is_couldnt_resolve_proxy() {
        return TransportErrorKind::NameResolution;
    }
    if e.is_couldnt_connect() {
        return TransportErrorKind::ConnectionRefused;
    }
    if e.is_send_error() {
        return TransportErrorKind::BrokenPipe;
    }
    if e.is_recv_error() {
        return TransportErrorKind::ConnectionReset;
    }
    if e.is_got_nothing() || e.is_partial_file() {
        return TransportErrorKind::SocketClosed;
    }
    TransportErrorKind::Other
}

/// Classify a dispatch error into an ErrorKind.
pub fn classify(e: &HttpError) -> ErrorKind {
    match e {
        HttpError::Transport(t) => classify_transport(t.kind),
        HttpError::Status(s) => classify_status(s.status),
        HttpError::Cancelled | HttpError::BodyDisturbed | HttpError::Store(_) => {
            ErrorKind::Other
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(code: u16) -> StatusCode {
        StatusCode::from_u16(code).unwrap()
    }

    #[test]
    fn rate_and_availability_statuses_throttled() {
        for code in [420, 429, 502, 503, 504] {
            assert_eq!(classify_status(status(code)), ErrorKind::Throttled, "{}", code);
        }
    }

    #[test]
    fn other_statuses_not_retryable() {
        assert_eq!(classify_status(status(500)), ErrorKind::Other);
        assert_eq!(classify_status(status(404)), ErrorKind::Other);
        assert_eq!(classify_status(status(403)), ErrorKind::Other);
    }

    #[test]
    fn connection_class_transport_errors() {
        assert_eq!(
            classify_transport(TransportErrorKind::ConnectionReset),
            ErrorKind::Connection
        );
        assert_eq!(
            classify_transport(TransportErrorKind::NameResolution),
            ErrorKind::Connection
        );
        assert_eq!(
            classify_transport(TransportErrorKind::BrokenPipe),
            ErrorKind::Connection
        );
        assert_eq!(classify_transport(TransportErrorKind::Timeout), ErrorKind::Other);
    }

    #[test]
    fn cancellation_is_never_retryable() {
        assert_eq!(classify(&HttpError::Cancelled), ErrorKind::Other);
        assert_eq!(classify(&HttpError::BodyDisturbed), ErrorKind::Other);
    }
}
