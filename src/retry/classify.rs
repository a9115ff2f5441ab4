//! Failure classification for retry predicates.
//!
//! Errors expose a machine-readable [`ErrorKind`] through the [`Classify`]
//! trait, and the ready-made predicates switch on that kind. Message text is
//! never inspected.

use std::fmt;

/// Machine-readable category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The remote side did not answer in time.
    Timeout,
    /// The connection was refused.
    ConnectionRefused,
    /// The connection was reset by the peer.
    ConnectionReset,
    /// The connection was aborted locally.
    ConnectionAborted,
    /// No route to the remote host.
    NetworkUnreachable,
    /// The service is temporarily unavailable.
    Unavailable,
    /// A quota or rate limit was hit.
    ResourceExhausted,
    /// The backend reported an internal error.
    Internal,
    /// The operation was aborted, typically by a concurrency conflict.
    Aborted,
    /// The backend's own deadline expired.
    DeadlineExceeded,
    /// The caller lacks permission.
    PermissionDenied,
    /// The caller is not authenticated.
    Unauthenticated,
    /// The request was malformed.
    InvalidArgument,
    /// The requested entity does not exist.
    NotFound,
    /// The entity being created already exists.
    AlreadyExists,
    /// The system is not in a state required for the operation.
    FailedPrecondition,
    /// The operation was cancelled by the caller.
    Cancelled,
    /// Anything else.
    Unknown,
}

impl ErrorKind {
    /// Stable lowercase code, suitable for logs.
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::ConnectionRefused => "connection-refused",
            ErrorKind::ConnectionReset => "connection-reset",
            ErrorKind::ConnectionAborted => "connection-aborted",
            ErrorKind::NetworkUnreachable => "network-unreachable",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::ResourceExhausted => "resource-exhausted",
            ErrorKind::Internal => "internal",
            ErrorKind::Aborted => "aborted",
            ErrorKind::DeadlineExceeded => "deadline-exceeded",
            ErrorKind::PermissionDenied => "permission-denied",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::NotFound => "not-found",
            ErrorKind::AlreadyExists => "already-exists",
            ErrorKind::FailedPrecondition => "failed-precondition",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Transient condition on the network path: timeouts, unreachable or
    /// overloaded peers and internal server errors.
    pub fn is_transient_network(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout
                | ErrorKind::DeadlineExceeded
                | ErrorKind::ConnectionRefused
                | ErrorKind::ConnectionReset
                | ErrorKind::ConnectionAborted
                | ErrorKind::NetworkUnreachable
                | ErrorKind::Unavailable
                | ErrorKind::ResourceExhausted
                | ErrorKind::Internal
        )
    }

    /// Transient condition anywhere between the client and the backend.
    ///
    /// Everything the network set retries, plus transactions the backend
    /// aborted on contention.
    pub fn is_transient_backend(self) -> bool {
        self.is_transient_network() || self == ErrorKind::Aborted
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Errors that can report their [`ErrorKind`].
pub trait Classify {
    /// The category of this failure.
    fn error_kind(&self) -> ErrorKind;
}

impl<T: Classify + ?Sized> Classify for &T {
    fn error_kind(&self) -> ErrorKind {
        (**self).error_kind()
    }
}

impl Classify for std::io::Error {
    fn error_kind(&self) -> ErrorKind {
        use std::io::ErrorKind as Io;
        match self.kind() {
            Io::TimedOut | Io::WouldBlock => ErrorKind::Timeout,
            Io::ConnectionRefused => ErrorKind::ConnectionRefused,
            Io::ConnectionReset | Io::BrokenPipe | Io::UnexpectedEof => ErrorKind::ConnectionReset,
            Io::ConnectionAborted | Io::NotConnected => ErrorKind::ConnectionAborted,
            Io::AddrNotAvailable => ErrorKind::NetworkUnreachable,
            Io::Interrupted => ErrorKind::Aborted,
            Io::OutOfMemory => ErrorKind::ResourceExhausted,
            Io::PermissionDenied => ErrorKind::PermissionDenied,
            Io::InvalidInput | Io::InvalidData => ErrorKind::InvalidArgument,
            Io::NotFound => ErrorKind::NotFound,
            Io::AlreadyExists => ErrorKind::AlreadyExists,
            Io::Unsupported => ErrorKind::FailedPrecondition,
            _ => ErrorKind::Unknown,
        }
    }
}

/// A structured backend failure: a kind plus a human-readable message.
///
/// # Examples
///
/// ```rust
/// use holdfast::retry::{is_transient_backend_error, BackendError, ErrorKind};
///
/// let err = BackendError::new(ErrorKind::ResourceExhausted, "quota exceeded");
/// assert!(is_transient_backend_error(&err));
///
/// let err = BackendError::new(ErrorKind::PermissionDenied, "not a member");
/// assert!(!is_transient_backend_error(&err));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    /// Machine-readable category.
    pub kind: ErrorKind,
    /// Free-form detail for humans.
    pub message: String,
}

impl BackendError {
    /// Create a backend error.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for BackendError {}

impl Classify for BackendError {
    fn error_kind(&self) -> ErrorKind {
        self.kind
    }
}

/// Retry predicate accepting transient network conditions only.
pub fn is_transient_network_error<E: Classify + ?Sized>(error: &E) -> bool {
    error.error_kind().is_transient_network()
}

/// Retry predicate accepting transient network and backend conditions.
pub fn is_transient_backend_error<E: Classify + ?Sized>(error: &E) -> bool {
    error.error_kind().is_transient_backend()
}
