//! Error taxonomy and classification.
//!
//! Every error that crosses a capability boundary is one of a small closed set
//! of [`ErrorKind`]s, or one of the two context-termination causes. Foreign
//! errors enter the taxonomy through [`classify`], which wraps them as
//! [`ErrorKind::Unexpected`] while keeping the original as the cause.
//!
//! Messages read outermost classification first:
//!
//! ```text
//! unexpected: connection reset by peer
//!     ^               ^
//!   kind       source of the problem
//! ```

use std::fmt;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::lifecycle::Context;

/// Boxed foreign error.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Status returned when the client closed the connection before a response
/// could be written. Non-standard; only the ingress sees it.
pub const STATUS_CLIENT_CLOSED_REQUEST: u16 = 499;

/// The closed set of domain error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The client asked to create a resource that already exists.
    AlreadyExists,
    /// The request cannot be understood or processed.
    BadRequest,
    /// The connection we are trying to use is closed.
    ConnectionClosed,
    /// The requested action is not allowed.
    NotAllowed,
    /// The requested resource does not exist.
    NotFound,
    /// The storage of the service is full.
    SpaceFull,
    /// An operation took longer than its time limit.
    TimeOut,
    /// Catch-all for conditions that should never happen.
    Unexpected,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 8] = [
        ErrorKind::AlreadyExists,
        ErrorKind::BadRequest,
        ErrorKind::ConnectionClosed,
        ErrorKind::NotAllowed,
        ErrorKind::NotFound,
        ErrorKind::SpaceFull,
        ErrorKind::TimeOut,
        ErrorKind::Unexpected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AlreadyExists => "already exists",
            ErrorKind::BadRequest => "bad request",
            ErrorKind::ConnectionClosed => "connection closed",
            ErrorKind::NotAllowed => "not allowed",
            ErrorKind::NotFound => "not found",
            ErrorKind::SpaceFull => "no space",
            ErrorKind::TimeOut => "time out",
            ErrorKind::Unexpected => "unexpected",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a [`Context`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, thiserror::Error)]
pub enum ContextError {
    #[error("context canceled")]
    Canceled,
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// Error surfaced by services and capabilities.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A classified domain error.
    #[error("{kind}{}", detail_suffix(.detail))]
    Kind {
        kind: ErrorKind,
        detail: Option<String>,
        #[source]
        source: Option<BoxError>,
    },

    /// The governing context was cancelled or ran past its deadline.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// A foreign error that has not been classified yet.
    #[error(transparent)]
    Other(BoxError),
}

fn detail_suffix(detail: &Option<String>) -> String {
    match detail {
        Some(detail) => format!(": {detail}"),
        None => String::new(),
    }
}

impl Error {
    /// A bare error of the given kind.
    pub fn new(kind: ErrorKind) -> Self {
        Error::Kind {
            kind,
            detail: None,
            source: None,
        }
    }

    /// An error of the given kind with an informational message.
    pub fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Error::Kind {
            kind,
            detail: Some(detail.into()),
            source: None,
        }
    }

    /// An error of the given kind caused by `source`.
    pub fn wrap<E>(kind: ErrorKind, detail: impl Into<String>, source: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Kind {
            kind,
            detail: Some(detail.into()),
            source: Some(source.into()),
        }
    }

    /// Carry a foreign error without classifying it.
    pub fn other<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Error::Other(err.into())
    }

    /// The classification of this error, if it has one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Kind { kind, .. } => Some(*kind),
            Error::Context(_) | Error::Other(_) => None,
        }
    }

    pub fn is(&self, kind: ErrorKind) -> bool {
        self.kind() == Some(kind)
    }

    /// The context-termination cause, when this error is one.
    pub fn context_error(&self) -> Option<ContextError> {
        match self {
            Error::Context(cause) => Some(*cause),
            Error::Other(err) => err.downcast_ref::<ContextError>().copied(),
            Error::Kind { .. } => None,
        }
    }
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error::new(kind)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Other(Box::new(err))
    }
}

/// Bring `err` into the taxonomy before it crosses a capability boundary.
///
/// Already-unexpected errors and context-termination errors are returned
/// unchanged, so classifying twice is the same as classifying once. Anything
/// else is logged and wrapped as [`ErrorKind::Unexpected`].
pub fn classify(ctx: &Context, err: Error) -> Error {
    if err.is(ErrorKind::Unexpected) {
        return err;
    }

    if let Some(cause) = err.context_error() {
        if ctx.err() == Some(cause) {
            tracing::info!(cause = %cause, "context was cancelled or timed out");
        } else {
            tracing::info!(cause = %cause, "foreign context was cancelled or timed out");
        }
        return err;
    }

    tracing::error!(error = %err, "unexpected error occurred");
    let detail = err.to_string();
    Error::Kind {
        kind: ErrorKind::Unexpected,
        detail: Some(detail),
        source: Some(Box::new(err)),
    }
}

/// [`classify`] for results.
pub trait ResultExt<T> {
    fn classify(self, ctx: &Context) -> Result<T, Error>;
}

impl<T, E> ResultExt<T> for Result<T, E>
where
    E: Into<Error>,
{
    fn classify(self, ctx: &Context) -> Result<T, Error> {
        self.map_err(|err| classify(ctx, err.into()))
    }
}

/// Map an error to the status code a client should see, logging the decision.
///
/// Context cancellation takes precedence over deadline expiry, which takes
/// precedence over the domain kinds. Everything unmapped is a 500.
pub fn status_for(err: &Error) -> StatusCode {
    match (err.context_error(), err.kind()) {
        (Some(ContextError::Canceled), _) => {
            tracing::info!(error = %err, "request interrupted due to ctx cancellation");
            client_closed_request()
        }
        (Some(ContextError::DeadlineExceeded), _) => {
            tracing::info!(error = %err, "request interrupted due to ctx timeout");
            StatusCode::SERVICE_UNAVAILABLE
        }
        (None, Some(ErrorKind::BadRequest | ErrorKind::SpaceFull)) => {
            tracing::info!(error = %err, "client made a bad request");
            StatusCode::BAD_REQUEST
        }
        (None, Some(ErrorKind::NotAllowed)) => {
            tracing::info!(error = %err, "client requested an action that is not allowed");
            StatusCode::FORBIDDEN
        }
        (None, Some(ErrorKind::NotFound)) => {
            tracing::info!(error = %err, "client requested a missing resource or action");
            StatusCode::NOT_FOUND
        }
        (None, Some(ErrorKind::AlreadyExists)) => {
            tracing::info!(
                error = %err,
                "client requested to create a resource that already exists"
            );
            StatusCode::CONFLICT
        }
        // TimeOut, ConnectionClosed, Unexpected and unclassified errors.
        _ => {
            tracing::error!(error = %err, "unexpected error while handling request");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn client_closed_request() -> StatusCode {
    StatusCode::from_u16(STATUS_CLIENT_CLOSED_REQUEST).unwrap_or(StatusCode::BAD_REQUEST)
}

/// Build the response for `err`: mapped status, error text as the body.
pub fn http_error(err: &Error) -> Response {
    (status_for(err), err.to_string()).into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        http_error(&self)
    }
}
