use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

pub type AppResult<T> = Result<T, Error>;

/// errors that end up as the client's response
#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Forbidden(String),

    #[error("method {0} is not proxied")]
    MethodNotAllowed(String),

    #[error("Error connecting to IPTV provider: {0}")]
    BadGateway(String),

    #[error("{0}")]
    InternalServerErrorWithContext(String),
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::InternalServerErrorWithContext(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("responding {}: {}", status, self);
        }
        // plain text on purpose, set top boxes just show whatever they get
        (status, self.to_string()).into_response()
    }
}

/// the forward call itself couldn't complete, the only error that kills a request
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("{0}")]
    ConnectFailure(String),
}

impl From<UpstreamError> for Error {
    fn from(err: UpstreamError) -> Self {
        match err {
            UpstreamError::ConnectFailure(reason) => Error::BadGateway(reason),
        }
    }
}

/// why a single temp link couldn't be resolved. Clone because every caller waiting on the same
/// in-flight resolution gets its own copy of the outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("portal request failed: {0}")]
    Network(String),

    #[error("portal answered with status {0}")]
    Status(u16),

    #[error("portal answer is not a link response: {0}")]
    Malformed(String),

    #[error("portal answer has no usable link")]
    MissingLink,

    #[error("portal refused the link request")]
    Unauthorized,

    #[error("no channel id in {0}")]
    NoChannelId(String),
}
