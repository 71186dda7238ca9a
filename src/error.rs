use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::fetch::SourceError;

/// Failures a request can end in. The payload is internal detail for logs;
/// clients only ever see [`ImageError::public_message`].
#[derive(Error, Debug, Clone)]
pub enum ImageError {
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error("malformed query: {0}")]
    InvalidQuery(String),
    #[error("invalid width: {0}")]
    InvalidWidth(String),
    #[error("invalid quality: {0}")]
    InvalidQuality(String),
    #[error("width {0} exceeds the configured maximum")]
    WidthTooLarge(u32),
    #[error("not acceptable: {0}")]
    NotAcceptable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("unreadable source: {0}")]
    Unreadable(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("resize error: {0}")]
    Resize(String),
    #[error("encode error: {0}")]
    Encode(String),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, ImageError>;

impl ImageError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidPath(_)
            | Self::InvalidQuery(_)
            | Self::InvalidWidth(_)
            | Self::InvalidQuality(_)
            | Self::WidthTooLarge(_)
            | Self::NotAcceptable(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Unreadable(_)
            | Self::Decode(_)
            | Self::Resize(_)
            | Self::Encode(_)
            | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidPath(_) => "Path must comply to the format `/{bucket}/{path...}`",
            Self::InvalidQuery(_) => "Query string is malformed",
            Self::InvalidWidth(_) => "Query param `w` (width: optional) must be an integer",
            Self::InvalidQuality(_) => {
                "Query param `q` (quality: optional) must be an integer between 1 and 100"
            }
            Self::WidthTooLarge(_) => "Query param `w` (width: optional) exceeds the maximum width",
            Self::NotAcceptable(_) => "Cannot accept any type provided by the header `Accept`",
            Self::NotFound(_) => "File cannot be found on the bucket",
            Self::Unreadable(_) => "Cannot read the source object",
            Self::Decode(_) => "Cannot read the image",
            Self::Resize(_) => "Cannot resize the image",
            Self::Encode(_) => "Cannot export the image",
            Self::Internal(_) => "Internal server error",
        }
    }
}

impl From<SourceError> for ImageError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound(_) => ImageError::NotFound(err.to_string()),
            SourceError::Unreadable(_) | SourceError::TooLarge(_) => {
                ImageError::Unreadable(err.to_string())
            }
        }
    }
}

impl IntoResponse for ImageError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }
        let mut response = (status, self.public_message()).into_response();
        response.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }
}
