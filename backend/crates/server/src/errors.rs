use axum::Json;
use axum::extract::multipart::MultipartError;
use axum::extract::rejection::BytesRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use readinglife_core::database::types::StoreError;
use readinglife_core::image_store::errors::ImageStoreError;
use serde::Serialize;

/// Every way a request can fail, together with the status code and message the client sees.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// No post carries the requested name
    #[error("Book not found")]
    BookNotFound,
    /// `POST /create` arrived without an `img` file part
    #[error("Image file is required")]
    MissingImage,
    /// The multipart body could not be read
    #[error("{}", .0.body_text())]
    Multipart(#[from] MultipartError),
    /// The request body could not be read, e.g. because it exceeds the body limit
    #[error("{}", .0.body_text())]
    Body(#[from] BytesRejection),
    /// A body declared as JSON did not parse into the expected shape
    #[error("Invalid JSON body")]
    Json(#[source] serde_json::Error),
    #[error("Failed to save image file")]
    ImageUpload(#[source] ImageStoreError),
    /// The image being replaced by an update could not be removed; the update was not applied
    #[error("Failed to delete old image file")]
    OldImageDeletion(#[source] ImageStoreError),
    /// The image of a post being deleted could not be removed; the post was kept
    #[error("Failed to delete image file")]
    ImageDeletion(#[source] ImageStoreError),
    #[error("Stored comments are malformed")]
    MalformedComments(#[source] StoreError),
    /// Any other failure of the record store
    #[error("Internal Server Error")]
    Store(#[source] StoreError),
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::MalformedComment { .. } => Self::MalformedComments(error),
            _ => Self::Store(error),
        }
    }
}

impl ApiError {
    #[must_use]
    #[inline]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::BookNotFound => StatusCode::NOT_FOUND,
            Self::MissingImage => StatusCode::BAD_REQUEST,
            Self::Multipart(error) => error.status(),
            Self::Body(error) => error.status(),
            Self::Json(_) => StatusCode::BAD_REQUEST,
            Self::ImageUpload(_)
            | Self::OldImageDeletion(_)
            | Self::ImageDeletion(_)
            | Self::MalformedComments(_)
            | Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// JSON body of every error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            match std::error::Error::source(&self) {
                Some(source) => tracing::error!(%status, error = %self, %source, "request failed"),
                None => tracing::error!(%status, error = %self, "request failed"),
            }
        } else {
            tracing::debug!(%status, error = %self, "request rejected");
        }

        let body = Json(ErrorBody {
            error: self.to_string(),
        });
        (status, body).into_response()
    }
}
