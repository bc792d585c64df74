//! Errors returned by the media server API.

use std::fmt;

use actix_web::HttpResponse;
use actix_web::http::StatusCode;
use spotifice_types::{ErrorBody, ErrorKind};

#[derive(Debug)]
pub enum ServerError {
    TrackNotFound { track_id: String },
    BadIdentity { render_id: String },
    NoStream { render_id: String },
    Io { item: String, reason: String },
}

impl ServerError {
    pub fn body(&self) -> ErrorBody {
        match self {
            ServerError::TrackNotFound { track_id } => {
                ErrorBody::new(ErrorKind::TrackError, "Track not found").with_item(track_id.as_str())
            }
            ServerError::BadIdentity { render_id } => {
                ErrorBody::new(ErrorKind::BadIdentity, "Invalid render identity")
                    .with_item(render_id.as_str())
            }
            ServerError::NoStream { render_id } => {
                ErrorBody::new(ErrorKind::StreamError, "No started stream for render")
                    .with_item(render_id.as_str())
            }
            ServerError::Io { item, reason } => {
                ErrorBody::new(ErrorKind::IoError, reason.as_str()).with_item(item.as_str())
            }
        }
    }

    /// Convert into an HTTP response carrying the JSON error body.
    pub fn into_response(self) -> HttpResponse {
        let body = self.body();
        let status = StatusCode::from_u16(body.kind.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        HttpResponse::build(status).json(body)
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.body())
    }
}

impl std::error::Error for ServerError {}
