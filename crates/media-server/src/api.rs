//! HTTP API handlers.

use actix_web::http::header;
use actix_web::{HttpResponse, Responder, delete, get, post, web};
use serde::{Deserialize, Serialize};
use spotifice_types::{ErrorBody, StartStreamRequest, TrackInfo};
use utoipa::{IntoParams, ToSchema};

use crate::state::AppState;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Query for `GET /streams/{render_id}/chunk`.
#[derive(Deserialize, IntoParams)]
pub struct ChunkQuery {
    /// Requested chunk size in bytes.
    pub size: Option<usize>,
}

/// Basic health check used by render nodes when binding.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Media server is healthy", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse { status: "ok" })
}

#[utoipa::path(
    get,
    path = "/tracks",
    responses(
        (status = 200, description = "All tracks", body = [TrackInfo])
    )
)]
#[get("/tracks")]
pub async fn list_tracks(state: web::Data<AppState>) -> impl Responder {
    HttpResponse::Ok().json(state.catalog.all_tracks())
}

#[utoipa::path(
    get,
    path = "/tracks/{track_id}",
    params(("track_id" = String, Path, description = "Track id")),
    responses(
        (status = 200, description = "Track info", body = TrackInfo),
        (status = 404, description = "Unknown track", body = ErrorBody)
    )
)]
#[get("/tracks/{track_id}")]
pub async fn track_info(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    match state.catalog.track_info(&path) {
        Ok(info) => HttpResponse::Ok().json(info),
        Err(err) => err.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/streams/{render_id}",
    params(("render_id" = String, Path, description = "Render identity")),
    request_body = StartStreamRequest,
    responses(
        (status = 200, description = "Stream opened"),
        (status = 400, description = "Invalid render identity", body = ErrorBody),
        (status = 404, description = "Unknown track", body = ErrorBody),
        (status = 500, description = "Track file could not be opened", body = ErrorBody)
    )
)]
#[post("/streams/{render_id}")]
/// Open a track for a render node, replacing its current stream.
pub async fn start_stream(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<StartStreamRequest>,
) -> impl Responder {
    let render_id = path.into_inner();
    match state
        .streams
        .start_stream(&state.catalog, &body.track_id, &render_id)
    {
        Ok(()) => HttpResponse::Ok().finish(),
        Err(err) => {
            tracing::warn!(render_id = %render_id, error = %err, "start stream failed");
            err.into_response()
        }
    }
}

#[utoipa::path(
    delete,
    path = "/streams/{render_id}",
    params(("render_id" = String, Path, description = "Render identity")),
    responses(
        (status = 200, description = "Stream closed (or none was open)")
    )
)]
#[delete("/streams/{render_id}")]
pub async fn stop_stream(state: web::Data<AppState>, path: web::Path<String>) -> impl Responder {
    state.streams.stop_stream(&path);
    HttpResponse::Ok().finish()
}

#[utoipa::path(
    get,
    path = "/streams/{render_id}/chunk",
    params(
        ("render_id" = String, Path, description = "Render identity"),
        ChunkQuery
    ),
    responses(
        (status = 200, description = "Next bytes of the stream; empty once exhausted", content_type = "application/octet-stream"),
        (status = 404, description = "No started stream for render", body = ErrorBody),
        (status = 500, description = "Read failure", body = ErrorBody)
    )
)]
#[get("/streams/{render_id}/chunk")]
/// Read the next chunk of a render node's stream.
pub async fn audio_chunk(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<ChunkQuery>,
) -> impl Responder {
    let size = query.size.unwrap_or(0);
    match state.streams.get_audio_chunk(&path, size) {
        Ok(bytes) => HttpResponse::Ok()
            .insert_header((header::CONTENT_TYPE, "application/octet-stream"))
            .body(bytes),
        Err(err) => err.into_response(),
    }
}

/// Register every media server route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(list_tracks)
        .service(track_info)
        .service(start_stream)
        .service(stop_stream)
        .service(audio_chunk);
}
