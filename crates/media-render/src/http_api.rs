//! Render node HTTP API.
//!
//! Every handler that can block on the engine or the media server runs its service
//! call on the blocking pool.

use actix_web::{HttpResponse, Responder, get, post, web};
use serde::Serialize;
use spotifice_types::{BindRequest, ErrorBody, LoadTrackRequest, RenderStatus, TrackInfo};
use utoipa::ToSchema;

use crate::error::RenderError;
use crate::service::RenderService;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Run a blocking service call and map its outcome to a response.
async fn blocking<T, F>(f: F, ok: impl FnOnce(T) -> HttpResponse) -> HttpResponse
where
    F: FnOnce() -> Result<T, RenderError> + Send + 'static,
    T: Send + 'static,
{
    match web::block(f).await {
        Ok(Ok(value)) => ok(value),
        Ok(Err(err)) => {
            tracing::warn!(error = %err, "request failed");
            err.into_response()
        }
        Err(err) => HttpResponse::InternalServerError().body(err.to_string()),
    }
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Render node is healthy", body = HealthResponse)
    )
)]
#[get("/health")]
pub async fn health() -> impl Responder {
    HttpResponse::Ok().json(HealthResponse { status: "ok" })
}

#[utoipa::path(
    post,
    path = "/bind",
    request_body = BindRequest,
    responses(
        (status = 200, description = "Media server bound"),
        (status = 502, description = "Media server not reachable", body = ErrorBody)
    )
)]
#[post("/bind")]
/// Bind this renderer to a media server.
pub async fn bind(state: web::Data<RenderService>, body: web::Json<BindRequest>) -> impl Responder {
    let server = body.into_inner().server;
    tracing::info!(server = %server, "bind request");
    blocking(move || state.bind_source(&server), |_| HttpResponse::Ok().finish()).await
}

#[utoipa::path(
    post,
    path = "/unbind",
    responses(
        (status = 200, description = "Media server unbound"),
        (status = 409, description = "Playback could not be stopped", body = ErrorBody)
    )
)]
#[post("/unbind")]
pub async fn unbind(state: web::Data<RenderService>) -> impl Responder {
    blocking(move || state.unbind_source(), |_| HttpResponse::Ok().finish()).await
}

#[utoipa::path(
    post,
    path = "/load",
    request_body = LoadTrackRequest,
    responses(
        (status = 200, description = "Track loaded", body = TrackInfo),
        (status = 404, description = "Unknown track", body = ErrorBody),
        (status = 409, description = "Player busy", body = ErrorBody),
        (status = 502, description = "No media server bound", body = ErrorBody)
    )
)]
#[post("/load")]
/// Load a track from the bound media server.
pub async fn load(
    state: web::Data<RenderService>,
    body: web::Json<LoadTrackRequest>,
) -> impl Responder {
    let track_id = body.into_inner().track_id;
    tracing::info!(track_id = %track_id, "load request");
    blocking(move || state.load(&track_id), |info| HttpResponse::Ok().json(info)).await
}

#[utoipa::path(
    get,
    path = "/track",
    responses(
        (status = 200, description = "Loaded track", body = TrackInfo),
        (status = 204, description = "No track loaded")
    )
)]
#[get("/track")]
pub async fn current_track(state: web::Data<RenderService>) -> impl Responder {
    match state.current_track() {
        Some(info) => HttpResponse::Ok().json(info),
        None => HttpResponse::NoContent().finish(),
    }
}

#[utoipa::path(
    post,
    path = "/play",
    responses(
        (status = 200, description = "Playback confirmed"),
        (status = 404, description = "No track loaded", body = ErrorBody),
        (status = 409, description = "Already playing or not confirmed", body = ErrorBody),
        (status = 502, description = "No media server bound", body = ErrorBody)
    )
)]
#[post("/play")]
/// Stream the loaded track from the bound media server.
pub async fn play(state: web::Data<RenderService>) -> impl Responder {
    tracing::info!("play request");
    blocking(move || state.play(), |_| HttpResponse::Ok().finish()).await
}

#[utoipa::path(
    post,
    path = "/stop",
    responses(
        (status = 200, description = "Playback stopped"),
        (status = 409, description = "Stop not confirmed", body = ErrorBody)
    )
)]
#[post("/stop")]
pub async fn stop(state: web::Data<RenderService>) -> impl Responder {
    tracing::info!("stop request");
    blocking(move || state.stop(), |_| HttpResponse::Ok().finish()).await
}

#[utoipa::path(
    post,
    path = "/pause",
    responses(
        (status = 200, description = "Playback paused"),
        (status = 409, description = "Not playing", body = ErrorBody)
    )
)]
#[post("/pause")]
pub async fn pause(state: web::Data<RenderService>) -> impl Responder {
    blocking(move || state.pause(), |_| HttpResponse::Ok().finish()).await
}

#[utoipa::path(
    post,
    path = "/resume",
    responses(
        (status = 200, description = "Playback resumed"),
        (status = 409, description = "Not playing", body = ErrorBody)
    )
)]
#[post("/resume")]
pub async fn resume(state: web::Data<RenderService>) -> impl Responder {
    blocking(move || state.resume(), |_| HttpResponse::Ok().finish()).await
}

#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Render status", body = RenderStatus)
    )
)]
#[get("/status")]
pub async fn status(state: web::Data<RenderService>) -> impl Responder {
    HttpResponse::Ok().json(state.status())
}

/// Register every render route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .service(bind)
        .service(unbind)
        .service(load)
        .service(current_track)
        .service(play)
        .service(stop)
        .service(pause)
        .service(resume)
        .service(status);
}
