use utoipa::OpenApi;

use crate::http_api;

#[derive(OpenApi)]
#[openapi(
    paths(
        http_api::health,
        http_api::bind,
        http_api::unbind,
        http_api::load,
        http_api::current_track,
        http_api::play,
        http_api::stop,
        http_api::pause,
        http_api::resume,
        http_api::status,
    ),
    components(
        schemas(
            http_api::HealthResponse,
            spotifice_types::BindRequest,
            spotifice_types::LoadTrackRequest,
            spotifice_types::TrackInfo,
            spotifice_types::RenderStatus,
            spotifice_types::PlaybackState,
            spotifice_types::ErrorBody,
            spotifice_types::ErrorKind,
        )
    ),
    tags(
        (name = "media-render", description = "Render node control API")
    )
)]
pub struct ApiDoc;
