use utoipa::OpenApi;

use crate::api;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::health,
        api::list_tracks,
        api::track_info,
        api::start_stream,
        api::stop_stream,
        api::audio_chunk,
    ),
    components(
        schemas(
            api::HealthResponse,
            spotifice_types::TrackInfo,
            spotifice_types::StartStreamRequest,
            spotifice_types::ErrorBody,
            spotifice_types::ErrorKind,
        )
    ),
    tags(
        (name = "media-server", description = "Track catalog and streaming API")
    )
)]
pub struct ApiDoc;
