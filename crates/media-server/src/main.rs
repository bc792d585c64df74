mod api;
mod config;
mod error;
mod library;
mod openapi;
mod state;
mod streams;

use std::path::PathBuf;

use actix_web::{App, HttpServer, middleware::Logger, web};
use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::ServerConfig;
use crate::library::scan_catalog;
use crate::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "media-server", version)]
struct Args {
    /// HTTP bind address, e.g. 0.0.0.0:10000
    #[arg(long)]
    bind: Option<std::net::SocketAddr>,

    /// Directory holding the served tracks
    #[arg(long)]
    media_dir: Option<PathBuf>,

    /// Optional server config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[actix_web::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("info,actix_web=info,media_server=info")
        }))
        .init();

    let cfg = match args.config.as_ref() {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    let settings = cfg.resolve(args.bind, args.media_dir)?;
    tracing::info!(
        bind = %settings.bind,
        media_dir = %settings.media_dir.display(),
        extensions = ?settings.extensions,
        max_chunk_bytes = settings.max_chunk_bytes,
        "starting media-server"
    );

    let catalog = scan_catalog(&settings.media_dir, &settings.extensions)?;
    if catalog.is_empty() {
        tracing::warn!(root = %catalog.root().display(), "no tracks found");
    } else {
        tracing::info!(count = catalog.len(), "total tracks loaded");
    }
    let state = web::Data::new(AppState::new(catalog, settings.max_chunk_bytes));

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(Logger::default().exclude("/health"))
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-doc/openapi.json", openapi::ApiDoc::openapi()),
            )
            .configure(api::configure)
    })
    .bind(settings.bind)?
    .run()
    .await?;

    tracing::info!("shutdown");
    Ok(())
}
