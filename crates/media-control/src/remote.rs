//! Blocking clients for the media server and render node APIs.

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use spotifice_types::{
    BindRequest, ErrorBody, LoadTrackRequest, RenderStatus, TrackInfo,
};

type Response = ureq::http::Response<ureq::Body>;

pub(crate) struct MediaServer {
    base: String,
}

impl MediaServer {
    pub(crate) fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    pub(crate) fn base(&self) -> &str {
        &self.base
    }

    pub(crate) fn all_tracks(&self) -> Result<Vec<TrackInfo>> {
        let resp = get(&format!("{}/tracks", self.base), "tracks")?;
        read_json(resp, "tracks")
    }

    pub(crate) fn track_info(&self, track_id: &str) -> Result<TrackInfo> {
        let url = format!("{}/tracks/{}", self.base, urlencoding::encode(track_id));
        read_json(get(&url, "tracks")?, "tracks")
    }
}

pub(crate) struct MediaRender {
    base: String,
}

impl MediaRender {
    pub(crate) fn new(base: &str) -> Self {
        Self {
            base: base.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base)
    }

    pub(crate) fn bind(&self, server: &str) -> Result<()> {
        post_json(
            &self.url("bind"),
            "bind",
            BindRequest {
                server: server.to_string(),
            },
        )
        .map(|_| ())
    }

    pub(crate) fn unbind(&self) -> Result<()> {
        post_empty(&self.url("unbind"), "unbind").map(|_| ())
    }

    pub(crate) fn load(&self, track_id: &str) -> Result<TrackInfo> {
        let resp = post_json(
            &self.url("load"),
            "load",
            LoadTrackRequest {
                track_id: track_id.to_string(),
            },
        )?;
        read_json(resp, "load")
    }

    pub(crate) fn play(&self) -> Result<()> {
        post_empty(&self.url("play"), "play").map(|_| ())
    }

    pub(crate) fn stop(&self) -> Result<()> {
        post_empty(&self.url("stop"), "stop").map(|_| ())
    }

    pub(crate) fn pause(&self) -> Result<()> {
        post_empty(&self.url("pause"), "pause").map(|_| ())
    }

    pub(crate) fn resume(&self) -> Result<()> {
        post_empty(&self.url("resume"), "resume").map(|_| ())
    }

    pub(crate) fn status(&self) -> Result<RenderStatus> {
        read_json(get(&self.url("status"), "status")?, "status")
    }
}

fn get(url: &str, label: &str) -> Result<Response> {
    let resp = ureq::get(url)
        .config()
        .http_status_as_error(false)
        .build()
        .call()
        .with_context(|| format!("request /{label}"))?;
    check(resp, label)
}

fn post_empty(url: &str, label: &str) -> Result<Response> {
    let resp = ureq::post(url)
        .config()
        .http_status_as_error(false)
        .build()
        .send_empty()
        .with_context(|| format!("request /{label}"))?;
    check(resp, label)
}

fn post_json<B: Serialize>(url: &str, label: &str, body: B) -> Result<Response> {
    let resp = ureq::post(url)
        .config()
        .http_status_as_error(false)
        .build()
        .send_json(body)
        .with_context(|| format!("request /{label}"))?;
    check(resp, label)
}

/// Pass successful responses through; turn error payloads into `kind: reason` errors.
fn check(mut resp: Response, label: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.body_mut().read_to_string().unwrap_or_default();
    Err(anyhow::anyhow!(describe_failure(label, status.as_u16(), &body)))
}

fn describe_failure(label: &str, status: u16, body: &str) -> String {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) => err.to_string(),
        Err(_) if body.trim().is_empty() => format!("/{label} failed with {status}"),
        Err(_) => format!("/{label} failed with {status}: {}", body.trim()),
    }
}

fn read_json<T: DeserializeOwned>(mut resp: Response, label: &str) -> Result<T> {
    let body = resp
        .body_mut()
        .read_to_string()
        .with_context(|| format!("read /{label} response body"))?;
    serde_json::from_str(&body).with_context(|| format!("decode /{label} response"))
}
