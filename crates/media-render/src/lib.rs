//! Media render node.
//!
//! Pulls encoded audio from a media server on demand and plays it on a local output
//! device. The [`engine`] owns every pipeline transition on a single worker thread;
//! [`service`] layers the render operations (bind, load, play, stop, ...) on top of it
//! and [`http_api`] exposes them over HTTP.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod http_api;
pub mod openapi;
pub mod runtime;
pub mod service;
pub mod source;

#[cfg(test)]
mod testing;
