//! Asynchronous Image Upscaling API
//!
//! This library provides the core functionality for the image-upscaler
//! system: an HTTP submission surface, a Redis-backed job queue and result
//! store, a PostgreSQL job store with guarded state transitions, and the
//! worker that drives the upscaling compute engine.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
pub mod worker;
