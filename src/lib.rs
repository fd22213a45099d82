//! oclapi - terminology registry API
//!
//! Organizations and users own sources and collections; sources and
//! collections are versioned. This library holds the models, storage,
//! services and HTTP layer; the binary wires them together.

pub mod api;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
