#![forbid(unsafe_code)]

//! Video catalog service: CRUD and filtered search over a single `videos`
//! collection.
//!
//! The binary in `src/bin/backend.rs` wires these modules into an HTTP
//! server; everything it needs lives here so tests can build isolated
//! instances with either store.

pub mod api;
pub mod config;
pub mod memory;
pub mod query;
pub mod repository;
pub mod sqlite;
pub mod video;
