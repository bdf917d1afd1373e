//! Client-side chat engine: incremental stream decoding and assembly, an
//! optimistic conversation cache, and the orchestrator tying them to an HTTP
//! streaming transport.

pub mod auth;
pub mod cache;
pub mod config;
pub mod controllers;
pub mod models;
pub mod repositories;
pub mod stream;
pub mod transport;
