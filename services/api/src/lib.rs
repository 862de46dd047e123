//! services/api/src/lib.rs
//!
//! The HTTP service around `study_assistant_core`: configuration, adapters for
//! the core's ports, and the Axum web layer.

pub mod adapters;
pub mod config;
pub mod error;
pub mod web;
