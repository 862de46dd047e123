//! crates/study_assistant_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of storage engines, AI vendors and device access.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::FilePart;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Stored value is corrupt: {0}")]
    Corrupt(String),
    #[error("Permission denied: {0}")]
    PermissionDenied(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// Durable key/value storage. Values are opaque strings (JSON in practice).
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> PortResult<Option<String>>;

    async fn put(&self, key: &str, value: &str) -> PortResult<()>;

    async fn remove(&self, key: &str) -> PortResult<()>;
}

/// The external generative model. Treated as a black box.
#[async_trait]
pub trait GenerativeModel: Send + Sync {
    /// Sends an instruction plus inline attachments to `model` and returns the raw text.
    async fn generate_content(
        &self,
        model: &str,
        instruction: &str,
        attachments: &[FilePart],
    ) -> PortResult<String>;
}

/// A single captured camera frame, already encoded.
#[derive(Debug, Clone)]
pub struct CapturedFrame {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// A live media stream handed out by a `CameraDevice`.
#[async_trait]
pub trait MediaStream: Send {
    async fn capture_frame(&mut self) -> PortResult<CapturedFrame>;

    /// Releases the underlying device. Must be safe to call more than once.
    fn stop(&mut self);
}

#[async_trait]
pub trait CameraDevice: Send + Sync {
    /// Requests access to the camera. Fails with `PermissionDenied` when refused.
    async fn open(&self) -> PortResult<Box<dyn MediaStream>>;
}

#[async_trait]
pub trait ClipboardService: Send + Sync {
    async fn write_text(&self, text: &str) -> PortResult<()>;
}

/// How a raster is laid out into a PDF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageLayout {
    #[default]
    /// One page sized to the raster's aspect ratio.
    SinglePage,
    /// A4-proportioned pages, the raster sliced top to bottom.
    MultiPage,
}

/// Off-screen rendering of result text.
#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Completes once every font the renderer needs is loaded.
    async fn ensure_fonts(&self) -> PortResult<()>;

    /// Rasterizes text into PNG bytes.
    async fn rasterize(&self, text: &str) -> PortResult<Vec<u8>>;

    /// Embeds a PNG raster into a PDF document.
    async fn compose_pdf(&self, png: &[u8], layout: PageLayout) -> PortResult<Vec<u8>>;
}
