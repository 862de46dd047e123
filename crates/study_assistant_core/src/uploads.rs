//! crates/study_assistant_core/src/uploads.rs
//!
//! The upload/capture manager. Files picked, pasted or captured from the camera are
//! normalized into `FilePart`s and appended to one of two lists: the main upload
//! list, or the attachments of the next chat message.

use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

use crate::domain::FilePart;
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::ports::{CameraDevice, MediaStream, PortError};

pub const DEFAULT_MAX_FILE_BYTES: usize = 20 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadTarget {
    Main,
    Chat,
}

/// A file chosen through the file picker.
#[derive(Debug, Clone)]
pub struct PickedFile {
    pub name: String,
    /// The type reported by the platform, when it reported one.
    pub mime_type: Option<String>,
    pub bytes: Bytes,
}

/// One item of a clipboard paste.
#[derive(Debug, Clone)]
pub struct ClipboardItem {
    pub mime_type: String,
    pub bytes: Bytes,
}

//=========================================================================================
// Camera state machine
//=========================================================================================

pub enum CameraState {
    Closed,
    Open(Box<dyn MediaStream>),
}

impl fmt::Debug for CameraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CameraState::Closed => f.write_str("Closed"),
            CameraState::Open(_) => f.write_str("Open"),
        }
    }
}

impl CameraState {
    pub fn is_open(&self) -> bool {
        matches!(self, CameraState::Open(_))
    }
}

//=========================================================================================
// UploadManager
//=========================================================================================

#[derive(Debug)]
pub struct UploadManager {
    main: Vec<FilePart>,
    chat: Vec<FilePart>,
    camera: CameraState,
    max_file_bytes: usize,
}

impl Default for UploadManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FILE_BYTES)
    }
}

fn is_supported(mime_type: &str) -> bool {
    mime_type.starts_with("image/") || mime_type == "application/pdf"
}

/// Falls back on the file name when the platform gave no type.
fn infer_mime(name: &str) -> String {
    if name.to_lowercase().ends_with(".pdf") {
        "application/pdf".to_string()
    } else {
        "image/jpeg".to_string()
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "application/pdf" => "pdf",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "jpg",
    }
}

impl UploadManager {
    pub fn new(max_file_bytes: usize) -> Self {
        Self {
            main: Vec::new(),
            chat: Vec::new(),
            camera: CameraState::Closed,
            max_file_bytes,
        }
    }

    fn list_mut(&mut self, target: UploadTarget) -> &mut Vec<FilePart> {
        match target {
            UploadTarget::Main => &mut self.main,
            UploadTarget::Chat => &mut self.chat,
        }
    }

    pub fn files(&self, target: UploadTarget) -> &[FilePart] {
        match target {
            UploadTarget::Main => &self.main,
            UploadTarget::Chat => &self.chat,
        }
    }

    fn check_size(&self, name: &str, len: usize) -> CoreResult<()> {
        if len > self.max_file_bytes {
            return Err(ValidationError::FileTooLarge {
                name: name.to_string(),
                limit: self.max_file_bytes,
            }
            .into());
        }
        Ok(())
    }

    /// Adds every picked file. The batch is validated first, so a rejected file adds nothing.
    pub fn add_from_picker(
        &mut self,
        target: UploadTarget,
        files: Vec<PickedFile>,
    ) -> CoreResult<usize> {
        let mut parts = Vec::with_capacity(files.len());
        for file in files {
            let mime_type = match file.mime_type.as_deref() {
                Some(m) if !m.is_empty() => m.to_string(),
                _ => infer_mime(&file.name),
            };
            if !is_supported(&mime_type) {
                return Err(ValidationError::UnsupportedFile(mime_type).into());
            }
            self.check_size(&file.name, file.bytes.len())?;
            parts.push(FilePart::from_bytes(&file.bytes, &mime_type, &file.name));
        }
        let added = parts.len();
        self.list_mut(target).extend(parts);
        debug!(?target, added, "Added picked files.");
        Ok(added)
    }

    /// Adds the image and PDF items of a paste; any other item is skipped.
    pub fn add_from_clipboard(
        &mut self,
        target: UploadTarget,
        items: Vec<ClipboardItem>,
    ) -> CoreResult<usize> {
        let stamp = Utc::now().timestamp_millis();
        let mut parts = Vec::new();
        for (i, item) in items.into_iter().enumerate() {
            if !is_supported(&item.mime_type) {
                debug!(mime = %item.mime_type, "Skipping non-file clipboard item.");
                continue;
            }
            let name = format!("Pasted_{}_{}.{}", stamp, i, extension_for(&item.mime_type));
            self.check_size(&name, item.bytes.len())?;
            parts.push(FilePart::from_bytes(&item.bytes, &item.mime_type, &name));
        }
        let added = parts.len();
        self.list_mut(target).extend(parts);
        Ok(added)
    }

    /// Removes one file. An absent index fails with `IndexOutOfRange`.
    pub fn remove(&mut self, target: UploadTarget, index: usize) -> CoreResult<FilePart> {
        let list = self.list_mut(target);
        if index >= list.len() {
            return Err(CoreError::IndexOutOfRange {
                index,
                len: list.len(),
            });
        }
        Ok(list.remove(index))
    }

    /// Drops the files that went out with a message; anything added since stays.
    pub fn discard_sent(&mut self, target: UploadTarget, sent: &[FilePart]) {
        self.list_mut(target).retain(|f| !sent.contains(f));
    }

    // --- Camera ---

    pub fn camera_open(&self) -> bool {
        self.camera.is_open()
    }

    /// CLOSED -> OPEN. Opening an already open camera is a no-op.
    pub async fn open_camera(&mut self, device: &dyn CameraDevice) -> CoreResult<()> {
        if self.camera.is_open() {
            return Ok(());
        }
        match device.open().await {
            Ok(stream) => {
                self.camera = CameraState::Open(stream);
                info!("Camera opened.");
                Ok(())
            }
            Err(PortError::PermissionDenied(reason)) => {
                warn!("Camera permission denied: {}", reason);
                Err(CoreError::PermissionDenied)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// OPEN -> CLOSED, releasing the stream.
    pub fn close_camera(&mut self) {
        if let CameraState::Open(mut stream) = std::mem::replace(&mut self.camera, CameraState::Closed)
        {
            stream.stop();
            debug!("Camera stream released.");
        }
    }

    /// Captures one frame into `target` and closes the camera, whether or not the
    /// capture succeeded.
    pub async fn add_from_camera(&mut self, target: UploadTarget) -> CoreResult<FilePart> {
        let CameraState::Open(mut stream) = std::mem::replace(&mut self.camera, CameraState::Closed)
        else {
            return Err(ValidationError::CameraClosed.into());
        };
        let frame = stream.capture_frame().await;
        stream.stop();
        let frame = frame?;

        let name = format!(
            "Capture_{}.{}",
            Utc::now().timestamp_millis(),
            extension_for(&frame.mime_type)
        );
        self.check_size(&name, frame.bytes.len())?;
        let part = FilePart::from_bytes(&frame.bytes, &frame.mime_type, &name);
        self.list_mut(target).push(part.clone());
        Ok(part)
    }

    /// Drops every list and releases the camera.
    pub fn reset(&mut self) {
        self.close_camera();
        self.main.clear();
        self.chat.clear();
    }
}
