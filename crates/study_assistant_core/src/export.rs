//! crates/study_assistant_core/src/export.rs
//!
//! Turns result text into a clipboard copy, a word-processor file, a PNG or a PDF.
//! Only one export runs at a time per exporter; a request arriving while another is
//! still rendering is ignored.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

use crate::error::{CoreError, CoreResult};
use crate::ports::{ClipboardService, DocumentRenderer, PageLayout, PortError};

const FILE_PREFIX: &str = "StudyAssistant";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum ExportFormat {
    Clipboard,
    Word,
    Image,
    Pdf {
        #[serde(default)]
        layout: PageLayout,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Busy(ExportFormat),
}

/// A generated file ready for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    Copied,
    File(ExportArtifact),
    /// Another export was still running.
    Ignored,
}

pub struct Exporter {
    renderer: Arc<dyn DocumentRenderer>,
    clipboard: Arc<dyn ClipboardService>,
    state: Mutex<ExportState>,
    // The off-screen container the renderer draws from. Empty between exports.
    stage: Mutex<Option<String>>,
}

/// Returns the exporter to `Idle` however the export ends.
struct BusyGuard<'a>(&'a Mutex<ExportState>);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut state) = self.0.lock() {
            *state = ExportState::Idle;
        }
    }
}

/// Empties the stage after capture, on success and on failure.
struct StageGuard<'a>(&'a Mutex<Option<String>>);

impl Drop for StageGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut stage) = self.0.lock() {
            *stage = None;
        }
    }
}

fn render_failure(e: PortError) -> CoreError {
    error!("Export rendering failed: {}", e);
    match e {
        PortError::Unexpected(msg) => CoreError::ExportFailed(msg),
        other => CoreError::ExportFailed(other.to_string()),
    }
}

fn file_name(extension: &str) -> String {
    format!("{}_{}.{}", FILE_PREFIX, Utc::now().timestamp_millis(), extension)
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// A minimal styled HTML document that word processors open as a `.doc`.
pub fn word_document(text: &str) -> Vec<u8> {
    let body = escape_html(text).replace('\n', "<br/>");
    format!(
        "\u{feff}<html><head><meta charset='utf-8'></head>\
         <body style=\"font-family: 'Hind Siliguri', Arial; line-height: 1.6; padding: 40px;\">{}</body></html>",
        body
    )
    .into_bytes()
}

impl Exporter {
    pub fn new(renderer: Arc<dyn DocumentRenderer>, clipboard: Arc<dyn ClipboardService>) -> Self {
        Self {
            renderer,
            clipboard,
            state: Mutex::new(ExportState::Idle),
            stage: Mutex::new(None),
        }
    }

    pub fn state(&self) -> ExportState {
        self.state.lock().map(|s| *s).unwrap_or(ExportState::Idle)
    }

    /// What the off-screen stage currently holds.
    pub fn staged(&self) -> Option<String> {
        self.stage.lock().ok().and_then(|s| s.clone())
    }

    fn try_begin(&self, format: ExportFormat) -> Option<BusyGuard<'_>> {
        let mut state = self.state.lock().ok()?;
        if let ExportState::Busy(running) = *state {
            debug!(?running, requested = ?format, "Export already running, request ignored.");
            return None;
        }
        *state = ExportState::Busy(format);
        Some(BusyGuard(&self.state))
    }

    pub async fn export(&self, text: &str, format: ExportFormat) -> CoreResult<ExportOutcome> {
        let Some(_busy) = self.try_begin(format) else {
            return Ok(ExportOutcome::Ignored);
        };

        match format {
            ExportFormat::Clipboard => {
                self.clipboard.write_text(text).await.map_err(|e| {
                    error!("Clipboard write failed: {}", e);
                    CoreError::ClipboardUnavailable
                })?;
                Ok(ExportOutcome::Copied)
            }
            ExportFormat::Word => Ok(ExportOutcome::File(ExportArtifact {
                file_name: file_name("doc"),
                mime_type: "application/msword".to_string(),
                bytes: word_document(text),
            })),
            ExportFormat::Image => {
                let png = self.capture(text).await?;
                info!(bytes = png.len(), "Image export ready.");
                Ok(ExportOutcome::File(ExportArtifact {
                    file_name: file_name("png"),
                    mime_type: "image/png".to_string(),
                    bytes: png,
                }))
            }
            ExportFormat::Pdf { layout } => {
                let png = self.capture(text).await?;
                let pdf = self
                    .renderer
                    .compose_pdf(&png, layout)
                    .await
                    .map_err(render_failure)?;
                info!(bytes = pdf.len(), ?layout, "PDF export ready.");
                Ok(ExportOutcome::File(ExportArtifact {
                    file_name: file_name("pdf"),
                    mime_type: "application/pdf".to_string(),
                    bytes: pdf,
                }))
            }
        }
    }

    /// Stages the text, waits for fonts, rasterizes, and empties the stage again.
    async fn capture(&self, text: &str) -> CoreResult<Vec<u8>> {
        if let Ok(mut stage) = self.stage.lock() {
            *stage = Some(text.to_string());
        }
        let _stage = StageGuard(&self.stage);

        self.renderer.ensure_fonts().await.map_err(render_failure)?;
        let staged = self.staged().unwrap_or_default();
        self.renderer.rasterize(&staged).await.map_err(render_failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{StubClipboard, StubRenderer};
    use tokio::sync::Notify;

    fn exporter(renderer: Arc<StubRenderer>, clipboard: Arc<StubClipboard>) -> Exporter {
        Exporter::new(renderer, clipboard)
    }

    #[tokio::test]
    async fn word_export_escapes_and_breaks_lines() {
        let ex = exporter(Arc::default(), Arc::default());
        let outcome = ex.export("a < b\nc", ExportFormat::Word).await.unwrap();
        let ExportOutcome::File(artifact) = outcome else {
            panic!("expected a file");
        };
        let html = String::from_utf8(artifact.bytes).unwrap();
        assert!(html.starts_with('\u{feff}'));
        assert!(html.contains("a &lt; b<br/>c"));
        assert!(artifact.file_name.starts_with("StudyAssistant_"));
        assert!(artifact.file_name.ends_with(".doc"));
        assert_eq!(artifact.mime_type, "application/msword");
    }

    #[tokio::test]
    async fn clipboard_denial_is_reported() {
        let clipboard = Arc::new(StubClipboard {
            deny: true,
            ..StubClipboard::default()
        });
        let ex = exporter(Arc::default(), clipboard);
        let err = ex.export("text", ExportFormat::Clipboard).await.unwrap_err();
        assert!(matches!(err, CoreError::ClipboardUnavailable));
        assert_eq!(ex.state(), ExportState::Idle);
    }

    #[tokio::test]
    async fn clipboard_copy_succeeds() {
        let clipboard = Arc::new(StubClipboard::default());
        let ex = exporter(Arc::default(), clipboard.clone());
        assert_eq!(
            ex.export("copy me", ExportFormat::Clipboard).await.unwrap(),
            ExportOutcome::Copied
        );
        assert_eq!(clipboard.copied.lock().unwrap().as_deref(), Some("copy me"));
    }

    #[tokio::test]
    async fn pdf_waits_for_fonts_and_clears_stage() {
        let renderer = Arc::new(StubRenderer::default());
        let ex = exporter(renderer.clone(), Arc::default());
        let outcome = ex
            .export(
                "পৃষ্ঠা",
                ExportFormat::Pdf {
                    layout: PageLayout::MultiPage,
                },
            )
            .await
            .unwrap();
        let ExportOutcome::File(artifact) = outcome else {
            panic!("expected a file");
        };
        assert_eq!(artifact.mime_type, "application/pdf");
        assert_eq!(artifact.bytes, "PDF:MultiPage:PNG:পৃষ্ঠা".as_bytes());
        assert_eq!(renderer.font_loads(), 1);
        assert!(ex.staged().is_none());
    }

    #[tokio::test]
    async fn failed_render_clears_stage_and_state() {
        let renderer = Arc::new(StubRenderer::failing());
        let ex = exporter(renderer, Arc::default());
        let err = ex.export("x", ExportFormat::Image).await.unwrap_err();
        match err {
            CoreError::ExportFailed(msg) => assert_eq!(msg, "canvas lost"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(ex.staged().is_none());
        assert_eq!(ex.state(), ExportState::Idle);
    }

    #[tokio::test]
    async fn second_request_while_rasterizing_is_ignored() {
        let gate = Arc::new(Notify::new());
        let renderer = Arc::new(StubRenderer::gated(gate.clone()));
        let ex = exporter(renderer.clone(), Arc::default());

        let first = ex.export("first", ExportFormat::Image);
        let second = async {
            // Runs after `first` has parked inside rasterize.
            let outcome = ex.export("second", ExportFormat::Image).await;
            assert_eq!(ex.staged().as_deref(), Some("first"));
            gate.notify_one();
            outcome
        };
        let (first, second) = futures::join!(first, second);

        assert_eq!(second.unwrap(), ExportOutcome::Ignored);
        let ExportOutcome::File(artifact) = first.unwrap() else {
            panic!("expected a file");
        };
        assert_eq!(artifact.bytes, b"PNG:first");
        assert_eq!(renderer.rasterized(), 1);
        assert!(ex.staged().is_none());
        assert_eq!(ex.state(), ExportState::Idle);
    }
}
