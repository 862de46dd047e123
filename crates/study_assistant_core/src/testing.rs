//! Test doubles for the ports.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

use crate::domain::FilePart;
use crate::ports::{
    ClipboardService, DocumentRenderer, GenerativeModel, PageLayout, PortError, PortResult,
};

/// One scripted model reply, optionally held back until its gate is released.
pub struct Step {
    pub reply: Result<String, String>,
    pub gate: Option<Arc<Notify>>,
}

impl Step {
    pub fn reply(text: &str) -> Self {
        Self {
            reply: Ok(text.to_string()),
            gate: None,
        }
    }

    pub fn fail(message: &str) -> Self {
        Self {
            reply: Err(message.to_string()),
            gate: None,
        }
    }

    pub fn gated(text: &str, gate: Arc<Notify>) -> Self {
        Self {
            reply: Ok(text.to_string()),
            gate: Some(gate),
        }
    }
}

/// Replies with scripted steps in call order, then echoes "ok".
#[derive(Default)]
pub struct StubModel {
    steps: Mutex<VecDeque<Step>>,
    calls: AtomicUsize,
    last_attachments: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl StubModel {
    pub fn scripted(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_attachments(&self) -> usize {
        self.last_attachments.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeModel for StubModel {
    async fn generate_content(
        &self,
        _model: &str,
        instruction: &str,
        attachments: &[FilePart],
    ) -> PortResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.last_attachments
            .store(attachments.len(), Ordering::SeqCst);
        self.prompts.lock().unwrap().push(instruction.to_string());
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            Some(step) => {
                if let Some(gate) = step.gate {
                    gate.notified().await;
                }
                step.reply.map_err(PortError::Unexpected)
            }
            None => Ok("ok".to_string()),
        }
    }
}

/// Renderer that records calls and can be held inside `rasterize`.
#[derive(Default)]
pub struct StubRenderer {
    pub gate: Option<Arc<Notify>>,
    pub fail: bool,
    rasterized: AtomicUsize,
    font_loads: AtomicUsize,
}

impl StubRenderer {
    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn rasterized(&self) -> usize {
        self.rasterized.load(Ordering::SeqCst)
    }

    pub fn font_loads(&self) -> usize {
        self.font_loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DocumentRenderer for StubRenderer {
    async fn ensure_fonts(&self) -> PortResult<()> {
        self.font_loads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rasterize(&self, text: &str) -> PortResult<Vec<u8>> {
        self.rasterized.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        if self.fail {
            return Err(PortError::Unexpected("canvas lost".to_string()));
        }
        Ok(format!("PNG:{}", text).into_bytes())
    }

    async fn compose_pdf(&self, png: &[u8], layout: PageLayout) -> PortResult<Vec<u8>> {
        let mut out = format!("PDF:{:?}:", layout).into_bytes();
        out.extend_from_slice(png);
        Ok(out)
    }
}

#[derive(Default)]
pub struct StubClipboard {
    pub deny: bool,
    pub copied: Mutex<Option<String>>,
}

#[async_trait]
impl ClipboardService for StubClipboard {
    async fn write_text(&self, text: &str) -> PortResult<()> {
        if self.deny {
            return Err(PortError::PermissionDenied("clipboard".to_string()));
        }
        *self.copied.lock().unwrap() = Some(text.to_string());
        Ok(())
    }
}
