//! services/api/src/adapters/clipboard.rs
//!
//! The server cannot reach the user's clipboard, so a copy is buffered here and
//! returned in the export response for the browser to write.

use async_trait::async_trait;
use std::sync::Mutex;
use study_assistant_core::ports::{ClipboardService, PortError, PortResult};

#[derive(Default)]
pub struct BufferedClipboard {
    last: Mutex<Option<String>>,
}

impl BufferedClipboard {
    /// The most recently copied text, consumed.
    pub fn take(&self) -> Option<String> {
        self.last.lock().ok().and_then(|mut last| last.take())
    }
}

#[async_trait]
impl ClipboardService for BufferedClipboard {
    async fn write_text(&self, text: &str) -> PortResult<()> {
        let mut last = self
            .last
            .lock()
            .map_err(|_| PortError::Unexpected("clipboard lock poisoned".to_string()))?;
        *last = Some(text.to_string());
        Ok(())
    }
}
