//! services/api/src/adapters/camera.rs
//!
//! The camera lives in the browser. The client reports whether the user granted
//! access, and later pushes the frame it grabbed; this adapter turns those two
//! reports into the `CameraDevice`/`MediaStream` ports.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use study_assistant_core::ports::{CameraDevice, CapturedFrame, MediaStream, PortError, PortResult};

type FrameSlot = Arc<Mutex<Option<CapturedFrame>>>;

#[derive(Default)]
pub struct ReportedCamera {
    granted: AtomicBool,
    frame: FrameSlot,
}

impl ReportedCamera {
    pub fn report_permission(&self, granted: bool) {
        self.granted.store(granted, Ordering::SeqCst);
    }

    /// Hands over the frame the client captured for the next `capture_frame`.
    pub fn push_frame(&self, frame: CapturedFrame) -> PortResult<()> {
        let mut slot = self
            .frame
            .lock()
            .map_err(|_| PortError::Unexpected("camera frame lock poisoned".to_string()))?;
        *slot = Some(frame);
        Ok(())
    }
}

#[async_trait]
impl CameraDevice for ReportedCamera {
    async fn open(&self) -> PortResult<Box<dyn MediaStream>> {
        if !self.granted.load(Ordering::SeqCst) {
            return Err(PortError::PermissionDenied(
                "the client did not grant camera access".to_string(),
            ));
        }
        Ok(Box::new(ReportedStream {
            frame: self.frame.clone(),
        }))
    }
}

struct ReportedStream {
    frame: FrameSlot,
}

#[async_trait]
impl MediaStream for ReportedStream {
    async fn capture_frame(&mut self) -> PortResult<CapturedFrame> {
        self.frame
            .lock()
            .map_err(|_| PortError::Unexpected("camera frame lock poisoned".to_string()))?
            .take()
            .ok_or_else(|| PortError::NotFound("no camera frame was sent".to_string()))
    }

    fn stop(&mut self) {
        if let Ok(mut slot) = self.frame.lock() {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn refused_permission_cannot_open() {
        let camera = ReportedCamera::default();
        assert!(matches!(
            camera.open().await,
            Err(PortError::PermissionDenied(_))
        ));
    }

    #[tokio::test]
    async fn pushed_frame_is_captured_once() {
        let camera = ReportedCamera::default();
        camera.report_permission(true);
        let mut stream = camera.open().await.unwrap();
        camera
            .push_frame(CapturedFrame {
                bytes: vec![1, 2, 3],
                mime_type: "image/jpeg".to_string(),
            })
            .unwrap();
        assert_eq!(stream.capture_frame().await.unwrap().bytes, vec![1, 2, 3]);
        assert!(matches!(
            stream.capture_frame().await,
            Err(PortError::NotFound(_))
        ));
    }
}
