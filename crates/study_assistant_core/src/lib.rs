pub mod assistant;
pub mod domain;
pub mod error;
pub mod export;
pub mod history;
pub mod normalize;
pub mod orchestrator;
pub mod ports;
pub mod prompt;
pub mod registry;
pub mod session;
pub mod store;
pub mod uploads;

#[cfg(test)]
mod testing;

pub use assistant::{Completion, Services, StudyAssistant};
pub use domain::{
    ChatMessage, ChatRole, FilePart, GenerationResult, InstructionOverride, Mode, PublicUser,
    QuestionCategory, QuestionTypeConfig, QuestionTypes, Role, Subject, User,
};
pub use error::{CoreError, CoreResult, ValidationError};
pub use export::{ExportArtifact, ExportFormat, ExportOutcome, ExportState};
pub use ports::{
    CameraDevice, CapturedFrame, ClipboardService, DocumentRenderer, GenerativeModel,
    KeyValueStore, MediaStream, PageLayout, PortError, PortResult,
};
pub use store::MemoryStore;
pub use uploads::{ClipboardItem, PickedFile, UploadTarget};
