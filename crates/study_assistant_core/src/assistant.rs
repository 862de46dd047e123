//! crates/study_assistant_core/src/assistant.rs
//!
//! `StudyAssistant` is the state of one browser instance: who is signed in, what has
//! been uploaded, the current settings and the result on display. Handlers call into
//! it; it drives the registry, orchestrator, history store and export pipeline.
//!
//! The view lock is never held across a model call, so overlapping requests are
//! possible. The newest issued request decides what is displayed; an older one that
//! finishes later is still kept in history.

use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domain::{
    ChatMessage, FilePart, GenerationResult, InstructionOverride, Mode, PublicUser,
    QuestionCategory, QuestionTypes, Subject,
};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::export::{ExportFormat, ExportOutcome, Exporter};
use crate::history::{ChatSeed, HistoryStore};
use crate::orchestrator::{GenerationOutcome, GenerationRequest, Orchestrator, RequestPayload, RequestState};
use crate::ports::{CameraDevice, ClipboardService, DocumentRenderer, GenerativeModel, KeyValueStore};
use crate::prompt::{InstructionSource, ModelTiers};
use crate::registry::UserRegistry;
use crate::session::SessionState;
use crate::store::JsonStore;
use crate::uploads::{ClipboardItem, PickedFile, UploadManager, UploadTarget, DEFAULT_MAX_FILE_BYTES};

//=========================================================================================
// Shared services
//=========================================================================================

/// Everything a `StudyAssistant` needs from outside. Cheap to clone.
#[derive(Clone)]
pub struct Services {
    pub store: JsonStore,
    pub registry: UserRegistry,
    pub instructions: InstructionSource,
    pub model: Arc<dyn GenerativeModel>,
    pub renderer: Arc<dyn DocumentRenderer>,
    pub clipboard: Arc<dyn ClipboardService>,
    pub tiers: ModelTiers,
    pub max_file_bytes: usize,
}

impl Services {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        model: Arc<dyn GenerativeModel>,
        renderer: Arc<dyn DocumentRenderer>,
        clipboard: Arc<dyn ClipboardService>,
    ) -> Self {
        let store = JsonStore::new(store);
        Self {
            registry: UserRegistry::new(store.clone()),
            instructions: InstructionSource::new(store.clone()),
            store,
            model,
            renderer,
            clipboard,
            tiers: ModelTiers::default(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
        }
    }

    pub fn with_tiers(mut self, tiers: ModelTiers) -> Self {
        self.tiers = tiers;
        self
    }

    pub fn with_max_file_bytes(mut self, max_file_bytes: usize) -> Self {
        self.max_file_bytes = max_file_bytes;
        self
    }

    pub fn with_clipboard(mut self, clipboard: Arc<dyn ClipboardService>) -> Self {
        self.clipboard = clipboard;
        self
    }
}

/// A finished request and whether it became the displayed result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub result: GenerationResult,
    pub displayed: bool,
}

struct View {
    session: SessionState,
    uploads: UploadManager,
    subject: Subject,
    question_types: QuestionTypes,
    history: HistoryStore,
}

pub struct StudyAssistant {
    services: Services,
    orchestrator: Orchestrator,
    exporter: Exporter,
    view: Mutex<View>,
}

impl StudyAssistant {
    /// A fresh instance with nobody signed in. Call `start` to pick up a mirrored session.
    pub fn new(services: Services, instance: &str) -> Self {
        let orchestrator = Orchestrator::new(
            services.model.clone(),
            services.registry.clone(),
            services.instructions.clone(),
            services.tiers.clone(),
        );
        let exporter = Exporter::new(services.renderer.clone(), services.clipboard.clone());
        let view = View {
            session: SessionState::new(services.store.clone(), instance),
            uploads: UploadManager::new(services.max_file_bytes),
            subject: Subject::default(),
            question_types: QuestionTypes::default(),
            history: HistoryStore::new(services.store.clone()),
        };
        Self {
            services,
            orchestrator,
            exporter,
            view: Mutex::new(view),
        }
    }

    /// Restores the mirrored session and that user's history.
    pub async fn start(&self) -> CoreResult<Option<PublicUser>> {
        let mut view = self.view.lock().await;
        let user = view.session.restore().await?;
        if let Some(user) = &user {
            view.history.load(user.id).await?;
            debug!(user_id = %user.id, "Session restored.");
        }
        Ok(user)
    }

    //=====================================================================================
    // Authentication
    //=====================================================================================

    pub async fn register(&self, name: &str, email: &str, password: &str) -> CoreResult<PublicUser> {
        let user = self.services.registry.register(name, email, password).await?;
        self.sign_in(user.clone()).await?;
        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> CoreResult<PublicUser> {
        let user = self.services.registry.login(email, password).await?;
        self.sign_in(user.clone()).await?;
        info!(user_id = %user.id, "User logged in.");
        Ok(user)
    }

    async fn sign_in(&self, user: PublicUser) -> CoreResult<()> {
        let mut view = self.view.lock().await;
        view.uploads.reset();
        view.history.load(user.id).await?;
        view.session.establish(user).await
    }

    /// Ends the session and drops every piece of per-user view state.
    pub async fn logout(&self) -> CoreResult<()> {
        let mut view = self.view.lock().await;
        view.session.clear().await?;
        view.history.unload();
        view.uploads.reset();
        view.subject = Subject::default();
        view.question_types = QuestionTypes::default();
        info!("User logged out.");
        Ok(())
    }

    pub async fn current_user(&self) -> Option<PublicUser> {
        self.view.lock().await.session.current().cloned()
    }

    //=====================================================================================
    // Uploads & camera
    //=====================================================================================

    pub async fn upload(&self, target: UploadTarget, files: Vec<PickedFile>) -> CoreResult<usize> {
        let mut view = self.view.lock().await;
        view.session.require()?;
        view.uploads.add_from_picker(target, files)
    }

    pub async fn paste(&self, target: UploadTarget, items: Vec<ClipboardItem>) -> CoreResult<usize> {
        let mut view = self.view.lock().await;
        view.session.require()?;
        view.uploads.add_from_clipboard(target, items)
    }

    pub async fn remove_file(&self, target: UploadTarget, index: usize) -> CoreResult<FilePart> {
        self.view.lock().await.uploads.remove(target, index)
    }

    pub async fn files(&self, target: UploadTarget) -> Vec<FilePart> {
        self.view.lock().await.uploads.files(target).to_vec()
    }

    pub async fn open_camera(&self, device: &dyn CameraDevice) -> CoreResult<()> {
        let mut view = self.view.lock().await;
        view.session.require()?;
        view.uploads.open_camera(device).await
    }

    pub async fn close_camera(&self) {
        self.view.lock().await.uploads.close_camera();
    }

    pub async fn camera_open(&self) -> bool {
        self.view.lock().await.uploads.camera_open()
    }

    pub async fn capture_photo(&self, target: UploadTarget) -> CoreResult<FilePart> {
        self.view.lock().await.uploads.add_from_camera(target).await
    }

    //=====================================================================================
    // Settings
    //=====================================================================================

    pub async fn set_subject(&self, subject: Subject) {
        self.view.lock().await.subject = subject;
    }

    pub async fn set_question_type(&self, category: QuestionCategory, enabled: bool, count: u32) {
        self.view
            .lock()
            .await
            .question_types
            .set(category, enabled, count);
    }

    pub async fn settings(&self) -> (Subject, QuestionTypes) {
        let view = self.view.lock().await;
        (view.subject, view.question_types.clone())
    }

    //=====================================================================================
    // Generation
    //=====================================================================================

    pub fn request_state(&self) -> RequestState {
        self.orchestrator.state()
    }

    /// Builds a question paper from the main upload list.
    pub async fn generate(&self, custom_instruction: &str) -> CoreResult<Completion> {
        let request = {
            let view = self.view.lock().await;
            let user = view.session.require()?;
            GenerationRequest {
                mode: Mode::Generate,
                subject: view.subject,
                files: view.uploads.files(UploadTarget::Main).to_vec(),
                payload: RequestPayload::Paper {
                    types: view.question_types.clone(),
                    custom_instruction: custom_instruction.to_string(),
                },
                user_id: user.id,
            }
        };
        let image_count = request.files.len();
        let (user_id, subject) = (request.user_id, request.subject);
        let outcome = self.orchestrator.generate(request).await?;

        let result = GenerationResult::new(user_id, Mode::Generate, subject, outcome.text.clone(), image_count);
        self.apply(outcome, result).await
    }

    /// Answers one question from the query and/or the main upload list.
    pub async fn search(&self, query: &str) -> CoreResult<Completion> {
        let request = {
            let view = self.view.lock().await;
            let user = view.session.require()?;
            GenerationRequest {
                mode: Mode::Search,
                subject: view.subject,
                files: view.uploads.files(UploadTarget::Main).to_vec(),
                payload: RequestPayload::Query {
                    text: query.to_string(),
                },
                user_id: user.id,
            }
        };
        let image_count = request.files.len();
        let (user_id, subject) = (request.user_id, request.subject);
        let outcome = self.orchestrator.generate(request).await?;

        let mut result = GenerationResult::new(user_id, Mode::Search, subject, outcome.text.clone(), image_count);
        if !query.trim().is_empty() {
            result.query = Some(query.trim().to_string());
        }
        self.apply(outcome, result).await
    }

    /// Sends one chat message with the chat attachments. The attachments are only
    /// dropped once the reply arrived; a failed send leaves them in place.
    pub async fn chat(&self, text: &str) -> CoreResult<Completion> {
        let request = {
            let view = self.view.lock().await;
            let user = view.session.require()?;
            GenerationRequest {
                mode: Mode::Chat,
                subject: view.subject,
                files: view.uploads.files(UploadTarget::Chat).to_vec(),
                payload: RequestPayload::Query {
                    text: text.to_string(),
                },
                user_id: user.id,
            }
        };
        let sent = request.files.clone();
        let seed = ChatSeed {
            user_id: request.user_id,
            subject: request.subject,
            image_count: sent.len(),
        };
        let outcome = self.orchestrator.generate(request).await?;
        let displayed = self.orchestrator.is_latest(outcome.ticket);

        let mut view = self.view.lock().await;
        ensure_owner(&view, seed.user_id)?;
        view.uploads.discard_sent(UploadTarget::Chat, &sent);
        let result = view
            .history
            .append_chat_turn(
                ChatMessage::user(text.trim()),
                ChatMessage::ai(outcome.text),
                seed,
                displayed,
            )
            .await?;
        self.refresh_user(&mut view).await;
        Ok(Completion { result, displayed })
    }

    /// Rewrites the displayed question paper. The rewrite is a new record that
    /// supersedes the old one; the old one stays in history unchanged.
    pub async fn refine(&self, instruction: &str) -> CoreResult<Completion> {
        let (request, previous) = {
            let view = self.view.lock().await;
            let user = view.session.require()?;
            let previous = view
                .history
                .current()
                .filter(|r| r.mode == Mode::Generate)
                .cloned()
                .ok_or(ValidationError::NothingToRefine)?;
            let request = GenerationRequest {
                mode: Mode::Generate,
                subject: previous.subject,
                files: Vec::new(),
                payload: RequestPayload::Refine {
                    previous: previous.content.clone(),
                    instruction: instruction.to_string(),
                },
                user_id: user.id,
            };
            (request, previous)
        };
        let outcome = self.orchestrator.generate(request).await?;
        let displayed = self.orchestrator.is_latest(outcome.ticket);

        let mut view = self.view.lock().await;
        ensure_owner(&view, previous.user_id)?;
        let refined = GenerationResult::new(
            previous.user_id,
            Mode::Generate,
            previous.subject,
            outcome.text,
            previous.image_count,
        );
        let result = view.history.supersede(previous.id, refined, displayed).await?;
        self.refresh_user(&mut view).await;
        Ok(Completion { result, displayed })
    }

    /// Stores a finished GENERATE/SEARCH result, displaying it only if it is the latest.
    async fn apply(&self, outcome: GenerationOutcome, result: GenerationResult) -> CoreResult<Completion> {
        let displayed = self.orchestrator.is_latest(outcome.ticket);
        let mut view = self.view.lock().await;
        ensure_owner(&view, result.user_id)?;
        if displayed {
            view.history.record_result(result.clone()).await?;
        } else {
            debug!(ticket = outcome.ticket, "Stale completion archived without display.");
            view.history.archive(result.clone()).await?;
        }
        self.refresh_user(&mut view).await;
        Ok(Completion { result, displayed })
    }

    /// Re-reads the signed-in user so the usage counter on display is current.
    async fn refresh_user(&self, view: &mut View) {
        let Some(user_id) = view.session.current().map(|u| u.id) else {
            return;
        };
        match self.services.registry.find(user_id).await {
            Ok(fresh) => {
                if let Err(e) = view.session.establish(fresh).await {
                    warn!("Failed to refresh session user: {}", e);
                }
            }
            Err(e) => warn!(%user_id, "Failed to reload user: {}", e),
        }
    }

    //=====================================================================================
    // Results & history
    //=====================================================================================

    pub async fn current_result(&self) -> Option<GenerationResult> {
        self.view.lock().await.history.current().cloned()
    }

    pub async fn transcript(&self) -> Vec<ChatMessage> {
        self.view.lock().await.history.transcript().to_vec()
    }

    pub async fn history(&self) -> CoreResult<Vec<GenerationResult>> {
        let view = self.view.lock().await;
        view.session.require()?;
        Ok(view.history.entries().to_vec())
    }

    pub async fn select_from_history(&self, id: Uuid) -> CoreResult<GenerationResult> {
        let mut view = self.view.lock().await;
        view.session.require()?;
        view.history.select_from_history(id).cloned()
    }

    pub async fn clear_result(&self) {
        self.view.lock().await.history.clear();
    }

    pub async fn clear_history(&self) -> CoreResult<()> {
        let mut view = self.view.lock().await;
        view.session.require()?;
        view.history.clear_all().await
    }

    //=====================================================================================
    // Export
    //=====================================================================================

    /// Exports a stored result, or the displayed one when `id` is `None`.
    pub async fn export(&self, format: ExportFormat, id: Option<Uuid>) -> CoreResult<ExportOutcome> {
        let content = {
            let view = self.view.lock().await;
            view.session.require()?;
            let result = match id {
                Some(id) => view.history.find(id),
                None => view.history.current(),
            };
            result
                .map(|r| r.content.clone())
                .ok_or_else(|| CoreError::NotFound("result".to_string()))?
        };
        self.exporter.export(&content, format).await
    }

    //=====================================================================================
    // Administration
    //=====================================================================================

    async fn require_admin(&self) -> CoreResult<PublicUser> {
        let view = self.view.lock().await;
        let user = view.session.require()?;
        if !user.is_admin() {
            return Err(CoreError::AdminOnly);
        }
        Ok(user.clone())
    }

    pub async fn list_users(&self) -> CoreResult<Vec<PublicUser>> {
        self.require_admin().await?;
        self.services.registry.list_users().await
    }

    pub async fn update_instruction(&self, text: &str) -> CoreResult<Option<InstructionOverride>> {
        let admin = self.require_admin().await?;
        self.services.instructions.update(text, admin.id).await
    }

    pub async fn instruction(&self) -> CoreResult<Option<InstructionOverride>> {
        self.require_admin().await?;
        Ok(self.services.instructions.current().await)
    }
}

/// A reply that arrives after the user signed out (or switched) is dropped.
fn ensure_owner(view: &View, user_id: Uuid) -> CoreResult<()> {
    match view.history.owner() {
        Some(owner) if owner == user_id => Ok(()),
        _ => {
            warn!(%user_id, "Discarding completion for a user who is no longer signed in.");
            Err(CoreError::NotAuthenticated)
        }
    }
}
