//! crates/study_assistant_core/src/orchestrator.rs
//!
//! The generation request orchestrator. It validates a request, composes the prompt,
//! routes it to a model tier, and normalizes the reply. Each call is tagged with a
//! monotonically increasing ticket so callers can tell stale completions apart.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::{FilePart, Mode, QuestionTypes, Subject};
use crate::error::{CoreError, CoreResult, ValidationError};
use crate::normalize::clean_response;
use crate::ports::{GenerativeModel, PortError};
use crate::prompt::{build_prompt, resolve_instruction, InstructionSource, ModelTiers, PromptParams};
use crate::registry::UserRegistry;

//=========================================================================================
// Request / Outcome Types
//=========================================================================================

#[derive(Debug, Clone)]
pub enum RequestPayload {
    /// Question-paper authoring.
    Paper {
        types: QuestionTypes,
        custom_instruction: String,
    },
    /// Free text for SEARCH and CHAT.
    Query { text: String },
    /// Rewrite of an earlier paper.
    Refine {
        previous: String,
        instruction: String,
    },
}

#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub mode: Mode,
    pub subject: Subject,
    pub files: Vec<FilePart>,
    pub payload: RequestPayload,
    pub user_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub ticket: u64,
    pub mode: Mode,
    pub model: String,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Idle,
    Pending { mode: Mode, ticket: u64 },
}

/// Checks preconditions. Nothing is sent when this fails.
pub fn validate(request: &GenerationRequest) -> Result<(), ValidationError> {
    match &request.payload {
        RequestPayload::Paper { types, .. } => {
            if request.files.is_empty() {
                return Err(ValidationError::NoFiles);
            }
            if !types.any_enabled() {
                return Err(ValidationError::NoQuestionTypes);
            }
        }
        RequestPayload::Query { text } => {
            if text.trim().is_empty() && request.files.is_empty() {
                return Err(match request.mode {
                    Mode::Chat => ValidationError::EmptyMessage,
                    _ => ValidationError::EmptyQuery,
                });
            }
        }
        RequestPayload::Refine { instruction, .. } => {
            if instruction.trim().is_empty() {
                return Err(ValidationError::EmptyMessage);
            }
        }
    }
    Ok(())
}

fn port_message(e: PortError) -> String {
    match e {
        PortError::Unexpected(msg) | PortError::NotFound(msg) => msg,
        other => other.to_string(),
    }
}

//=========================================================================================
// Orchestrator
//=========================================================================================

pub struct Orchestrator {
    model: Arc<dyn GenerativeModel>,
    registry: UserRegistry,
    instructions: InstructionSource,
    tiers: ModelTiers,
    issued: AtomicU64,
    in_flight: Mutex<Vec<(u64, Mode)>>,
}

/// Removes a ticket from the in-flight list however the call ends.
struct PendingGuard<'a> {
    in_flight: &'a Mutex<Vec<(u64, Mode)>>,
    ticket: u64,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.in_flight.lock() {
            pending.retain(|(t, _)| *t != self.ticket);
        }
    }
}

impl Orchestrator {
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        registry: UserRegistry,
        instructions: InstructionSource,
        tiers: ModelTiers,
    ) -> Self {
        Self {
            model,
            registry,
            instructions,
            tiers,
            issued: AtomicU64::new(0),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    pub async fn generate(&self, request: GenerationRequest) -> CoreResult<GenerationOutcome> {
        validate(&request)?;

        let ticket = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut pending) = self.in_flight.lock() {
            pending.push((ticket, request.mode));
        }
        let _guard = PendingGuard {
            in_flight: &self.in_flight,
            ticket,
        };

        // Resolved once per request.
        let override_record = self.instructions.current().await;
        let instruction = resolve_instruction(override_record.as_ref(), request.mode, request.subject);
        let params = match &request.payload {
            RequestPayload::Paper {
                types,
                custom_instruction,
            } => PromptParams::Paper {
                types,
                custom_instruction,
            },
            RequestPayload::Query { text } => PromptParams::Query { text },
            RequestPayload::Refine {
                previous,
                instruction,
            } => PromptParams::Refine {
                previous,
                instruction,
            },
        };
        let prompt = build_prompt(&instruction, request.subject, &params);
        let model = self.tiers.select(request.subject).to_string();

        info!(
            ticket,
            mode = %request.mode,
            model = %model,
            attachments = request.files.len(),
            "Sending generation request."
        );

        let raw = self
            .model
            .generate_content(&model, &prompt, &request.files)
            .await
            .map_err(|e| {
                error!(ticket, "Generation error: {}", e);
                CoreError::GenerationFailed(port_message(e))
            })?;

        let text = clean_response(&raw);
        if let Err(e) = self.registry.increment_usage(request.user_id).await {
            warn!(ticket, "Failed to record usage: {}", e);
        }

        info!(ticket, chars = text.chars().count(), "Generation completed.");
        Ok(GenerationOutcome {
            ticket,
            mode: request.mode,
            model,
            text,
        })
    }

    /// True when no request was issued after `ticket`.
    pub fn is_latest(&self, ticket: u64) -> bool {
        self.issued.load(Ordering::SeqCst) == ticket
    }

    /// Pending while any call is outstanding; reports the newest one.
    pub fn state(&self) -> RequestState {
        match self.in_flight.lock() {
            Ok(pending) => match pending.iter().max_by_key(|(t, _)| *t) {
                Some((ticket, mode)) => RequestState::Pending {
                    mode: *mode,
                    ticket: *ticket,
                },
                None => RequestState::Idle,
            },
            Err(_) => RequestState::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::QuestionCategory;
    use crate::store::{JsonStore, MemoryStore};
    use crate::testing::{StubModel, Step};

    struct Fixture {
        orchestrator: Orchestrator,
        model: Arc<StubModel>,
        registry: UserRegistry,
        instructions: InstructionSource,
        user_id: Uuid,
    }

    async fn fixture(steps: Vec<Step>) -> Fixture {
        let store = JsonStore::new(Arc::new(MemoryStore::new()));
        let registry = UserRegistry::new(store.clone());
        let user = registry.register("Student", "s@example.com", "pw").await.unwrap();
        let model = Arc::new(StubModel::scripted(steps));
        let instructions = InstructionSource::new(store);
        let orchestrator = Orchestrator::new(
            model.clone(),
            registry.clone(),
            instructions.clone(),
            ModelTiers::default(),
        );
        Fixture {
            orchestrator,
            model,
            registry,
            instructions,
            user_id: user.id,
        }
    }

    fn paper_request(user_id: Uuid, files: Vec<FilePart>, subject: Subject) -> GenerationRequest {
        let mut types = QuestionTypes::default();
        types.set(QuestionCategory::MultipleChoice, true, 5);
        GenerationRequest {
            mode: Mode::Generate,
            subject,
            files,
            payload: RequestPayload::Paper {
                types,
                custom_instruction: String::new(),
            },
            user_id,
        }
    }

    fn page() -> FilePart {
        FilePart::from_bytes(b"img", "image/jpeg", "page.jpg")
    }

    #[tokio::test]
    async fn generate_without_files_never_calls_model() {
        let fx = fixture(vec![]).await;
        for _ in 0..3 {
            let err = fx
                .orchestrator
                .generate(paper_request(fx.user_id, vec![], Subject::General))
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::Validation(ValidationError::NoFiles)));
        }
        assert_eq!(fx.model.calls(), 0);
    }

    #[tokio::test]
    async fn generate_without_enabled_types_is_rejected() {
        let fx = fixture(vec![]).await;
        let mut request = paper_request(fx.user_id, vec![page()], Subject::General);
        request.payload = RequestPayload::Paper {
            types: QuestionTypes::default(),
            custom_instruction: String::new(),
        };
        let err = fx.orchestrator.generate(request).await.unwrap_err();
        assert!(matches!(
            err,
            CoreError::Validation(ValidationError::NoQuestionTypes)
        ));
        assert_eq!(fx.model.calls(), 0);
    }

    #[tokio::test]
    async fn search_and_chat_preconditions() {
        let fx = fixture(vec![]).await;
        let search = GenerationRequest {
            mode: Mode::Search,
            subject: Subject::General,
            files: vec![],
            payload: RequestPayload::Query {
                text: "   ".to_string(),
            },
            user_id: fx.user_id,
        };
        let err = fx.orchestrator.generate(search.clone()).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::EmptyQuery)));

        let chat = GenerationRequest {
            mode: Mode::Chat,
            ..search.clone()
        };
        let err = fx.orchestrator.generate(chat).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::EmptyMessage)));

        // A file alone is enough for SEARCH.
        let with_file = GenerationRequest {
            files: vec![page()],
            ..search
        };
        assert!(validate(&with_file).is_ok());
        assert_eq!(fx.model.calls(), 0);
    }

    #[tokio::test]
    async fn success_cleans_text_routes_model_and_counts_usage() {
        let fx = fixture(vec![Step::reply("**Q1** ...\n\n\n\nQ5 ...")]).await;
        let outcome = fx
            .orchestrator
            .generate(paper_request(fx.user_id, vec![page()], Subject::Math))
            .await
            .unwrap();

        assert_eq!(outcome.text, "Q1 ...\n\nQ5 ...");
        assert_eq!(outcome.model, ModelTiers::default().pro);
        assert_eq!(outcome.ticket, 1);
        assert_eq!(fx.model.calls(), 1);
        assert_eq!(fx.model.last_attachments(), 1);
        assert_eq!(fx.registry.find(fx.user_id).await.unwrap().usage_count, 1);
        assert_eq!(fx.orchestrator.state(), RequestState::Idle);
    }

    #[tokio::test]
    async fn failure_carries_message_and_skips_usage() {
        let fx = fixture(vec![Step::fail("model overloaded")]).await;
        let err = fx
            .orchestrator
            .generate(paper_request(fx.user_id, vec![page()], Subject::Bangla))
            .await
            .unwrap_err();
        match err {
            CoreError::GenerationFailed(msg) => assert_eq!(msg, "model overloaded"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(fx.registry.find(fx.user_id).await.unwrap().usage_count, 0);
        assert_eq!(fx.orchestrator.state(), RequestState::Idle);
    }

    #[tokio::test]
    async fn later_request_makes_earlier_ticket_stale() {
        let fx = fixture(vec![Step::reply("one"), Step::reply("two")]).await;
        let first = fx
            .orchestrator
            .generate(paper_request(fx.user_id, vec![page()], Subject::General))
            .await
            .unwrap();
        assert!(fx.orchestrator.is_latest(first.ticket));
        let second = fx
            .orchestrator
            .generate(paper_request(fx.user_id, vec![page()], Subject::General))
            .await
            .unwrap();
        assert!(!fx.orchestrator.is_latest(first.ticket));
        assert!(fx.orchestrator.is_latest(second.ticket));
        assert_eq!(second.model, ModelTiers::default().flash);
    }

    #[tokio::test]
    async fn prompt_carries_override_and_selected_counts() {
        let fx = fixture(vec![]).await;
        fx.orchestrator
            .generate(paper_request(fx.user_id, vec![page()], Subject::General))
            .await
            .unwrap();

        fx.instructions
            .update("কেবল বহুনির্বাচনী প্রশ্ন লেখো।", fx.user_id)
            .await
            .unwrap();
        fx.orchestrator
            .generate(paper_request(fx.user_id, vec![page()], Subject::General))
            .await
            .unwrap();

        let prompts = fx.model.prompts();
        assert_eq!(prompts.len(), 2);
        let selected = format!("{}: 5টি", QuestionCategory::MultipleChoice.label());
        assert!(prompts.iter().all(|p| p.contains(&selected)));
        assert!(!prompts[0].contains("কেবল বহুনির্বাচনী প্রশ্ন লেখো।"));
        assert!(prompts[1].starts_with("কেবল বহুনির্বাচনী প্রশ্ন লেখো।\n"));
    }
}
