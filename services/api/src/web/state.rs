//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-browser workspaces.
//!
//! Only workspaces with a signed-in user are kept between requests. Anything else
//! lives for a single request; an idle workspace is evicted and rebuilt from its
//! mirrored session the next time its cookie is seen.

use crate::adapters::{BufferedClipboard, ReportedCamera};
use crate::config::Config;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use study_assistant_core::{CoreResult, Services, StudyAssistant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub services: Services,
    workspaces: Arc<RwLock<HashMap<String, Arc<Workspace>>>>,
}

//=========================================================================================
// Workspace (Specific to One Browser Instance)
//=========================================================================================

/// Everything one browser instance owns: its assistant and the adapters that
/// stand in for its camera and clipboard.
pub struct Workspace {
    pub id: String,
    pub assistant: StudyAssistant,
    pub camera: Arc<ReportedCamera>,
    pub clipboard: Arc<BufferedClipboard>,
    last_seen: Mutex<Instant>,
}

impl Workspace {
    fn touch(&self) {
        if let Ok(mut last_seen) = self.last_seen.lock() {
            *last_seen = Instant::now();
        }
    }

    fn idle_since(&self) -> Option<Instant> {
        self.last_seen.lock().ok().map(|t| *t)
    }
}

impl AppState {
    pub fn new(config: Arc<Config>, services: Services) -> Self {
        Self {
            config,
            services,
            workspaces: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Seeds the administrator account, with the default password when none is configured.
    pub async fn seed_admin(&self) -> CoreResult<()> {
        if self.config.admin_password.is_none() {
            warn!(
                admin = %self.config.admin_email,
                "ADMIN_PASSWORD not set; the administrator uses the default password."
            );
        }
        self.services
            .registry
            .bootstrap(&self.config.admin_email, self.config.admin_password())
            .await
    }

    /// The kept workspace for `id`, or a new one that picks up whatever session was
    /// mirrored for that id. A new workspace is not kept until `settle` says so.
    pub async fn workspace(&self, id: &str) -> CoreResult<Arc<Workspace>> {
        if let Some(existing) = self.workspaces.read().await.get(id) {
            existing.touch();
            return Ok(existing.clone());
        }

        let clipboard = Arc::new(BufferedClipboard::default());
        let services = self.services.clone().with_clipboard(clipboard.clone());
        let workspace = Arc::new(Workspace {
            id: id.to_string(),
            assistant: StudyAssistant::new(services, id),
            camera: Arc::new(ReportedCamera::default()),
            clipboard,
            last_seen: Mutex::new(Instant::now()),
        });
        workspace.assistant.start().await?;
        Ok(workspace)
    }

    /// Keeps the workspace while someone is signed in to it and drops it otherwise.
    /// Returns whether it is kept.
    pub async fn settle(&self, workspace: &Arc<Workspace>) -> bool {
        let signed_in = workspace.assistant.current_user().await.is_some();
        let mut workspaces = self.workspaces.write().await;
        if signed_in {
            workspaces
                .entry(workspace.id.clone())
                .or_insert_with(|| workspace.clone());
            true
        } else {
            if workspaces.remove(&workspace.id).is_some() {
                debug!(workspace = %workspace.id, "Workspace released.");
            }
            false
        }
    }

    pub async fn workspace_count(&self) -> usize {
        self.workspaces.read().await.len()
    }

    /// Drops every workspace not used since `now - config.workspace_idle`.
    pub async fn evict_idle_at(&self, now: Instant) -> usize {
        let idle = self.config.workspace_idle;
        let mut workspaces = self.workspaces.write().await;
        let before = workspaces.len();
        workspaces.retain(|_, ws| match ws.idle_since() {
            Some(seen) => now.saturating_duration_since(seen) < idle,
            None => false,
        });
        let evicted = before - workspaces.len();
        if evicted > 0 {
            info!(evicted, remaining = workspaces.len(), "Evicted idle workspaces.");
        }
        evicted
    }

    pub async fn evict_idle(&self) -> usize {
        self.evict_idle_at(Instant::now()).await
    }
}
