//! Turn submission and history protocols.
//!
//! A submission walks `Received → Admitted → UserTurnPersisted → WindowBuilt →
//! AwaitingProvider` and ends in `Completed` or `Failed`. The user turn is
//! durable before the provider is contacted, and a provider failure never
//! produces an assistant turn. There is exactly one provider call per
//! submission and no step is retried.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::core::completion::{CompletionError, CompletionProvider, Modality};
use crate::core::context::ContextWindowBuilder;
use crate::core::rate_limiter::{Admission, RouteClass, TrafficShaper};
use crate::core::storage::{ProjectDirectory, TranscriptStore};
use crate::models::project::Project;
use crate::models::turn::{NewTurn, Turn};

/// Stored as the user turn's content when only an image was sent.
pub const IMAGE_ONLY_CONTENT: &str = "Image analysis request";

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("rate limit exceeded for {route}")]
    RateLimited {
        route: RouteClass,
        retry_after: Duration,
    },

    #[error("project not found")]
    NotFound,

    #[error("completion provider timed out")]
    Timeout,

    #[error("completion provider throttled the request")]
    ProviderThrottled,

    #[error("completion provider failure: {0}")]
    ProviderFailure(String),

    #[error("internal failure: {0}")]
    InternalFailure(String),
}

impl From<CompletionError> for GatewayError {
    fn from(err: CompletionError) -> Self {
        match err {
            CompletionError::Timeout(_) => GatewayError::Timeout,
            CompletionError::Throttled(_) => GatewayError::ProviderThrottled,
            CompletionError::Failure(detail) => GatewayError::ProviderFailure(detail),
        }
    }
}

fn internal(context: &str, err: anyhow::Error) -> GatewayError {
    error!("{}: {:#}", context, err);
    GatewayError::InternalFailure(format!("{context}: {err:#}"))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SubmissionState {
    Received,
    Admitted,
    UserTurnPersisted,
    WindowBuilt,
    AwaitingProvider,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    pub message: Option<String>,
    pub image_url: Option<String>,
}

/// Every state a submission passed through, plus its terminal result.
#[derive(Debug)]
pub struct SubmissionOutcome {
    pub trail: Vec<SubmissionState>,
    pub result: Result<Turn, GatewayError>,
}

impl SubmissionOutcome {
    pub fn last_state(&self) -> SubmissionState {
        self.trail
            .last()
            .copied()
            .unwrap_or(SubmissionState::Received)
    }

    /// Last state reached before the terminal one.
    pub fn reached(&self) -> SubmissionState {
        self.trail
            .iter()
            .rev()
            .find(|s| !matches!(s, SubmissionState::Completed | SubmissionState::Failed))
            .copied()
            .unwrap_or(SubmissionState::Received)
    }
}

struct Submission {
    project_id: String,
    trail: Vec<SubmissionState>,
    started: Instant,
}

impl Submission {
    fn start(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            trail: vec![SubmissionState::Received],
            started: Instant::now(),
        }
    }

    fn advance(&mut self, state: SubmissionState) {
        debug!(project_id = %self.project_id, ?state, "Submission advanced");
        self.trail.push(state);
    }

    fn complete(mut self, turn: Turn) -> SubmissionOutcome {
        self.advance(SubmissionState::Completed);
        info!(
            project_id = %self.project_id,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "Submission completed"
        );
        SubmissionOutcome {
            trail: self.trail,
            result: Ok(turn),
        }
    }

    fn fail(mut self, err: GatewayError) -> SubmissionOutcome {
        let reached = self.trail.last().copied();
        self.advance(SubmissionState::Failed);
        warn!(
            project_id = %self.project_id,
            ?reached,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            error = %err,
            "Submission failed"
        );
        SubmissionOutcome {
            trail: self.trail,
            result: Err(err),
        }
    }
}

/// Composes admission control, transcript persistence, window construction
/// and the provider call. Cheap to clone; all collaborators are shared.
#[derive(Clone)]
pub struct Gateway {
    transcripts: Arc<dyn TranscriptStore>,
    projects: Arc<dyn ProjectDirectory>,
    shaper: Arc<TrafficShaper>,
    provider: Arc<dyn CompletionProvider>,
    window: ContextWindowBuilder,
    history_limit: usize,
}

impl Gateway {
    pub fn new(
        transcripts: Arc<dyn TranscriptStore>,
        projects: Arc<dyn ProjectDirectory>,
        shaper: Arc<TrafficShaper>,
        provider: Arc<dyn CompletionProvider>,
        window: ContextWindowBuilder,
        history_limit: usize,
    ) -> Self {
        Self {
            transcripts,
            projects,
            shaper,
            provider,
            window,
            history_limit,
        }
    }

    /// Resolve a project for `caller`. Unknown and foreign projects are
    /// indistinguishable.
    pub async fn authorize(&self, caller: &str, project_id: &str) -> Result<Project, GatewayError> {
        self.projects
            .find_owned(project_id, caller)
            .await
            .map_err(|e| internal("Failed to look up project", e))?
            .ok_or(GatewayError::NotFound)
    }

    pub async fn submit(
        &self,
        caller: &str,
        project_id: &str,
        request: TurnRequest,
    ) -> SubmissionOutcome {
        let mut submission = Submission::start(project_id);

        let message = request.message.filter(|m| !m.trim().is_empty());
        let image_url = request.image_url.filter(|u| !u.trim().is_empty());

        if message.is_none() && image_url.is_none() {
            return submission.fail(GatewayError::InvalidRequest(
                "Message or image required".to_string(),
            ));
        }

        info!(
            project_id,
            caller,
            message_length = message.as_ref().map(|m| m.chars().count()).unwrap_or(0),
            has_image = image_url.is_some(),
            "Chat request"
        );

        if let Admission::Denied { retry_after } =
            self.shaper.admit(caller, RouteClass::TurnSubmission)
        {
            return submission.fail(GatewayError::RateLimited {
                route: RouteClass::TurnSubmission,
                retry_after,
            });
        }
        submission.advance(SubmissionState::Admitted);

        let project = match self.authorize(caller, project_id).await {
            Ok(project) => project,
            Err(e) => return submission.fail(e),
        };

        let user_turn = NewTurn::user(
            message
                .clone()
                .unwrap_or_else(|| IMAGE_ONLY_CONTENT.to_string()),
            image_url.clone(),
        );
        if let Err(e) = self.transcripts.append(&project.id, user_turn).await {
            return submission.fail(internal("Failed to persist user turn", e));
        }
        submission.advance(SubmissionState::UserTurnPersisted);

        let window = match self
            .window
            .build(
                self.transcripts.as_ref(),
                &project,
                message.as_deref(),
                image_url.as_deref(),
            )
            .await
        {
            Ok(window) => window,
            Err(e) => return submission.fail(internal("Failed to read transcript", e)),
        };
        submission.advance(SubmissionState::WindowBuilt);

        let modality = Modality::for_request(image_url.as_deref());
        submission.advance(SubmissionState::AwaitingProvider);

        let reply = match self.provider.complete(&window, modality).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(
                    project_id,
                    ?modality,
                    window_len = window.len(),
                    error = %e,
                    "Completion provider call failed"
                );
                return submission.fail(e.into());
            },
        };

        match self
            .transcripts
            .append(&project.id, NewTurn::assistant(reply))
            .await
        {
            Ok(turn) => submission.complete(turn),
            Err(e) => submission.fail(internal("Failed to persist assistant turn", e)),
        }
    }

    /// Most recent turns of an authorized project, oldest first.
    pub async fn history(&self, project: &Project) -> Result<Vec<Turn>, GatewayError> {
        self.transcripts
            .history(&project.id, self.history_limit)
            .await
            .map_err(|e| internal("Failed to fetch messages", e))
    }

    pub async fn fetch_history(
        &self,
        caller: &str,
        project_id: &str,
    ) -> Result<Vec<Turn>, GatewayError> {
        let project = self.authorize(caller, project_id).await?;
        self.history(&project).await
    }

    /// Irreversibly delete every turn of a project.
    pub async fn clear_history(&self, caller: &str, project_id: &str) -> Result<usize, GatewayError> {
        let project = self.authorize(caller, project_id).await?;
        self.transcripts
            .clear(&project.id)
            .await
            .map_err(|e| internal("Failed to clear messages", e))
    }
}
