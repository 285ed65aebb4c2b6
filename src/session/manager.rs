//! SessionManager: owns every in-progress dialogue and drives both flows.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::artifacts::document_file_name;
use crate::error::{FlowError, RenderError};
use crate::profile::{CompanyProfile, ProfileStore, UserId};
use crate::render;

use super::model::DialogueSession;
use super::prompts::{opening_prompt, retry_prompt, step_prompt};
use super::state::{FlowKind, Step};

/// A flow was entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStarted {
    pub flow: FlowKind,
    /// Greeting and first question.
    pub prompt: String,
}

/// The active session was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancelled {
    pub flow: FlowKind,
}

/// The rendered terms document, ready for delivery.
#[derive(Debug, Clone)]
pub struct RenderedDocument {
    pub file_name: String,
    /// Plain-text rendering of the document.
    pub text: String,
    /// PDF bytes.
    pub bytes: Vec<u8>,
}

/// What a terminal step produced.
#[derive(Debug, Clone)]
pub enum Completion {
    /// Onboarding finished and the profile was saved.
    Onboarded(CompanyProfile),
    /// Engagement finished and the document was rendered.
    Document(RenderedDocument),
}

/// Result of feeding one answer to a session.
#[derive(Debug, Clone)]
pub enum SubmitOutcome {
    /// The answer was stored; ask the next question.
    NextPrompt { step: Step, prompt: String },
    /// The answer was blank; the same question is asked again.
    Retry { step: Step, prompt: String },
    /// The flow reached its terminal step.
    Completed(Completion),
}

type Slot = Arc<Mutex<Option<DialogueSession>>>;

/// Per-user dialogue table.
///
/// Each user gets a slot guarded by its own async mutex, so one user's
/// store write or render never blocks another user. The table lock is
/// held only to look slots up or drop empty ones.
pub struct SessionManager {
    store: Arc<dyn ProfileStore>,
    slots: Mutex<HashMap<UserId, Slot>>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self {
            store,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Start the onboarding flow. Fails if the user already has a profile.
    pub async fn begin_onboarding(&self, user: &UserId) -> Result<SessionStarted, FlowError> {
        self.begin(user, FlowKind::Onboarding).await
    }

    /// Start the engagement flow. Fails if the user has no profile yet.
    pub async fn begin_engagement(&self, user: &UserId) -> Result<SessionStarted, FlowError> {
        self.begin(user, FlowKind::Engagement).await
    }

    /// Feed a free-text answer to the user's active session.
    ///
    /// The terminal action (saving the profile, rendering the document)
    /// runs inside this call. If saving fails the session stays on its
    /// last step so the user can resend the answer.
    pub async fn submit_answer(
        &self,
        user: &UserId,
        text: &str,
    ) -> Result<SubmitOutcome, FlowError> {
        let slot = self.slot(user).await;
        let result = {
            let mut guard = slot.lock().await;
            self.apply_answer(user, &mut guard, text).await
        };
        self.release(user, slot).await;
        result
    }

    /// Discard the user's active session.
    pub async fn cancel(&self, user: &UserId) -> Result<Cancelled, FlowError> {
        let slot = self.slot(user).await;
        let result = {
            let mut guard = slot.lock().await;
            guard
                .take()
                .map(|session| Cancelled {
                    flow: session.flow(),
                })
                .ok_or(FlowError::NoActiveSession)
        };
        if let Ok(ref cancelled) = result {
            tracing::info!(user_id = %user, flow = %cancelled.flow, "Session cancelled");
        }
        self.release(user, slot).await;
        result
    }

    /// Current step of the user's session, if one is active.
    pub async fn active_step(&self, user: &UserId) -> Option<Step> {
        let slot = self.slots.lock().await.get(user).cloned()?;
        let guard = slot.lock().await;
        guard.as_ref().map(|s| s.step)
    }

    /// Number of users with an active session.
    pub async fn active_count(&self) -> usize {
        let slots = self.slots.lock().await;
        slots
            .values()
            .filter(|slot| slot.try_lock().map(|g| g.is_some()).unwrap_or(true))
            .count()
    }

    /// Drop sessions idle for longer than `max_idle`. Sessions busy with a
    /// message are skipped. Returns how many were evicted.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let Ok(limit) = chrono::Duration::from_std(max_idle) else {
            return 0;
        };
        let cutoff = Utc::now() - limit;

        let mut slots = self.slots.lock().await;
        let mut evicted = 0;
        for (user, slot) in slots.iter() {
            let Ok(mut guard) = slot.try_lock() else {
                continue;
            };
            if guard.as_ref().is_some_and(|s| s.last_activity < cutoff) {
                if let Some(session) = guard.take() {
                    tracing::info!(
                        user_id = %user,
                        flow = %session.flow(),
                        step = %session.step,
                        age_secs = session.age().num_seconds(),
                        "Evicted idle session"
                    );
                    evicted += 1;
                }
            }
        }
        slots.retain(|_, slot| !is_reclaimable(slot, 1));
        evicted
    }

    async fn begin(&self, user: &UserId, flow: FlowKind) -> Result<SessionStarted, FlowError> {
        let slot = self.slot(user).await;
        let result = {
            let mut guard = slot.lock().await;
            self.start_session(user, &mut guard, flow).await
        };
        self.release(user, slot).await;
        result
    }

    async fn start_session(
        &self,
        user: &UserId,
        guard: &mut Option<DialogueSession>,
        flow: FlowKind,
    ) -> Result<SessionStarted, FlowError> {
        let onboarded = self.store.get(user).await.is_some();
        match flow {
            FlowKind::Onboarding if onboarded => return Err(FlowError::AlreadyOnboarded),
            FlowKind::Engagement if !onboarded => return Err(FlowError::NotOnboarded),
            _ => {}
        }
        if let Some(active) = guard.as_ref() {
            return Err(FlowError::SessionInProgress {
                flow: active.flow(),
            });
        }

        let session = DialogueSession::new(flow);
        let prompt = opening_prompt(session.step);
        tracing::info!(user_id = %user, flow = %flow, "Session started");
        *guard = Some(session);
        Ok(SessionStarted { flow, prompt })
    }

    async fn apply_answer(
        &self,
        user: &UserId,
        guard: &mut Option<DialogueSession>,
        text: &str,
    ) -> Result<SubmitOutcome, FlowError> {
        let session = guard.as_mut().ok_or(FlowError::NoActiveSession)?;
        session.touch();

        let answer = text.trim();
        if answer.is_empty() {
            tracing::debug!(user_id = %user, step = %session.step, "Blank answer, re-prompting");
            return Ok(SubmitOutcome::Retry {
                step: session.step,
                prompt: retry_prompt(session.step),
            });
        }

        let mut draft = session.clone();
        draft.record(answer);
        let step = match draft.advance() {
            Ok(step) => step,
            Err(e) => {
                tracing::warn!(user_id = %user, "Dropping session in invalid state: {e}");
                *guard = None;
                return Err(FlowError::NoActiveSession);
            }
        };
        tracing::debug!(user_id = %user, step = %step, "Answer recorded");

        if !step.is_terminal() {
            *guard = Some(draft);
            return Ok(SubmitOutcome::NextPrompt {
                step,
                prompt: step_prompt(step).to_string(),
            });
        }

        match step.flow() {
            FlowKind::Onboarding => {
                let profile = draft.to_profile()?;
                if let Err(e) = self.store.put(user, profile.clone()).await {
                    tracing::warn!(user_id = %user, "Failed to save profile: {e}");
                    return Err(e.into());
                }
                *guard = None;
                tracing::info!(
                    user_id = %user,
                    agency = %profile.agency_name,
                    elapsed_secs = draft.age().num_seconds(),
                    "Onboarding complete"
                );
                Ok(SubmitOutcome::Completed(Completion::Onboarded(profile)))
            }
            FlowKind::Engagement => {
                // Render failures end the session.
                *guard = None;
                let document = self.render_document(user, &draft).await.inspect_err(|e| {
                    tracing::warn!(user_id = %user, "Failed to render terms document: {e}");
                })?;
                tracing::info!(
                    user_id = %user,
                    file = %document.file_name,
                    bytes = document.bytes.len(),
                    elapsed_secs = draft.age().num_seconds(),
                    "Terms document rendered"
                );
                Ok(SubmitOutcome::Completed(Completion::Document(document)))
            }
        }
    }

    async fn render_document(
        &self,
        user: &UserId,
        session: &DialogueSession,
    ) -> Result<RenderedDocument, RenderError> {
        let profile = self.store.get(user).await.ok_or(RenderError::MissingProfile)?;
        let engagement = session.to_engagement()?;
        let document = render::render(&profile, &engagement)?;
        Ok(RenderedDocument {
            file_name: document_file_name(user),
            text: document.to_text(),
            bytes: document.to_pdf()?,
        })
    }

    async fn slot(&self, user: &UserId) -> Slot {
        let mut slots = self.slots.lock().await;
        Arc::clone(slots.entry(user.clone()).or_default())
    }

    /// Drop the user's slot from the table if it is empty and unused.
    async fn release(&self, user: &UserId, slot: Slot) {
        let mut slots = self.slots.lock().await;
        // Held by the table and by `slot`.
        if is_reclaimable(&slot, 2) {
            slots.remove(user);
        }
    }
}

/// Slots are only cloned under the table lock, so with that lock held a
/// strong count of `owners` means nobody else can reach the slot.
fn is_reclaimable(slot: &Slot, owners: usize) -> bool {
    Arc::strong_count(slot) == owners
        && slot.try_lock().map(|g| g.is_none()).unwrap_or(false)
}

/// Spawn a background task that periodically evicts idle sessions.
pub fn spawn_eviction_task(
    manager: Arc<SessionManager>,
    max_idle: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            let evicted = manager.evict_idle(max_idle).await;
            if evicted > 0 {
                tracing::info!(evicted, "Idle session sweep");
            }
        }
    })
}
