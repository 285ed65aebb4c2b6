//! Dialogue sessions: the per-user state machines for onboarding and
//! engagement.
//!
//! Each user has at most one active session. Onboarding collects the
//! company profile and saves it; engagement collects client details and
//! renders the Terms & Conditions document. Both flows are strictly linear
//! and advance one answer at a time.

pub mod manager;
pub mod model;
pub mod prompts;
pub mod state;

pub use manager::{
    spawn_eviction_task, Cancelled, Completion, RenderedDocument, SessionManager,
    SessionStarted, SubmitOutcome,
};
pub use model::{DialogueSession, EngagementRecord};
pub use state::{EngagementStep, FlowKind, OnboardingStep, Step};
