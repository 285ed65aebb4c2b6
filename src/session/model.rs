//! Session and engagement data models.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::error::RenderError;
use crate::profile::CompanyProfile;

use super::state::{FlowKind, Step};

/// Client and contract details collected by one engagement flow.
///
/// Lives only until the terms document has been rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngagementRecord {
    pub client_name: String,
    pub amount: String,
    pub duration: String,
    pub client_services: String,
}

impl EngagementRecord {
    /// Name of the first blank field, if any.
    pub fn first_missing_field(&self) -> Option<&'static str> {
        [
            ("client_name", &self.client_name),
            ("amount", &self.amount),
            ("duration", &self.duration),
            ("client_services", &self.client_services),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}

/// An in-progress dialogue for one user.
#[derive(Debug, Clone)]
pub struct DialogueSession {
    /// Current step. Never terminal while the session is held by the manager.
    pub step: Step,
    /// Collected answers keyed by field name.
    pub answers: BTreeMap<&'static str, String>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

impl DialogueSession {
    pub fn new(flow: FlowKind) -> Self {
        let now = Utc::now();
        Self {
            step: flow.initial_step(),
            answers: BTreeMap::new(),
            started_at: now,
            last_activity: now,
        }
    }

    pub fn flow(&self) -> FlowKind {
        self.step.flow()
    }

    /// Store the answer for the current step's field.
    pub fn record(&mut self, answer: &str) {
        if let Some(field) = self.step.field() {
            self.answers.insert(field, answer.to_string());
        }
    }

    /// Advance to the next step. Returns an error if already terminal.
    pub fn advance(&mut self) -> Result<Step, String> {
        let next = self
            .step
            .next()
            .ok_or_else(|| "Already at terminal step".to_string())?;
        if !self.step.can_transition_to(next) {
            return Err(format!("Cannot transition from {} to {}", self.step, next));
        }
        self.step = next;
        Ok(next)
    }

    pub fn touch(&mut self) {
        self.last_activity = Utc::now();
    }

    /// Time since the flow was entered.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.started_at
    }

    fn answer(&self, field: &'static str) -> Result<String, RenderError> {
        self.answers
            .get(field)
            .filter(|v| !v.trim().is_empty())
            .cloned()
            .ok_or(RenderError::MissingField { field })
    }

    /// Assemble the company profile from onboarding answers.
    pub fn to_profile(&self) -> Result<CompanyProfile, RenderError> {
        Ok(CompanyProfile {
            agency_name: self.answer("agency_name")?,
            services: self.answer("services")?,
            email: self.answer("email")?,
            phone: self.answer("phone")?,
        })
    }

    /// Assemble the engagement record from engagement answers.
    pub fn to_engagement(&self) -> Result<EngagementRecord, RenderError> {
        Ok(EngagementRecord {
            client_name: self.answer("client_name")?,
            amount: self.answer("amount")?,
            duration: self.answer("duration")?,
            client_services: self.answer("client_services")?,
        })
    }
}
