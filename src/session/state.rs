//! Dialogue state machines: which step of which flow a user is in.

use serde::{Deserialize, Serialize};

/// The two dialogues a user can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Onboarding,
    Engagement,
}

impl FlowKind {
    /// First step of the flow.
    pub fn initial_step(&self) -> Step {
        match self {
            Self::Onboarding => Step::Onboarding(OnboardingStep::AgencyName),
            Self::Engagement => Step::Engagement(EngagementStep::ClientName),
        }
    }
}

impl std::fmt::Display for FlowKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Onboarding => write!(f, "onboarding"),
            Self::Engagement => write!(f, "engagement"),
        }
    }
}

/// Steps of the onboarding flow.
///
/// Progresses linearly: AgencyName → Services → Email → Phone → Complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    AgencyName,
    Services,
    Email,
    Phone,
    Complete,
}

impl OnboardingStep {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: OnboardingStep) -> bool {
        use OnboardingStep::*;
        matches!(
            (self, target),
            (AgencyName, Services) | (Services, Email) | (Email, Phone) | (Phone, Complete)
        )
    }

    pub fn next(&self) -> Option<OnboardingStep> {
        use OnboardingStep::*;
        match self {
            AgencyName => Some(Services),
            Services => Some(Email),
            Email => Some(Phone),
            Phone => Some(Complete),
            Complete => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Profile field filled by the answer to this step.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::AgencyName => Some("agency_name"),
            Self::Services => Some("services"),
            Self::Email => Some("email"),
            Self::Phone => Some("phone"),
            Self::Complete => None,
        }
    }
}

/// Steps of the engagement flow.
///
/// Progresses linearly: ClientName → Amount → Duration → ClientServices →
/// Complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementStep {
    ClientName,
    Amount,
    Duration,
    ClientServices,
    Complete,
}

impl EngagementStep {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: EngagementStep) -> bool {
        use EngagementStep::*;
        matches!(
            (self, target),
            (ClientName, Amount)
                | (Amount, Duration)
                | (Duration, ClientServices)
                | (ClientServices, Complete)
        )
    }

    pub fn next(&self) -> Option<EngagementStep> {
        use EngagementStep::*;
        match self {
            ClientName => Some(Amount),
            Amount => Some(Duration),
            Duration => Some(ClientServices),
            ClientServices => Some(Complete),
            Complete => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Engagement field filled by the answer to this step.
    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::ClientName => Some("client_name"),
            Self::Amount => Some("amount"),
            Self::Duration => Some("duration"),
            Self::ClientServices => Some("client_services"),
            Self::Complete => None,
        }
    }
}

/// A step in either flow. Mixing steps across flows is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "flow", content = "step", rename_all = "snake_case")]
pub enum Step {
    Onboarding(OnboardingStep),
    Engagement(EngagementStep),
}

impl Step {
    pub fn flow(&self) -> FlowKind {
        match self {
            Self::Onboarding(_) => FlowKind::Onboarding,
            Self::Engagement(_) => FlowKind::Engagement,
        }
    }

    pub fn next(&self) -> Option<Step> {
        match self {
            Self::Onboarding(s) => s.next().map(Self::Onboarding),
            Self::Engagement(s) => s.next().map(Self::Engagement),
        }
    }

    pub fn can_transition_to(&self, target: Step) -> bool {
        match (self, target) {
            (Self::Onboarding(from), Self::Onboarding(to)) => from.can_transition_to(to),
            (Self::Engagement(from), Self::Engagement(to)) => from.can_transition_to(to),
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        match self {
            Self::Onboarding(s) => s.is_terminal(),
            Self::Engagement(s) => s.is_terminal(),
        }
    }

    pub fn field(&self) -> Option<&'static str> {
        match self {
            Self::Onboarding(s) => s.field(),
            Self::Engagement(s) => s.field(),
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.field() {
            Some(field) => write!(f, "{}:{field}", self.flow()),
            None => write!(f, "{}:complete", self.flow()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn onboarding_valid_transitions() {
        use OnboardingStep::*;
        for (from, to) in [
            (AgencyName, Services),
            (Services, Email),
            (Email, Phone),
            (Phone, Complete),
        ] {
            assert!(from.can_transition_to(to), "{from:?} should transition to {to:?}");
        }
    }

    #[test]
    fn onboarding_invalid_transitions() {
        use OnboardingStep::*;
        // Skip
        assert!(!AgencyName.can_transition_to(Email));
        // Backward
        assert!(!Email.can_transition_to(Services));
        // Terminal
        assert!(!Complete.can_transition_to(AgencyName));
        // Self-transition
        assert!(!Phone.can_transition_to(Phone));
    }

    #[test]
    fn engagement_invalid_transitions() {
        use EngagementStep::*;
        assert!(!ClientName.can_transition_to(Duration));
        assert!(!ClientServices.can_transition_to(Amount));
        assert!(!Complete.can_transition_to(ClientName));
    }

    #[test]
    fn next_walks_onboarding() {
        let mut step = FlowKind::Onboarding.initial_step();
        let mut fields = Vec::new();
        while let Some(field) = step.field() {
            fields.push(field);
            let next = step.next().unwrap();
            assert!(step.can_transition_to(next));
            step = next;
        }
        assert!(step.is_terminal());
        assert!(step.next().is_none());
        assert_eq!(fields, ["agency_name", "services", "email", "phone"]);
    }

    #[test]
    fn next_walks_engagement() {
        let mut step = FlowKind::Engagement.initial_step();
        let mut fields = Vec::new();
        while let Some(field) = step.field() {
            fields.push(field);
            step = step.next().unwrap();
        }
        assert!(step.is_terminal());
        assert_eq!(fields, ["client_name", "amount", "duration", "client_services"]);
    }

    #[test]
    fn cross_flow_transition_rejected() {
        let from = Step::Onboarding(OnboardingStep::Phone);
        let to = Step::Engagement(EngagementStep::ClientName);
        assert!(!from.can_transition_to(to));
    }

    #[test]
    fn step_reports_its_flow() {
        assert_eq!(FlowKind::Onboarding.initial_step().flow(), FlowKind::Onboarding);
        assert_eq!(FlowKind::Engagement.initial_step().flow(), FlowKind::Engagement);
    }

    #[test]
    fn display_includes_flow_and_field() {
        assert_eq!(
            Step::Onboarding(OnboardingStep::Email).to_string(),
            "onboarding:email"
        );
        assert_eq!(
            Step::Engagement(EngagementStep::Complete).to_string(),
            "engagement:complete"
        );
    }

    #[test]
    fn step_serde_roundtrip() {
        let step = Step::Engagement(EngagementStep::Duration);
        let json = serde_json::to_string(&step).unwrap();
        assert_eq!(json, r#"{"flow":"engagement","step":"duration"}"#);
        let parsed: Step = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, step);
    }
}
