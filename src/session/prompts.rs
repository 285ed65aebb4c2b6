//! User-facing texts for both dialogues.

use super::state::{EngagementStep, OnboardingStep, Step};

pub const ONBOARDING_WELCOME: &str = "👋 Welcome! Let's set up your company.";
pub const ONBOARDING_COMPLETE: &str = "✅ Setup complete! Use /generate to create a PDF.";
pub const ALREADY_ONBOARDED: &str =
    "✅ You're already set up! Use /generate to create a Terms PDF.";
pub const NOT_ONBOARDED: &str = "❗ Please run /start to set up your company info first.";
pub const CANCELLED: &str = "❌ Operation canceled.";
pub const NOTHING_TO_CANCEL: &str = "Nothing to cancel. Use /start or /generate to begin.";
pub const NO_ACTIVE_SESSION: &str =
    "There's no conversation in progress. Use /start to set up or /generate to create a Terms PDF.";
pub const BLANK_ANSWER: &str = "⚠️ That answer was empty.";
pub const DOCUMENT_CAPTION: &str = "📄 Here are your Terms & Conditions.";
pub const SAVE_FAILED: &str =
    "⚠️ Couldn't save your company info. Please send your phone number again to retry.";
pub const RENDER_FAILED: &str =
    "⚠️ Something went wrong creating your document. Please run /generate again.";

pub const HELP: &str = "\
Available commands:
/start - set up your company profile
/generate - create a Terms & Conditions PDF for a client
/cancel - cancel the current conversation
/help - show this message";

/// Prompt asking for the answer to `step`. Empty for terminal steps.
pub fn step_prompt(step: Step) -> &'static str {
    match step {
        Step::Onboarding(step) => match step {
            OnboardingStep::AgencyName => "Enter your Agency/Company name:",
            OnboardingStep::Services => {
                "Enter your services (e.g., Video Editing, Posters, etc):"
            }
            OnboardingStep::Email => "📧 Enter your contact email:",
            OnboardingStep::Phone => "📞 Enter your phone number:",
            OnboardingStep::Complete => "",
        },
        Step::Engagement(step) => match step {
            EngagementStep::ClientName => "👤 Enter Client's Name:",
            EngagementStep::Amount => "💰 Enter the Amount (e.g., ₹3000):",
            EngagementStep::Duration => "⏱️ Enter Time/Duration (e.g., 3 days):",
            EngagementStep::ClientServices => {
                "🛠️ Enter Services you're providing to this client:"
            }
            EngagementStep::Complete => "",
        },
    }
}

/// Opening message of a flow: optional greeting plus the first prompt.
pub fn opening_prompt(step: Step) -> String {
    match step {
        Step::Onboarding(_) => format!("{ONBOARDING_WELCOME}\n{}", step_prompt(step)),
        Step::Engagement(_) => step_prompt(step).to_string(),
    }
}

/// Re-prompt after a blank answer.
pub fn retry_prompt(step: Step) -> String {
    format!("{BLANK_ANSWER} {}", step_prompt(step))
}
