//! Inbound text classification: bot commands versus free-text answers.

use std::sync::LazyLock;

use regex::Regex;

/// `/name` or `/name@botname`, followed by whitespace or end of input.
static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/([A-Za-z0-9_]+)(?:@[A-Za-z0-9_]+)?(?:\s|$)").unwrap()
});

/// Commands the bot understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Enter the onboarding flow.
    Start,
    /// Enter the engagement flow.
    Generate,
    Cancel,
    Help,
    Unknown(String),
}

impl Command {
    fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "start" => Self::Start,
            "generate" => Self::Generate,
            "cancel" => Self::Cancel,
            "help" => Self::Help,
            _ => Self::Unknown(name.to_string()),
        }
    }
}

/// A classified inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Command(Command),
    Text(String),
}

/// Classify a message. Anything that does not look like a command is an
/// answer, including text that merely starts with `/` such as `/path/to/x`.
pub fn parse(text: &str) -> Inbound {
    match COMMAND_RE.captures(text.trim_start()) {
        Some(caps) => Inbound::Command(Command::from_name(&caps[1])),
        None => Inbound::Text(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_commands() {
        assert_eq!(parse("/start"), Inbound::Command(Command::Start));
        assert_eq!(parse("/generate"), Inbound::Command(Command::Generate));
        assert_eq!(parse("/cancel"), Inbound::Command(Command::Cancel));
        assert_eq!(parse("/help"), Inbound::Command(Command::Help));
    }

    #[test]
    fn bot_suffix_and_arguments_are_ignored() {
        assert_eq!(parse("/start@TermsBot"), Inbound::Command(Command::Start));
        assert_eq!(parse("/generate now please"), Inbound::Command(Command::Generate));
        assert_eq!(parse("  /cancel"), Inbound::Command(Command::Cancel));
    }

    #[test]
    fn command_names_are_case_insensitive() {
        assert_eq!(parse("/START"), Inbound::Command(Command::Start));
    }

    #[test]
    fn unknown_command() {
        assert_eq!(
            parse("/frobnicate"),
            Inbound::Command(Command::Unknown("frobnicate".to_string()))
        );
    }

    #[test]
    fn plain_text_is_an_answer() {
        assert_eq!(parse("Acme"), Inbound::Text("Acme".to_string()));
        assert_eq!(parse("₹3000"), Inbound::Text("₹3000".to_string()));
        assert_eq!(parse(""), Inbound::Text(String::new()));
    }

    #[test]
    fn slash_text_that_is_not_a_command_is_an_answer() {
        assert_eq!(parse("/path/to/x"), Inbound::Text("/path/to/x".to_string()));
        assert_eq!(parse("/ hello"), Inbound::Text("/ hello".to_string()));
        assert_eq!(parse("a/b"), Inbound::Text("a/b".to_string()));
    }
}
