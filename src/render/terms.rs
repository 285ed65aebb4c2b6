//! Terms & Conditions document model and renderer.

use crate::error::RenderError;
use crate::profile::CompanyProfile;
use crate::session::EngagementRecord;

/// A titled block of lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub heading: Option<String>,
    pub lines: Vec<String>,
}

/// A rendered Terms & Conditions document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TermsDocument {
    pub title: String,
    pub sections: Vec<Section>,
}

/// The fixed terms block. `duration` and `amount` come from the engagement.
pub fn standard_terms(duration: &str, amount: &str) -> Vec<String> {
    vec![
        "- A 50% advance is required to begin work.".to_string(),
        format!("- Work will be delivered in approximately {duration}."),
        format!("- Final delivery after full payment of {amount}."),
        "- Max 2 rounds of revisions allowed.".to_string(),
        "- No refund after final delivery.".to_string(),
        "- Communication must be clear to avoid delays.".to_string(),
    ]
}

/// Render the terms document for one engagement.
///
/// Pure and deterministic: the same inputs always give the same document.
pub fn render(
    profile: &CompanyProfile,
    engagement: &EngagementRecord,
) -> Result<TermsDocument, RenderError> {
    if let Some(field) = profile
        .first_missing_field()
        .or_else(|| engagement.first_missing_field())
    {
        return Err(RenderError::MissingField { field });
    }

    let client = Section {
        heading: None,
        lines: vec![
            format!("Client Name: {}", engagement.client_name),
            format!("Amount: {}", engagement.amount),
            format!("Duration: {}", engagement.duration),
            format!("Service(s): {}", engagement.client_services),
        ],
    };

    let agency = Section {
        heading: Some("Agency Info:".to_string()),
        lines: vec![
            format!("Name: {}", profile.agency_name),
            format!("Email: {}", profile.email),
            format!("Phone: {}", profile.phone),
            format!("Services Offered: {}", profile.services),
        ],
    };

    let terms = Section {
        heading: None,
        lines: standard_terms(&engagement.duration, &engagement.amount),
    };

    Ok(TermsDocument {
        title: format!("{} - Terms & Conditions", profile.agency_name),
        sections: vec![client, agency, terms],
    })
}

impl TermsDocument {
    /// Plain-text rendering: title, then sections separated by blank lines.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.title);
        out.push('\n');
        for section in &self.sections {
            out.push('\n');
            if let Some(ref heading) = section.heading {
                out.push_str(heading);
                out.push('\n');
            }
            for line in &section.lines {
                out.push_str(line);
                out.push('\n');
            }
        }
        out
    }

    /// Encode the document as a PDF.
    pub fn to_pdf(&self) -> Result<Vec<u8>, RenderError> {
        super::pdf::encode(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn acme() -> CompanyProfile {
        CompanyProfile {
            agency_name: "Acme".to_string(),
            services: "Video Editing".to_string(),
            email: "a@acme.com".to_string(),
            phone: "555-0100".to_string(),
        }
    }

    fn bob() -> EngagementRecord {
        EngagementRecord {
            client_name: "Bob".to_string(),
            amount: "₹3000".to_string(),
            duration: "3 days".to_string(),
            client_services: "Logo design".to_string(),
        }
    }

    const EXPECTED_TERMS: &str = "\
- A 50% advance is required to begin work.
- Work will be delivered in approximately 3 days.
- Final delivery after full payment of ₹3000.
- Max 2 rounds of revisions allowed.
- No refund after final delivery.
- Communication must be clear to avoid delays.
";

    #[test]
    fn document_contains_all_fields() {
        let text = render(&acme(), &bob()).unwrap().to_text();
        assert!(text.starts_with("Acme - Terms & Conditions\n"));
        assert!(text.contains("Client Name: Bob"));
        assert!(text.contains("Amount: ₹3000"));
        assert!(text.contains("Duration: 3 days"));
        assert!(text.contains("Service(s): Logo design"));
        assert!(text.contains("Agency Info:\nName: Acme\n"));
        assert!(text.contains("Email: a@acme.com"));
        assert!(text.contains("Phone: 555-0100"));
        assert!(text.contains("Services Offered: Video Editing"));
    }

    #[test]
    fn terms_block_is_verbatim() {
        let text = render(&acme(), &bob()).unwrap().to_text();
        assert!(text.ends_with(EXPECTED_TERMS), "got:\n{text}");
    }

    #[test]
    fn render_is_deterministic() {
        let a = render(&acme(), &bob()).unwrap();
        let b = render(&acme(), &bob()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn missing_profile_field_fails() {
        let profile = CompanyProfile {
            phone: String::new(),
            ..acme()
        };
        let err = render(&profile, &bob()).unwrap_err();
        assert!(matches!(err, RenderError::MissingField { field: "phone" }));
    }

    #[test]
    fn missing_engagement_field_fails() {
        let engagement = EngagementRecord {
            client_name: "  ".to_string(),
            ..bob()
        };
        let err = render(&acme(), &engagement).unwrap_err();
        assert!(matches!(err, RenderError::MissingField { field: "client_name" }));
    }
}
