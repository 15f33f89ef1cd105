use serde::{Deserialize, Serialize};

/// FHIR OperationOutcome, as servers return it on failed reads/searches.
///
/// The issue code is kept as a plain string so any server-issued code
/// round-trips; only severity is a closed enum.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcome {
    pub resource_type: String,
    pub issue: Vec<OperationOutcomeIssue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationOutcomeIssue {
    pub severity: IssueSeverity,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Fatal,
    Error,
    Warning,
    Information,
}

impl OperationOutcome {
    /// The first issue's diagnostics, the most useful line for a log entry.
    pub fn first_diagnostics(&self) -> Option<&str> {
        self.issue.first()?.diagnostics.as_deref()
    }

    /// Dig an OperationOutcome payload out of an error message.
    ///
    /// FHIR client layers commonly prefix the serialized outcome with
    /// human text ("Request failed: {...}"); everything from the first
    /// `{` onward is tried as JSON. Plain-text messages yield `None`.
    pub fn from_error_text(message: &str) -> Option<OperationOutcome> {
        let start = message.find('{')?;
        let outcome: OperationOutcome = serde_json::from_str(&message[start..]).ok()?;
        (outcome.resource_type == "OperationOutcome").then_some(outcome)
    }
}
