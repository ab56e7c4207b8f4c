use crate::error::{AuditError, Result};
use serde::{Deserialize, Serialize};

/// Message returned to callers that did not supply any source text.
pub const NO_SOURCE_MESSAGE: &str = "No source code provided";

/// Wire shape of an inbound analysis call.
///
/// `code` is accepted as an alias for `sourceText` so older front-ends keep working.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzePayload {
    #[serde(default, alias = "code")]
    source_text: Option<String>,
}

/// A validated request to audit one contract. Owned by a single pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    source_text: String,
}

impl AnalysisRequest {
    /// Validate an already-extracted source string.
    pub fn new(source_text: impl Into<String>) -> Result<Self> {
        let source_text = source_text.into();
        if source_text.trim().is_empty() {
            return Err(AuditError::no_source());
        }
        Ok(Self { source_text })
    }

    /// Parse and validate a raw request body.
    ///
    /// Malformed JSON, a missing field and blank text all map to the same
    /// `InvalidInput` error.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let payload: AnalyzePayload =
            serde_json::from_slice(body).map_err(|_| AuditError::no_source())?;
        Self::new(payload.source_text.unwrap_or_default())
    }

    pub fn source_text(&self) -> &str {
        &self.source_text
    }
}

/// Textual output of the static-analysis stage. Always populated, even on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticReport {
    text: String,
}

impl StaticReport {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }
}

/// Rendered prompt handed to the language model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    text: String,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }
}

/// Narrative produced by the summarizer, or a description of why it could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryResult {
    pub text: String,
    pub succeeded: bool,
}

impl SummaryResult {
    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            succeeded: true,
        }
    }

    pub fn failure(description: impl Into<String>) -> Self {
        Self {
            text: description.into(),
            succeeded: false,
        }
    }
}

/// Terminal artifact of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResponse {
    pub static_report: String,
    pub narrative_summary: String,
}

impl AnalysisResponse {
    /// Both fields are always filled; a failed summary contributes its failure text.
    pub fn assemble(report: StaticReport, summary: SummaryResult) -> Self {
        Self {
            static_report: report.into_text(),
            narrative_summary: summary.text,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_source_text() {
        let request = AnalysisRequest::from_json(br#"{"sourceText": "contract C {}"}"#).unwrap();
        assert_eq!(request.source_text(), "contract C {}");
    }

    #[test]
    fn test_request_accepts_legacy_code_field() {
        let request = AnalysisRequest::from_json(br#"{"code": "contract D {}"}"#).unwrap();
        assert_eq!(request.source_text(), "contract D {}");
    }

    #[test]
    fn test_request_rejects_missing_and_blank_source() {
        for body in [
            &br#"{}"#[..],
            br#"{"sourceText": ""}"#,
            br#"{"sourceText": "   \n"}"#,
            br#"{"sourceText": null}"#,
            b"not json",
            b"",
        ] {
            let err = AnalysisRequest::from_json(body).unwrap_err();
            assert!(matches!(err, AuditError::InvalidInput(_)));
            assert_eq!(err.to_string(), NO_SOURCE_MESSAGE);
        }
    }

    #[test]
    fn test_response_uses_failure_text_for_failed_summary() {
        let response = AnalysisResponse::assemble(
            StaticReport::new("0 issues found"),
            SummaryResult::failure("OpenAI call failed: connection refused"),
        );
        assert_eq!(response.static_report, "0 issues found");
        assert_eq!(
            response.narrative_summary,
            "OpenAI call failed: connection refused"
        );

        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("staticReport").is_some());
        assert!(json.get("narrativeSummary").is_some());
    }
}
