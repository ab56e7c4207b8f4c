use solaudit_core::{AuditError, LlmConfig, Prompt, Result};
use tracing::info;

const SOURCE_SLOT: &str = "source_code";
const REPORT_SLOT: &str = "static_report";

/// Built-in audit prompt. `{source_code}` and `{static_report}` are the slots.
pub const DEFAULT_TEMPLATE: &str = r#"You are a senior smart-contract security auditor.

Review the Solidity contract below together with the output of the static analyzer that was run against it. Write a concise audit summary for the contract's developers that:
- lists every significant finding with a severity of High, Medium, Low or Informational,
- explains how each finding could be exploited or why it matters,
- recommends a concrete fix.
If the static analysis failed or reported nothing useful, review the code directly and say so.

Contract source:
```solidity
{source_code}
```

Static analysis report:
```
{static_report}
```
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Source,
    Report,
}

/// A prompt template parsed once at start-up.
///
/// Composition walks the parsed segments in a single pass, so slot markers that
/// appear inside submitted code or report text are copied through untouched.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    segments: Vec<Segment>,
}

impl PromptTemplate {
    /// Parse a template. Each slot must appear exactly once; any other
    /// `{identifier}` is rejected so typos surface at start-up.
    pub fn parse(template: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut rest = template;

        while let Some(open) = rest.find('{') {
            literal.push_str(&rest[..open]);
            let after = &rest[open + 1..];

            let slot = after
                .find('}')
                .map(|close| &after[..close])
                .filter(|name| is_identifier(name));

            match slot {
                Some(name) => {
                    let segment = match name {
                        SOURCE_SLOT => Segment::Source,
                        REPORT_SLOT => Segment::Report,
                        other => {
                            return Err(AuditError::Template(format!(
                                "unknown slot '{{{}}}'",
                                other
                            )))
                        }
                    };
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(segment);
                    rest = &after[name.len() + 1..];
                }
                None => {
                    literal.push('{');
                    rest = after;
                }
            }
        }
        literal.push_str(rest);
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        for (slot, segment) in [(SOURCE_SLOT, Segment::Source), (REPORT_SLOT, Segment::Report)] {
            let count = segments.iter().filter(|s| **s == segment).count();
            if count != 1 {
                return Err(AuditError::Template(format!(
                    "slot '{{{}}}' must appear exactly once, found {}",
                    slot, count
                )));
            }
        }

        Ok(Self { segments })
    }

    /// Load the configured template, or the built-in one.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        match &config.prompt_template_path {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                let template = Self::parse(&text)?;
                info!(path = %path.display(), "Loaded custom prompt template");
                Ok(template)
            }
            None => Self::parse(DEFAULT_TEMPLATE),
        }
    }

    /// Substitute the source and report into the template.
    pub fn compose(&self, source_text: &str, static_report: &str) -> Prompt {
        let capacity = source_text.len()
            + static_report.len()
            + self
                .segments
                .iter()
                .map(|s| match s {
                    Segment::Literal(text) => text.len(),
                    _ => 0,
                })
                .sum::<usize>();

        let mut text = String::with_capacity(capacity);
        for segment in &self.segments {
            match segment {
                Segment::Literal(literal) => text.push_str(literal),
                Segment::Source => text.push_str(source_text),
                Segment::Report => text.push_str(static_report),
            }
        }
        Prompt::new(text)
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_lowercase() || c == '_')
}
