use serde::{Deserialize, Serialize};

const WARNING_WEIGHT: usize = 5;
const ERROR_WEIGHT: usize = 10;
const INFO_WEIGHT: usize = 2;

/// Coarse risk classification derived from the score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskBand {
    Low,
    Medium,
    High,
}

impl RiskBand {
    pub fn from_score(score: u32) -> Self {
        match score {
            80.. => RiskBand::Low,
            50..=79 => RiskBand::Medium,
            _ => RiskBand::High,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineSuggestion {
    pub line: String,
    pub suggestion: String,
}

/// Heuristic reading of a static report: a 0-100 score plus remediation hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportInsights {
    pub risk_score: u32,
    pub risk_band: RiskBand,
    pub suggestions: Vec<LineSuggestion>,
}

impl ReportInsights {
    pub fn from_report(report: &str) -> Self {
        let risk_score = risk_score(report);
        let suggestions = report
            .lines()
            .filter_map(|line| {
                fix_suggestion(line).map(|suggestion| LineSuggestion {
                    line: line.trim().to_string(),
                    suggestion: suggestion.to_string(),
                })
            })
            .collect();

        Self {
            risk_score,
            risk_band: RiskBand::from_score(risk_score),
            suggestions,
        }
    }
}

/// 100 minus weighted counts of WARNING, ERROR and INFO markers, floored at zero.
pub fn risk_score(report: &str) -> u32 {
    let penalty = report.matches("WARNING").count() * WARNING_WEIGHT
        + report.matches("ERROR").count() * ERROR_WEIGHT
        + report.matches("INFO").count() * INFO_WEIGHT;
    100usize.saturating_sub(penalty) as u32
}

/// Remediation hint for a report line, first match wins.
pub fn fix_suggestion(line: &str) -> Option<&'static str> {
    if line.contains("Reentrancy") {
        Some("Use a reentrancy guard (e.g. OpenZeppelin's ReentrancyGuard) and update state before external calls.")
    } else if line.contains("shadowing") {
        Some("Rename the variable to avoid the name conflict.")
    } else if line.contains("overflow") {
        Some("Use Solidity >=0.8 checked arithmetic or SafeMath.")
    } else {
        None
    }
}
