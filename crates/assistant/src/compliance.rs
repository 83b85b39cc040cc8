use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;
use crate::prompt::{COMPLIANT_STATEMENT, QUESTIONABLE_STATEMENT, SUGGESTION_SEPARATOR};

/// Case-sensitive marker searched for in the compliance-check answer.
pub const COMPLIANCE_TOKEN: &str = "compliant";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceVerdict {
    Compliant,
    Questionable,
}

impl ComplianceVerdict {
    pub fn statement(&self) -> &'static str {
        match self {
            ComplianceVerdict::Compliant => COMPLIANT_STATEMENT,
            ComplianceVerdict::Questionable => QUESTIONABLE_STATEMENT,
        }
    }
}

/// Classifies the raw answer of the compliance-check query. Blank answers
/// carry no verdict.
pub fn classify(answer: &str) -> Result<ComplianceVerdict, WorkflowError> {
    if answer.trim().is_empty() {
        return Err(WorkflowError::MalformedCompliance);
    }
    if answer.contains(COMPLIANCE_TOKEN) {
        Ok(ComplianceVerdict::Compliant)
    } else {
        Ok(ComplianceVerdict::Questionable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceOutcome {
    pub verdict: ComplianceVerdict,
    pub explanation: Option<String>,
    pub suggestions: Option<String>,
}

impl ComplianceOutcome {
    pub fn compliant() -> Self {
        Self {
            verdict: ComplianceVerdict::Compliant,
            explanation: None,
            suggestions: None,
        }
    }

    pub fn questionable(explanation: impl Into<String>, suggestions: impl Into<String>) -> Self {
        Self {
            verdict: ComplianceVerdict::Questionable,
            explanation: Some(explanation.into()),
            suggestions: Some(suggestions.into()),
        }
    }

    pub fn statement(&self) -> &'static str {
        self.verdict.statement()
    }

    /// Explanation and suggestions shown under the statement. Empty for a
    /// compliant verdict.
    pub fn render(&self) -> String {
        match self.verdict {
            ComplianceVerdict::Compliant => String::new(),
            ComplianceVerdict::Questionable => format!(
                "{}{}{}",
                self.explanation.as_deref().unwrap_or_default(),
                SUGGESTION_SEPARATOR,
                self.suggestions.as_deref().unwrap_or_default()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substring_match_is_case_sensitive() {
        assert_eq!(classify("compliant").unwrap(), ComplianceVerdict::Compliant);
        assert_eq!(
            classify("The plan is non-compliant with fluids").unwrap(),
            ComplianceVerdict::Compliant
        );
        assert_eq!(classify("Compliant").unwrap(), ComplianceVerdict::Questionable);
        assert_eq!(
            classify("deviation: antibiotics delayed").unwrap(),
            ComplianceVerdict::Questionable
        );
    }

    #[test]
    fn blank_answer_is_malformed() {
        assert_eq!(classify("  \n"), Err(WorkflowError::MalformedCompliance));
    }

    #[test]
    fn questionable_outcome_joins_follow_ups() {
        let outcome = ComplianceOutcome::questionable("late antibiotics", "give within 1 h");
        assert_eq!(
            outcome.render(),
            "late antibiotics\n\nTo achieve compliance, consider the following suggestions:\ngive within 1 h"
        );
        assert_eq!(outcome.statement(), QUESTIONABLE_STATEMENT);

        let compliant = ComplianceOutcome::compliant();
        assert_eq!(compliant.statement(), COMPLIANT_STATEMENT);
        assert!(compliant.render().is_empty());
    }
}
