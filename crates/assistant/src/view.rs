use serde::{Deserialize, Serialize};

use crate::case::{CaseField, CaseInput, ResponseLength, ResponseLengthBudget};
use crate::orchestrator::WorkflowStage;

/// Read-only snapshot of a session, taken under the state lock.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionView {
    pub inputs: CaseInput,
    pub response_length: ResponseLength,
    pub budget: ResponseLengthBudget,
    pub stage: WorkflowStage,
    pub formatted_display: String,
    pub recommendation_1: String,
    pub recommendation_2: String,
    pub compliance_statement: String,
    pub compliance_text: String,
    pub last_error: Option<String>,
}

impl SessionView {
    /// Plain-text rendering used by the CLI.
    pub fn render_text(&self) -> String {
        let mut out = String::from("== Case ==\n");
        for field in CaseField::ALL {
            out.push_str(&format!("{}: {}\n", field.label(), self.inputs.get(field)));
        }
        out.push_str(&format!(
            "Response length: {} (management {} tokens, follow-up {} tokens)\n",
            self.response_length.label(),
            self.budget.management,
            self.budget.follow_up
        ));
        section(&mut out, "Sepsis management recommendation", &self.recommendation_1);
        section(&mut out, "Antibiotic recommendation", &self.recommendation_2);
        let compliance = [self.compliance_statement.as_str(), self.compliance_text.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        section(&mut out, "Guideline compliance", &compliance);
        if let Some(err) = &self.last_error {
            out.push_str(&format!("\nLast error: {err}\n"));
        }
        out
    }
}

fn section(out: &mut String, title: &str, body: &str) {
    out.push_str(&format!("\n== {title} ==\n"));
    out.push_str(if body.is_empty() { "(none)" } else { body });
    out.push('\n');
}
