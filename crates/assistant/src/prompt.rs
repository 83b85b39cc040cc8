//! Prompt composition.
//!
//! Case text is interpolated into the templates verbatim. Nothing here guards
//! against instructions embedded in the clinical fields reaching the model.

use crate::error::WorkflowError;

pub const FIELD_SEPARATOR: &str = "; ";
pub const RECOMMENDATION_SEPARATOR: &str = " | ";
pub const SUGGESTION_SEPARATOR: &str =
    "\n\nTo achieve compliance, consider the following suggestions:\n";

pub const COMPLIANT_STATEMENT: &str =
    "Recommendations comply with current sepsis management guidelines.";
pub const QUESTIONABLE_STATEMENT: &str =
    "Compliance with current sepsis management guidelines is questionable.";

pub fn join_inputs<S: AsRef<str>>(fields: &[S]) -> String {
    let parts: Vec<&str> = fields.iter().map(|f| f.as_ref()).collect();
    parts.join(FIELD_SEPARATOR)
}

/// `"label: value"` pairs joined like [`join_inputs`].
pub fn format_inputs_for_display<S: AsRef<str>, N: AsRef<str>>(
    values: &[S],
    names: &[N],
) -> Result<String, WorkflowError> {
    if values.len() != names.len() {
        return Err(WorkflowError::InvalidInput(format!(
            "{} values for {} field names",
            values.len(),
            names.len()
        )));
    }
    let parts: Vec<String> = names
        .iter()
        .zip(values)
        .map(|(name, value)| format!("{}: {}", name.as_ref(), value.as_ref()))
        .collect();
    Ok(parts.join(FIELD_SEPARATOR))
}

pub fn management_query(joined_case: &str, max_tokens: u32) -> String {
    format!(
        "The sepsis management recommendations you provide should be maximally based on the queried database and {joined_case}. The length of your response should not exceed {max_tokens} tokens."
    )
}

pub fn antibiotic_query(special_comments: &str) -> String {
    format!(
        "The antibiotics recommendations you provide should be maximally based on the queried database and {special_comments}. When possible, recommend particular antibiotics and their doses."
    )
}

/// Asks for a verdict the substring classifier can read: the bare word
/// "compliant" on success, never that word otherwise.
pub fn compliance_check_query(combined: &str) -> String {
    format!(
        "Assess whether the following recommendations comply with current sepsis management guidelines: {combined}. If they comply, answer with the single lowercase word compliant. Otherwise answer with the word deviation followed by the main deviations, without using the word compliant."
    )
}

pub fn non_compliance_explanation_query(combined: &str, max_tokens: u32) -> String {
    format!(
        "Explain why the following recommendations do not comply: {combined}. The length of your response should not exceed {max_tokens} tokens."
    )
}

pub fn compliance_suggestion_query(combined: &str, max_tokens: u32) -> String {
    format!(
        "Provide suggestions to make the following recommendations compliant: {combined}. The length of your response should not exceed {max_tokens} tokens."
    )
}

pub fn combine_recommendations(management: &str, antibiotics: &str) -> String {
    format!("{management}{RECOMMENDATION_SEPARATOR}{antibiotics}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn six_empty_fields_join_to_five_separators() {
        assert_eq!(join_inputs(&[""; 6]), "; ; ; ; ; ");
    }

    #[test]
    fn join_preserves_order_without_escaping() {
        assert_eq!(join_inputs(&["a;b", "", "c"]), "a;b; ; c");
        assert_eq!(join_inputs::<&str>(&[]), "");
    }

    #[test]
    fn display_formatting_pairs_labels_and_values() {
        assert_eq!(
            format_inputs_for_display(&["a", "b"], &["X", "Y"]).unwrap(),
            "X: a; Y: b"
        );
        assert!(matches!(
            format_inputs_for_display(&["a"], &["X", "Y"]),
            Err(WorkflowError::InvalidInput(_))
        ));
    }

    #[test]
    fn templates_embed_budgets_and_case_text() {
        let q = management_query("septic shock; 67 y", 300);
        assert!(q.contains("queried database and septic shock; 67 y."));
        assert!(q.ends_with("should not exceed 300 tokens."));
        let q = antibiotic_query("CAP");
        assert!(q.contains("queried database and CAP."));
        let q = non_compliance_explanation_query("r1 | r2", 30);
        assert!(q.starts_with("Explain why the following recommendations do not comply: r1 | r2."));
        assert!(q.ends_with("30 tokens."));
        let q = compliance_suggestion_query("r1 | r2", 100);
        assert!(q.contains("compliant: r1 | r2."));
        assert_eq!(combine_recommendations("r1", ""), "r1 | ");
    }
}
