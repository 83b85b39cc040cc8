use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WorkflowError;

/// The six free-text fields of a case, in form order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseField {
    Diagnosis,
    Demographic,
    VitalSigns,
    LaboratoryFindings,
    MedicalHistory,
    SpecialComments,
}

impl CaseField {
    pub const ALL: [CaseField; 6] = [
        CaseField::Diagnosis,
        CaseField::Demographic,
        CaseField::VitalSigns,
        CaseField::LaboratoryFindings,
        CaseField::MedicalHistory,
        CaseField::SpecialComments,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            CaseField::Diagnosis => "Diagnosis",
            CaseField::Demographic => "Demographic",
            CaseField::VitalSigns => "Vital_signs",
            CaseField::LaboratoryFindings => "Laboratory_findings",
            CaseField::MedicalHistory => "Medical_history",
            CaseField::SpecialComments => "Special_comments",
        }
    }

    pub fn labels() -> [&'static str; 6] {
        Self::ALL.map(|field| field.label())
    }
}

impl fmt::Display for CaseField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for CaseField {
    type Err = WorkflowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_lowercase();
        CaseField::ALL
            .into_iter()
            .find(|field| field.label().to_lowercase() == wanted)
            .ok_or_else(|| WorkflowError::InvalidInput(format!("unknown case field {value}")))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaseInput {
    pub diagnosis: String,
    pub demographic: String,
    pub vital_signs: String,
    pub laboratory_findings: String,
    pub medical_history: String,
    pub special_comments: String,
}

impl CaseInput {
    pub fn get(&self, field: CaseField) -> &str {
        match field {
            CaseField::Diagnosis => &self.diagnosis,
            CaseField::Demographic => &self.demographic,
            CaseField::VitalSigns => &self.vital_signs,
            CaseField::LaboratoryFindings => &self.laboratory_findings,
            CaseField::MedicalHistory => &self.medical_history,
            CaseField::SpecialComments => &self.special_comments,
        }
    }

    pub fn set(&mut self, field: CaseField, value: impl Into<String>) {
        let slot = match field {
            CaseField::Diagnosis => &mut self.diagnosis,
            CaseField::Demographic => &mut self.demographic,
            CaseField::VitalSigns => &mut self.vital_signs,
            CaseField::LaboratoryFindings => &mut self.laboratory_findings,
            CaseField::MedicalHistory => &mut self.medical_history,
            CaseField::SpecialComments => &mut self.special_comments,
        };
        *slot = value.into();
    }

    /// Field values in form order.
    pub fn values(&self) -> [&str; 6] {
        CaseField::ALL.map(|field| self.get(field))
    }

    pub fn is_blank(&self) -> bool {
        self.values().iter().all(|v| v.trim().is_empty())
    }
}

/// Token budgets for the management query and for the two compliance
/// follow-up queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseLengthBudget {
    pub management: u32,
    pub follow_up: u32,
}

impl Default for ResponseLengthBudget {
    fn default() -> Self {
        ResponseLength::default().budget()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseLength {
    #[default]
    #[serde(alias = "Regular response", alias = "Regular")]
    Regular,
    #[serde(alias = "Short response", alias = "Short")]
    Short,
}

impl ResponseLength {
    pub fn label(&self) -> &'static str {
        match self {
            ResponseLength::Regular => "Regular response",
            ResponseLength::Short => "Short response",
        }
    }

    pub fn budget(&self) -> ResponseLengthBudget {
        match self {
            ResponseLength::Regular => ResponseLengthBudget {
                management: 300,
                follow_up: 100,
            },
            ResponseLength::Short => ResponseLengthBudget {
                management: 50,
                follow_up: 30,
            },
        }
    }
}

impl FromStr for ResponseLength {
    type Err = WorkflowError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "regular" | "regular response" => Ok(ResponseLength::Regular),
            "short" | "short response" => Ok(ResponseLength::Short),
            other => Err(WorkflowError::InvalidInput(format!(
                "unknown response length {other:?}; expected \"Regular response\" or \"Short response\""
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn response_length_maps_to_budgets() {
        assert_eq!(
            ResponseLength::Regular.budget(),
            ResponseLengthBudget {
                management: 300,
                follow_up: 100
            }
        );
        assert_eq!(
            ResponseLength::Short.budget(),
            ResponseLengthBudget {
                management: 50,
                follow_up: 30
            }
        );
        assert_eq!(ResponseLengthBudget::default(), ResponseLength::Regular.budget());
    }

    #[test]
    fn response_length_labels_parse_and_unknown_is_rejected() {
        assert_eq!("Regular response".parse::<ResponseLength>().unwrap(), ResponseLength::Regular);
        assert_eq!("short".parse::<ResponseLength>().unwrap(), ResponseLength::Short);
        assert!(matches!(
            "Long response".parse::<ResponseLength>(),
            Err(WorkflowError::InvalidInput(_))
        ));
        let parsed: ResponseLength = serde_json::from_str("\"Short response\"").unwrap();
        assert_eq!(parsed, ResponseLength::Short);
    }

    #[test]
    fn fields_round_trip_through_case_input() {
        let mut case = CaseInput::default();
        assert!(case.is_blank());
        for (idx, field) in CaseField::ALL.into_iter().enumerate() {
            case.set(field, format!("v{idx}"));
        }
        assert_eq!(case.values(), ["v0", "v1", "v2", "v3", "v4", "v5"]);
        assert_eq!(case.get(CaseField::SpecialComments), "v5");
        assert!(!case.is_blank());
    }

    #[test]
    fn field_labels_parse_case_insensitively() {
        assert_eq!("vital_signs".parse::<CaseField>().unwrap(), CaseField::VitalSigns);
        assert_eq!("Special_comments".parse::<CaseField>().unwrap(), CaseField::SpecialComments);
        assert!("allergies".parse::<CaseField>().is_err());
        assert_eq!(
            CaseField::labels(),
            [
                "Diagnosis",
                "Demographic",
                "Vital_signs",
                "Laboratory_findings",
                "Medical_history",
                "Special_comments"
            ]
        );
    }
}
