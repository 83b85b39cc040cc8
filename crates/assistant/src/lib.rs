pub mod case;
pub mod compliance;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod view;

pub use case::{CaseField, CaseInput, ResponseLength, ResponseLengthBudget};
pub use compliance::{classify, ComplianceOutcome, ComplianceVerdict, COMPLIANCE_TOKEN};
pub use config::{
    AssistantConfig, CollectionTarget, RetrievalConfig, ServiceConfig, WorkflowCollections,
};
pub use error::WorkflowError;
pub use orchestrator::{Orchestrator, WorkflowStage};
pub use prompt::{
    combine_recommendations, format_inputs_for_display, join_inputs, COMPLIANT_STATEMENT,
    QUESTIONABLE_STATEMENT, SUGGESTION_SEPARATOR,
};
pub use view::SessionView;
