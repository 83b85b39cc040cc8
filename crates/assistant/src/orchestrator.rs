//! Session state machine driving the three retrieval-augmented steps.
//!
//! State lives behind a short-held lock. Triggers that may query a model are
//! serialised by an async reaction guard; `reset` bypasses that guard and
//! bumps a generation counter so in-flight queries stop and their late
//! results are dropped.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use isaac_rag::{EngineFactory, QueryEngine, QueryResponse, RagEngineFactory};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::{task, time};
use tracing::{debug, error, info, warn};

use crate::case::{CaseField, CaseInput, ResponseLength, ResponseLengthBudget};
use crate::compliance::{self, ComplianceOutcome, ComplianceVerdict};
use crate::config::{AssistantConfig, CollectionTarget, WorkflowCollections};
use crate::error::WorkflowError;
use crate::prompt;
use crate::view::SessionView;

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    #[default]
    Idle,
    HaveRecommendation,
    Complete,
}

#[derive(Debug, Default)]
struct SessionState {
    inputs: CaseInput,
    response_length: ResponseLength,
    budget: ResponseLengthBudget,
    joined_text: Option<String>,
    formatted_display: String,
    management: Option<QueryResponse>,
    antibiotics: Option<QueryResponse>,
    recommendation_1: String,
    recommendation_2: String,
    compliance_statement: String,
    compliance_text: String,
    stage: WorkflowStage,
    last_error: Option<String>,
}

impl SessionState {
    fn view(&self) -> SessionView {
        SessionView {
            inputs: self.inputs.clone(),
            response_length: self.response_length,
            budget: self.budget,
            stage: self.stage,
            formatted_display: self.formatted_display.clone(),
            recommendation_1: self.recommendation_1.clone(),
            recommendation_2: self.recommendation_2.clone(),
            compliance_statement: self.compliance_statement.clone(),
            compliance_text: self.compliance_text.clone(),
            last_error: self.last_error.clone(),
        }
    }

    fn record_failure(&mut self, step: Step, err: &WorkflowError) {
        let text = err.user_message();
        match step {
            Step::Management => {
                self.management = None;
                self.recommendation_1 = text.clone();
            }
            Step::Antibiotics => {
                self.antibiotics = None;
                self.recommendation_2 = text.clone();
            }
            Step::Compliance => {
                self.compliance_statement.clear();
                self.compliance_text = text.clone();
            }
        }
        self.last_error = Some(text);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Management,
    Antibiotics,
    Compliance,
}

impl Step {
    fn as_str(&self) -> &'static str {
        match self {
            Step::Management => "management",
            Step::Antibiotics => "antibiotics",
            Step::Compliance => "compliance",
        }
    }
}

/// Reset generation current when a step was triggered.
struct Ticket {
    reset: watch::Receiver<u64>,
    generation: u64,
}

pub struct Orchestrator {
    factory: Arc<dyn EngineFactory>,
    collections: WorkflowCollections,
    query_timeout: Duration,
    state: Mutex<SessionState>,
    reactions: AsyncMutex<()>,
    generation: watch::Sender<u64>,
}

impl Orchestrator {
    pub fn new(
        factory: Arc<dyn EngineFactory>,
        collections: WorkflowCollections,
        query_timeout: Duration,
    ) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            factory,
            collections,
            query_timeout,
            state: Mutex::new(SessionState::default()),
            reactions: AsyncMutex::new(()),
            generation,
        }
    }

    pub fn from_config(config: &AssistantConfig) -> Self {
        let factory = RagEngineFactory::new(config.engine_settings());
        Self::new(
            Arc::new(factory),
            config.collections.clone(),
            config.query_timeout(),
        )
    }

    pub fn collections(&self) -> &WorkflowCollections {
        &self.collections
    }

    fn ticket(&self) -> Ticket {
        let reset = self.generation.subscribe();
        let generation = *reset.borrow();
        Ticket { reset, generation }
    }

    pub fn view(&self) -> SessionView {
        self.state.lock().view()
    }

    pub fn set_field(&self, field: CaseField, value: impl Into<String>) {
        self.state.lock().inputs.set(field, value);
    }

    pub fn set_inputs(&self, inputs: CaseInput) {
        self.state.lock().inputs = inputs;
    }

    pub fn set_response_length(&self, length: ResponseLength) {
        let mut state = self.state.lock();
        state.response_length = length;
        state.budget = length.budget();
    }

    /// Stores the joined case text the management query is built from.
    pub async fn submit(&self) -> String {
        let _reaction = self.reactions.lock().await;
        let mut state = self.state.lock();
        let joined = prompt::join_inputs(&state.inputs.values());
        debug!(chars = joined.len(), "case submitted");
        state.joined_text = Some(joined.clone());
        joined
    }

    /// Renders the current inputs as `label: value` pairs for the operator
    /// to check.
    pub async fn verify(&self) -> Result<String, WorkflowError> {
        let _reaction = self.reactions.lock().await;
        let mut state = self.state.lock();
        let display =
            prompt::format_inputs_for_display(&state.inputs.values(), &CaseField::labels())?;
        state.formatted_display = display.clone();
        Ok(display)
    }

    /// Returns the session to its initial state and cancels any query still
    /// running. Calling it again has no further effect.
    pub fn reset(&self) -> SessionView {
        let mut state = self.state.lock();
        *state = SessionState::default();
        self.generation.send_modify(|generation| *generation += 1);
        info!("session reset");
        state.view()
    }

    pub async fn recommend_management(&self) -> Result<QueryResponse, WorkflowError> {
        let mut ticket = self.ticket();
        let _reaction = self.reactions.lock().await;
        let query = {
            let state = self.state.lock();
            self.admit(Step::Management, &ticket)?;
            let joined = match &state.joined_text {
                Some(joined) => joined.clone(),
                None => {
                    warn!("management recommendation requested before the case was submitted");
                    String::new()
                }
            };
            prompt::management_query(&joined, state.budget.management)
        };
        let result = self
            .query_once(&self.collections.management, &query, &mut ticket)
            .await;
        self.settle(Step::Management, &ticket, result, |state, response| {
            state.recommendation_1 = response.content.clone();
            state.management = Some(response.clone());
            state.stage = state.stage.max(WorkflowStage::HaveRecommendation);
        })
    }

    /// Antibiotic advice is driven by `Special_comments` alone and does not
    /// move the workflow stage.
    pub async fn recommend_antibiotics(&self) -> Result<QueryResponse, WorkflowError> {
        let mut ticket = self.ticket();
        let _reaction = self.reactions.lock().await;
        let query = {
            let state = self.state.lock();
            self.admit(Step::Antibiotics, &ticket)?;
            prompt::antibiotic_query(state.inputs.get(CaseField::SpecialComments))
        };
        let result = self
            .query_once(&self.collections.antibiotics, &query, &mut ticket)
            .await;
        self.settle(Step::Antibiotics, &ticket, result, |state, response| {
            state.recommendation_2 = response.content.clone();
            state.antibiotics = Some(response.clone());
        })
    }

    pub async fn assess_compliance(&self) -> Result<ComplianceOutcome, WorkflowError> {
        let mut ticket = self.ticket();
        let _reaction = self.reactions.lock().await;
        let (combined, follow_up) = {
            let mut state = self.state.lock();
            self.admit(Step::Compliance, &ticket)?;
            if state.stage < WorkflowStage::HaveRecommendation || state.management.is_none() {
                let err = WorkflowError::InputIncomplete(
                    "request the sepsis management recommendation before checking compliance"
                        .to_string(),
                );
                warn!(error = %err, "compliance check refused");
                state.record_failure(Step::Compliance, &err);
                return Err(err);
            }
            let content = |response: &Option<QueryResponse>| {
                response
                    .as_ref()
                    .map(|r| r.content.clone())
                    .unwrap_or_default()
            };
            (
                prompt::combine_recommendations(
                    &content(&state.management),
                    &content(&state.antibiotics),
                ),
                state.budget.follow_up,
            )
        };
        let result = self.check_compliance(&combined, follow_up, &mut ticket).await;
        self.settle(Step::Compliance, &ticket, result, |state, outcome| {
            state.compliance_statement = outcome.statement().to_string();
            state.compliance_text = outcome.render();
            state.stage = WorkflowStage::Complete;
        })
    }

    async fn check_compliance(
        &self,
        combined: &str,
        follow_up: u32,
        ticket: &mut Ticket,
    ) -> Result<ComplianceOutcome, WorkflowError> {
        let engine = self
            .guarded(ticket, self.open_engine(&self.collections.guidelines))
            .await?;
        let check = self
            .ask(engine.as_ref(), &prompt::compliance_check_query(combined), ticket)
            .await?;
        let verdict = compliance::classify(check.content())?;
        debug!(?verdict, "compliance check classified");
        match verdict {
            ComplianceVerdict::Compliant => Ok(ComplianceOutcome::compliant()),
            ComplianceVerdict::Questionable => {
                let explanation = self
                    .ask(
                        engine.as_ref(),
                        &prompt::non_compliance_explanation_query(combined, follow_up),
                        ticket,
                    )
                    .await?;
                let suggestions = self
                    .ask(
                        engine.as_ref(),
                        &prompt::compliance_suggestion_query(combined, follow_up),
                        ticket,
                    )
                    .await?;
                Ok(ComplianceOutcome::questionable(
                    explanation.content,
                    suggestions.content,
                ))
            }
        }
    }

    async fn query_once(
        &self,
        target: &CollectionTarget,
        query: &str,
        ticket: &mut Ticket,
    ) -> Result<QueryResponse, WorkflowError> {
        let engine = self.guarded(ticket, self.open_engine(target)).await?;
        self.ask(engine.as_ref(), query, ticket).await
    }

    async fn open_engine(
        &self,
        target: &CollectionTarget,
    ) -> Result<Box<dyn QueryEngine>, WorkflowError> {
        let factory = Arc::clone(&self.factory);
        let path = target.path.clone();
        let collection = target.collection.clone();
        task::spawn_blocking(move || factory.create_query_engine(&path, &collection))
            .await
            .map_err(|e| WorkflowError::StorageUnavailable(format!("engine setup failed: {e}")))?
            .map_err(WorkflowError::from)
    }

    async fn ask(
        &self,
        engine: &dyn QueryEngine,
        query: &str,
        ticket: &mut Ticket,
    ) -> Result<QueryResponse, WorkflowError> {
        debug!(collection = engine.collection(), "querying");
        self.guarded(ticket, async {
            engine.query(query).await.map_err(WorkflowError::from)
        })
        .await
    }

    /// Bounds `work` by the query timeout and abandons it on reset.
    async fn guarded<T, F>(
        &self,
        ticket: &mut Ticket,
        work: F,
    ) -> Result<T, WorkflowError>
    where
        F: Future<Output = Result<T, WorkflowError>>,
    {
        tokio::select! {
            outcome = time::timeout(self.query_timeout, work) => {
                outcome.unwrap_or(Err(WorkflowError::Timeout(self.query_timeout)))
            }
            _ = ticket.reset.changed() => Err(WorkflowError::Cancelled),
        }
    }

    /// Refuses a trigger that was queued behind the reaction guard when a
    /// reset happened. Call with the state lock held.
    fn admit(&self, step: Step, ticket: &Ticket) -> Result<(), WorkflowError> {
        if *self.generation.borrow() != ticket.generation {
            debug!(step = step.as_str(), "dropping trigger queued before reset");
            return Err(WorkflowError::Cancelled);
        }
        Ok(())
    }

    /// Writes a step's result into the session unless a reset happened
    /// since the step started.
    fn settle<T>(
        &self,
        step: Step,
        ticket: &Ticket,
        result: Result<T, WorkflowError>,
        apply: impl FnOnce(&mut SessionState, &T),
    ) -> Result<T, WorkflowError> {
        let mut state = self.state.lock();
        if *self.generation.borrow() != ticket.generation {
            debug!(step = step.as_str(), "dropping result overtaken by reset");
            return Err(WorkflowError::Cancelled);
        }
        match &result {
            Ok(value) => {
                apply(&mut *state, value);
                state.last_error = None;
                info!(step = step.as_str(), stage = ?state.stage, "step complete");
            }
            Err(err) => {
                if err.is_upstream() {
                    error!(step = step.as_str(), error = %err, "step failed");
                } else {
                    warn!(step = step.as_str(), error = %err, "step failed");
                }
                state.record_failure(step, err);
            }
        }
        result
    }
}
