//! Summarizer/Extractor adapter contracts, the Plan State Machine, and the
//! Orchestrator Facade (§4.8, §4.9, §6).

pub mod adapters;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod planner;
pub mod state_machine;

pub use adapters::{EntityExtractor, ExtractedEntity, ExtractionOutput, Summarizer, SummaryOutput, TimeoutWrappedAdapter};
pub use error::CoreError;
pub use events::OrchestratorEvent;
pub use orchestrator::Orchestrator;
pub use planner::{Planner, PlannerProposal};
pub use state_machine::{AgentNodeOutcome, CoreConfig, PlanStateMachine, PlannerOutcome};
