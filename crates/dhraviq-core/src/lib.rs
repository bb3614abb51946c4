pub mod agents;
pub mod dependency;
pub mod errors;
pub mod ids;
pub mod keywords;
pub mod models;
pub mod prompt;
pub mod provider;

pub use dependency::Dependency;
pub use errors::GatewayError;
pub use models::{
    AgentOutcome, AgentRequest, AggregatedResponse, HealthReport, HealthStatus, ReminderState,
    ResponseStatus, SessionRecord, ValidationError, MAX_AGENTS,
};
