pub mod error;
pub mod health;
pub mod invoker;
pub mod notify;
pub mod orchestrator;
pub mod recorder;

pub use error::OrchestratorError;
pub use health::HealthAggregator;
pub use invoker::AgentInvoker;
pub use notify::{
    ChannelNotificationQueue, DisabledSink, NotificationJob, NotificationQueue, NotificationSink,
    NotificationWorker, NotifyError, PushoverSink,
};
pub use orchestrator::FanOutOrchestrator;
pub use recorder::SessionRecorder;
