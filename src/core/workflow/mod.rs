pub mod executor;
pub mod types;

pub use executor::WorkflowExecutor;
pub use types::{
    ActionFailure, ActionKind, ExecutionContext, ExecutionResult, LogStatus, TriggerKind, Workflow,
};
