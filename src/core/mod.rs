//! 核心编排层：错误与恢复、路由策略、执行上下文、编排状态机、结构化事件、会话监管

pub mod context;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod recovery;
pub mod routing;
pub mod session_supervisor;
pub mod state;

pub use context::ExecutionContext;
pub use error::{AgentError, RecoveryAction};
pub use events::{EventSink, OrchestratorEvent};
pub use orchestrator::Orchestrator;
pub use recovery::RecoveryEngine;
pub use routing::RoutingPolicy;
pub use session_supervisor::SessionSupervisor;
pub use state::{OrchestratorState, Response, StepResult, StepStatus, UPSTREAM_FAILED};
