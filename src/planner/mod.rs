//! 任务规划：子句切分与意图识别、Plan/Step 类型、规划器

pub mod intent;
pub mod plan;
#[allow(clippy::module_inception)]
pub mod planner;

pub use intent::{AmbiguousDocumentIntent, Clause, Intent};
pub use plan::{Plan, Step};
pub use planner::{PlannerOptions, TaskPlanner};
