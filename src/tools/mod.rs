pub mod answerer;
pub mod calculator;
pub mod code_executor;
pub mod executor;
pub mod registry;
pub mod summarizer;
pub mod web_search;

pub use answerer::{DocumentAnswererTool, GeneralReasonerTool, NOT_FOUND_IN_DOCUMENT};
pub use calculator::CalculatorTool;
pub use code_executor::CodeExecutorTool;
pub use executor::ToolExecutor;
pub use registry::{StepArgs, Tool, ToolKind, ToolRegistry};
pub use summarizer::SummarizerTool;
pub use web_search::WebSearchTool;
