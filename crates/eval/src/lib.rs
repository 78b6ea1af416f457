pub mod config;
pub mod evaluator;
pub mod playground;
pub mod plots;

pub use config::PlaygroundConfig;
pub use evaluator::{ResponseEvaluator, answer_with_feedback};
pub use playground::{
    CellOutcome, ComparisonOutput, ComparisonRecord, ComparisonTable, OutputFormat, Playground,
    PlaygroundError,
};
pub use plots::plot_latency;
