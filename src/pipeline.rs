pub mod ground_truth;
pub mod optimizer;
pub mod parse;
pub mod prompt;
pub mod recommend;

pub use ground_truth::GroundTruthGenerator;
pub use optimizer::{
    IterationRecord, OptimizationState, OptimizationSummary, Optimizer, OptimizerSettings,
    ProfileOutcome, ProfileReport, StopReason,
};
pub use prompt::PromptComponents;
pub use recommend::{FallbackCause, Recommendation, Recommender};
