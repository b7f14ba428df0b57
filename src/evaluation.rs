pub mod evaluator;
pub mod feedback;
pub mod metrics;

pub use evaluator::{Evaluation, Evaluator};
pub use feedback::{Feedback, Gap, GapKind};
pub use metrics::{MeanMetrics, Metrics};
