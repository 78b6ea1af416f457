pub mod engine;
pub mod feedback;
pub mod schema;
pub mod synthesizer;
pub mod transform;

pub use engine::{AsQueryEngine, QueryEngine};
pub use feedback::{DEFAULT_RESYNTHESIS_PROMPT_TMPL, FeedbackQueryTransformation};
pub use index::QueryBundle;
pub use schema::{Evaluation, Response};
pub use synthesizer::{ResponseMode, ResponseSynthesizer};
pub use transform::{IdentityQueryTransform, QueryTransform};
