mod normalizer;
mod prompt;

pub use normalizer::{strip_code_fence, ResponseNormalizer, DEFAULT_EXPLANATION};
pub use prompt::build_analysis_prompt;
