pub mod analysis_service;
pub mod analyzer;
pub mod database;
pub mod gemini;

pub use analysis_service::AnalysisService;
pub use analyzer::AnalysisClient;
pub use database::{AnalysisStore, Database};
pub use gemini::{GeminiService, GenerationParams, TextModel};
