pub mod adapters;
pub mod backend;
pub mod config;
pub mod dryrun;
pub mod gemini;
pub mod session;
pub mod studio;

pub use adapters::{ImageEditAdapter, ImageGenerationAdapter};
pub use backend::{ContentRequest, ModelBackend, ModelKind};
pub use config::GeminiConfig;
pub use dryrun::DryrunBackend;
pub use gemini::GeminiClient;
pub use session::{ConversationSession, EditReport, SessionManager};
pub use studio::{ChatOutcome, DesignStudio, StudioPhase, StyleOutcome};
