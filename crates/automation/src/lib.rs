//! Browser automation engine for the Gemini chat UI
//!
//! Drives a real Chrome through the DevTools protocol: binds the chat tab,
//! types a question as keystrokes, submits it and polls the page until the
//! streamed reply settles. The protocol plumbing lives in [`cdp`]; the
//! [`automation::GeminiAutomation`] facade ties the pieces together.

pub mod automation;
pub mod binder;
pub mod cdp;
pub mod detect;
pub mod endpoint;
pub mod error;
pub mod input;
pub mod launch;
pub mod prompt;
pub mod snapshot;

pub use automation::{AutomationConfig, ConversationTurn, GeminiAutomation, GEMINI_URL};
pub use cdp::{CdpClient, CdpSession};
pub use detect::{CompletionDetector, DetectorConfig, Phase};
pub use error::{AutomationError, Result};
pub use prompt::SystemPrompt;
