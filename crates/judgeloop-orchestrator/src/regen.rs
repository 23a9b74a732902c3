//! AI-assisted "fix this error" call.

use tracing::{info, instrument, warn};

use crate::ai::{AiBackend, RegenRequest};
use crate::error::Result;
use crate::language::Language;

/// Notification shown after the code buffer was regenerated.
pub const REGEN_SUCCESS_MESSAGE: &str = "Regenerated code successfully!";

/// Notification shown when regeneration fails for any reason.
pub const REGEN_FAILURE_MESSAGE: &str = "Sorry, something went wrong. Please try again.";

/// Asks the AI backend to rewrite `code` so that `error_text` goes away.
///
/// The language is identified by its AI backend key. No retry is attempted.
///
/// # Errors
///
/// Returns the backend's `Transport` or `MalformedAiResponse` error.
#[instrument(skip(ai, error_text, code), fields(language = %language.value))]
pub async fn regenerate(
    ai: &dyn AiBackend,
    error_text: &str,
    code: &str,
    language: &Language,
) -> Result<String> {
    let request = RegenRequest {
        error: error_text.to_string(),
        code: code.to_string(),
        language: language.value.clone(),
    };
    match ai.regenerate(&request).await {
        Ok(fixed) => {
            info!(code_len = fixed.len(), "Code regenerated");
            Ok(fixed)
        }
        Err(e) => {
            warn!(error = %e, "Regeneration failed");
            Err(e)
        }
    }
}
