pub mod cleaner;
pub mod prompt;

use futures::future::BoxFuture;
use log::{debug, info, warn};

use crate::config::ClassifierConfig;
use crate::email::{ClassificationResult, NormalizedMessage};
use crate::error::GenerationError;

pub use cleaner::clean_response;

/// Length of the body excerpt used as summary for whitelisted senders
pub const WHITELIST_SUMMARY_CHARS: usize = 500;
pub const NOT_IMPORTANT_MARKER: &str = "NOT IMPORTANT";

/// A service turning a prompt into text.
pub trait TextGenerator: Send + Sync {
    fn generate<'a>(&'a self, prompt: &'a str) -> BoxFuture<'a, Result<String, GenerationError>>;
}

/// Decides whether a message deserves a summary, and writes it.
pub struct Classifier<G> {
    config: ClassifierConfig,
    generator: G,
}

impl<G: TextGenerator> Classifier<G> {
    pub fn new(config: ClassifierConfig, generator: G) -> Self {
        Self { config, generator }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// Never fails: service errors become a not-important result whose
    /// reason carries the error.
    pub async fn classify(&self, message: &NormalizedMessage) -> ClassificationResult {
        let sender = message.from_name.to_lowercase();

        if let Some(token) = self.config.whitelist.iter().find(|t| sender.contains(t.as_str())) {
            debug!("UID {}: sender matches whitelist token '{}'", message.uid, token);
            return ClassificationResult::important(
                excerpt(&message.body, WHITELIST_SUMMARY_CHARS),
                Some("Sender is whitelisted".to_string()),
            );
        }

        if let Some(token) = self.config.blacklist.iter().find(|t| sender.contains(t.as_str())) {
            debug!("UID {}: sender matches blacklist token '{}'", message.uid, token);
            return ClassificationResult::not_important(Some("Sender is blacklisted".to_string()));
        }

        let template = self
            .config
            .prompt_template
            .as_deref()
            .unwrap_or(prompt::DEFAULT_TEMPLATE);
        let prompt = prompt::render(template, &self.config.user_name, message);

        let response = match self.generator.generate(&prompt).await {
            Ok(response) => response,
            Err(e) => {
                warn!("UID {}: text generation failed: {}", message.uid, e);
                return ClassificationResult::not_important(Some(format!("Error: {}", e)));
            }
        };

        let answer = if self.config.clean_response {
            clean_response(&response)
        } else {
            response.trim().to_string()
        };

        if answer.is_empty() {
            let e = GenerationError::Decode("empty response".to_string());
            warn!("UID {}: {}", message.uid, e);
            return ClassificationResult::not_important(Some(format!("Error: {}", e)));
        }

        if answer.to_uppercase().starts_with(NOT_IMPORTANT_MARKER) {
            info!("UID {}: not important", message.uid);
            ClassificationResult::not_important(None)
        } else {
            info!("UID {}: important", message.uid);
            ClassificationResult::important(answer, None)
        }
    }
}

/// First `max_chars` characters, with "..." when something was cut.
fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
