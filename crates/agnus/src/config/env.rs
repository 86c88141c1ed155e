// crates/agnus/src/config/env.rs
// Environment-based configuration - single source of truth for all env vars

use std::path::PathBuf;
use tracing::{debug, warn};

use crate::retriever::ReviewDepth;

/// API keys loaded from environment variables
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// DeepSeek API key (DEEPSEEK_API_KEY)
    pub deepseek: Option<String>,
    /// OpenAI API key (OPENAI_API_KEY)
    pub openai: Option<String>,
    /// Ollama host for local embeddings (OLLAMA_HOST)
    pub ollama: Option<String>,
}

impl ApiKeys {
    /// Load API keys from environment variables (single source of truth)
    pub fn from_env() -> Self {
        let keys = Self {
            deepseek: Self::read_key("DEEPSEEK_API_KEY"),
            openai: Self::read_key("OPENAI_API_KEY"),
            ollama: Self::read_key("OLLAMA_HOST"),
        };
        keys.log_status();
        keys
    }

    /// Read a single env var, filtering empty values
    fn read_key(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|k| !k.trim().is_empty())
    }

    /// Log which API keys are available (without exposing values)
    fn log_status(&self) {
        let mut available = Vec::new();
        if self.deepseek.is_some() {
            available.push("DeepSeek");
        }
        if self.openai.is_some() {
            available.push("OpenAI");
        }
        if self.ollama.is_some() {
            available.push("Ollama");
        }

        if available.is_empty() {
            warn!("No API keys configured - LLM and embedding features will be unavailable");
        } else {
            debug!(keys = ?available, "API keys loaded");
        }
    }

    /// Check if any LLM provider is available
    pub fn has_llm_provider(&self) -> bool {
        self.deepseek.is_some() || self.openai.is_some()
    }

    /// Check if an embedding provider is available
    pub fn has_embeddings(&self) -> bool {
        self.openai.is_some() || self.ollama.is_some()
    }
}

/// Embeddings configuration from environment variables
#[derive(Debug, Clone, Default)]
pub struct EmbeddingsConfig {
    /// Custom embedding dimensions (AGNUS_EMBEDDING_DIMENSIONS)
    pub dimensions: Option<usize>,
    /// Ollama embedding model (AGNUS_OLLAMA_EMBEDDING_MODEL)
    pub ollama_embedding_model: Option<String>,
}

impl EmbeddingsConfig {
    /// Load embeddings configuration from environment variables
    pub fn from_env() -> Self {
        let dimensions = std::env::var("AGNUS_EMBEDDING_DIMENSIONS")
            .ok()
            .and_then(|d| d.parse().ok());

        if let Some(dims) = dimensions {
            debug!(dimensions = dims, "Custom embedding dimensions configured");
        }

        Self {
            dimensions,
            ollama_embedding_model: std::env::var("AGNUS_OLLAMA_EMBEDDING_MODEL")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }
}

/// Review pipeline settings
#[derive(Debug, Clone)]
pub struct ReviewSettings {
    /// Maximum diff characters injected into the prompt (AGNUS_MAX_DIFF_SIZE)
    pub max_diff_size: usize,
    /// Minimum confidence for a comment to survive the precision filter
    /// (AGNUS_CONFIDENCE_THRESHOLD)
    pub confidence_threshold: f32,
    /// Analysis depth: fast (1 hop), standard (2 hops), deep (2 hops + semantic)
    pub depth: ReviewDepth,
    /// Edit-distance limit for the local diff engine before falling back to
    /// full replacement (AGNUS_MAX_EDIT_DISTANCE)
    pub max_edit_distance: usize,
    /// Directory of skill snippets injected by file glob (AGNUS_SKILLS_DIR)
    pub skills_dir: Option<PathBuf>,
    /// Server secret for feedback token signing (AGNUS_FEEDBACK_SECRET)
    pub feedback_secret: Option<String>,
    /// Public base URL for feedback links (AGNUS_FEEDBACK_BASE_URL)
    pub feedback_base_url: Option<String>,
}

impl Default for ReviewSettings {
    fn default() -> Self {
        Self {
            max_diff_size: 50_000,
            confidence_threshold: 0.7,
            depth: ReviewDepth::Standard,
            max_edit_distance: 8_000,
            skills_dir: None,
            feedback_secret: None,
            feedback_base_url: None,
        }
    }
}

impl ReviewSettings {
    /// Load review settings from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let depth = std::env::var("AGNUS_REVIEW_DEPTH")
            .ok()
            .and_then(|d| ReviewDepth::parse(&d))
            .unwrap_or(defaults.depth);

        // Empty string is treated as unset for secrets so feedback links are
        // omitted rather than minted with an invalid key
        let read_opt = |name: &str| std::env::var(name).ok().filter(|s| !s.trim().is_empty());

        Self {
            max_diff_size: std::env::var("AGNUS_MAX_DIFF_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_diff_size),
            confidence_threshold: std::env::var("AGNUS_CONFIDENCE_THRESHOLD")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.confidence_threshold),
            depth,
            max_edit_distance: std::env::var("AGNUS_MAX_EDIT_DISTANCE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.max_edit_distance),
            skills_dir: read_opt("AGNUS_SKILLS_DIR").map(PathBuf::from),
            feedback_secret: read_opt("AGNUS_FEEDBACK_SECRET"),
            feedback_base_url: read_opt("AGNUS_FEEDBACK_BASE_URL"),
        }
    }
}

/// Configuration validation result
#[derive(Debug, Default)]
pub struct ConfigValidation {
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl ConfigValidation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    pub fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    /// Format as a human-readable report
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        if !self.errors.is_empty() {
            lines.push("Errors:".to_string());
            for err in &self.errors {
                lines.push(format!("  - {}", err));
            }
        }

        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            for warn in &self.warnings {
                lines.push(format!("  - {}", warn));
            }
        }

        if lines.is_empty() {
            "Configuration OK".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Environment configuration - all env vars in one place
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub api_keys: ApiKeys,
    pub embeddings: EmbeddingsConfig,
    pub review: ReviewSettings,
}

impl EnvConfig {
    /// Load all environment configuration (call once at startup)
    pub fn load() -> Self {
        Self {
            api_keys: ApiKeys::from_env(),
            embeddings: EmbeddingsConfig::from_env(),
            review: ReviewSettings::from_env(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigValidation {
        let mut validation = ConfigValidation::new();

        if !self.api_keys.has_llm_provider() {
            validation
                .add_warning("No LLM API keys configured. Set DEEPSEEK_API_KEY or OPENAI_API_KEY.");
        }

        if !self.api_keys.has_embeddings() {
            validation.add_warning(
                "No embedding provider configured. Set OPENAI_API_KEY or OLLAMA_HOST for deep review and prior-example retrieval.",
            );
        }

        if !(0.0..=1.0).contains(&self.review.confidence_threshold) {
            validation.add_error(format!(
                "AGNUS_CONFIDENCE_THRESHOLD must be within [0, 1], got {}",
                self.review.confidence_threshold
            ));
        }

        if self.review.feedback_secret.is_some() && self.review.feedback_base_url.is_none() {
            validation.add_warning(
                "AGNUS_FEEDBACK_SECRET is set without AGNUS_FEEDBACK_BASE_URL; feedback links will be omitted.",
            );
        }

        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_keys_default_empty() {
        let keys = ApiKeys::default();
        assert!(!keys.has_llm_provider());
        assert!(!keys.has_embeddings());
    }

    #[test]
    fn test_api_keys_with_values() {
        let keys = ApiKeys {
            deepseek: Some("test-key".to_string()),
            openai: None,
            ollama: None,
        };
        assert!(keys.has_llm_provider());
        assert!(!keys.has_embeddings());
    }

    #[test]
    fn test_review_settings_defaults() {
        let settings = ReviewSettings::default();
        assert_eq!(settings.max_diff_size, 50_000);
        assert_eq!(settings.confidence_threshold, 0.7);
        assert_eq!(settings.max_edit_distance, 8_000);
        assert!(settings.feedback_secret.is_none());
    }

    #[test]
    fn test_validation_threshold_out_of_range() {
        let config = EnvConfig {
            api_keys: ApiKeys::default(),
            embeddings: EmbeddingsConfig::default(),
            review: ReviewSettings {
                confidence_threshold: 1.5,
                ..ReviewSettings::default()
            },
        };
        let validation = config.validate();
        assert!(!validation.is_valid());
    }

    #[test]
    fn test_validation_no_keys_warns_only() {
        let config = EnvConfig {
            api_keys: ApiKeys::default(),
            embeddings: EmbeddingsConfig::default(),
            review: ReviewSettings::default(),
        };
        let validation = config.validate();
        assert!(validation.is_valid());
        assert!(!validation.warnings.is_empty());
    }
}
