// src/config/rewrite.rs
use serde::{Deserialize, Serialize};

fn default_min_overlap() -> f32 {
    0.35
}

/// Optional LLM rewrite of the deterministic companion message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RewriteConfig {
    pub enabled: bool,
    /// "openai" | "mock" (case-insensitive)
    pub provider: String,
    /// "ENV" means: read from OPENAI_API_KEY
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Share of rewrite tokens that must already appear in the plan/evidence.
    #[serde(default = "default_min_overlap")]
    pub min_overlap: f32,
    pub timeout_secs: u64,
}

impl Default for RewriteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: "openai".to_string(),
            api_key: "ENV".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            max_tokens: 180,
            min_overlap: default_min_overlap(),
            timeout_secs: 10,
        }
    }
}

impl RewriteConfig {
    /// Resolve `api_key = "ENV"` against the given lookup. A missing key
    /// leaves the string empty, which keeps the rewriter disabled.
    pub fn resolve_api_key<F>(&mut self, get: &F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.api_key.trim().eq_ignore_ascii_case("env") {
            self.api_key = match self.provider.as_str() {
                "openai" => get("OPENAI_API_KEY").unwrap_or_default(),
                _ => String::new(),
            };
        }
    }

    pub fn sanitize(&mut self) {
        self.provider = self.provider.trim().to_lowercase();
        if !(0.0..=1.0).contains(&self.min_overlap) {
            self.min_overlap = default_min_overlap();
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            self.temperature = 0.2;
        }
        if self.max_tokens == 0 {
            self.max_tokens = 180;
        }
        if self.timeout_secs == 0 {
            self.timeout_secs = 10;
        }
    }

    /// Enabled and, for real providers, holding a key.
    pub fn is_usable(&self) -> bool {
        self.enabled && (self.provider == "mock" || !self.api_key.trim().is_empty())
    }
}
