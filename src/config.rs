use crate::error::ConfigError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Placeholder secret shipped in the default configuration. A source still
/// using it never authenticates.
pub const DUMMY_SECRET: &str = "ChangeMe";

const DEFAULT_BIND: &str = "127.0.0.1:0";

/// One configured webhook tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceConfig {
    pub slug: String,
    pub name: String,
    pub secret: String,
    #[serde(default)]
    pub priority: i64,
}

/// Where rendered messages are submitted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    pub url: String,
    #[serde(default)]
    pub token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Externally reachable base URL shown on the status page. Defaults to
    /// the bound address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(default)]
    pub sink: SinkConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            public_url: None,
            sink: SinkConfig {
                url: "http://localhost:8080".to_string(),
                token: String::new(),
            },
            sources: vec![SourceConfig {
                slug: "me:me.com".to_string(),
                name: "Notification for @me@me.com".to_string(),
                secret: DUMMY_SECRET.to_string(),
                priority: 4,
            }],
        }
    }
}

impl Config {
    /// Check the whole configuration, collecting every problem instead of
    /// stopping at the first one.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errs = validate_sources(&self.sources);
        if self.sink.url.trim().is_empty() {
            errs.push("sink has no url".to_string());
        }
        if errs.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(errs))
        }
    }
}

/// Per-source diagnostics. Secret problems come with a suggested replacement.
pub fn validate_sources(sources: &[SourceConfig]) -> Vec<String> {
    let mut errs = Vec::new();
    let mut seen = HashSet::new();

    for source in sources {
        if !slug_is_valid(&source.slug) {
            errs.push(format!(
                "source {} has invalid slug, only alnum, _-:. characters are allowed",
                source.slug
            ));
        }
        if !seen.insert(source.slug.as_str()) {
            errs.push(format!("source {} is configured more than once", source.slug));
        }
        if source.secret.is_empty() {
            errs.push(format!(
                "source {} has no secret, what about {}?",
                source.slug,
                random_secret()
            ));
        } else if source.secret == DUMMY_SECRET {
            errs.push(format!(
                "source {} has the default secret, please change it, what about {}?",
                source.slug,
                random_secret()
            ));
        }
    }

    errs
}

pub fn slug_is_valid(slug: &str) -> bool {
    !slug.is_empty()
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':' | '.'))
}

/// 16 random bytes, hex encoded.
pub fn random_secret() -> String {
    let bytes: [u8; 16] = rand::thread_rng().gen();
    hex::encode(bytes)
}
