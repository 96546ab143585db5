use crate::config::{validate_sources, Config, SourceConfig};
use crate::error::ConfigError;
use crate::store::ConfigStore;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Immutable set of webhook sources keyed by slug.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: Vec<SourceConfig>,
    by_slug: HashMap<String, usize>,
}

impl SourceRegistry {
    /// Build a registry without validation. Used for the bootstrap default
    /// configuration, whose placeholder secret the authenticator refuses anyway.
    pub fn new(sources: Vec<SourceConfig>) -> Self {
        let mut by_slug = HashMap::new();
        for (i, source) in sources.iter().enumerate() {
            by_slug.entry(source.slug.clone()).or_insert(i);
        }
        Self { sources, by_slug }
    }

    pub fn validated(sources: Vec<SourceConfig>) -> Result<Self, ConfigError> {
        let errs = validate_sources(&sources);
        if !errs.is_empty() {
            return Err(ConfigError::Invalid(errs));
        }
        Ok(Self::new(sources))
    }

    pub fn get(&self, slug: &str) -> Option<&SourceConfig> {
        self.by_slug.get(slug).map(|&i| &self.sources[i])
    }

    pub fn sources(&self) -> &[SourceConfig] {
        &self.sources
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Registry snapshot shared with the HTTP server.
/// Readers clone the current `Arc`; reconfiguration swaps in a new one.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry {
    current: Arc<RwLock<Arc<SourceRegistry>>>,
}

impl SharedRegistry {
    pub fn new(registry: SourceRegistry) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(registry))),
        }
    }

    pub async fn snapshot(&self) -> Arc<SourceRegistry> {
        self.current.read().await.clone()
    }

    pub async fn replace(&self, registry: SourceRegistry) {
        *self.current.write().await = Arc::new(registry);
    }

    /// Validate `sources` and publish them only if every one is valid.
    pub async fn try_replace(&self, sources: Vec<SourceConfig>) -> Result<(), ConfigError> {
        let registry = SourceRegistry::validated(sources)?;
        self.replace(registry).await;
        Ok(())
    }

    /// Replace the sources of `config`: validate, persist, then publish.
    /// On any error neither the file nor the live snapshot changes.
    pub async fn commit_sources(
        &self,
        store: &ConfigStore,
        config: &Config,
        sources: Vec<SourceConfig>,
    ) -> Result<Config, ConfigError> {
        let registry = SourceRegistry::validated(sources)?;
        let updated = Config {
            sources: registry.sources().to_vec(),
            ..config.clone()
        };
        store.save(&updated)?;
        self.replace(registry).await;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(slug: &str, secret: &str) -> SourceConfig {
        SourceConfig {
            slug: slug.to_string(),
            name: slug.to_uppercase(),
            secret: secret.to_string(),
            priority: 1,
        }
    }

    #[test]
    fn lookup_by_exact_slug() {
        let reg = SourceRegistry::new(vec![source("a", "x"), source("b", "y")]);
        assert_eq!(reg.get("b").map(|s| s.name.as_str()), Some("B"));
        assert!(reg.get("B").is_none());
        assert!(reg.get("").is_none());
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn first_duplicate_wins_in_unvalidated_registry() {
        let reg = SourceRegistry::new(vec![source("a", "first"), source("a", "second")]);
        assert_eq!(reg.get("a").map(|s| s.secret.as_str()), Some("first"));
    }

    #[tokio::test]
    async fn invalid_update_keeps_old_snapshot() {
        let shared = SharedRegistry::new(SourceRegistry::new(vec![source("a", "x")]));
        let before = shared.snapshot().await;

        let err = shared
            .try_replace(vec![source("b", "ok"), source("c", "")])
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref errs) if errs.len() == 1));

        let after = shared.snapshot().await;
        assert!(Arc::ptr_eq(&before, &after));
        assert!(after.get("a").is_some());
        assert!(after.get("b").is_none());
    }

    #[tokio::test]
    async fn commit_persists_before_publishing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf());
        let shared = SharedRegistry::new(SourceRegistry::new(vec![source("a", "x")]));

        let updated = shared
            .commit_sources(&store, &Config::default(), vec![source("b", "y")])
            .await
            .unwrap();
        assert_eq!(updated.sources, vec![source("b", "y")]);
        assert_eq!(store.load().unwrap(), Some(updated));
        assert!(shared.snapshot().await.get("b").is_some());
    }

    #[tokio::test]
    async fn failed_save_keeps_old_snapshot() {
        // A data dir below a regular file cannot be created.
        let file = tempfile::NamedTempFile::new().unwrap();
        let store = ConfigStore::new(file.path().join("data"));
        let shared = SharedRegistry::new(SourceRegistry::new(vec![source("a", "x")]));
        let before = shared.snapshot().await;

        let err = shared
            .commit_sources(&store, &Config::default(), vec![source("b", "y")])
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(Arc::ptr_eq(&before, &shared.snapshot().await));
    }

    #[tokio::test]
    async fn invalid_commit_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::new(dir.path().to_path_buf());
        let shared = SharedRegistry::default();

        let err = shared
            .commit_sources(&store, &Config::default(), vec![source("b", "")])
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        assert!(store.load().unwrap().is_none());
    }

    #[tokio::test]
    async fn valid_update_swaps_whole_snapshot() {
        let shared = SharedRegistry::new(SourceRegistry::new(vec![source("a", "x")]));
        let held = shared.snapshot().await;

        shared.try_replace(vec![source("b", "y")]).await.unwrap();

        // Readers holding the old snapshot keep a consistent view.
        assert!(held.get("a").is_some());
        let now = shared.snapshot().await;
        assert!(now.get("a").is_none());
        assert!(now.get("b").is_some());
    }
}
