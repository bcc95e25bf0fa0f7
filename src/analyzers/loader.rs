use crate::error::AnalyzerError;

type LoaderFn<T> = Box<dyn Fn() -> Result<T, AnalyzerError> + Send>;

enum LoadState<T> {
    Untried,
    Loaded { source: String, analyzer: T },
    Failed(AnalyzerError),
}

/// Load-once acquisition of an optional analyzer
///
/// Sources are tried in registration order on first use. The first success
/// is kept for the session; if every source fails the analyzer is disabled
/// and later calls return the cached [`AnalyzerError::Unavailable`] without
/// retrying.
pub struct AnalyzerLoader<T> {
    name: String,
    sources: Vec<(String, LoaderFn<T>)>,
    state: LoadState<T>,
}

impl<T> AnalyzerLoader<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
            state: LoadState::Untried,
        }
    }

    /// Append a fallback source
    pub fn with_source<F>(mut self, source: impl Into<String>, loader: F) -> Self
    where
        F: Fn() -> Result<T, AnalyzerError> + Send + 'static,
    {
        self.sources.push((source.into(), Box::new(loader)));
        self
    }

    /// A loader that is already resolved to `analyzer`
    pub fn ready(name: impl Into<String>, source: impl Into<String>, analyzer: T) -> Self {
        Self {
            name: name.into(),
            sources: Vec::new(),
            state: LoadState::Loaded { source: source.into(), analyzer },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The analyzer, loading it on first call
    pub fn get(&mut self) -> Result<&mut T, AnalyzerError> {
        if matches!(self.state, LoadState::Untried) {
            self.state = self.load();
        }
        match &mut self.state {
            LoadState::Loaded { analyzer, .. } => Ok(analyzer),
            LoadState::Failed(e) => Err(e.clone()),
            LoadState::Untried => Err(AnalyzerError::Unavailable { name: self.name.clone() }),
        }
    }

    /// The analyzer if a previous call loaded it; never triggers loading
    pub fn loaded(&self) -> Option<&T> {
        match &self.state {
            LoadState::Loaded { analyzer, .. } => Some(analyzer),
            _ => None,
        }
    }

    pub fn loaded_mut(&mut self) -> Option<&mut T> {
        match &mut self.state {
            LoadState::Loaded { analyzer, .. } => Some(analyzer),
            _ => None,
        }
    }

    /// Name of the source that succeeded
    pub fn loaded_source(&self) -> Option<&str> {
        match &self.state {
            LoadState::Loaded { source, .. } => Some(source),
            _ => None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self.state, LoadState::Failed(_))
    }

    fn load(&self) -> LoadState<T> {
        for (source, loader) in &self.sources {
            match loader() {
                Ok(analyzer) => {
                    tracing::info!("Loaded {} analyzer from {}", self.name, source);
                    return LoadState::Loaded { source: source.clone(), analyzer };
                }
                Err(e) => {
                    tracing::warn!("Could not load {} analyzer from {}: {}", self.name, source, e);
                }
            }
        }
        if self.sources.is_empty() {
            tracing::debug!("No {} analyzer registered", self.name);
        } else {
            tracing::warn!(
                "{} analyzer unavailable after {} sources; disabled for this session",
                self.name,
                self.sources.len()
            );
        }
        LoadState::Failed(AnalyzerError::Unavailable { name: self.name.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn failing(name: &str) -> impl Fn() -> Result<u32, AnalyzerError> + Send + 'static {
        let name = name.to_string();
        move || {
            Err(AnalyzerError::LoadFailed {
                name: "test".to_string(),
                source_name: name.clone(),
                reason: "unreachable".to_string(),
            })
        }
    }

    #[test]
    fn test_first_success_wins_and_is_cached() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let mut loader = AnalyzerLoader::new("test")
            .with_source("primary", failing("primary"))
            .with_source("mirror", move || {
                counted.fetch_add(1, Ordering::SeqCst);
                Ok(7u32)
            })
            .with_source("never", || Ok(9u32));

        assert_eq!(*loader.get().unwrap(), 7);
        assert_eq!(*loader.get().unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(loader.loaded_source(), Some("mirror"));
    }

    #[test]
    fn test_exhausted_sources_disable_without_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let mut loader: AnalyzerLoader<u32> = AnalyzerLoader::new("test").with_source("only", move || {
            counted.fetch_add(1, Ordering::SeqCst);
            Err(AnalyzerError::WorkerDisconnected)
        });

        assert!(matches!(loader.get(), Err(AnalyzerError::Unavailable { .. })));
        assert!(loader.is_disabled());
        assert!(loader.get().is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(loader.loaded().is_none());
    }

    #[test]
    fn test_empty_loader_is_unavailable() {
        let mut loader: AnalyzerLoader<u32> = AnalyzerLoader::new("none");
        assert!(loader.get().is_err());
    }
}
