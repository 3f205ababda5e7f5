//! Lazily initialized, process-wide classifier handle.

use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::error::Result;

use super::{Classifier, LoadClassifier};

/// Shared handle to the classifier, loaded on first use.
///
/// Concurrent first callers block on a single load. A failed load leaves
/// the handle empty, so the next call tries again. Once loaded the
/// classifier is never replaced.
pub struct ModelHandle {
    loader: Box<dyn LoadClassifier>,
    classifier: OnceCell<Arc<dyn Classifier>>,
}

impl ModelHandle {
    pub fn new(loader: impl LoadClassifier + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            classifier: OnceCell::new(),
        }
    }

    /// Wrap an already-loaded classifier.
    pub fn preloaded(classifier: Arc<dyn Classifier>) -> Self {
        Self {
            loader: Box::new(Preloaded(Arc::clone(&classifier))),
            classifier: OnceCell::with_value(classifier),
        }
    }

    /// Return the classifier, loading it if this is the first call.
    ///
    /// Blocks while the model is loading.
    ///
    /// # Errors
    ///
    /// Returns the loader's error; nothing is cached in that case.
    pub fn get(&self) -> Result<Arc<dyn Classifier>> {
        self.classifier
            .get_or_try_init(|| {
                tracing::info!("Cold start: resolving classifier");
                self.loader.load().inspect_err(|err| {
                    tracing::error!("Error loading model: {err}");
                })
            })
            .cloned()
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.classifier.get().is_some()
    }
}

struct Preloaded(Arc<dyn Classifier>);

impl LoadClassifier for Preloaded {
    fn load(&self) -> Result<Arc<dyn Classifier>> {
        Ok(Arc::clone(&self.0))
    }
}
