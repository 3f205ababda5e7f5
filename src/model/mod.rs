//! Classifier resolution, loading, and the shared model handle.

mod handle;
mod loader;
mod session;

pub use handle::ModelHandle;
pub use loader::{
    default_local_paths, LoaderConfig, ModelLoader, ModelSource, MODEL_FILENAME,
    PLACEHOLDER_MODEL_URL,
};
pub use session::OnnxClassifier;

use std::sync::Arc;

use crate::error::Result;
use crate::image::ImageTensor;

/// A binary classifier producing the probability of the positive class.
pub trait Classifier: Send + Sync {
    /// Run inference on a normalized NHWC tensor and return the raw
    /// output probability.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying model fails.
    fn predict(&self, input: &ImageTensor) -> Result<f32>;
}

/// Something that can produce a ready-to-use classifier.
pub trait LoadClassifier: Send + Sync {
    /// Resolve and load a classifier.
    ///
    /// # Errors
    ///
    /// Returns an error if no classifier could be resolved or loaded.
    fn load(&self) -> Result<Arc<dyn Classifier>>;
}
