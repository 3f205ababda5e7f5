//! Decode → normalize → infer → threshold.

use std::path::Path;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::image::{self, ImageTensor, DEFAULT_IMAGE_SIZE};
use crate::model::ModelHandle;

use super::prediction::Prediction;

/// Configuration for the classification pipeline.
///
/// Both defaults match the shipped model but have not been checked against
/// its training preprocessing.
#[derive(Debug, Clone)]
pub struct Config {
    /// Probabilities strictly above this are labelled pneumonia.
    pub threshold: f64,

    /// Side length images are resized to before inference.
    pub image_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threshold: 0.95,
            image_size: DEFAULT_IMAGE_SIZE,
        }
    }
}

impl Config {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(Error::InvalidParameter {
                name: "threshold".to_string(),
                reason: "must be between 0.0 and 1.0".to_string(),
            });
        }

        if self.image_size == 0 {
            return Err(Error::InvalidParameter {
                name: "image_size".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

/// Classification pipeline over a shared model handle.
pub struct Pipeline {
    config: Config,
    model: Arc<ModelHandle>,
}

impl Pipeline {
    /// Create a new pipeline. The model is not loaded until first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(config: Config, model: Arc<ModelHandle>) -> Result<Self> {
        config.validate()?;

        tracing::debug!("Initializing pipeline with config: {config:?}");

        Ok(Self { config, model })
    }

    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    /// Classify an encoded image.
    ///
    /// The image is decoded before the model is touched, so invalid input
    /// never triggers a cold start.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidImage`] for undecodable bytes, or a model
    /// error if loading or inference fails.
    pub fn classify_bytes(&self, bytes: &[u8]) -> Result<Prediction> {
        let tensor = image::decode_image(bytes, self.config.image_size)?;
        self.classify_tensor(&tensor)
    }

    /// Classify an image file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or classified.
    pub fn classify_file<P: AsRef<Path>>(&self, path: P) -> Result<Prediction> {
        let path = path.as_ref();
        tracing::debug!("Classifying {}", path.display());

        let tensor = image::load_image(path, self.config.image_size)?;
        self.classify_tensor(&tensor)
    }

    /// Classify an already-normalized tensor.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be loaded or inference fails.
    pub fn classify_tensor(&self, tensor: &ImageTensor) -> Result<Prediction> {
        let classifier = self.model.get()?;
        let probability = classifier.predict(tensor)?;

        let prediction = Prediction::from_probability(f64::from(probability), self.config.threshold);
        tracing::debug!("Raw probability {probability}, prediction {prediction}");

        Ok(prediction)
    }
}
