//! ONNX Runtime backed classifier.

use std::path::Path;

use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;

use crate::error::{Error, Result};
use crate::image::ImageTensor;

use super::Classifier;

/// Binary classifier wrapping an ONNX Runtime session.
///
/// The model is expected to take a single `(1, H, W, 1)` float input and
/// emit a single sigmoid output neuron.
pub struct OnnxClassifier {
    name: String,
    session: Mutex<Session>,
}

impl OnnxClassifier {
    /// Load a classifier from an ONNX file.
    ///
    /// # Errors
    ///
    /// Returns an error if the model cannot be loaded.
    pub fn from_file(path: &Path) -> Result<Self> {
        let name = path.display().to_string();

        let session = Session::builder()
            .map_err(|source| Error::ModelLoad {
                name: name.clone(),
                source,
            })?
            .commit_from_file(path)
            .map_err(|source| Error::ModelLoad {
                name: name.clone(),
                source,
            })?;

        Ok(Self {
            name,
            session: Mutex::new(session),
        })
    }

    /// Name (source path) of the loaded model.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, input: &ImageTensor) -> Result<f32> {
        let input_value =
            Tensor::from_array(input.clone()).map_err(|source| Error::Inference { source })?;

        let mut session = self.session.lock();
        let outputs = session
            .run(ort::inputs![input_value])
            .map_err(|source| Error::Inference { source })?;

        // Get first output
        let output = outputs
            .values()
            .next()
            .ok_or_else(|| Error::ShapeMismatch {
                expected: "probability output".to_string(),
                actual: "no output".to_string(),
            })?;

        let (_, data) = output
            .try_extract_tensor::<f32>()
            .map_err(|source| Error::Inference { source })?;

        let probability = data.first().copied();

        probability.ok_or_else(|| Error::ShapeMismatch {
            expected: "at least one output value".to_string(),
            actual: "empty tensor".to_string(),
        })
    }
}
