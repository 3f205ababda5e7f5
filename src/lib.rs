//! # pneumonia-detect
//!
//! Chest X-ray pneumonia classification behind two thin HTTP surfaces.
//!
//! An uploaded image is decoded to grayscale, resized to 256x256 and
//! normalized to [0, 1], then run through a pre-trained ONNX classifier
//! with a single sigmoid output. Probabilities above the threshold
//! (0.95 by default) are labelled `Pneumonia`, everything else `Normal`.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use pneumonia_detect::model::{LoaderConfig, ModelHandle, ModelLoader};
//! use pneumonia_detect::pipeline::{Config, Pipeline};
//!
//! # fn main() -> pneumonia_detect::Result<()> {
//! let loader = ModelLoader::new(LoaderConfig::default())?;
//! let model = Arc::new(ModelHandle::new(loader));
//! let pipeline = Pipeline::new(Config::default(), model)?;
//!
//! let prediction = pipeline.classify_file("chest-xray.jpeg")?;
//! println!("{prediction}");
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod image;
pub mod model;
pub mod pipeline;
pub mod web;

pub use error::{Error, Result};
pub use pipeline::{Config, Label, Pipeline, Prediction};
