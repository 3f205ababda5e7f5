//! Classification pipeline: preprocessing, inference, thresholding.

mod classify;
mod prediction;

pub use classify::{Config, Pipeline};
pub use prediction::{Label, Prediction};
