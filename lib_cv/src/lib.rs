pub mod config;
pub mod correspondence;
pub mod features;
pub mod homography;
pub mod pipeline;
pub mod selection;
pub mod utils;
pub mod visualization;

pub use config::{DetectorConfig, MatcherKind};
pub use pipeline::{Detection, DetectionOutcome, ObjectDetector, RoiTemplate};
