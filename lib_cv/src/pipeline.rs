use std::time::Instant;

use log::debug;
use opencv::core::{Point2f, StsBadArg};
use opencv::prelude::*;
use opencv::{self, Error};

use crate::config::DetectorConfig;
use crate::correspondence::{KNN_NEIGHBOURS, KnnMatcher, Match, gather_correspondences, ratio_test};
use crate::features::{FeatureExtractor, FeatureSet};
use crate::homography::{PoseEstimate, PoseEstimator, Quad, RansacEstimator, reproject_roi, roi_corners};

/// Шаблон объекта: вырезанная пользователем область и её признаки.
/// Живёт до следующего выделения.
#[derive(Debug)]
pub struct RoiTemplate {
    image: Mat,
    features: FeatureSet,
}

impl RoiTemplate {
    pub fn new(image: Mat, extractor: &FeatureExtractor) -> Result<Self, Error> {
        if image.empty() {
            return Err(Error::new(StsBadArg as i32, "ROI пустой".to_string()));
        }
        let features = extractor.extract(&image)?;
        Ok(Self { image, features })
    }

    pub fn from_parts(image: Mat, features: FeatureSet) -> Self {
        Self { image, features }
    }

    pub fn image(&self) -> &Mat {
        &self.image
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    pub fn width(&self) -> i32 {
        self.image.cols()
    }

    pub fn height(&self) -> i32 {
        self.image.rows()
    }

    pub fn corners(&self) -> [Point2f; 4] {
        roi_corners(self.width(), self.height())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DetectionOutcome {
    /// Хороших соответствий меньше порога, поза не оценивалась
    InsufficientMatches { good: usize },
    /// RANSAC не нашёл согласованной модели или углы ушли на бесконечность
    NoPose { good: usize },
    Located { pose: PoseEstimate, outline: Quad },
}

impl DetectionOutcome {
    pub fn outline(&self) -> Option<&Quad> {
        match self {
            DetectionOutcome::Located { outline, .. } => Some(outline),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Detection {
    pub frame_features: FeatureSet,
    pub good_matches: Vec<Match>,
    pub outcome: DetectionOutcome,
}

pub struct ObjectDetector<E = RansacEstimator> {
    extractor: FeatureExtractor,
    matcher: KnnMatcher,
    ratio: f32,
    min_good_matches: usize,
    estimator: E,
}

impl ObjectDetector<RansacEstimator> {
    pub fn new(config: &DetectorConfig) -> Result<Self, Error> {
        Self::with_estimator(config, RansacEstimator::new(config.pose))
    }
}

impl<E: PoseEstimator> ObjectDetector<E> {
    pub fn with_estimator(config: &DetectorConfig, estimator: E) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            extractor: FeatureExtractor::new(config.extractor),
            matcher: KnnMatcher::new(config.matcher),
            ratio: config.ratio,
            min_good_matches: config.min_good_matches,
            estimator,
        })
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn template(&self, roi_image: Mat) -> Result<RoiTemplate, Error> {
        RoiTemplate::new(roi_image, &self.extractor)
    }

    /// Один цикл поиска объекта в кадре
    pub fn detect(&self, roi: &RoiTemplate, frame: &Mat) -> Result<Detection, Error> {
        let stopwatch = Instant::now();
        let frame_features = self.extractor.extract(frame)?;
        debug!(
            "Признаки кадра: {} точек за {:?}",
            frame_features.len(),
            stopwatch.elapsed()
        );
        self.detect_in_features(roi, frame_features)
    }

    /// Сопоставление, фильтрация и оценка позы для уже извлечённых признаков кадра
    pub fn detect_in_features(
        &self,
        roi: &RoiTemplate,
        frame_features: FeatureSet,
    ) -> Result<Detection, Error> {
        let stopwatch = Instant::now();
        let knn_matches = self.matcher.knn_match(
            roi.features().descriptors(),
            frame_features.descriptors(),
            KNN_NEIGHBOURS,
        )?;
        let good_matches = ratio_test(&knn_matches, self.ratio);
        let good = good_matches.len();
        debug!(
            "Сопоставление: {} кандидатов, {} хороших за {:?}",
            knn_matches.len(),
            good,
            stopwatch.elapsed()
        );

        if good < self.min_good_matches {
            return Ok(Detection {
                frame_features,
                good_matches,
                outcome: DetectionOutcome::InsufficientMatches { good },
            });
        }

        let correspondences = gather_correspondences(
            &good_matches,
            roi.features().keypoints(),
            frame_features.keypoints(),
        )?;
        let outcome = match self.estimator.estimate(&correspondences)? {
            Some(pose) => match reproject_roi(&pose.homography, roi.width(), roi.height()) {
                Some(outline) => {
                    debug!("Объект найден: {} inliers из {}", pose.inliers, good);
                    DetectionOutcome::Located { pose, outline }
                }
                None => DetectionOutcome::NoPose { good },
            },
            None => DetectionOutcome::NoPose { good },
        };

        Ok(Detection {
            frame_features,
            good_matches,
            outcome,
        })
    }
}
