use opencv::{Error, core::StsBadArg};
use serde::{Deserialize, Serialize};

/// Минимальное число соответствий, при котором гомография определена однозначно.
pub const MIN_HOMOGRAPHY_POINTS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Порог контраста SIFT. Чем меньше, тем больше ключевых точек (и шума).
    pub contrast_threshold: f64,
    pub edge_threshold: f64,
    pub octave_layers: i32,
    pub sigma: f64,
    /// 0 - без ограничения
    pub max_features: i32,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            contrast_threshold: 0.04,
            edge_threshold: 10.0,
            octave_layers: 3,
            sigma: 1.6,
            max_features: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatcherKind {
    /// Приближённый поиск соседей (FLANN)
    #[default]
    Flann,
    /// Точный перебор по норме L2
    BruteForce,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoseConfig {
    pub ransac_reproj_threshold: f64,
    pub max_iters: i32,
    pub confidence: f64,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            ransac_reproj_threshold: 3.0,
            max_iters: 2000,
            confidence: 0.995,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub extractor: ExtractorConfig,
    pub matcher: MatcherKind,
    /// Порог теста отношений: лучший сосед принимается, если он не дальше ratio * второй
    pub ratio: f32,
    pub min_good_matches: usize,
    pub pose: PoseConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            extractor: ExtractorConfig::default(),
            matcher: MatcherKind::default(),
            ratio: 0.6,
            min_good_matches: MIN_HOMOGRAPHY_POINTS,
            pose: PoseConfig::default(),
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<(), Error> {
        let fail = |msg: String| Err(Error::new(StsBadArg as i32, msg));

        if !(self.ratio > 0.0 && self.ratio <= 1.0) {
            return fail(format!("ratio должен лежать в (0, 1], получено {}", self.ratio));
        }
        if self.min_good_matches < MIN_HOMOGRAPHY_POINTS {
            return fail(format!(
                "min_good_matches не может быть меньше {}, получено {}",
                MIN_HOMOGRAPHY_POINTS, self.min_good_matches
            ));
        }
        if !(self.extractor.contrast_threshold > 0.0) || !(self.extractor.edge_threshold > 0.0) {
            return fail("Пороги экстрактора должны быть положительными".to_string());
        }
        if self.extractor.octave_layers < 1 || self.extractor.max_features < 0 {
            return fail(format!(
                "Неверные параметры экстрактора: octave_layers={}, max_features={}",
                self.extractor.octave_layers, self.extractor.max_features
            ));
        }
        if !(self.pose.ransac_reproj_threshold > 0.0) || self.pose.max_iters < 1 {
            return fail("Неверные параметры RANSAC".to_string());
        }
        if !(self.pose.confidence > 0.0 && self.pose.confidence < 1.0) {
            return fail(format!(
                "confidence должен лежать в (0, 1), получено {}",
                self.pose.confidence
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = DetectorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ratio, 0.6);
        assert_eq!(config.min_good_matches, 4);
        assert_eq!(config.matcher, MatcherKind::Flann);
    }

    #[test]
    fn rejects_min_matches_below_four() {
        let config = DetectorConfig {
            min_good_matches: 3,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_ratio_out_of_range() {
        for ratio in [0.0, -0.5, 1.5, f32::NAN] {
            let config = DetectorConfig {
                ratio,
                ..Default::default()
            };
            assert!(config.validate().is_err(), "ratio {ratio} принят");
        }
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: DetectorConfig =
            serde_json::from_str(r#"{"matcher": "brute_force", "extractor": {"contrast_threshold": 0.02}}"#)
                .unwrap();
        assert_eq!(config.matcher, MatcherKind::BruteForce);
        assert_eq!(config.extractor.contrast_threshold, 0.02);
        assert_eq!(config.extractor.octave_layers, 3);
        assert_eq!(config.ratio, 0.6);
    }
}
