use opencv::core::{KeyPoint, Point2f, StsBadArg, Vector};
use opencv::features2d::SIFT;
use opencv::imgproc;
use opencv::prelude::*;
use opencv::{self, Error};

use crate::config::ExtractorConfig;

/// Ключевая точка кадра. Создаётся экстрактором и дальше не меняется.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Keypoint {
    pub pt: Point2f,
    pub size: f32,
    pub angle: f32,
    pub response: f32,
    pub octave: i32,
}

impl Keypoint {
    pub fn new(x: f32, y: f32, size: f32) -> Self {
        Self {
            pt: Point2f::new(x, y),
            size,
            angle: -1.0,
            response: 0.0,
            octave: 0,
        }
    }

    pub fn from_opencv_keypoint(kp: &KeyPoint) -> Self {
        Self {
            pt: kp.pt(),
            size: kp.size(),
            angle: kp.angle(),
            response: kp.response(),
            octave: kp.octave(),
        }
    }

    pub fn to_opencv_keypoint(&self) -> opencv::Result<KeyPoint> {
        KeyPoint::new_coords(
            self.pt.x,
            self.pt.y,
            self.size,
            self.angle,
            self.response,
            self.octave,
            -1,
        )
    }
}

/// Ключевые точки и дескрипторы одного изображения.
/// Строка i матрицы дескрипторов соответствует keypoints[i].
#[derive(Debug)]
pub struct FeatureSet {
    keypoints: Vec<Keypoint>,
    descriptors: Mat,
}

impl FeatureSet {
    pub fn empty() -> Self {
        Self {
            keypoints: Vec::new(),
            descriptors: Mat::default(),
        }
    }

    pub fn from_parts(keypoints: Vec<Keypoint>, descriptors: Mat) -> Result<Self, Error> {
        if keypoints.len() != descriptors.rows() as usize {
            return Err(Error::new(
                StsBadArg as i32,
                format!(
                    "Число ключевых точек ({}) не совпадает с числом дескрипторов ({})",
                    keypoints.len(),
                    descriptors.rows()
                ),
            ));
        }
        Ok(Self {
            keypoints,
            descriptors,
        })
    }

    pub fn keypoints(&self) -> &[Keypoint] {
        &self.keypoints
    }

    pub fn descriptors(&self) -> &Mat {
        &self.descriptors
    }

    pub fn len(&self) -> usize {
        self.keypoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keypoints.is_empty()
    }

    pub fn opencv_keypoints(&self) -> opencv::Result<Vector<KeyPoint>> {
        self.keypoints
            .iter()
            .map(|kp| kp.to_opencv_keypoint())
            .collect()
    }
}

/// Перевод в оттенки серого. Одноканальное изображение возвращается как есть.
pub fn to_grayscale(image: &Mat) -> Result<Mat, Error> {
    let code = match image.channels() {
        1 => return image.try_clone(),
        3 => imgproc::COLOR_BGR2GRAY,
        4 => imgproc::COLOR_BGRA2GRAY,
        n => {
            return Err(Error::new(
                StsBadArg as i32,
                format!("Неподдерживаемое число каналов: {}", n),
            ));
        }
    };
    let mut gray = Mat::default();
    imgproc::cvt_color_def(image, &mut gray, code)?;
    Ok(gray)
}

pub struct FeatureExtractor {
    config: ExtractorConfig,
}

impl FeatureExtractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self { config }
    }

    /// SIFT на сером изображении. Для пустого изображения - пустой набор, не ошибка.
    pub fn extract(&self, image: &Mat) -> Result<FeatureSet, Error> {
        if image.empty() || image.rows() == 0 || image.cols() == 0 {
            return Ok(FeatureSet::empty());
        }
        let gray = to_grayscale(image)?;

        let mut sift = SIFT::create(
            self.config.max_features,
            self.config.octave_layers,
            self.config.contrast_threshold,
            self.config.edge_threshold,
            self.config.sigma,
            false,
        )?;

        let mut keypoints = Vector::<KeyPoint>::default();
        let mut descriptors = Mat::default();
        let mask = Mat::default();
        sift.detect_and_compute_def(&gray, &mask, &mut keypoints, &mut descriptors)?;

        if keypoints.is_empty() {
            return Ok(FeatureSet::empty());
        }
        let keypoints = keypoints
            .iter()
            .map(|kp| Keypoint::from_opencv_keypoint(&kp))
            .collect();
        FeatureSet::from_parts(keypoints, descriptors)
    }
}
