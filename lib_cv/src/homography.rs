use log::debug;
use opencv::calib3d::{RANSAC, find_homography_ext};
use opencv::core::{Point2f, Vector, count_non_zero};
use opencv::prelude::*;
use opencv::{self, Error};

use crate::config::{MIN_HOMOGRAPHY_POINTS, PoseConfig};
use crate::correspondence::Correspondence;

const DEGENERATE_EPS: f64 = 1e-9;
/// Углы дальше этой координаты считаются ушедшими на бесконечность
pub const MAX_CORNER_COORD: f32 = 1e5;

/// Проективное преобразование 3x3 из координат ROI в координаты кадра.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
    m: [[f64; 3]; 3],
}

impl Homography {
    /// None, если матрица вырождена или содержит не конечные значения.
    /// det(H) / h22^3 - якобиан отображения в начале координат ROI, от сдвига он не зависит.
    pub fn new(m: [[f64; 3]; 3]) -> Option<Self> {
        if m.iter().flatten().any(|v| !v.is_finite()) {
            return None;
        }
        let w = m[2][2];
        if w.abs() < DEGENERATE_EPS {
            return None;
        }
        let h = Self { m };
        if (h.determinant() / w.powi(3)).abs() < DEGENERATE_EPS {
            return None;
        }
        Some(h)
    }

    pub fn identity() -> Self {
        Self {
            m: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }

    /// Пустая матрица (find_homography не нашла модель) даёт Ok(None)
    pub fn from_mat(mat: &Mat) -> Result<Option<Self>, Error> {
        if mat.empty() || mat.rows() != 3 || mat.cols() != 3 {
            return Ok(None);
        }
        let mut m = [[0.0; 3]; 3];
        for (r, row) in m.iter_mut().enumerate() {
            for (c, value) in row.iter_mut().enumerate() {
                *value = *mat.at_2d::<f64>(r as i32, c as i32)?;
            }
        }
        Ok(Self::new(m))
    }

    pub fn determinant(&self) -> f64 {
        let m = &self.m;
        m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
            - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
            + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
    }

    /// None для точки, уходящей на бесконечность
    pub fn project(&self, p: Point2f) -> Option<Point2f> {
        let (x, y) = (p.x as f64, p.y as f64);
        let m = &self.m;
        let w = m[2][0] * x + m[2][1] * y + m[2][2];
        if w.abs() < DEGENERATE_EPS {
            return None;
        }
        let u = (m[0][0] * x + m[0][1] * y + m[0][2]) / w;
        let v = (m[1][0] * x + m[1][1] * y + m[1][2]) / w;
        Some(Point2f::new(u as f32, v as f32))
    }
}

/// Четырёхугольник найденного объекта, углы по порядку обхода.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quad {
    pub corners: [Point2f; 4],
}

impl Quad {
    /// Рёбра 0-1, 1-2, 2-3, 3-0
    pub fn edges(&self) -> [(Point2f, Point2f); 4] {
        let c = &self.corners;
        [(c[0], c[1]), (c[1], c[2]), (c[2], c[3]), (c[3], c[0])]
    }

    pub fn translated(&self, offset: Point2f) -> Self {
        Self {
            corners: self.corners.map(|p| Point2f::new(p.x + offset.x, p.y + offset.y)),
        }
    }
}

pub fn roi_corners(width: i32, height: i32) -> [Point2f; 4] {
    let (w, h) = (width as f32, height as f32);
    [
        Point2f::new(0.0, 0.0),
        Point2f::new(w, 0.0),
        Point2f::new(w, h),
        Point2f::new(0.0, h),
    ]
}

/// None, если хотя бы один угол уходит на бесконечность или дальше MAX_CORNER_COORD
pub fn reproject_roi(homography: &Homography, width: i32, height: i32) -> Option<Quad> {
    let [a, b, c, d] = roi_corners(width, height);
    let quad = Quad {
        corners: [
            homography.project(a)?,
            homography.project(b)?,
            homography.project(c)?,
            homography.project(d)?,
        ],
    };
    let bounded = quad
        .corners
        .iter()
        .all(|p| p.x.abs() <= MAX_CORNER_COORD && p.y.abs() <= MAX_CORNER_COORD);
    bounded.then_some(quad)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseEstimate {
    pub homography: Homography,
    pub inliers: usize,
}

pub trait PoseEstimator {
    /// Ok(None) - согласованная модель не найдена, это не ошибка
    fn estimate(&self, correspondences: &[Correspondence]) -> Result<Option<PoseEstimate>, Error>;
}

pub struct RansacEstimator {
    config: PoseConfig,
}

impl RansacEstimator {
    pub fn new(config: PoseConfig) -> Self {
        Self { config }
    }
}

impl PoseEstimator for RansacEstimator {
    fn estimate(&self, correspondences: &[Correspondence]) -> Result<Option<PoseEstimate>, Error> {
        let roi_points: Vec<Point2f> = correspondences.iter().map(|c| c.roi).collect();
        let frame_points: Vec<Point2f> = correspondences.iter().map(|c| c.frame).collect();
        if !spans_plane(&roi_points) || !spans_plane(&frame_points) {
            debug!("Соответствия вырождены, гомография не оценивается");
            return Ok(None);
        }

        let src: Vector<Point2f> = roi_points.into_iter().collect();
        let dst: Vector<Point2f> = frame_points.into_iter().collect();
        let mut mask = Mat::default();
        let h = match find_homography_ext(
            &src,
            &dst,
            RANSAC,
            self.config.ransac_reproj_threshold,
            &mut mask,
            self.config.max_iters,
            self.config.confidence,
        ) {
            Ok(h) => h,
            Err(e) => {
                debug!("find_homography не справилась: {}", e);
                return Ok(None);
            }
        };

        let Some(homography) = Homography::from_mat(&h)? else {
            return Ok(None);
        };
        let inliers = if mask.empty() {
            correspondences.len()
        } else {
            count_non_zero(&mask)? as usize
        };
        Ok(Some(PoseEstimate {
            homography,
            inliers,
        }))
    }
}

/// Есть ли среди точек хотя бы 4 различных и не лежат ли все они на одной прямой
pub fn spans_plane(points: &[Point2f]) -> bool {
    let mut distinct: Vec<Point2f> = Vec::with_capacity(points.len());
    for p in points {
        if !distinct.iter().any(|q| (q.x - p.x).abs() < 1e-3 && (q.y - p.y).abs() < 1e-3) {
            distinct.push(*p);
        }
    }
    if distinct.len() < MIN_HOMOGRAPHY_POINTS {
        return false;
    }

    let origin = distinct[0];
    let Some(far) = distinct.iter().copied().max_by(|a, b| {
        let da = (a.x - origin.x).powi(2) + (a.y - origin.y).powi(2);
        let db = (b.x - origin.x).powi(2) + (b.y - origin.y).powi(2);
        da.total_cmp(&db)
    }) else {
        return false;
    };
    let (dx, dy) = ((far.x - origin.x) as f64, (far.y - origin.y) as f64);
    let length = (dx * dx + dy * dy).sqrt();
    distinct.iter().any(|p| {
        let cross = dx * (p.y - origin.y) as f64 - dy * (p.x - origin.x) as f64;
        (cross / length).abs() > 1e-2
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(a: Point2f, b: Point2f, tol: f32) {
        assert!(
            (a.x - b.x).abs() < tol && (a.y - b.y).abs() < tol,
            "{:?} далеко от {:?}",
            a,
            b
        );
    }

    #[test]
    fn rejects_degenerate_matrices() {
        assert!(Homography::new([[0.0; 3]; 3]).is_none());
        assert!(Homography::new([[1.0, 2.0, 3.0], [2.0, 4.0, 6.0], [0.0, 0.0, 1.0]]).is_none());
        assert!(Homography::new([[f64::NAN, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]]).is_none());
        assert!(Homography::from_mat(&Mat::default()).unwrap().is_none());
    }

    #[test]
    fn scale_and_shift_maps_roi_corners() {
        let h = Homography::new([[2.0, 0.0, 50.0], [0.0, 2.0, 50.0], [0.0, 0.0, 1.0]]).unwrap();
        let quad = reproject_roi(&h, 100, 100).unwrap();
        let expected = [
            Point2f::new(50.0, 50.0),
            Point2f::new(250.0, 50.0),
            Point2f::new(250.0, 250.0),
            Point2f::new(50.0, 250.0),
        ];
        for (got, want) in quad.corners.iter().zip(expected) {
            assert_close(*got, want, 1e-4);
        }
    }

    #[test]
    fn frame_sized_translations_are_accepted() {
        let poses = [
            [[1.0, 0.0, 1200.0], [0.0, 1.0, 500.0], [0.0, 0.0, 1.0]],
            [[0.5, 0.0, 1000.0], [0.0, 0.5, 600.0], [0.0, 0.0, 1.0]],
            [[0.3, 0.0, 500.0], [0.0, 0.3, 300.0], [0.0, 0.0, 1.0]],
            [[0.1, 0.0, 3800.0], [0.0, 0.1, 2100.0], [0.0, 0.0, 1.0]],
            [[0.9, -0.2, 1700.0], [0.15, 1.1, 950.0], [0.0001, -0.00005, 1.0]],
        ];
        for m in poses {
            let h = Homography::new(m).unwrap_or_else(|| panic!("{:?} отброшена", m));
            assert!(reproject_roi(&h, 200, 150).is_some());
        }

        // масштаб всей матрицы на вырожденность не влияет
        let scaled = [[2.0, 0.0, 2400.0], [0.0, 2.0, 1000.0], [0.0, 0.0, 2.0]];
        let h = Homography::new(scaled).unwrap();
        assert_close(h.project(Point2f::new(0.0, 0.0)).unwrap(), Point2f::new(1200.0, 500.0), 1e-3);
    }

    #[test]
    fn singular_matrix_with_translation_is_rejected() {
        // вторая строка кратна первой при любом сдвиге
        assert!(Homography::new([[1.0, 2.0, 1500.0], [2.0, 4.0, 3000.0], [0.0, 0.0, 1.0]]).is_none());
        // h22 = 0: начало ROI уходит на бесконечность
        assert!(Homography::new([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.001, 0.0, 0.0]]).is_none());
        // линейный блок невырожден, но перспектива делает всю матрицу вырожденной
        assert!(Homography::new([[1.0, 0.0, 1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 1.0]]).is_none());
    }

    #[test]
    fn far_away_corners_give_no_outline() {
        // w в углу (100, 0) равно 1e-8, координата около 1e10
        let h = Homography::new([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [-0.0099999999, 0.0, 1.0]]).unwrap();
        assert!(reproject_roi(&h, 100, 50).is_none());
    }

    #[test]
    fn point_at_infinity_gives_no_outline() {
        // w = 1 - x/100 обращается в ноль в углу (100, 0)
        let h = Homography::new([[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [-0.01, 0.0, 1.0]]).unwrap();
        assert!(reproject_roi(&h, 100, 50).is_none());
    }

    #[test]
    fn quad_edges_are_cyclic() {
        let quad = Quad {
            corners: roi_corners(10, 20),
        };
        let edges = quad.edges();
        for i in 0..4 {
            assert_eq!(edges[i].1, edges[(i + 1) % 4].0);
        }
        let shifted = quad.translated(Point2f::new(5.0, 0.0));
        assert_eq!(shifted.corners[2], Point2f::new(15.0, 20.0));
    }

    #[test]
    fn spans_plane_detects_degenerate_sets() {
        let collinear: Vec<Point2f> = (0..10).map(|i| Point2f::new(i as f32, 2.0 * i as f32)).collect();
        assert!(!spans_plane(&collinear));
        let duplicates = vec![Point2f::new(1.0, 1.0); 8];
        assert!(!spans_plane(&duplicates));
        let square = roi_corners(10, 10);
        assert!(spans_plane(&square));
    }

    #[test]
    fn ransac_recovers_known_transform() {
        let truth = Homography::new([
            [1.2, 0.1, 30.0],
            [-0.05, 0.9, 12.0],
            [0.0004, 0.0002, 1.0],
        ])
        .unwrap();
        let correspondences: Vec<Correspondence> = (0..8)
            .flat_map(|i| (0..8).map(move |j| Point2f::new(i as f32 * 25.0, j as f32 * 20.0)))
            .map(|p| Correspondence {
                roi: p,
                frame: truth.project(p).unwrap(),
            })
            .collect();

        let estimate = RansacEstimator::new(PoseConfig::default())
            .estimate(&correspondences)
            .unwrap()
            .expect("модель должна найтись");
        assert_eq!(estimate.inliers, correspondences.len());
        for c in &correspondences {
            let p = estimate.homography.project(c.roi).unwrap();
            assert_close(p, c.frame, 1.0);
        }
    }

    #[test]
    fn ransac_recovers_transform_far_from_origin() {
        let truth = Homography::new([
            [0.6, 0.05, 1350.0],
            [-0.04, 0.55, 820.0],
            [0.00008, 0.00003, 1.0],
        ])
        .unwrap();
        let correspondences: Vec<Correspondence> = (0..10)
            .flat_map(|i| (0..6).map(move |j| Point2f::new(i as f32 * 30.0, j as f32 * 35.0)))
            .map(|p| Correspondence {
                roi: p,
                frame: truth.project(p).unwrap(),
            })
            .collect();

        let estimate = RansacEstimator::new(PoseConfig::default())
            .estimate(&correspondences)
            .unwrap()
            .expect("модель должна найтись при сдвиге больше 1000 пикселей");
        assert_eq!(estimate.inliers, correspondences.len());
        let outline = reproject_roi(&estimate.homography, 270, 175).unwrap();
        let expected = reproject_roi(&truth, 270, 175).unwrap();
        for (got, want) in outline.corners.iter().zip(expected.corners) {
            assert_close(*got, want, 1.0);
        }
    }

    #[test]
    fn ransac_reports_no_pose_for_collinear_points() {
        let correspondences: Vec<Correspondence> = (0..6)
            .map(|i| Correspondence {
                roi: Point2f::new(i as f32, 0.0),
                frame: Point2f::new(2.0 * i as f32, 5.0),
            })
            .collect();
        let estimate = RansacEstimator::new(PoseConfig::default())
            .estimate(&correspondences)
            .unwrap();
        assert!(estimate.is_none());
    }
}
