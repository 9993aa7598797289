use opencv::core::{DMatch, NORM_L2, Point2f, StsBadArg, Vector};
use opencv::features2d::{BFMatcher, FlannBasedMatcher};
use opencv::prelude::*;
use opencv::{self, Error};

use crate::config::MatcherKind;
use crate::features::Keypoint;

/// Сколько соседей запрашивается для теста отношений
pub const KNN_NEIGHBOURS: i32 = 2;

/// Кандидат в соответствие: дескриптор запроса (ROI) -> дескриптор кадра.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Match {
    pub query_idx: usize,
    pub reference_idx: usize,
    pub distance: f32,
}

impl Match {
    pub fn new(query_idx: usize, reference_idx: usize, distance: f32) -> Self {
        Self {
            query_idx,
            reference_idx,
            distance,
        }
    }

    pub fn to_opencv_dmatch(&self) -> DMatch {
        DMatch {
            query_idx: self.query_idx as i32,
            train_idx: self.reference_idx as i32,
            img_idx: -1,
            distance: self.distance,
        }
    }
}

impl TryFrom<DMatch> for Match {
    type Error = Error;

    fn try_from(m: DMatch) -> Result<Self, Self::Error> {
        if m.query_idx < 0 || m.train_idx < 0 {
            return Err(Error::new(
                StsBadArg as i32,
                format!("Отрицательный индекс в DMatch: {:?}", m),
            ));
        }
        Ok(Self::new(m.query_idx as usize, m.train_idx as usize, m.distance))
    }
}

/// Пара точек: в координатах ROI и в координатах кадра
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Correspondence {
    pub roi: Point2f,
    pub frame: Point2f,
}

pub struct KnnMatcher {
    kind: MatcherKind,
}

impl KnnMatcher {
    pub fn new(kind: MatcherKind) -> Self {
        Self { kind }
    }

    /// Для каждого дескриптора запроса - до k ближайших дескрипторов кадра по возрастанию расстояния.
    /// Длина результата равна числу строк query. Если в reference меньше k строк,
    /// кандидатов тоже меньше k.
    pub fn knn_match(&self, query: &Mat, reference: &Mat, k: i32) -> Result<Vec<Vec<Match>>, Error> {
        if k < 1 {
            return Err(Error::new(
                StsBadArg as i32,
                format!("k должно быть положительным, получено {}", k),
            ));
        }
        let query_rows = if query.empty() { 0 } else { query.rows() as usize };
        if query_rows == 0 {
            return Ok(Vec::new());
        }
        if reference.empty() || reference.rows() == 0 {
            return Ok(vec![Vec::new(); query_rows]);
        }

        let mut matched_descriptors = Vector::<Vector<DMatch>>::default();
        // FLANN на наборе меньше k строк ведёт себя непредсказуемо, там перебор
        let use_flann = self.kind == MatcherKind::Flann && reference.rows() >= k;
        if use_flann {
            let flann_matcher = FlannBasedMatcher::create()?;
            flann_matcher.knn_train_match_def(query, reference, &mut matched_descriptors, k)?;
        } else {
            let bf_matcher = BFMatcher::create(NORM_L2, false)?;
            bf_matcher.knn_train_match_def(query, reference, &mut matched_descriptors, k)?;
        }

        let mut result = vec![Vec::new(); query_rows];
        for neighbours in matched_descriptors.iter() {
            let mut candidates = neighbours
                .iter()
                .map(Match::try_from)
                .collect::<Result<Vec<Match>, Error>>()?;
            let Some(first) = candidates.first() else {
                continue;
            };
            let query_idx = first.query_idx;
            if query_idx >= query_rows {
                return Err(Error::new(
                    StsBadArg as i32,
                    format!("Индекс запроса {} вне диапазона {}", query_idx, query_rows),
                ));
            }
            candidates.sort_by(|a, b| a.distance.total_cmp(&b.distance));
            result[query_idx] = candidates;
        }
        Ok(result)
    }
}

/// Тест отношений: лучший кандидат принимается, только если кандидатов ровно два
/// и distance(c0) <= ratio * distance(c1). Остальные молча отбрасываются.
pub fn ratio_test(knn_matches: &[Vec<Match>], ratio: f32) -> Vec<Match> {
    knn_matches
        .iter()
        .filter_map(|candidates| match candidates.as_slice() {
            [best, second] if best.distance <= ratio * second.distance => Some(*best),
            _ => None,
        })
        .collect()
}

pub fn gather_correspondences(
    good_matches: &[Match],
    roi_keypoints: &[Keypoint],
    frame_keypoints: &[Keypoint],
) -> Result<Vec<Correspondence>, Error> {
    good_matches
        .iter()
        .map(|m| {
            let roi = roi_keypoints.get(m.query_idx);
            let frame = frame_keypoints.get(m.reference_idx);
            match (roi, frame) {
                (Some(roi), Some(frame)) => Ok(Correspondence {
                    roi: roi.pt,
                    frame: frame.pt,
                }),
                _ => Err(Error::new(
                    StsBadArg as i32,
                    format!(
                        "Соответствие {:?} ссылается на несуществующую ключевую точку",
                        m
                    ),
                )),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidates(distances: &[f32]) -> Vec<Match> {
        distances
            .iter()
            .enumerate()
            .map(|(i, &d)| Match::new(0, i, d))
            .collect()
    }

    #[test]
    fn ratio_test_keeps_only_confident_pairs() {
        let knn = vec![
            candidates(&[1.0, 10.0]), // принят
            candidates(&[6.0, 10.0]), // ровно на пороге - принят
            candidates(&[6.1, 10.0]), // неоднозначно
            candidates(&[1.0]),       // один кандидат
            candidates(&[]),
            candidates(&[1.0, 10.0, 20.0]), // больше двух
        ];
        let good = ratio_test(&knn, 0.6);
        assert_eq!(good.len(), 2);
        assert_eq!(good[0].distance, 1.0);
        assert_eq!(good[1].distance, 6.0);
    }

    #[test]
    fn ratio_test_matches_predicate_on_grid() {
        let mut knn = Vec::new();
        let mut expected = 0;
        for a in 0..20 {
            for b in 0..20 {
                let (d0, d1) = (a as f32, b as f32);
                if d0 <= 0.6 * d1 {
                    expected += 1;
                }
                knn.push(candidates(&[d0, d1]));
            }
        }
        assert_eq!(ratio_test(&knn, 0.6).len(), expected);
    }

    #[test]
    fn zero_distances_pass() {
        // 0 <= 0.6 * 0, как в исходном предикате
        let good = ratio_test(&[candidates(&[0.0, 0.0])], 0.6);
        assert_eq!(good.len(), 1);
    }

    #[test]
    fn gather_rejects_bad_indices() {
        let roi = vec![Keypoint::new(1.0, 2.0, 3.0)];
        let frame = vec![Keypoint::new(5.0, 6.0, 3.0)];
        let ok = gather_correspondences(&[Match::new(0, 0, 0.5)], &roi, &frame).unwrap();
        assert_eq!(ok[0].roi, Point2f::new(1.0, 2.0));
        assert_eq!(ok[0].frame, Point2f::new(5.0, 6.0));
        assert!(gather_correspondences(&[Match::new(0, 1, 0.5)], &roi, &frame).is_err());
    }

    #[test]
    fn knn_orders_neighbours_and_covers_every_query() {
        let reference =
            Mat::from_slice_2d(&[[0f32, 0.0], [10.0, 0.0], [3.0, 0.0], [0.0, 7.0]]).unwrap();
        let query = Mat::from_slice_2d(&[[1f32, 0.0], [9.0, 1.0], [0.0, 6.0]]).unwrap();

        for kind in [MatcherKind::BruteForce, MatcherKind::Flann] {
            let matches = KnnMatcher::new(kind)
                .knn_match(&query, &reference, KNN_NEIGHBOURS)
                .unwrap();
            assert_eq!(matches.len(), 3);
            for (j, candidates) in matches.iter().enumerate() {
                assert_eq!(candidates.len(), 2);
                assert!(candidates[0].distance <= candidates[1].distance);
                assert!(candidates.iter().all(|m| m.query_idx == j));
            }
            assert_eq!(matches[0][0].reference_idx, 0);
            assert_eq!(matches[1][0].reference_idx, 1);
            assert_eq!(matches[2][0].reference_idx, 3);
        }
    }

    #[test]
    fn knn_with_single_reference_gives_one_candidate() {
        let reference = Mat::from_slice_2d(&[[0f32, 0.0]]).unwrap();
        let query = Mat::from_slice_2d(&[[1f32, 0.0], [2.0, 2.0]]).unwrap();
        let matches = KnnMatcher::new(MatcherKind::Flann)
            .knn_match(&query, &reference, KNN_NEIGHBOURS)
            .unwrap();
        assert_eq!(matches.len(), 2);
        assert!(matches.iter().all(|c| c.len() == 1));
        assert!(ratio_test(&matches, 0.6).is_empty());
    }

    #[test]
    fn knn_with_empty_sets() {
        let matcher = KnnMatcher::new(MatcherKind::BruteForce);
        let query = Mat::from_slice_2d(&[[1f32, 0.0]]).unwrap();
        assert!(matcher.knn_match(&Mat::default(), &query, 2).unwrap().is_empty());
        let matches = matcher.knn_match(&query, &Mat::default(), 2).unwrap();
        assert_eq!(matches, vec![Vec::<Match>::new()]);
    }
}
