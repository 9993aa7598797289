use opencv::core::{DMatch, Point, Point2f, Rect, Scalar, Vector};
use opencv::features2d::{DrawMatchesFlags, draw_matches};
use opencv::imgproc;
use opencv::prelude::*;
use opencv::{self, Error};

use crate::homography::Quad;
use crate::pipeline::{Detection, RoiTemplate};

pub const OUTLINE_THICKNESS: i32 = 4;

// BGR
pub fn outline_color() -> Scalar {
    Scalar::new(0.0, 255.0, 0.0, 0.0)
}

pub fn selection_color() -> Scalar {
    Scalar::new(0.0, 0.0, 255.0, 0.0)
}

fn to_pixel(p: Point2f) -> Point {
    Point::new(p.x.round() as i32, p.y.round() as i32)
}

/// Контур найденного объекта, рёбра 0-1-2-3-0
pub fn draw_outline(img: &mut Mat, quad: &Quad, color: Scalar, thickness: i32) -> Result<(), Error> {
    for (from, to) in quad.edges() {
        imgproc::line(
            img,
            to_pixel(from),
            to_pixel(to),
            color,
            thickness,
            imgproc::LINE_AA,
            0,
        )?;
    }
    Ok(())
}

/// Копия замороженного кадра с рамкой текущего выделения
pub fn draw_selection(frozen: &Mat, rect: Rect) -> Result<Mat, Error> {
    let mut preview = frozen.try_clone()?;
    imgproc::rectangle(&mut preview, rect, selection_color(), 1, imgproc::LINE_8, 0)?;
    Ok(preview)
}

/// ROI слева, кадр справа, только хорошие соответствия.
/// Контур сдвигается на ширину ROI, чтобы попасть на половину с кадром.
pub fn draw_match_view(roi: &RoiTemplate, frame: &Mat, detection: &Detection) -> Result<Mat, Error> {
    let roi_keypoints = roi.features().opencv_keypoints()?;
    let frame_keypoints = detection.frame_features.opencv_keypoints()?;
    let matches: Vector<DMatch> = detection
        .good_matches
        .iter()
        .map(|m| m.to_opencv_dmatch())
        .collect();

    let mut view = Mat::default();
    draw_matches(
        roi.image(),
        &roi_keypoints,
        frame,
        &frame_keypoints,
        &matches,
        &mut view,
        Scalar::all(-1.0),
        Scalar::all(-1.0),
        &Vector::new(),
        DrawMatchesFlags::NOT_DRAW_SINGLE_POINTS,
    )?;

    if let Some(outline) = detection.outcome.outline() {
        let shifted = outline.translated(Point2f::new(roi.width() as f32, 0.0));
        draw_outline(&mut view, &shifted, outline_color(), OUTLINE_THICKNESS)?;
    }
    Ok(view)
}

/// Кадр для главного окна: контур поверх живого кадра, если объект найден
pub fn draw_overlay(frame: &Mat, detection: &Detection) -> Result<Mat, Error> {
    let mut overlay = frame.try_clone()?;
    if let Some(outline) = detection.outcome.outline() {
        draw_outline(&mut overlay, outline, outline_color(), OUTLINE_THICKNESS)?;
    }
    Ok(overlay)
}
