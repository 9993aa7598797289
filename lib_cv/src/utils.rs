use opencv::{
    Error,
    core::{Rect, StsBadArg},
    prelude::*,
};

use crate::selection::{clamp_to_image, is_large_enough};

/// Копия области кадра. Прямоугольник обрезается по границам кадра;
/// если после этого он слишком мал, возвращается None.
pub fn crop_roi(img: &Mat, rect: Rect) -> Result<Option<Mat>, Error> {
    if img.empty() {
        return Err(Error::new(
            StsBadArg as i32,
            "Нельзя вырезать ROI из пустого кадра".to_string(),
        ));
    }
    let Some(rect) = clamp_to_image(rect, img.cols(), img.rows()) else {
        return Ok(None);
    };
    if !is_large_enough(rect) {
        return Ok(None);
    }
    let roi = Mat::roi(img, rect)?;
    let mut cropped = Mat::default();
    roi.copy_to(&mut cropped)?;
    Ok(Some(cropped))
}
