use log::info;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};
use opencv::{Error, core::StsError};

use crate::config::SourceConfig;

/// Источник кадров: камера или видеофайл
pub struct FrameSource {
    capture: VideoCapture,
    is_file: bool,
}

impl FrameSource {
    pub fn open(config: &SourceConfig) -> Result<Self, Error> {
        let (capture, is_file) = match config {
            SourceConfig::Camera(index) => (VideoCapture::new(*index, videoio::CAP_ANY)?, false),
            SourceConfig::Video(path) => (
                VideoCapture::from_file(&path.to_string_lossy(), videoio::CAP_ANY)?,
                true,
            ),
        };
        if !capture.is_opened()? {
            return Err(Error::new(
                StsError as i32,
                format!("Источник {:?} не открылся", config),
            ));
        }
        info!("Источник кадров открыт: {:?}", config);
        Ok(Self { capture, is_file })
    }

    /// None - поток закончился. Пустой кадр с камеры возвращается как есть, его пропускает цикл.
    pub fn next_frame(&mut self) -> Result<Option<Mat>, Error> {
        let mut frame = Mat::default();
        let grabbed = self.capture.read(&mut frame)?;
        if !grabbed && self.is_file {
            return Ok(None);
        }
        Ok(Some(frame))
    }
}
