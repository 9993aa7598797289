use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};

use lib_cv::pipeline::{DetectionOutcome, ObjectDetector, RoiTemplate};
use lib_cv::selection::{MouseInput, SelectionSession, SelectionUpdate};
use lib_cv::utils::crop_roi;
use lib_cv::visualization::{draw_match_view, draw_overlay, draw_selection};
use log::{debug, info, warn};
use opencv::core::{Rect, StsError};
use opencv::prelude::*;
use opencv::{Error, highgui, imgcodecs};

use crate::config::AppConfig;
use crate::input::{Command, command_from_key, mouse_input};
use crate::source::FrameSource;

pub const WINDOW_MAIN: &str = "Main window";
pub const WINDOW_SELECT: &str = "Select ROI";
pub const WINDOW_MATCHES: &str = "Matching";

pub struct DetectionApp {
    detector: ObjectDetector,
    roi: Option<RoiTemplate>,
    frozen: Option<Mat>,
    session: SelectionSession,
    mouse_tx: Sender<MouseInput>,
    mouse_rx: Receiver<MouseInput>,
    located: bool,
}

impl DetectionApp {
    pub fn new(config: &AppConfig) -> Result<Self, Error> {
        let detector = ObjectDetector::new(&config.detector)?;
        let (mouse_tx, mouse_rx) = mpsc::channel();
        let mut app = Self {
            detector,
            roi: None,
            frozen: None,
            session: SelectionSession::new(),
            mouse_tx,
            mouse_rx,
            located: false,
        };
        if let Some(path) = &config.template {
            app.load_template(path)?;
        }
        Ok(app)
    }

    fn load_template(&mut self, path: &Path) -> Result<(), Error> {
        let image = imgcodecs::imread(&path.to_string_lossy(), imgcodecs::IMREAD_COLOR)?;
        if image.empty() {
            return Err(Error::new(
                StsError as i32,
                format!("Не удалось прочитать шаблон {}", path.display()),
            ));
        }
        self.set_roi(image)
    }

    pub fn run(&mut self, source: &mut FrameSource) -> Result<(), Error> {
        highgui::named_window(WINDOW_MAIN, highgui::WINDOW_AUTOSIZE)?;
        info!("s - заморозить кадр и выделить объект, Esc - выход");

        loop {
            let Some(frame) = source.next_frame()? else {
                info!("Поток кадров закончился");
                break;
            };
            if frame.empty() {
                debug!("Пустой кадр пропущен");
            } else {
                self.handle_mouse()?;
                let shown = self.process_frame(&frame);
                highgui::imshow(WINDOW_MAIN, &shown)?;
            }

            match command_from_key(highgui::wait_key(1)?) {
                Some(Command::Quit) => break,
                Some(Command::Freeze) if !frame.empty() => self.freeze(&frame)?,
                _ => {}
            }
        }
        highgui::destroy_all_windows()?;
        Ok(())
    }

    /// Ошибки внутри цикла обработки не прерывают работу: кадр показывается без контура
    fn process_frame(&mut self, frame: &Mat) -> Mat {
        let Some(roi) = &self.roi else {
            return frame.clone();
        };
        let detection = match self.detector.detect(roi, frame) {
            Ok(d) => d,
            Err(e) => {
                warn!("Кадр пропущен: {}", e);
                return frame.clone();
            }
        };

        let located = matches!(detection.outcome, DetectionOutcome::Located { .. });
        if located != self.located {
            match &detection.outcome {
                DetectionOutcome::Located { pose, .. } => {
                    info!("Объект найден ({} inliers)", pose.inliers)
                }
                other => info!("Объект потерян: {:?}", other),
            }
            self.located = located;
        }

        match draw_match_view(roi, frame, &detection) {
            Ok(view) => {
                if let Err(e) = highgui::imshow(WINDOW_MATCHES, &view) {
                    warn!("Не удалось показать соответствия: {}", e);
                }
            }
            Err(e) => warn!("Не удалось нарисовать соответствия: {}", e),
        }
        match draw_overlay(frame, &detection) {
            Ok(overlay) => overlay,
            Err(e) => {
                warn!("Не удалось нарисовать контур: {}", e);
                frame.clone()
            }
        }
    }

    fn freeze(&mut self, frame: &Mat) -> Result<(), Error> {
        let frozen = frame.try_clone()?;
        highgui::imshow(WINDOW_SELECT, &frozen)?;
        highgui::move_window(WINDOW_SELECT, 200, 200)?;

        let tx = self.mouse_tx.clone();
        highgui::set_mouse_callback(
            WINDOW_SELECT,
            Some(Box::new(move |event, x, y, _flags| {
                if let Some(input) = mouse_input(event, x, y) {
                    // приёмник живёт столько же, сколько приложение
                    let _ = tx.send(input);
                }
            })),
        )?;

        self.frozen = Some(frozen);
        self.session = SelectionSession::new();
        info!("Кадр заморожен, выделите объект мышью в окне \"{}\"", WINDOW_SELECT);
        Ok(())
    }

    fn handle_mouse(&mut self) -> Result<(), Error> {
        while let Ok(input) = self.mouse_rx.try_recv() {
            let (session, update) = self.session.advance(input);
            self.session = session;
            self.apply_selection_update(update)?;
        }
        Ok(())
    }

    fn apply_selection_update(&mut self, update: SelectionUpdate) -> Result<(), Error> {
        let Some(frozen) = &self.frozen else {
            return Ok(());
        };
        match update {
            SelectionUpdate::Idle => {}
            SelectionUpdate::Preview(rect) => {
                highgui::imshow(WINDOW_SELECT, &draw_selection(frozen, rect)?)?;
            }
            SelectionUpdate::TooSmall(rect) => {
                warn!(
                    "Выделите область побольше: {}x{}, нужно больше {} пикселей по каждой стороне",
                    rect.width,
                    rect.height,
                    lib_cv::selection::MIN_SELECTION_SIZE
                );
                highgui::imshow(WINDOW_SELECT, frozen)?;
            }
            SelectionUpdate::Selected(rect) => self.select(rect)?,
        }
        Ok(())
    }

    fn select(&mut self, rect: Rect) -> Result<(), Error> {
        let Some(frozen) = &self.frozen else {
            return Ok(());
        };
        match crop_roi(frozen, rect)? {
            Some(roi_image) => self.set_roi(roi_image),
            None => {
                warn!("Выделение {:?} после обрезки по кадру слишком маленькое", rect);
                self.session = SelectionSession::new();
                Ok(())
            }
        }
    }

    fn set_roi(&mut self, roi_image: Mat) -> Result<(), Error> {
        let roi = self.detector.template(roi_image)?;
        if roi.features().is_empty() {
            warn!("В выделенной области нет ключевых точек, объект не будет найден");
        }
        info!(
            "Новый ROI {}x{}, ключевых точек: {}",
            roi.width(),
            roi.height(),
            roi.features().len()
        );
        self.roi = Some(roi);
        self.located = false;
        Ok(())
    }
}
