use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use lib_cv::config::{DetectorConfig, MatcherKind};
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(version, about = "Поиск выделенного объекта в видеопотоке по SIFT-признакам и гомографии")]
pub struct Cli {
    /// JSON файл с настройками
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// индекс камеры
    #[arg(long, conflicts_with = "video")]
    pub camera: Option<i32>,

    /// видеофайл вместо камеры
    #[arg(long)]
    pub video: Option<PathBuf>,

    /// изображение-шаблон, загружается как ROI при старте
    #[arg(long)]
    pub template: Option<PathBuf>,

    #[arg(long, value_enum)]
    pub matcher: Option<MatcherArg>,

    /// порог контраста SIFT (меньше - больше точек)
    #[arg(long)]
    pub threshold: Option<f64>,

    /// порог теста отношений
    #[arg(long)]
    pub ratio: Option<f32>,

    /// напечатать итоговые настройки в JSON и выйти
    #[arg(long)]
    pub print_config: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum MatcherArg {
    Flann,
    BruteForce,
}

impl From<MatcherArg> for MatcherKind {
    fn from(arg: MatcherArg) -> Self {
        match arg {
            MatcherArg::Flann => MatcherKind::Flann,
            MatcherArg::BruteForce => MatcherKind::BruteForce,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceConfig {
    Camera(i32),
    Video(PathBuf),
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Camera(0)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub source: SourceConfig,
    pub template: Option<PathBuf>,
    pub detector: DetectorConfig,
}

impl AppConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, String> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Не удалось прочитать {}: {}", path.display(), e))?;
        serde_json::from_str(&text)
            .map_err(|e| format!("Ошибка разбора {}: {}", path.display(), e))
    }

    /// Файл настроек (если указан), поверх него - аргументы командной строки
    pub fn resolve(cli: &Cli) -> Result<Self, String> {
        let mut config = match &cli.config {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };
        config.apply_cli(cli);
        config.detector.validate().map_err(|e| e.message)?;
        Ok(config)
    }

    fn apply_cli(&mut self, cli: &Cli) {
        if let Some(index) = cli.camera {
            self.source = SourceConfig::Camera(index);
        }
        if let Some(video) = &cli.video {
            self.source = SourceConfig::Video(video.clone());
        }
        if let Some(template) = &cli.template {
            self.template = Some(template.clone());
        }
        if let Some(matcher) = cli.matcher {
            self.detector.matcher = matcher.into();
        }
        if let Some(threshold) = cli.threshold {
            self.detector.extractor.contrast_threshold = threshold;
        }
        if let Some(ratio) = cli.ratio {
            self.detector.ratio = ratio;
        }
    }
}
