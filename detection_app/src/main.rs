mod app;
mod config;
mod input;
mod source;

use clap::Parser;
use log::{error, info};

use crate::app::DetectionApp;
use crate::config::{AppConfig, Cli};
use crate::source::FrameSource;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = match AppConfig::resolve(&cli) {
        Ok(c) => c,
        Err(e) => {
            error!("Ошибка в настройках: {}", e);
            std::process::exit(2);
        }
    };

    if cli.print_config {
        match serde_json::to_string_pretty(&config) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                error!("Не удалось сериализовать настройки: {}", e);
                std::process::exit(2);
            }
        }
        return;
    }
    info!(
        "Сопоставление: {:?}, порог контраста {}, ratio {}",
        config.detector.matcher, config.detector.extractor.contrast_threshold, config.detector.ratio
    );

    let mut source = match FrameSource::open(&config.source) {
        Ok(s) => s,
        Err(e) => {
            error!("Не получилось открыть источник кадров: {}", e);
            std::process::exit(1);
        }
    };

    let mut app = match DetectionApp::new(&config) {
        Ok(app) => app,
        Err(e) => {
            error!("Не получилось запустить детектор: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = app.run(&mut source) {
        error!("Работа прервана: {}", e);
        std::process::exit(1);
    }
}
