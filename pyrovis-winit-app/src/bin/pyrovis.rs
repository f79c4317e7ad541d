use std::process::ExitCode;

use pyrovis_app::config::PyrovisConfig;
use pyrovis_crate_tools::init_log::init_log;
use pyrovis_winit_app::app::WinitApp;

fn run(config_path: &str) -> anyhow::Result<()> {
    let config = PyrovisConfig::load(config_path)?;
    init_log(&config.logger.log_options(&config.paths())?)?;
    log::info!("config: {config_path}");

    WinitApp::run(config)
}

fn main() -> ExitCode {
    let Some(config_path) = std::env::args().nth(1) else {
        eprintln!("usage: pyrovis <config.json>");
        return ExitCode::FAILURE;
    };

    match run(&config_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // logger 可能还没有初始化
            if log::log_enabled!(log::Level::Error) {
                log::error!("{e:?}");
            } else {
                eprintln!("{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}
