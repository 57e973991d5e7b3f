//! dicecam_api - query-only API service
//!
//! Serves `/get-current-number` from the mirror file written by a dicecamd
//! process, for deployments where the camera loop and the API run as
//! separate processes. Does not capture frames; `/video` answers 404.

use anyhow::Result;
use std::sync::mpsc;

use dicecam::{
    api::{ApiConfig, ApiServer, NumberSource},
    config::DicecamConfig,
};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = DicecamConfig::load()?;
    let api_config = ApiConfig {
        addr: config.api_addr.clone(),
    };
    let api_handle = ApiServer::new(
        api_config,
        NumberSource::Mirror(config.mirror_path.clone()),
        None,
    )
    .spawn()?;
    log::info!("api listening on {}", api_handle.addr);
    log::info!(
        "dicecam_api running. reading {}",
        config.mirror_path.display()
    );

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    log::info!("dicecam_api waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping api server...");
    api_handle.stop()?;

    Ok(())
}
