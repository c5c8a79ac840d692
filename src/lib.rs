pub mod audio;
pub mod capture;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod reticle;
pub mod sampler;
pub mod service;
pub mod settings;
pub mod timer;
pub mod utils;

#[cfg(test)]
mod test_support;

use clap::Parser;

pub use config::ScanConfig;
pub use error::ScanError;
pub use events::{UiBridge, UiEvent};
pub use service::{ActivationParams, OverlayKind, ScanService};

pub fn run() {
    let cli = host::Cli::parse();
    let config = ScanConfig::from_env();
    utils::init_logging(config.debug || cli.debug);

    log::info!("ColorScan starting up...");

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!("Failed to build async runtime: {err}");
            std::process::exit(1);
        }
    };

    if let Err(err) = runtime.block_on(host::run_host(cli, config)) {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}
