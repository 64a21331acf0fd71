#[macro_use]
extern crate anyhow;

use std::sync::Arc;

use anyhow::Context;
use async_std::task;
use clap::Parser;
use log::{debug, info};
use single_instance::SingleInstance;

use repeater_bridge::cli::Cli;
use repeater_bridge::conf::{Conf, ENV_VAR_PREFIX};
use repeater_bridge::context::BridgeContext;
use repeater_bridge::event_bits::EventBits;
use repeater_bridge::mac_clone::Timeouts;
use repeater_bridge::router::Router;
use repeater_bridge::sim::SimPlatform;
use repeater_bridge::traits::{EventBus, IpStack, RadioDriver};
use repeater_bridge::types::Mac;
use repeater_bridge::Result;

fn main() -> Result<()> {
    let args = Cli::parse();
    let instance = SingleInstance::new("repeater-bridge")?;
    if !instance.is_single() {
        return Err(anyhow!("Another instance is already running"));
    }

    let mut dot_env_path = std::env::current_exe().unwrap_or_default();
    dot_env_path.set_file_name(".env");
    let _ = dotenv::from_path(dot_env_path);

    let log_level = args
        .verbosity_level()
        .or_else(|| std::env::var(format!("{ENV_VAR_PREFIX}LOG_LEVEL")).ok())
        .unwrap_or_else(|| "error".into());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let server_config = Conf::load(args.conf.as_ref());
    server_config.validate().context("validating configuration")?;

    if !args.simulate {
        bail!("no production RadioDriver/IpStack backend is wired in; run with --simulate");
    }

    info!("starting in --simulate mode against the in-process reference platform");
    let original_sta_mac = Mac([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    let ap_mac = Mac([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);
    let ctx = Arc::new(BridgeContext::new(original_sta_mac, ap_mac));
    let platform = Arc::new(SimPlatform::new(original_sta_mac, ap_mac));
    let driver: Arc<dyn RadioDriver> = platform.clone();
    let ip_stack: Arc<dyn IpStack> = platform.clone();
    let event_bus: Arc<dyn EventBus> = platform.clone();
    let bits = Arc::new(EventBits::new());

    driver.set_max_tx_power(server_config.tx_power_dbm());
    let _ = driver.connect();

    let router = Router::new(ctx.clone(), driver, ip_stack, bits, Timeouts::default());
    let result: Result<()> = task::block_on(async move {
        router.run(&*event_bus).await;
        Ok(())
    });

    debug!("exiting");
    result
}
