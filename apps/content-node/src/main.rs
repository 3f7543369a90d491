//! Binary entry point: loads configuration, installs the logging façade,
//! and hands control to the Lifecycle Controller (`kernel::run`).

mod config;
mod fallback;
mod handlers;
mod kernel;

use config::NodeConfig;

fn main() -> anyhow::Result<()> {
    let config = NodeConfig::load();
    contentnode_shared_telemetry::init_tracing("content_node");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(kernel::run(config))
}
