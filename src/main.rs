use clap::Parser;

use basestation::config::RuntimeConfig;

fn main() -> anyhow::Result<()> {
    let config = RuntimeConfig::parse();
    basestation::telemetry::init()?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(basestation::app::run(config))?;
    Ok(())
}
