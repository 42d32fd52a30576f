use super::{open_store, ChannelArgs};
use repairdesk_server::ServeConfig;
use std::path::Path;
use std::time::Duration;

pub fn run(root: &Path, port: u16, report_tick_secs: u64, channel: &ChannelArgs) -> anyhow::Result<()> {
    // Fail before starting the runtime if the data directory is missing.
    open_store(root)?;
    if report_tick_secs == 0 {
        anyhow::bail!("--report-tick-secs must be at least 1");
    }

    // The blocking Telegram client is built and finally dropped outside the
    // async runtime.
    let channel = channel.channel()?;

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(repairdesk_server::serve(ServeConfig {
        root: root.to_path_buf(),
        port,
        report_tick: Duration::from_secs(report_tick_secs),
        channel: channel.clone(),
    }))?;
    drop(rt);
    drop(channel);
    Ok(())
}
