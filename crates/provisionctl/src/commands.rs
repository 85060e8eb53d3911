//! Subcommand implementations.

use anyhow::{Context, Result};
use provision_common::udev::{
    generate_udev_rule, udevadm_info, udevadm_settle, udevadm_trigger, SettleOptions,
};
use provision_common::{SystemCommandRunner, FEATURES};
use tracing::info;

pub fn info(path: &str) -> Result<()> {
    let runner = SystemCommandRunner;
    let mapping = udevadm_info(&runner, path)
        .with_context(|| format!("querying udev properties of {path}"))?;
    println!("{}", serde_json::to_string_pretty(&mapping)?);
    Ok(())
}

pub fn settle(exists: Option<String>, timeout: Option<u64>) -> Result<()> {
    let runner = SystemCommandRunner;
    udevadm_settle(&runner, &SettleOptions { exists, timeout })
        .context("waiting for udev event queue")?;
    Ok(())
}

pub fn trigger(devices: Vec<String>) -> Result<()> {
    let runner = SystemCommandRunner;
    udevadm_trigger(&runner, &devices).context("triggering udev events")?;
    Ok(())
}

pub fn net_rule(interface: &str, mac: &str, output: Option<&str>) -> Result<()> {
    let rule = generate_udev_rule(interface, mac);
    match output {
        Some(path) => {
            std::fs::write(path, &rule)
                .with_context(|| format!("writing udev rule to {path}"))?;
            info!("wrote udev rule for {} to {}", interface, path);
        }
        None => print!("{rule}"),
    }
    Ok(())
}

pub fn features() -> Result<()> {
    for feature in FEATURES {
        println!("{feature}");
    }
    Ok(())
}
