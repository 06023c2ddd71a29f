//! Show or save the effective configuration.

use efv_common::config::AppConfig;

pub fn run(config: &AppConfig, save: bool) -> anyhow::Result<()> {
    let path = AppConfig::path();
    println!("Config file: {}", path.display());
    if !path.exists() {
        println!("  (not present, using defaults)");
    }
    println!();
    println!("{}", serde_json::to_string_pretty(config)?);

    if save {
        config
            .save()
            .map_err(|e| anyhow::anyhow!("Failed to save config: {e}"))?;
        println!();
        println!("Saved to {}", path.display());
    }

    Ok(())
}
