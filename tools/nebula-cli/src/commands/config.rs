//! Show or write the configuration file.

use nebula_common::config::AppConfig;

pub fn run(config: &AppConfig, init: bool) -> anyhow::Result<()> {
    let path = AppConfig::path();
    if init {
        if path.exists() {
            anyhow::bail!("Config already exists at {}", path.display());
        }
        config.save()?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    println!("# {}", path.display());
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
