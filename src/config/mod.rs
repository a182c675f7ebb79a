pub mod assets;
pub mod settings;

pub use assets::*;
pub use settings::*;

use anyhow::Context;

/// Load scanner settings from a TOML file (optional) layered with
/// `SCANNER_*` environment variables.
pub fn load_settings(path: &str) -> anyhow::Result<ScannerSettings> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix("SCANNER")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("failed to read configuration from {path}"))?;

    let settings: ScannerSettings = cfg
        .try_deserialize()
        .with_context(|| format!("failed to parse configuration from {path}"))?;
    Ok(settings)
}
