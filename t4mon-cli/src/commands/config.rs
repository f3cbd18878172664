//! Effective configuration dump.

use std::path::Path;

use crate::error::CliError;
use crate::util::load_settings;

/// Config command handler
pub fn cmd_config(settings_path: &Path) -> Result<(), CliError> {
    let settings = load_settings(settings_path)?;
    println!("# {}", settings_path.display());
    print!("{}", settings.to_toml()?);
    Ok(())
}
