//! `config`: print the merged configuration.

use anyhow::Result;

use crate::cli::output::{output, ConfigOutput};
use crate::domain::models::Config;

pub fn execute(config: Config, json_mode: bool) -> Result<()> {
    output(&ConfigOutput(config), json_mode);
    Ok(())
}
