pub mod config_cmd;
pub mod plugins;
pub mod send;
pub mod serve;

use conduit_config::AppConfig;

pub(crate) fn load_config() -> Result<AppConfig, Box<dyn std::error::Error>> {
    Ok(AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?)
}
