//! `conduit config`: Configuration management commands.

use clap::Subcommand;
use conduit_config::{AppConfig, ProviderKind};

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration (default)
    Show,
    /// Print the config file location
    Path,
    /// Load and validate the configuration
    Validate,
    /// Write a default config file if none exists
    Init,
}

pub async fn run(action: Option<ConfigAction>) -> Result<(), Box<dyn std::error::Error>> {
    match action.unwrap_or(ConfigAction::Show) {
        ConfigAction::Show => show(),
        ConfigAction::Path => path(),
        ConfigAction::Validate => validate(),
        ConfigAction::Init => init(),
    }
}

fn config_path() -> std::path::PathBuf {
    AppConfig::config_dir().join("config.toml")
}

fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let mut value = toml::Value::try_from(&config)?;
    if let Some(key) = value
        .get_mut("provider")
        .and_then(|p| p.get_mut("api_key"))
    {
        *key = toml::Value::String("***".into());
    }
    println!("{}", toml::to_string_pretty(&value)?);
    Ok(())
}

fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", config_path().display());
    Ok(())
}

fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   Config OK");

            let mut warnings = Vec::new();
            if config.provider.kind == ProviderKind::Openai && config.provider.api_key.is_none() {
                warnings.push("provider.kind = openai but no API key (set CONDUIT_API_KEY or OPENAI_API_KEY)");
            }
            if config.gateway.host == "0.0.0.0" {
                warnings.push("gateway is bound to all interfaces");
            }
            for w in &warnings {
                println!("   warning: {w}");
            }

            println!();
            println!("   Provider:  {:?} ({})", config.provider.kind, config.provider.model);
            println!("   Planner:   {:?}", config.planner.kind);
            println!("   Policy:    {:?}", config.runtime.failure_policy);
            println!("   Memory:    {:?}", config.memory.backend);
            println!("   Plugins:   {}", config.plugins.enabled.join(", "));
            println!("   Gateway:   {}:{}", config.gateway.host, config.gateway.port);
            Ok(())
        }
        Err(e) => {
            println!("   Config error: {e}");
            Err(e.into())
        }
    }
}

fn init() -> Result<(), Box<dyn std::error::Error>> {
    let path = config_path();
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    std::fs::write(&path, AppConfig::default_toml())?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
