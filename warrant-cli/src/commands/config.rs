//! `warrant config ...` handlers

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;
use tracing::{error, info};
use warrant_config::{ConfigLoader, WarrantConfig};

use crate::cli::ConfigCommands;

pub fn handle(command: &ConfigCommands, config: &WarrantConfig) -> Result<()> {
    match command {
        ConfigCommands::Validate { config_file } => validate(config_file),
        ConfigCommands::Generate { output, force } => generate(output, *force),
        ConfigCommands::Show { format } => show(config, format),
    }
}

fn validate(config_file: &Path) -> Result<()> {
    info!("Validating configuration file: {:?}", config_file);

    if !config_file.exists() {
        return Err(anyhow::anyhow!(
            "Configuration file not found: {:?}",
            config_file
        ));
    }

    match ConfigLoader::new().from_file(config_file) {
        Ok(config) => {
            println!("Configuration file is valid");
            println!(
                "Scopes: {}",
                config.scopes.keys().cloned().collect::<Vec<_>>().join(", ")
            );
            Ok(())
        }
        Err(e) => {
            error!("Configuration validation failed: {}", e);
            Err(anyhow::anyhow!("Configuration validation failed: {}", e))
        }
    }
}

fn generate(output: &Path, force: bool) -> Result<()> {
    info!("Generating configuration at: {:?}", output);

    if output.exists() && !force {
        return Err(anyhow::anyhow!(
            "Output file already exists: {:?}. Use --force to overwrite.",
            output
        ));
    }

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent).context("Failed to create output directory")?;
    }

    fs::write(output, WarrantConfig::generate_sample())
        .context("Failed to write configuration file")?;

    println!("Configuration generated at: {:?}", output);
    println!(
        "Validate with: warrant config validate --config-file {:?}",
        output
    );
    Ok(())
}

fn show(config: &WarrantConfig, format: &str) -> Result<()> {
    println!("{}", render(config, format)?);
    Ok(())
}

fn render(config: &WarrantConfig, format: &str) -> Result<String> {
    match format.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::to_string(config).context("Failed to serialize to YAML"),
        "json" => serde_json::to_string_pretty(config).context("Failed to serialize to JSON"),
        other => Err(anyhow::anyhow!(
            "Unsupported format: {}. Use 'yaml' or 'json'",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_then_validate() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("warrant.yaml");

        generate(&path, false).unwrap();
        assert!(validate(&path).is_ok());

        // Refuses to clobber without --force
        assert!(generate(&path, false).is_err());
        assert!(generate(&path, true).is_ok());
    }

    #[test]
    fn test_validate_missing_file() {
        let dir = TempDir::new().unwrap();
        assert!(validate(&dir.path().join("absent.yaml")).is_err());
    }

    #[test]
    fn test_render_formats() {
        let config = WarrantConfig::default();
        assert!(render(&config, "yaml").unwrap().contains("scopes"));
        assert!(render(&config, "JSON").unwrap().starts_with('{'));
        assert!(render(&config, "toml").is_err());
    }
}
