//! `llmux status`: show configuration, provider availability, and stores.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use colored::Colorize;

use llmux_core::config::{get_config_path, Config};
use llmux_core::store::LocalFileStore;
use llmux_core::utils::expand_home;
use llmux_engine::ModelRepository;
use llmux_providers::registry::{effective_api_base, is_available};
use llmux_providers::PROVIDERS;

fn found(exists: bool) -> String {
    if exists {
        "✓".green().to_string()
    } else {
        "(not found)".red().to_string()
    }
}

/// Run the status command.
pub fn run(config: &Config, config_path: Option<PathBuf>) -> Result<()> {
    let config_path = config_path.unwrap_or_else(get_config_path);

    println!();
    println!("{}", "llmux status".cyan().bold());
    println!();

    println!(
        "  {:<18} {} {}",
        "Config:".bold(),
        config_path.display(),
        found(config_path.exists())
    );

    let defaults = &config.defaults;
    let model = if defaults.model.is_empty() {
        "(provider default)".to_string()
    } else {
        defaults.model.clone()
    };
    println!("  {:<18} {} / {}", "Default:".bold(), defaults.provider, model);
    println!(
        "  {:<18} {} | max_tokens: {} | timeout: {}s",
        "Parameters:".bold(),
        format!("temp: {}", defaults.temperature).dimmed(),
        format!("{}", defaults.max_tokens).dimmed(),
        format!("{}", defaults.timeout_secs).dimmed(),
    );

    // Providers
    println!();
    println!("  {}", "Providers:".bold());
    for spec in PROVIDERS {
        let provider_config = config.providers.get_by_name(spec.name).cloned().unwrap_or_default();
        let status = if is_available(spec, &provider_config) {
            format!("{} {}", "✓".green(), effective_api_base(spec, &provider_config).dimmed())
        } else {
            format!("{}", format!("· not configured ({})", spec.env_key).dimmed())
        };
        println!("    {:<20} {}", spec.display_name, status);
    }

    // Stores
    println!();
    println!("  {}", "Storage:".bold());
    let models_path = expand_home(&config.storage.models_path);
    let repository = ModelRepository::new(
        Arc::new(LocalFileStore::new()),
        models_path.clone(),
        Duration::from_secs(config.models.cache_ttl_secs),
    );
    let models = match repository.list(None) {
        Ok(models) => format!("{} models", models.len()).dimmed().to_string(),
        Err(e) => format!("unreadable: {e}").red().to_string(),
    };
    println!(
        "    {:<20} {} {} {}",
        "Models:",
        models_path.display(),
        found(models_path.exists()),
        models
    );

    let presets_dir = expand_home(&config.storage.presets_dir);
    println!(
        "    {:<20} {} {}",
        "Presets:",
        presets_dir.display(),
        found(presets_dir.exists())
    );

    if config.storage.log_path.trim().is_empty() {
        println!("    {:<20} {}", "Request log:", "disabled".dimmed());
    } else {
        let log_path = expand_home(&config.storage.log_path);
        println!(
            "    {:<20} {} {}",
            "Request log:",
            log_path.display(),
            found(log_path.exists())
        );
    }

    // Cache
    println!();
    let cache = &config.cache;
    let cache_status = if !cache.enabled {
        "disabled".dimmed().to_string()
    } else {
        let ttl = if cache.ttl_secs == 0 {
            "no expiry".to_string()
        } else {
            format!("ttl {}s", cache.ttl_secs)
        };
        let location = match cache.dir {
            Some(ref dir) => expand_home(dir).display().to_string(),
            None => "in memory".to_string(),
        };
        format!("{} {}", "✓".green(), format!("{ttl}, {location}").dimmed())
    };
    println!("  {:<18} {}", "Cache:".bold(), cache_status);
    println!(
        "  {:<18} {} (×{})",
        "Pricing:".bold(),
        config.pricing.currency,
        config.pricing.multiplier
    );

    println!();

    Ok(())
}
