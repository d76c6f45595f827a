use anyhow::{anyhow, Context, Result};
use flowdash::config::Config;
use flowdash::dashboard::{self, Dashboard};
use flowdash::executors::create_service;
use flowdash::metrics::Metrics;
use flowdash::runner::{QueryRunner, ResultCache, RunnerOptions};
use log::{error, info};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Get the platform-specific default config path
fn get_default_config_path() -> PathBuf {
    if cfg!(target_os = "linux") {
        // Linux: /home/username/.config/flowdash/config.yaml
        let home = env::var("HOME").unwrap_or_else(|_| String::from("/home/user"));
        PathBuf::from(home).join(".config").join("flowdash").join("config.yaml")
    } else if cfg!(target_os = "macos") {
        // macOS: ~/Library/Application Support/flowdash/config.yaml
        let home = env::var("HOME").unwrap_or_else(|_| String::from("/Users/user"));
        PathBuf::from(home)
            .join("Library")
            .join("Application Support")
            .join("flowdash")
            .join("config.yaml")
    } else {
        PathBuf::from("config.yaml")
    }
}

/// Load configuration from FLOWDASH_CONFIG, the platform path or ./config.yaml
pub fn load_config() -> Result<Config> {
    if let Ok(explicit) = env::var("FLOWDASH_CONFIG") {
        info!("Using configuration from FLOWDASH_CONFIG: {}", explicit);
        return load_config_from_path(Path::new(&explicit));
    }

    let default_path = get_default_config_path();
    if default_path.exists() {
        info!("Using configuration from system path: {}", default_path.display());
        return load_config_from_path(&default_path);
    }

    let local_path = Path::new("config.yaml");
    if local_path.exists() {
        info!("Using configuration from local path: {}", local_path.display());
        return load_config_from_path(local_path);
    }

    Err(anyhow!(
        "Configuration file not found. Expected at: {}",
        default_path.display()
    ))
}

/// Load and validate configuration from a specific path
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    info!("Loading configuration from {:?}...", path);
    let config = Config::load(path).context(
        "Failed to load config file. Please ensure it exists and contains valid configuration",
    )?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {:?}", path))?;
    Ok(config)
}

async fn run(config: Config) -> Result<()> {
    let metrics = Arc::new(Metrics::new().context("Failed to register metrics")?);
    let service = create_service(&config.athena).await;
    let runner = QueryRunner::new(service, RunnerOptions::from(&config.runner))
        .with_metrics(metrics.clone());

    let shutdown = CancellationToken::new();
    let dashboard = Dashboard::new(
        runner,
        ResultCache::new(config.cache.ttl()),
        &config.athena,
        config.queries.clone(),
        metrics,
    )
    .with_shutdown(shutdown.clone());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal_token.cancel();
    });

    dashboard::serve(Arc::new(dashboard), &config.server.listen_addr, shutdown).await
}

#[tokio::main]
async fn main() {
    env_logger::init();
    info!("Starting flowdash");

    let config = match load_config() {
        Ok(config) => {
            info!("Configuration loaded successfully");
            config
        }
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
    info!("flowdash stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_config_from_path() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test_config.yaml");

        let config_content = r#"
athena:
  region: eu-north-1
  output_location: s3://flow-results/
runner:
  timeout_secs: 120
"#;
        fs::write(&config_path, config_content).unwrap();

        let config = load_config_from_path(&config_path).unwrap();
        assert_eq!(config.athena.region, "eu-north-1");
        assert_eq!(config.athena.database, "default");
        assert_eq!(config.runner.timeout_secs, Some(120));
        assert_eq!(config.cache.ttl_secs, 300);
    }

    #[test]
    fn test_load_config_rejects_invalid_values() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("bad.yaml");
        fs::write(
            &config_path,
            "athena:\n  region: eu-north-1\n  output_location: results/\n",
        )
        .unwrap();

        let err = load_config_from_path(&config_path).unwrap_err();
        assert!(format!("{:#}", err).contains("s3://"));
    }

    #[test]
    fn test_get_default_config_path() {
        let path = get_default_config_path();
        assert!(path.to_str().unwrap().ends_with("config.yaml"));
    }
}
