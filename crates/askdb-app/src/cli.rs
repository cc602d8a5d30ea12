//! CLI argument definitions for askdb.
//!
//! Uses `clap` with derive macros for ergonomic argument parsing.
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::Parser;
use std::path::PathBuf;

/// askdb - ask questions about a SQLite database in plain language.
#[derive(Parser, Debug)]
#[command(name = "askdb", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// API server port.
    #[arg(short = 'p', long = "port")]
    pub port: Option<u16>,

    /// Data directory for the application database.
    #[arg(short = 'd', long = "data-dir")]
    pub data_dir: Option<PathBuf>,

    /// Analytical SQLite database to query (opened read-only).
    #[arg(short = 'w', long = "warehouse")]
    pub warehouse: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level")]
    pub log_level: Option<String>,

    /// Create the demo warehouse if the configured file does not exist.
    #[arg(long = "init-sample")]
    pub init_sample: bool,
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > ASKDB_CONFIG env var > ~/.askdb/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        if let Some(ref p) = self.config {
            return p.clone();
        }
        if let Ok(p) = std::env::var("ASKDB_CONFIG") {
            return PathBuf::from(p);
        }
        default_config_path()
    }

    /// Resolve the API server port.
    ///
    /// Priority: --port flag > ASKDB_PORT env var > config file value.
    pub fn resolve_port(&self, config_port: u16) -> u16 {
        if let Some(p) = self.port {
            return p;
        }
        if let Ok(val) = std::env::var("ASKDB_PORT") {
            if let Ok(p) = val.parse::<u16>() {
                return p;
            }
        }
        config_port
    }

    /// Resolve the data directory, expanding `~`.
    pub fn resolve_data_dir(&self, config_dir: &str) -> PathBuf {
        match self.data_dir {
            Some(ref p) => p.clone(),
            None => expand_home(config_dir),
        }
    }

    /// Resolve the analytical database path, expanding `~`.
    pub fn resolve_warehouse(&self, config_path: &str) -> PathBuf {
        match self.warehouse {
            Some(ref p) => p.clone(),
            None => expand_home(config_path),
        }
    }

    /// Resolve the log level.
    ///
    /// Priority: --log-level flag > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        self.log_level
            .clone()
            .unwrap_or_else(|| config_level.to_string())
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/").or_else(|| path.strip_prefix("~\\")) {
        return home_dir().join(rest);
    }
    if path == "~" {
        return home_dir();
    }
    PathBuf::from(path)
}

fn home_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
    #[cfg(not(target_os = "windows"))]
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    PathBuf::from(home)
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    home_dir().join(".askdb").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliArgs {
        CliArgs::parse_from(std::iter::once("askdb").chain(args.iter().copied()))
    }

    #[test]
    fn test_parse_all_flags() {
        let args = parse(&[
            "--config",
            "/tmp/askdb.toml",
            "--port",
            "9000",
            "--warehouse",
            "/data/shop.db",
            "--log-level",
            "debug",
            "--init-sample",
        ]);
        assert_eq!(args.resolve_config_path(), PathBuf::from("/tmp/askdb.toml"));
        assert_eq!(args.resolve_port(8000), 9000);
        assert_eq!(args.resolve_warehouse("~/x.db"), PathBuf::from("/data/shop.db"));
        assert_eq!(args.resolve_log_level("info"), "debug");
        assert!(args.init_sample);
    }

    #[test]
    fn test_defaults_fall_back_to_config() {
        let args = parse(&[]);
        assert_eq!(args.resolve_log_level("warn"), "warn");
        assert_eq!(args.resolve_data_dir("/srv/askdb"), PathBuf::from("/srv/askdb"));
        assert!(!args.init_sample);
    }

    #[test]
    fn test_expand_home() {
        assert_eq!(expand_home("/abs/path"), PathBuf::from("/abs/path"));
        assert_eq!(expand_home("relative"), PathBuf::from("relative"));
        assert_eq!(expand_home("~/data"), home_dir().join("data"));
    }
}
