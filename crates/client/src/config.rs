//! Binary configuration.
use std::env;
use std::path::PathBuf;

use inventory_core::ControllerId;

const SHIPPED_DATA: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/../inventory/content/data");

/// Where content and logs live, and how many clients to run.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Directory holding `items.ron`, `layout.toml` and `config.toml`.
    pub data_dir: PathBuf,
    /// File logging is enabled only when set.
    pub log_dir: Option<PathBuf>,
    pub clients: u32,
    /// Print every final view as JSON on stdout.
    pub print_views: bool,
}

impl ClientConfig {
    pub const DEFAULT_CLIENTS: u32 = 2;

    /// Construct configuration from the command line and environment.
    ///
    /// The first positional argument overrides `INVENTORY_DATA_DIR`.
    ///
    /// Environment variables:
    /// - `INVENTORY_DATA_DIR` - Content directory (default: [`default_data_dir`])
    /// - `INVENTORY_LOG_DIR` - Log directory; `default` picks the platform cache dir
    /// - `INVENTORY_CLIENTS` - Number of predicting clients (default: 2)
    /// - `INVENTORY_PRINT_VIEWS` - Print final views (default: true)
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(dir) = env::args().nth(1).or_else(|| env::var("INVENTORY_DATA_DIR").ok()) {
            config.data_dir = PathBuf::from(dir);
        }
        config.log_dir = env::var("INVENTORY_LOG_DIR").ok().map(|dir| {
            if dir == "default" {
                default_log_dir()
            } else {
                PathBuf::from(dir)
            }
        });
        if let Some(clients) = read_env::<u32>("INVENTORY_CLIENTS") {
            config.clients = clients.max(1);
        }
        if let Some(print) = read_env_bool("INVENTORY_PRINT_VIEWS") {
            config.print_views = print;
        }

        config
    }

    pub fn controllers(&self) -> impl Iterator<Item = ControllerId> {
        (1..=self.clients).map(ControllerId)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_dir: None,
            clients: Self::DEFAULT_CLIENTS,
            print_views: true,
        }
    }
}

/// Installed content in the platform data directory if it holds a catalog,
/// else the content shipped with the workspace.
///
/// - Linux: `~/.local/share/inventory/content`
/// - macOS: `~/Library/Application Support/inventory/content`
pub fn default_data_dir() -> PathBuf {
    let installed = directories::ProjectDirs::from("", "", "inventory")
        .map(|dirs| dirs.data_dir().join("content"));
    match installed {
        Some(dir) if dir.join("items.ron").is_file() => dir,
        _ => PathBuf::from(SHIPPED_DATA),
    }
}

/// Platform cache directory for logs.
///
/// - Linux: `~/.cache/inventory/logs`
/// - macOS: `~/Library/Caches/inventory/logs`
/// - Fallback: `/tmp/inventory/logs`
pub fn default_log_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "inventory")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("/tmp/inventory"))
        .join("logs")
}

fn read_env<T>(key: &str) -> Option<T>
where
    T: std::str::FromStr,
{
    env::var(key).ok()?.parse().ok()
}

fn read_env_bool(key: &str) -> Option<bool> {
    match env::var(key).ok()?.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
