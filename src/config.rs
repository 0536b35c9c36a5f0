//! Configuration types for fetch-dl

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Direct HTTP transfer settings
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Connect timeout (default: 15 seconds)
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,

    /// Read timeout, applied to each wait for body data (default: 30 seconds)
    #[serde(default = "default_read_timeout", with = "duration_serde")]
    pub read_timeout: Duration,

    /// Size of each write to the destination file in bytes (default: 32 KiB)
    ///
    /// Progress is reported and cancellation is re-checked after every chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// User-Agent header sent with every request
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            chunk_size: default_chunk_size(),
            user_agent: default_user_agent(),
        }
    }
}

/// External downloader settings (yt-dlp)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Explicit path to the yt-dlp executable (auto-detected if None)
    #[serde(default)]
    pub ytdlp_path: Option<PathBuf>,

    /// Directory searched for a bundled copy of the tool (default: "./bin")
    #[serde(default = "default_bin_dir")]
    pub bundled_dir: PathBuf,

    /// Whether to search PATH if no explicit or bundled binary exists (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,

    /// Download the tool when it cannot be found anywhere (default: true)
    #[serde(default = "default_true")]
    pub auto_fetch: bool,

    /// Where a fetched tool is stored (default: "./bin")
    #[serde(default = "default_bin_dir")]
    pub bin_dir: PathBuf,

    /// Release asset fetched when `auto_fetch` is enabled
    #[serde(default = "default_fetch_url")]
    pub fetch_url: String,

    /// Upper bound for the title lookup that runs before a nameless download (default: 10 seconds)
    #[serde(default = "default_title_timeout", with = "duration_serde")]
    pub title_timeout: Duration,

    /// Time a process tree gets to exit after SIGTERM before it is killed (default: 2000 ms)
    #[serde(default = "default_kill_grace_period", with = "duration_millis_serde")]
    pub kill_grace_period: Duration,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            bundled_dir: default_bin_dir(),
            search_path: true,
            auto_fetch: true,
            bin_dir: default_bin_dir(),
            fetch_url: default_fetch_url(),
            title_timeout: default_title_timeout(),
            kill_grace_period: default_kill_grace_period(),
        }
    }
}

/// Main configuration for [`DownloadPool`](crate::DownloadPool)
///
/// # Examples
///
/// ```
/// use fetch_dl::Config;
/// use std::time::Duration;
///
/// let mut config = Config::default();
/// config.http.read_timeout = Duration::from_secs(60);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Direct HTTP transfer settings
    #[serde(default)]
    pub http: HttpConfig,

    /// External downloader settings
    #[serde(default)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Check settings that would otherwise make every download fail
    pub fn validate(&self) -> Result<()> {
        if self.http.chunk_size == 0 {
            return Err(Error::Config {
                message: "chunk size must be greater than zero".into(),
                key: Some("http.chunk_size".into()),
            });
        }
        if self.http.connect_timeout.is_zero() {
            return Err(Error::Config {
                message: "connect timeout must be greater than zero".into(),
                key: Some("http.connect_timeout".into()),
            });
        }
        if self.http.read_timeout.is_zero() {
            return Err(Error::Config {
                message: "read timeout must be greater than zero".into(),
                key: Some("http.read_timeout".into()),
            });
        }
        if self.tools.title_timeout.is_zero() {
            return Err(Error::Config {
                message: "title timeout must be greater than zero".into(),
                key: Some("tools.title_timeout".into()),
            });
        }
        Ok(())
    }
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(15)
}

fn default_read_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_chunk_size() -> usize {
    32 * 1024
}

fn default_user_agent() -> String {
    format!("fetch-dl/{}", env!("CARGO_PKG_VERSION"))
}

fn default_bin_dir() -> PathBuf {
    PathBuf::from("./bin")
}

fn default_true() -> bool {
    true
}

fn default_fetch_url() -> String {
    let asset = if cfg!(windows) {
        "yt-dlp.exe"
    } else if cfg!(target_os = "macos") {
        "yt-dlp_macos"
    } else {
        "yt-dlp"
    };
    format!("https://github.com/yt-dlp/yt-dlp/releases/latest/download/{asset}")
}

fn default_title_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_kill_grace_period() -> Duration {
    Duration::from_millis(2000)
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
