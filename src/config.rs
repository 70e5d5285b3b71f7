use crate::collectors::topology::MemberFilter;
use crate::error::{Result, SleepError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder substituted with the device path in command templates.
pub const DEVICE_PLACEHOLDER: &str = "{device}";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub devices: DevicesConfig,

    #[serde(default)]
    pub commands: CommandsConfig,

    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// How often the array's stat file is polled, in milliseconds
    pub poll_interval_ms: u64,
    /// Quiet time before the disks are spun down, in seconds
    pub idle_timeout_sec: u64,
    /// Record every power transition in the event log
    pub event_log: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// Which members to manage: "rotational", "non-rotational" or "all"
    pub filter: MemberFilter,
    /// Member names to leave alone; a trailing `*` matches a prefix ("nvme*")
    pub exclude: Vec<String>,
}

/// argv templates for the two power commands.
///
/// `{device}` is replaced with the full device path; without it the path is
/// appended as the last argument.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub spin_up:   Vec<String>,
    pub spin_down: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Where array and disk attributes are read from
    pub sysfs_root: PathBuf,
    /// Prefix for bare device names handed to the power commands
    pub dev_root: PathBuf,
}

// ── Defaults ─────────────────────────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self { poll_interval_ms: 1000, idle_timeout_sec: 900, event_log: true }
    }
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self { filter: MemberFilter::Rotational, exclude: Vec::new() }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            spin_up:   vec!["/usr/bin/hdparm".into(), "--read-sector".into(), "0".into()],
            spin_down: vec!["/usr/bin/hdparm".into(), "-y".into()],
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self { sysfs_root: PathBuf::from("/sys/block"), dev_root: PathBuf::from("/dev") }
    }
}

// ── Accessors ─────────────────────────────────────────────────────────

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.general.poll_interval_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.general.idle_timeout_sec)
    }

    pub fn is_excluded(&self, name: &str) -> bool {
        self.devices.exclude.iter().any(|pat| {
            if let Some(p) = pat.strip_suffix('*') { name.starts_with(p) }
            else { pat == name }
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.general.poll_interval_ms == 0 {
            return Err(SleepError::Config("poll_interval_ms must be greater than 0".into()));
        }
        if self.general.idle_timeout_sec == 0 {
            return Err(SleepError::Config("idle_timeout_sec must be greater than 0".into()));
        }
        for (key, argv) in [("spin_up", &self.commands.spin_up), ("spin_down", &self.commands.spin_down)] {
            if argv.first().map(|p| p.trim().is_empty()).unwrap_or(true) {
                return Err(SleepError::Config(format!("commands.{} needs a program", key)));
            }
        }
        Ok(())
    }
}

// ── Load / Save ───────────────────────────────────────────────────────

impl Config {
    /// Load from `explicit`, or from the per-user default location.
    ///
    /// A missing default file yields defaults (and writes them out for next
    /// time); a missing explicit file is an error. Values are not validated
    /// here: command-line overrides still have to be applied.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let cfg = match explicit {
            Some(path) => read_file(path)?,
            None => match Self::config_path() {
                Some(path) => match fs::read_to_string(&path) {
                    Ok(text) => parse(&text, &path)?,
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        if let Err(e) = try_write_defaults(&path) {
                            tracing::debug!("could not write default config: {}", e);
                        }
                        Config::default()
                    }
                    Err(e) => return Err(SleepError::Config(format!("{}: {}", path.display(), e))),
                },
                None => Config::default(),
            },
        };
        Ok(cfg)
    }

    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("md-sleep").join("md-sleep.toml"))
    }
}

fn read_file(path: &Path) -> Result<Config> {
    let text = fs::read_to_string(path)
        .map_err(|e| SleepError::Config(format!("{}: {}", path.display(), e)))?;
    parse(&text, path)
}

fn parse(text: &str, path: &Path) -> Result<Config> {
    toml::from_str(text).map_err(|e| SleepError::Config(format!("{}: {}", path.display(), e)))
}

fn try_write_defaults(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let text = toml::to_string_pretty(&Config::default())?;
    fs::write(path, format!("# md-sleep configuration\n# Generated on first run, edit freely\n\n{}", text))?;
    Ok(())
}
