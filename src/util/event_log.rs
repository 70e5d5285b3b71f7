use crate::models::power::Spin;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

/// Append-only record of power transitions, one line each.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// `<data-local>/md-sleep/events.log`
    pub fn default_location() -> Option<Self> {
        dirs::data_local_dir().map(|p| Self::new(p.join("md-sleep").join("events.log")))
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    /// Record one transition. Best-effort: logging failures never stop the daemon.
    pub fn append(&self, array: &str, spin: Spin, devices: &[String], error: Option<&str>) {
        if let Some(parent) = self.path.parent() {
            let _ = fs::create_dir_all(parent);
        }
        let now = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let outcome = match error {
            None    => "ok".to_string(),
            Some(e) => format!("FAILED: {}", e),
        };
        match OpenOptions::new().create(true).append(true).open(&self.path) {
            Ok(mut file) => {
                let _ = writeln!(
                    file,
                    "{} [{}] {} {} {}",
                    now, spin.label(), array, devices.join(","), outcome
                );
            }
            Err(e) => tracing::debug!("event log {} unavailable: {}", self.path.display(), e),
        }
    }

    /// Up to `n` most recent lines, oldest first.
    pub fn load_recent(&self, n: usize) -> Vec<String> {
        let text = match fs::read_to_string(&self.path) {
            Ok(t)  => t,
            Err(_) => return Vec::new(),
        };
        let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
        let skip = lines.len().saturating_sub(n);
        lines[skip..].iter().map(|l| l.to_string()).collect()
    }
}
