use crate::config::{Config, DEVICE_PLACEHOLDER};
use crate::error::{Result, SleepError};
use crate::models::power::{IdleState, Spin};
use std::os::unix::process::CommandExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

/// Issues spin-up / spin-down to a whole set of disks at once.
pub trait PowerControl {
    /// Command every device and wait for all of them.
    ///
    /// Succeeds only if every device succeeded; the returned state is the one
    /// the array is in afterwards. On error the physical state of the disks is
    /// unknown: some may have transitioned, nothing is rolled back.
    fn set_power(&self, devices: &[String], spin: Spin) -> Result<IdleState>;
}

/// argv with an optional `{device}` placeholder.
#[derive(Debug, Clone)]
pub struct CommandTemplate {
    argv: Vec<String>,
}

impl CommandTemplate {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    fn command(&self, device: &Path) -> Command {
        let dev = device.to_string_lossy();
        let mut cmd = Command::new(self.argv.first().map(String::as_str).unwrap_or_default());
        let mut substituted = false;
        for arg in self.argv.iter().skip(1) {
            if arg.contains(DEVICE_PLACEHOLDER) {
                substituted = true;
                cmd.arg(arg.replace(DEVICE_PLACEHOLDER, &dev));
            } else {
                cmd.arg(arg);
            }
        }
        if !substituted {
            cmd.arg(device);
        }
        cmd
    }
}

/// Runs an external command per disk, `hdparm` by default.
#[derive(Debug, Clone)]
pub struct HdparmController {
    dev_root:  PathBuf,
    spin_up:   CommandTemplate,
    spin_down: CommandTemplate,
}

impl HdparmController {
    pub fn new(dev_root: PathBuf, spin_up: CommandTemplate, spin_down: CommandTemplate) -> Self {
        Self { dev_root, spin_up, spin_down }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(
            cfg.paths.dev_root.clone(),
            CommandTemplate::new(cfg.commands.spin_up.clone()),
            CommandTemplate::new(cfg.commands.spin_down.clone()),
        )
    }

    /// "sda" → "/dev/sda"; absolute paths are left alone.
    pub fn device_path(&self, name: &str) -> PathBuf {
        let p = Path::new(name);
        if p.is_absolute() { p.to_path_buf() } else { self.dev_root.join(name) }
    }

    fn template(&self, spin: Spin) -> &CommandTemplate {
        match spin {
            Spin::Up   => &self.spin_up,
            Spin::Down => &self.spin_down,
        }
    }
}

impl PowerControl for HdparmController {
    fn set_power(&self, devices: &[String], spin: Spin) -> Result<IdleState> {
        let template = self.template(spin);
        let mut launched: Vec<(String, Child)> = Vec::with_capacity(devices.len());
        let mut failure: Option<SleepError> = None;

        // Launch everything first so the batch costs about as much as the slowest disk.
        for name in devices {
            let path = self.device_path(name);
            let device = path.display().to_string();
            let spawned = template
                .command(&path)
                .stdin(Stdio::null())
                .stdout(Stdio::null())
                .stderr(Stdio::piped())
                // Own process group: a terminal Ctrl-C must reach md-sleep, not hdparm.
                .process_group(0)
                .spawn();
            match spawned {
                Ok(child) => {
                    tracing::debug!("{} launched for {}", spin, device);
                    launched.push((device, child));
                }
                Err(e) => {
                    failure = Some(SleepError::power(device, e));
                    break;
                }
            }
        }

        // Reap in launch order; the first failure wins but every child is waited for.
        for (device, child) in launched {
            let result = child.wait_with_output();
            if failure.is_some() { continue; }
            match result {
                Ok(out) if out.status.success() => {}
                Ok(out) => failure = Some(SleepError::power(device, describe(out.status, &out.stderr))),
                Err(e)  => failure = Some(SleepError::power(device, e)),
            }
        }

        match failure {
            Some(e) => Err(e),
            None    => Ok(spin.resulting_state()),
        }
    }
}

fn describe(status: ExitStatus, stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    match text.lines().rev().find(|l| !l.trim().is_empty()) {
        Some(line) => format!("{} ({})", status, line.trim()),
        None       => status.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    fn template(argv: &[&str]) -> CommandTemplate {
        CommandTemplate::new(argv.iter().map(|s| s.to_string()).collect())
    }

    fn controller(up: &[&str], down: &[&str]) -> HdparmController {
        HdparmController::new(PathBuf::from("/dev"), template(up), template(down))
    }

    fn devs(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn bare_names_are_qualified() {
        let c = controller(&["true"], &["true"]);
        assert_eq!(c.device_path("sda"), PathBuf::from("/dev/sda"));
        assert_eq!(c.device_path("/dev/sdb"), PathBuf::from("/dev/sdb"));
        assert_eq!(c.device_path("/dev/disk/by-id/ata-X"), PathBuf::from("/dev/disk/by-id/ata-X"));
    }

    #[test]
    fn success_reports_resulting_state() {
        let c = controller(&["true"], &["true"]);
        assert_eq!(c.set_power(&devs(&["sda", "sdb"]), Spin::Up).unwrap(), IdleState::Active);
        assert_eq!(c.set_power(&devs(&["sda", "sdb"]), Spin::Down).unwrap(), IdleState::Idle);
    }

    #[test]
    fn repeated_spin_up_stays_active() {
        let c = controller(&["true"], &["true"]);
        for _ in 0..3 {
            assert_eq!(c.set_power(&devs(&["sda"]), Spin::Up).unwrap(), IdleState::Active);
        }
    }

    #[test]
    fn up_and_down_use_their_own_commands() {
        let c = controller(&["true"], &["false"]);
        assert!(c.set_power(&devs(&["sda"]), Spin::Up).is_ok());
        assert!(c.set_power(&devs(&["sda"]), Spin::Down).is_err());
    }

    #[test]
    fn one_failing_disk_fails_the_batch_without_rollback() {
        let dir = tempdir().expect("tempdir");
        let script = r#"touch "$1.done"; case "$1" in *sdb) echo "SG_IO: bad sense" >&2; exit 3;; esac"#;
        let c = HdparmController::new(
            dir.path().to_path_buf(),
            template(&["sh", "-c", script, "sh"]),
            template(&["true"]),
        );

        let err = c.set_power(&devs(&["sda", "sdb", "sdc"]), Spin::Up).unwrap_err();
        match err {
            SleepError::PowerCommand { device, cause } => {
                assert!(device.ends_with("sdb"), "wrong device: {}", device);
                assert!(cause.contains('3'), "cause: {}", cause);
                assert!(cause.contains("SG_IO: bad sense"), "cause: {}", cause);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        for disk in ["sda", "sdb", "sdc"] {
            assert!(dir.path().join(format!("{}.done", disk)).exists(), "{} not commanded", disk);
        }
    }

    #[test]
    fn launch_failure_names_the_device() {
        let c = controller(&["/nonexistent/md-sleep/hdparm", "-y"], &["true"]);
        let err = c.set_power(&devs(&["sda"]), Spin::Up).unwrap_err();
        assert!(matches!(err, SleepError::PowerCommand { ref device, .. } if device == "/dev/sda"));
    }

    #[test]
    fn placeholder_is_substituted_in_place() {
        let c = controller(
            &["sh", "-c", r#"test "$1" = /dev/sda && test "$2" = tail"#, "sh", "{device}", "tail"],
            &["true"],
        );
        assert!(c.set_power(&devs(&["sda"]), Spin::Up).is_ok());
    }

    #[test]
    fn commands_run_in_their_own_process_group() {
        // Field 5 of /proc/<pid>/stat is the process group id.
        let c = controller(&["sh", "-c", r#"set -- $(cat /proc/$$/stat); test "$5" = "$1""#], &["true"]);
        assert!(c.set_power(&devs(&["sda"]), Spin::Up).is_ok());
    }

    #[test]
    fn devices_are_commanded_concurrently() {
        let c = controller(&["sh", "-c", "sleep 0.5"], &["true"]);
        let start = Instant::now();
        c.set_power(&devs(&["sda", "sdb", "sdc", "sdd"]), Spin::Up).expect("spin-up");
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(500));
        assert!(elapsed < Duration::from_millis(1500), "took {:?}", elapsed);
    }
}
