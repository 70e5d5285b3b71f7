mod collectors;
mod config;
mod control;
mod error;
mod models;
mod util;

use anyhow::{Context, Result};
use clap::Parser;
use collectors::activity::ActivityMonitor;
use collectors::topology::{self, Member, MemberFilter};
use config::Config;
use control::coordinator::IdleCoordinator;
use control::power::{HdparmController, PowerControl};
use error::SleepError;
use models::array::{normalize_name, RaidArray};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{fmt, EnvFilter};
use util::event_log::EventLog;
use util::human::fmt_duration;
use util::{shutdown, slot};

#[derive(Parser, Debug)]
#[command(name = "md-sleep", about = "md-sleep: watch md-raid array and spin down idle disks", version)]
struct Cli {
    /// md array to watch, e.g. md0 or /dev/md0
    #[arg(required_unless_present_any = ["history", "print_config"])]
    array: Option<String>,

    /// Interval to check for I/O activity in milliseconds (config default 1000)
    #[arg(short = 'w', long = "watch", value_name = "MS")]
    watch: Option<u64>,

    /// Idle time before initiating spin-down in seconds (config default 900)
    #[arg(short = 'i', long = "idle", value_name = "SECS")]
    idle: Option<u64>,

    /// Spin down non-rotating member devices instead of rotating disks
    #[arg(short = 'r', long)]
    non_rotational: bool,

    /// Config file (default: ~/.config/md-sleep/md-sleep.toml)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Resolve and print the managed member devices, then exit
    #[arg(long)]
    list: bool,

    /// Print --list output as JSON
    #[arg(long, requires = "list")]
    json: bool,

    /// Print the last N logged power transitions and exit
    #[arg(long, value_name = "N", num_args = 0..=1, default_missing_value = "20")]
    history: Option<usize>,

    /// Print config file path and effective values, then exit
    #[arg(long)]
    print_config: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("md_sleep=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut cfg = Config::load(cli.config.as_deref()).context("loading configuration")?;
    apply_overrides(&mut cfg, &cli);
    cfg.validate()?;

    if let Some(n) = cli.history {
        return run_history(n);
    }
    if cli.print_config {
        return run_print_config(&cfg, cli.config.clone());
    }

    // clap guarantees the array for every remaining mode
    let array = normalize_name(cli.array.as_deref().unwrap_or_default());
    let members = resolve(&cfg, &array)?;

    if cli.list {
        return run_list(&cfg, &array, &members, cli.json);
    }
    run_daemon(&cfg, &array, members)
}

/// Command-line values win over the config file.
fn apply_overrides(cfg: &mut Config, cli: &Cli) {
    if let Some(ms) = cli.watch {
        cfg.general.poll_interval_ms = ms;
    }
    if let Some(secs) = cli.idle {
        cfg.general.idle_timeout_sec = secs;
    }
    if cli.non_rotational {
        cfg.devices.filter = MemberFilter::NonRotational;
    }
}

fn resolve(cfg: &Config, array: &str) -> Result<Vec<Member>> {
    let members: Vec<Member> = topology::resolve_members(&cfg.paths.sysfs_root, array, cfg.devices.filter)?
        .into_iter()
        .filter(|m| {
            let excluded = cfg.is_excluded(&m.name);
            if excluded { tracing::info!("{} excluded by config", m.name); }
            !excluded
        })
        .collect();
    if members.is_empty() {
        return Err(SleepError::discovery(array, "every member device is excluded").into());
    }
    Ok(members)
}

fn run_daemon(cfg: &Config, name: &str, members: Vec<Member>) -> Result<()> {
    let names: Vec<String> = members.into_iter().map(|m| m.name).collect();
    let array = RaidArray::new(name, names, &cfg.paths.sysfs_root);

    tracing::info!(
        "starting md-sleep for {} {:?} (poll {}, idle {})",
        array.name, array.members,
        fmt_duration(cfg.poll_interval()), fmt_duration(cfg.idle_timeout())
    );
    shutdown::install().context("installing signal handlers")?;

    let events = if cfg.general.event_log { EventLog::default_location() } else { None };
    watch(
        &array,
        HdparmController::from_config(cfg),
        cfg.idle_timeout(),
        cfg.poll_interval(),
        events,
    )?;
    tracing::info!("md-sleep for {} stopped", array.name);
    Ok(())
}

/// Spin the array up, then run the monitor and coordinator until either stops.
///
/// A power failure wins over a monitor failure; a monitor read error surfaces
/// once the coordinator has seen the channel close.
fn watch<P: PowerControl>(
    array: &RaidArray,
    power: P,
    idle_timeout: Duration,
    poll_interval: Duration,
    events: Option<EventLog>,
) -> std::result::Result<(), SleepError> {
    let (tx, rx) = slot::slot();
    let coordinator = IdleCoordinator::start(array, power, idle_timeout, rx, events)?;
    let monitor = ActivityMonitor::new(array.stat_path.clone(), poll_interval).spawn(tx)?;

    let outcome = coordinator.run();
    let monitor_outcome = monitor.join();
    outcome?;
    monitor_outcome
}

fn run_list(cfg: &Config, array: &str, members: &[Member], as_json: bool) -> Result<()> {
    use serde_json::json;

    let power = HdparmController::from_config(cfg);
    if as_json {
        let doc = json!({
            "array":     array,
            "stat_path": cfg.paths.sysfs_root.join(array).join("stat"),
            "filter":    cfg.devices.filter.label(),
            "members": members.iter().map(|m| json!({
                "name":       m.name,
                "device":     power.device_path(&m.name),
                "rotational": m.rotational,
            })).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("{} ({} members)", array, cfg.devices.filter.label());
    for m in members {
        let kind = if m.rotational { "rotational" } else { "non-rotational" };
        println!("  {:<10} {:<16} {}", m.name, power.device_path(&m.name).display(), kind);
    }
    Ok(())
}

fn run_history(n: usize) -> Result<()> {
    let log = match EventLog::default_location() {
        Some(l) => l,
        None    => anyhow::bail!("no data directory for the event log"),
    };
    let lines = log.load_recent(n);
    if lines.is_empty() {
        println!("No power transitions in {}.", log.path().display());
        return Ok(());
    }
    for line in &lines {
        println!("{}", line);
    }
    Ok(())
}

fn run_print_config(cfg: &Config, explicit: Option<PathBuf>) -> Result<()> {
    let path = explicit
        .or_else(Config::config_path)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|| "(unknown)".to_string());
    println!("Config: {}", path);
    println!();
    println!("[general]");
    println!("  poll_interval_ms = {}", cfg.general.poll_interval_ms);
    println!("  idle_timeout_sec = {} ({})", cfg.general.idle_timeout_sec, fmt_duration(cfg.idle_timeout()));
    println!("  event_log        = {}", cfg.general.event_log);
    println!();
    println!("[devices]");
    println!("  filter  = {}", cfg.devices.filter.label());
    println!("  exclude = {:?}", cfg.devices.exclude);
    println!();
    println!("[commands]");
    println!("  spin_up   = {:?}", cfg.commands.spin_up);
    println!("  spin_down = {:?}", cfg.commands.spin_down);
    println!();
    println!("[paths]");
    println!("  sysfs_root = {}", cfg.paths.sysfs_root.display());
    println!("  dev_root   = {}", cfg.paths.dev_root.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use control::power::CommandTemplate;
    use std::fs;
    use std::path::Path;
    use std::thread;
    use std::time::Instant;
    use tempfile::tempdir;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::parse_from(["md-sleep", "-w", "100", "-i", "2", "-r", "/dev/md0"]);
        let mut cfg = Config::default();
        apply_overrides(&mut cfg, &cli);
        assert_eq!(cfg.general.poll_interval_ms, 100);
        assert_eq!(cfg.general.idle_timeout_sec, 2);
        assert_eq!(cfg.devices.filter, MemberFilter::NonRotational);
        assert_eq!(normalize_name(cli.array.as_deref().unwrap()), "md0");
    }

    #[test]
    fn array_is_required_for_the_daemon() {
        assert!(Cli::try_parse_from(["md-sleep"]).is_err());
        assert!(Cli::try_parse_from(["md-sleep", "--history"]).is_ok());
        assert!(Cli::try_parse_from(["md-sleep", "--print-config"]).is_ok());
    }

    #[test]
    fn history_defaults_to_twenty() {
        let cli = Cli::parse_from(["md-sleep", "--history"]);
        assert_eq!(cli.history, Some(20));
    }

    #[test]
    fn unknown_flag_is_rejected() {
        assert!(Cli::try_parse_from(["md-sleep", "--bogus", "md0"]).is_err());
    }

    #[test]
    fn flag_fixes_a_config_value_that_would_not_validate() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("md-sleep.toml");
        fs::write(&path, "[general]\npoll_interval_ms = 0\n").unwrap();

        let cli = Cli::parse_from(["md-sleep", "-w", "500", "-c", path.to_str().unwrap(), "md0"]);
        let mut cfg = Config::load(cli.config.as_deref()).expect("load");
        apply_overrides(&mut cfg, &cli);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.poll_interval(), Duration::from_millis(500));
    }

    fn write_stat(path: &Path, text: &str) {
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, text).unwrap();
        fs::rename(&tmp, path).unwrap();
    }

    /// Lines starting with `prefix`, sorted: the disks of one batch run concurrently.
    fn recorded(calls: &Path, prefix: &str) -> Vec<String> {
        let mut lines: Vec<String> = fs::read_to_string(calls)
            .unwrap_or_default()
            .lines()
            .filter(|l| l.starts_with(prefix))
            .map(str::to_string)
            .collect();
        lines.sort();
        lines
    }

    #[test]
    fn monitor_drives_coordinator_end_to_end() {
        let dir = tempdir().expect("tempdir");
        let sysfs = dir.path().join("block");
        fs::create_dir_all(sysfs.join("md0")).unwrap();
        let stat = sysfs.join("md0").join("stat");
        write_stat(&stat, "100 0 800 12\n");

        let calls = dir.path().join("calls");
        let record = |word: &str| {
            CommandTemplate::new(vec![
                "sh".into(),
                "-c".into(),
                format!(r#"echo "{} $1" >> "$0""#, word),
                calls.to_string_lossy().into_owned(),
            ])
        };
        let power = HdparmController::new(PathBuf::from("/dev"), record("up"), record("down"));
        let array = RaidArray::new("md0", vec!["sda".into(), "sdb".into()], &sysfs);

        let started = Instant::now();
        let worker = thread::spawn(move || {
            watch(&array, power, Duration::from_millis(500), Duration::from_millis(20), None)
        });

        thread::sleep(Duration::from_millis(300));
        write_stat(&stat, "101 0 808 12\n");

        // The change at 300ms restarts the 500ms wait.
        thread::sleep(Duration::from_millis(700).saturating_sub(started.elapsed()));
        assert_eq!(recorded(&calls, "up"), vec!["up /dev/sda", "up /dev/sdb"]);
        assert!(recorded(&calls, "down").is_empty());

        thread::sleep(Duration::from_millis(1400).saturating_sub(started.elapsed()));
        assert_eq!(recorded(&calls, "down"), vec!["down /dev/sda", "down /dev/sdb"]);

        fs::remove_file(&stat).unwrap();
        let outcome = worker.join().unwrap();
        assert!(matches!(outcome, Err(SleepError::MonitorRead { .. })));
        assert_eq!(recorded(&calls, "down").len(), 2);
    }
}
