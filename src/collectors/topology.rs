use crate::error::{Result, SleepError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Which member disks of an array are managed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MemberFilter {
    Rotational,
    NonRotational,
    All,
}

impl MemberFilter {
    /// `flag` is the first byte of `queue/rotational`.
    fn accepts(&self, flag: u8) -> bool {
        match self {
            MemberFilter::Rotational    => flag == b'1',
            MemberFilter::NonRotational => flag == b'0',
            MemberFilter::All           => true,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MemberFilter::Rotational    => "rotational",
            MemberFilter::NonRotational => "non-rotational",
            MemberFilter::All           => "all",
        }
    }
}

/// A physical disk backing the array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name:       String,
    pub rotational: bool,
}

/// Resolve the disks behind `<sysfs_root>/<array>/slaves/`, in name order.
///
/// Each slave link points at either a whole disk or a partition; the last two
/// components of the target are tried as disk names and kept when their
/// `queue/rotational` flag is readable and passes `filter`.
pub fn resolve_members(sysfs_root: &Path, array: &str, filter: MemberFilter) -> Result<Vec<Member>> {
    let slaves_dir = sysfs_root.join(array).join("slaves");
    let entries = fs::read_dir(&slaves_dir)
        .map_err(|e| SleepError::discovery(array, format!("{}: {}", slaves_dir.display(), e)))?;

    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();

    let mut members: Vec<Member> = Vec::new();
    for slave in &names {
        let target = match fs::read_link(slaves_dir.join(slave)) {
            Ok(t)  => t,
            Err(e) => {
                tracing::debug!("skipping slave {}: {}", slave, e);
                continue;
            }
        };
        let parts: Vec<String> = target
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();

        for candidate in parts.iter().rev().take(2) {
            let flag = match read_rotational_flag(sysfs_root, candidate) {
                Some(f) => f,
                None    => continue,
            };
            if !filter.accepts(flag) { continue; }
            if members.iter().any(|m| &m.name == candidate) { continue; }
            members.push(Member { name: candidate.clone(), rotational: flag == b'1' });
        }
    }

    if members.is_empty() {
        return Err(SleepError::discovery(
            array,
            format!("no {} member devices found", filter.label()),
        ));
    }
    Ok(members)
}

fn read_rotational_flag(sysfs_root: &Path, name: &str) -> Option<u8> {
    let bytes = fs::read(sysfs_root.join(name).join("queue").join("rotational")).ok()?;
    bytes.first().copied()
}
