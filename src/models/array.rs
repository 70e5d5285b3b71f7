use std::path::{Path, PathBuf};

/// One md array and the member disks md-sleep manages for it.
#[derive(Debug, Clone)]
pub struct RaidArray {
    pub name:      String,   // "md0", never "/dev/md0"
    pub members:   Vec<String>,
    pub stat_path: PathBuf,  // <sysfs-root>/<name>/stat
}

impl RaidArray {
    pub fn new(name: &str, members: Vec<String>, sysfs_root: &Path) -> Self {
        let name = normalize_name(name);
        let stat_path = sysfs_root.join(&name).join("stat");
        Self { name, members, stat_path }
    }
}

/// Strip a leading `/dev/` so "/dev/md0" and "md0" name the same array.
pub fn normalize_name(name: &str) -> String {
    name.strip_prefix("/dev/").unwrap_or(name).to_string()
}

/// Raw bytes of the array's stat file. Only equality matters.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ActivitySnapshot(Vec<u8>);

impl ActivitySnapshot {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}
