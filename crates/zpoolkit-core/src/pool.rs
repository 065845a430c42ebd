//! Pool, vdev group, and device records shared by every provider, plus the
//! small helpers the parsers lean on.

use serde::Serialize;
use std::path::Path;

// Pool and device health as rendered by `zpool`. See zpoolconcepts(7),
// "Device Failure and Recovery".
pub const ZPOOL_ONLINE: &str = "ONLINE";
pub const ZPOOL_DEGRADED: &str = "DEGRADED";
pub const ZPOOL_FAULTED: &str = "FAULTED";
pub const ZPOOL_OFFLINE: &str = "OFFLINE";
pub const ZPOOL_UNAVAIL: &str = "UNAVAIL";
pub const ZPOOL_REMOVED: &str = "REMOVED";
pub const ZPOOL_DESTROYED: &str = "ONLINE (DESTROYED)";

/// Substring that marks a destroyed pool in the `state:` text.
pub const DESTROYED_MARKER: &str = "DESTROYED";

/// Descriptor name of the synthetic group that collects bare devices and files.
pub const UNGROUPED_VDEV: &str = "disks/files";

/// Redundancy-scheme and section names that open a vdev group.
const VDEV_GROUP_KINDS: &[&str] = &[
    "mirror", "raidz", "raidz1", "raidz2", "raidz3", "draid", "draid1", "draid2", "draid3",
    "spare", "replacing", "logs", "cache", "spares", "special", "dedup",
];

/// A single device (or a group descriptor, which shares the shape).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Vdev {
    pub name: String,
    pub health: String,
}

/// Devices under one redundancy scheme, in report order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VdevGroup {
    pub group: Vdev,
    pub devices: Vec<Vdev>,
}

impl VdevGroup {
    pub fn new(name: impl Into<String>, health: impl Into<String>) -> Self {
        Self {
            group: Vdev {
                name: name.into(),
                health: health.into(),
            },
            devices: Vec::new(),
        }
    }

    /// Synthetic bucket for devices listed without a group header.
    pub fn ungrouped() -> Self {
        Self::new(UNGROUPED_VDEV, "")
    }

    pub fn is_ungrouped(&self) -> bool {
        self.group.name == UNGROUPED_VDEV
    }
}

/// A pool that is currently imported.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Zpool {
    pub name: String,
    pub health: String,
    pub allocated: u64,
    pub size: u64,
    pub free: u64,
    pub fragmentation: u64,
    pub read_only: bool,
    pub freeing: u64,
    pub leaked: u64,
    pub dedup_ratio: f64,
    pub vdevs: Vec<VdevGroup>,
}

impl Zpool {
    pub fn is_healthy(&self) -> bool {
        self.health == ZPOOL_ONLINE
    }
}

/// A pool found on attached media that is not imported yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExportedZpool {
    pub name: String,
    pub id: Option<String>,
    pub state: Option<String>,
    pub status: Option<String>,
    pub action: Option<String>,
    pub see: Option<String>,
    pub vdevs: Vec<VdevGroup>,
}

impl ExportedZpool {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// True when the state text carries the destroyed marker anywhere.
    pub fn is_destroyed(&self) -> bool {
        self.state
            .as_deref()
            .is_some_and(|state| state.contains(DESTROYED_MARKER))
    }

    /// Identifier used to target the import, falling back to the name.
    pub fn import_target(&self) -> &str {
        self.id.as_deref().unwrap_or(&self.name)
    }

    /// Build `zpool import` arguments: never mount, optionally force, and
    /// confirm destroyed pools.
    pub fn import_args(&self, try_force: bool) -> Vec<String> {
        let mut flags = String::from("-N");
        if try_force {
            flags.push('f');
        }
        if self.is_destroyed() {
            flags.push('D');
        }
        vec![
            "import".to_string(),
            flags,
            self.import_target().to_string(),
        ]
    }
}

/// Assign `value` only when `field` is still unset. Empty values are ignored
/// so an absent `status:` tail leaves the field unset.
pub fn set_once(field: &mut Option<String>, value: String) {
    if field.is_none() && !value.is_empty() {
        *field = Some(value);
    }
}

/// Whether a device-tree token such as `raidz1-0` or `draid2:4d:1s:8c-0`
/// opens a vdev group.
pub fn is_vdev_group(token: &str) -> bool {
    let base = match token.rsplit_once('-') {
        Some((head, index)) if !index.is_empty() && index.bytes().all(|b| b.is_ascii_digit()) => {
            head
        }
        _ => token,
    };
    let base = base.split(':').next().unwrap_or(base);
    VDEV_GROUP_KINDS.contains(&base)
}

/// Turns a raw device token from `zpool` output into a display name.
pub trait DeviceResolver {
    fn resolve(&self, raw: &str) -> String;
}

impl<F> DeviceResolver for F
where
    F: Fn(&str) -> String,
{
    fn resolve(&self, raw: &str) -> String {
        self(raw)
    }
}

/// Keeps tokens exactly as the tool printed them.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughResolver;

impl DeviceResolver for PassthroughResolver {
    fn resolve(&self, raw: &str) -> String {
        raw.to_string()
    }
}

/// Maps bare disk names to device nodes under `/dev` or `/dev/disk/by-id`.
/// Absolute paths, group names, and names with no matching node pass through.
#[derive(Debug, Clone, Copy, Default)]
pub struct DevPathResolver;

impl DevPathResolver {
    const SEARCH_DIRS: &'static [&'static str] = &["/dev", "/dev/disk/by-id"];
}

impl DeviceResolver for DevPathResolver {
    fn resolve(&self, raw: &str) -> String {
        if raw.starts_with('/') || is_vdev_group(raw) {
            return raw.to_string();
        }
        Self::SEARCH_DIRS
            .iter()
            .map(|dir| Path::new(dir).join(raw))
            .find(|candidate| candidate.exists())
            .map(|candidate| candidate.to_string_lossy().into_owned())
            .unwrap_or_else(|| raw.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vdev_group_detection() {
        assert!(is_vdev_group("mirror-0"));
        assert!(is_vdev_group("raidz1-12"));
        assert!(is_vdev_group("raidz"));
        assert!(is_vdev_group("draid2:4d:1s:8c-0"));
        assert!(is_vdev_group("logs"));
        assert!(!is_vdev_group("sda"));
        assert!(!is_vdev_group("mirror-a"));
        assert!(!is_vdev_group("ata-WDC_WD40EFRX-68N32N0"));
    }

    #[test]
    fn set_once_keeps_first_value() {
        let mut field = None;
        set_once(&mut field, String::new());
        assert_eq!(field, None);
        set_once(&mut field, "ONLINE".to_string());
        set_once(&mut field, "FAULTED".to_string());
        assert_eq!(field.as_deref(), Some("ONLINE"));
    }

    #[test]
    fn destroyed_pool_import_args() {
        let mut pool = ExportedZpool::new("tank");
        pool.id = Some("4711".to_string());
        pool.state = Some(ZPOOL_DESTROYED.to_string());
        assert!(pool.is_destroyed());
        assert_eq!(pool.import_args(true), vec!["import", "-NfD", "4711"]);
        assert_eq!(pool.import_args(false), vec!["import", "-ND", "4711"]);
    }

    #[test]
    fn plain_import_args() {
        let mut pool = ExportedZpool::new("tank");
        pool.state = Some(ZPOOL_ONLINE.to_string());
        assert!(!pool.is_destroyed());
        assert_eq!(pool.import_args(false), vec!["import", "-N", "tank"]);
    }

    #[test]
    fn closures_resolve_devices() {
        let upper = |raw: &str| raw.to_uppercase();
        assert_eq!(upper.resolve("sda"), "SDA");
        assert_eq!(PassthroughResolver.resolve("sda"), "sda");
        assert_eq!(DevPathResolver.resolve("/tmp/vdev0"), "/tmp/vdev0");
        assert_eq!(DevPathResolver.resolve("mirror-0"), "mirror-0");
    }
}
