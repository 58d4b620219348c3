// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # Relocatable sysfs reader
//!
//! A [`SysFs`] maps logical sysfs paths to absolute ones under a configurable
//! root and exposes one read operation per topology facet: CPU core and
//! package ids, the cache hierarchy, block and network devices, NUMA node
//! memory info, huge-page counters and the system UUID.
//!
//! Paths handed out by [`SysFs::node_paths`] and [`SysFs::cpu_paths`] are
//! logical, so they can be fed back into the per-path operations regardless
//! of which root the handle carries. Nothing is cached; every operation is a
//! plain read of the tree as it is at call time.

use crate::cpus;
use crate::cpus::CPU_CORE_ID;
use crate::cpus::CPU_DIR_PATTERN;
use crate::cpus::CPU_PHYSICAL_PACKAGE_ID;
use crate::cpus::ONLINE_FILE;
use crate::cpus::TOPOLOGY_DIR;
use crate::misc::read_from_file;
use crate::misc::read_trimmed;
use crate::Error;
use crate::Result;
use glob::glob;
use log::debug;
use serde::Deserialize;
use serde::Serialize;
use sscanf::sscanf;
use std::env;
use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;

const BLOCK_DIR: &str = "sys/block";
const CPU_BUS_DIR: &str = "sys/devices/system/cpu";
const CPU_DIR: &str = "sys/devices/system/cpu/cpu";
const NET_DIR: &str = "sys/class/net";
const DMI_ID_DIR: &str = "sys/class/dmi/id";
const NODE_DIR: &str = "sys/devices/system/node";
const PPC_DEV_TREE: &str = "proc/device-tree";
// s390/s390x keeps its machine id under /etc instead.
const S390X_DEV_TREE: &str = "etc";

const MEMINFO_FILE: &str = "meminfo";
const HUGE_PAGES_NR_FILE: &str = "nr_hugepages";

const NODE_DIR_PATTERN: &str = "node*[0-9]";

/// Environment variable pointing reads at a relocated tree, for tools that
/// inspect a mounted image instead of the live host.
pub const ROOT_ENV_VAR: &str = "SYSFS_TOPOLOGY_ROOT";

/// Description of a single CPU cache directory.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct CacheInfo {
    /// Cache size in bytes.
    pub size: u64,
    /// Cache level as reported by the kernel, e.g. 1 for L1d.
    pub level: u32,
    /// "Data", "Instruction" or "Unified".
    pub cache_type: String,
    /// Number of CPUs sharing this cache.
    pub cpus: usize,
}

/// Handle for reading machine topology out of a sysfs-style tree.
///
/// The root is fixed at construction; two handles with different roots are
/// fully independent. A `SysFs` holds no other state and is safe to share
/// across threads.
#[derive(Clone, Debug)]
pub struct SysFs {
    root: PathBuf,
}

impl SysFs {
    /// Reader over a relocated tree. `root` is prepended to every logical
    /// path; an empty root reads the live host.
    pub fn new(root: impl Into<PathBuf>) -> SysFs {
        SysFs { root: root.into() }
    }

    /// Reader over the live host's `/`.
    pub fn real() -> SysFs {
        SysFs {
            root: PathBuf::new(),
        }
    }

    /// Reader rooted at `$SYSFS_TOPOLOGY_ROOT`, or the live host when unset.
    pub fn from_env() -> SysFs {
        SysFs::new(env::var_os(ROOT_ENV_VAR).unwrap_or_default())
    }

    /// Map a logical path to an absolute one under the configured root.
    /// Pure joining, never touches the filesystem.
    fn resolve(&self, rel: impl AsRef<Path>) -> PathBuf {
        let rel = rel.as_ref();
        let rel = rel.strip_prefix("/").unwrap_or(rel);
        if self.root.as_os_str().is_empty() {
            Path::new("/").join(rel)
        } else {
            self.root.join(rel)
        }
    }

    /// Strip the root back off an absolute path, the inverse of `resolve`.
    fn unresolve(&self, abs: &Path) -> PathBuf {
        if self.root.as_os_str().is_empty() {
            return abs.to_path_buf();
        }
        match abs.strip_prefix(&self.root) {
            Ok(rel) => Path::new("/").join(rel),
            Err(_) => abs.to_path_buf(),
        }
    }

    fn glob_dir(&self, dir: impl AsRef<Path>, pattern: &str) -> Result<Vec<PathBuf>> {
        let pattern_path = self.resolve(dir).join(pattern);
        let pattern_str = pattern_path.to_string_lossy();
        let paths = glob(&pattern_str).map_err(|_| Error::Parse {
            path: pattern_path.clone(),
            value: pattern_str.into_owned(),
        })?;
        Ok(paths
            .filter_map(std::result::Result::ok)
            .map(|p| self.unresolve(&p))
            .collect())
    }

    /// Logical paths of the NUMA node directories.
    pub fn node_paths(&self) -> Result<Vec<PathBuf>> {
        self.glob_dir(NODE_DIR, NODE_DIR_PATTERN)
    }

    /// Logical paths of the `cpu<N>` directories under `cpus_path`.
    pub fn cpu_paths(&self, cpus_path: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
        self.glob_dir(cpus_path, CPU_DIR_PATTERN)
    }

    /// Hardware core id of the CPU at `cpu_path`.
    pub fn core_id(&self, cpu_path: impl AsRef<Path>) -> Result<String> {
        read_trimmed(
            &self
                .resolve(cpu_path)
                .join(TOPOLOGY_DIR)
                .join(CPU_CORE_ID),
        )
    }

    /// Physical socket id of the CPU at `cpu_path`.
    pub fn physical_package_id(&self, cpu_path: impl AsRef<Path>) -> Result<String> {
        read_trimmed(
            &self
                .resolve(cpu_path)
                .join(TOPOLOGY_DIR)
                .join(CPU_PHYSICAL_PACKAGE_ID),
        )
    }

    /// Raw `meminfo` content of the NUMA node at `node_path`.
    pub fn meminfo(&self, node_path: impl AsRef<Path>) -> Result<String> {
        read_trimmed(&self.resolve(node_path).join(MEMINFO_FILE))
    }

    /// Names of the huge-page size directories under `dir`.
    pub fn huge_pages_dirs(&self, dir: impl AsRef<Path>) -> Result<Vec<String>> {
        list_names(&self.resolve(dir))
    }

    /// Value of the `nr_hugepages` counter for the huge-page size directory
    /// `name` under `dir`.
    pub fn huge_pages_nr(&self, dir: impl AsRef<Path>, name: &str) -> Result<String> {
        read_trimmed(
            &self
                .resolve(dir)
                .join(name)
                .join(HUGE_PAGES_NR_FILE),
        )
    }

    /// Names of the block devices on the host.
    pub fn block_devices(&self) -> Result<Vec<String>> {
        list_names(&self.resolve(BLOCK_DIR))
    }

    /// Major:minor numbers of the named block device.
    pub fn block_device_numbers(&self, name: &str) -> Result<String> {
        read_trimmed(&self.resolve(format!("{}/{}/dev", BLOCK_DIR, name)))
    }

    /// I/O scheduler line of the named block device.
    pub fn block_device_scheduler(&self, name: &str) -> Result<String> {
        read_trimmed(&self.resolve(format!("{}/{}/queue/scheduler", BLOCK_DIR, name)))
    }

    /// Size of the named block device in 512-byte sectors.
    pub fn block_device_size(&self, name: &str) -> Result<String> {
        read_trimmed(&self.resolve(format!("{}/{}/size", BLOCK_DIR, name)))
    }

    /// Names of the network interfaces. Symlinked entries are resolved first
    /// and kept only when the target is a directory.
    pub fn network_devices(&self) -> Result<Vec<String>> {
        let net_dir = self.resolve(NET_DIR);
        let entries = fs::read_dir(&net_dir).map_err(|e| Error::from_io(&net_dir, e))?;

        let mut devices = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::from_io(&net_dir, e))?;
            // fs::metadata follows symlinks; entries whose target cannot be
            // stat'ed are dropped.
            let meta = match fs::metadata(entry.path()) {
                Ok(meta) => meta,
                Err(_) => continue,
            };
            if meta.is_dir() {
                devices.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        devices.sort();
        Ok(devices)
    }

    /// MAC address of the named interface.
    pub fn network_address(&self, name: &str) -> Result<String> {
        read_trimmed(&self.resolve(format!("{}/{}/address", NET_DIR, name)))
    }

    /// MTU of the named interface.
    pub fn network_mtu(&self, name: &str) -> Result<String> {
        read_trimmed(&self.resolve(format!("{}/{}/mtu", NET_DIR, name)))
    }

    /// Link speed of the named interface.
    pub fn network_speed(&self, name: &str) -> Result<String> {
        read_trimmed(&self.resolve(format!("{}/{}/speed", NET_DIR, name)))
    }

    /// Value of a single counter under the interface's `statistics`
    /// directory, e.g. `rx_bytes`.
    pub fn network_stat(&self, dev: &str, stat: &str) -> Result<u64> {
        read_from_file(&self.resolve(format!("{}/{}/statistics/{}", NET_DIR, dev, stat)))
    }

    /// Names of the cache index directories of `cpu<id>`.
    pub fn caches(&self, cpu_id: u16) -> Result<Vec<String>> {
        list_names(&self.resolve(format!("{}{}/cache", CPU_DIR, cpu_id)))
    }

    /// Assemble a [`CacheInfo`] from `cpu<id>`'s cache directory `name`
    /// (e.g. "index0").
    pub fn cache_info(&self, cpu_id: u16, name: &str) -> Result<CacheInfo> {
        let cache_path = self.resolve(format!("{}{}/cache/{}", CPU_DIR, cpu_id, name));

        // Sizes are reported in kibibytes, e.g. "256K".
        let size_path = cache_path.join("size");
        let raw_size = read_trimmed(&size_path)?;
        let size = match sscanf!(raw_size.as_str(), "{u64}K").ok() {
            Some(kib) => kib * 1024,
            None => {
                return Err(Error::Parse {
                    path: size_path,
                    value: raw_size,
                });
            }
        };

        let level = read_from_file::<u32>(&cache_path.join("level"))?;
        let cache_type = read_trimmed(&cache_path.join("type"))?;
        let cpus = shared_cpu_count(&cache_path)?;

        Ok(CacheInfo {
            size,
            level,
            cache_type,
            cpus,
        })
    }

    /// System UUID, tried in order from the DMI product uuid, the PowerPC
    /// device-tree system id, the device-tree VM uuid and the s390x machine
    /// id. Returns the last error when every source fails.
    pub fn system_uuid(&self) -> Result<String> {
        read_trimmed(&self.resolve(format!("{}/product_uuid", DMI_ID_DIR)))
            .or_else(|_| read_trimmed(&self.resolve(format!("{}/system-id", PPC_DEV_TREE))))
            .or_else(|_| read_trimmed(&self.resolve(format!("{}/vm,uuid", PPC_DEV_TREE))))
            .or_else(|_| read_trimmed(&self.resolve(format!("{}/machine-id", S390X_DEV_TREE))))
    }

    /// Whether the CPU at `cpu_path` is online. On kernels built without
    /// hotplug support there is no `online` file and every CPU is online.
    pub fn is_cpu_online(&self, cpu_path: impl AsRef<Path>) -> bool {
        let cpu_path = self.resolve(cpu_path);
        let online_path = match cpu_path.parent() {
            Some(dir) => dir.join(ONLINE_FILE),
            None => return false,
        };

        match fs::metadata(&online_path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => return true,
            Err(e) => debug!("Unable to stat {:?}: {}", online_path, e),
            Ok(_) => {}
        }

        let cpu_id = match cpus::cpu_id_from_path(&cpu_path) {
            Ok(id) => id,
            Err(e) => {
                debug!("{}", e);
                return false;
            }
        };

        match cpus::cpu_online_in_list(&online_path, cpu_id) {
            Ok(online) => online,
            Err(e) => {
                debug!("Unable to get online CPUs list: {}", e);
                false
            }
        }
    }

    /// Number of distinct `(property, physical package)` pairs across the
    /// online CPUs of this tree, e.g. the physical core count for
    /// [`CPU_CORE_ID`].
    pub fn unique_cpu_property_count(&self, property: &str) -> usize {
        cpus::unique_cpu_property_count(&self.resolve(CPU_BUS_DIR), property)
    }
}

fn list_names(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|e| Error::from_io(dir, e))?;
    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| Error::from_io(dir, e))?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Population count over the comma-separated hex masks the kernel writes to
/// `shared_cpu_map`, e.g. "00000000,0000000f".
fn count_mask_bits(masks: &str) -> Option<usize> {
    let mut count = 0;
    for mask in masks.split(',') {
        let mask = u64::from_str_radix(mask.trim(), 16).ok()?;
        count += mask.count_ones() as usize;
    }
    Some(count)
}

fn shared_cpu_count(cache_path: &Path) -> Result<usize> {
    let map_path = cache_path.join("shared_cpu_map");
    let masks = read_trimmed(&map_path)?;
    count_mask_bits(&masks).ok_or_else(|| Error::Parse {
        path: map_path,
        value: masks,
    })
}
