// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! CPU online state and topology-property uniqueness.
//!
//! The kernel encodes the set of online CPUs as a cpulist, a comma-separated
//! sequence of single ids and inclusive `min-max` ranges (e.g. "0,3-5,10").
//! On kernels built without CPU hotplug the online file does not exist at
//! all, in which case every CPU is online.

use crate::misc::read_trimmed;
use crate::Error;
use crate::Result;
use glob::glob;
use log::debug;
use log::error;
use log::warn;
use sscanf::sscanf;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Per-CPU topology file holding the hardware core id.
pub const CPU_CORE_ID: &str = "core_id";
/// Per-CPU topology file holding the physical socket id. The actual value is
/// architecture and platform dependent.
pub const CPU_PHYSICAL_PACKAGE_ID: &str = "physical_package_id";

pub(crate) const TOPOLOGY_DIR: &str = "topology";
pub(crate) const CPU_DIR_PATTERN: &str = "cpu*[0-9]";

pub(crate) const ONLINE_FILE: &str = "online";

/// Extract the numeric id from the innermost `cpu<N>` segment of `path`.
pub fn cpu_id_from_path(path: &Path) -> Result<u16> {
    path.components()
        .rev()
        .find_map(|comp| {
            let digits = comp.as_os_str().to_str()?.strip_prefix("cpu")?;
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            digits.parse::<u16>().ok()
        })
        .ok_or_else(|| Error::Format {
            path: path.to_path_buf(),
        })
}

/// Parse the kernel cpulist at `path` and report whether `cpu_id` appears in
/// it, either as a single token or inside an inclusive range token.
///
/// A missing file surfaces as [`Error::NotFound`]; callers treat that as
/// "hotplug disabled, all CPUs online".
pub fn cpu_online_in_list(path: &Path, cpu_id: u16) -> Result<bool> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => return Err(Error::from_io(path, e)),
    };
    let cpu_list = content.trim_end_matches('\0').trim();
    if cpu_list.is_empty() {
        return Err(Error::EmptyFile {
            path: path.to_path_buf(),
        });
    }

    for token in cpu_list.split(',') {
        let token = token.trim();
        match sscanf!(token, "{u16}-{u16}") {
            Ok((min, max)) => {
                if min > max {
                    return Err(Error::InvalidRange {
                        path: path.to_path_buf(),
                        token: token.to_string(),
                    });
                }
                if (min..=max).contains(&cpu_id) {
                    return Ok(true);
                }
            }
            Err(_) => match sscanf!(token, "{u16}") {
                Ok(id) => {
                    if id == cpu_id {
                        return Ok(true);
                    }
                }
                Err(_) => {
                    return Err(Error::InvalidRange {
                        path: path.to_path_buf(),
                        token: token.to_string(),
                    });
                }
            },
        }
    }

    Ok(false)
}

/// Number of distinct values of the named per-CPU topology property, paired
/// with the owning physical package, across the online CPUs under
/// `cpu_bus_path`. Counting `core_id` this way yields the number of physical
/// cores.
///
/// Individual CPUs degrade rather than failing the whole count: an
/// unreadable property file is taken as "0" with a logged warning, and a CPU
/// whose online state cannot be determined is skipped.
pub fn unique_cpu_property_count(cpu_bus_path: &Path, property: &str) -> usize {
    let pattern = cpu_bus_path.join(CPU_DIR_PATTERN);
    let cpu_paths = match glob(&pattern.to_string_lossy()) {
        Ok(paths) => paths,
        Err(e) => {
            error!(
                "Cannot find files matching {:?} ({}), number of unique {} set to 0",
                pattern, e, property
            );
            return 0;
        }
    };

    let online_path = cpu_bus_path.join(ONLINE_FILE);
    let mut uniques: HashSet<String> = HashSet::new();
    for cpu_path in cpu_paths.filter_map(std::result::Result::ok) {
        let cpu_id = match cpu_id_from_path(&cpu_path) {
            Ok(id) => id,
            Err(e) => {
                debug!("Skipping {:?}: {}", cpu_path, e);
                continue;
            }
        };
        match cpu_online_in_list(&online_path, cpu_id) {
            Ok(true) => {}
            Ok(false) => continue,
            // No online file: hotplug is disabled and every CPU is online.
            Err(ref e) if e.is_not_found() => {}
            Err(e) => {
                debug!("Unable to determine online state of cpu{}: {}", cpu_id, e);
                continue;
            }
        }

        let property_path = cpu_path.join(TOPOLOGY_DIR).join(property);
        let property_val = read_trimmed(&property_path).unwrap_or_else(|e| {
            warn!(
                "Cannot read {:?}, assuming 0 for {} of cpu{}: {}",
                property_path, property, cpu_id, e
            );
            "0".to_string()
        });
        let package_path = cpu_path.join(TOPOLOGY_DIR).join(CPU_PHYSICAL_PACKAGE_ID);
        let package_val = read_trimmed(&package_path).unwrap_or_else(|e| {
            warn!(
                "Cannot read {:?}, assuming 0 for {} of cpu{}: {}",
                package_path, CPU_PHYSICAL_PACKAGE_ID, cpu_id, e
            );
            "0".to_string()
        });

        uniques.insert(format!("{}_{}", property_val, package_val));
    }

    uniques.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn make_cpu(bus: &Path, id: usize, core_id: Option<&str>, package_id: &str) -> Result<()> {
        let topo = bus.join(format!("cpu{}", id)).join(TOPOLOGY_DIR);
        fs::create_dir_all(&topo)?;
        if let Some(core_id) = core_id {
            fs::write(topo.join(CPU_CORE_ID), core_id)?;
        }
        fs::write(topo.join(CPU_PHYSICAL_PACKAGE_ID), package_id)?;
        Ok(())
    }

    #[test]
    fn test_cpu_id_from_path() {
        let id = |p: &str| cpu_id_from_path(Path::new(p));

        assert_eq!(id("/sys/devices/system/cpu/cpu14").unwrap(), 14);
        assert_eq!(id("cpu0").unwrap(), 0);
        assert_eq!(id("/sys/devices/system/cpu/cpu2/cache/index0").unwrap(), 2);

        assert!(matches!(
            id("/sys/devices/system/cpu"),
            Err(Error::Format { .. })
        ));
        assert!(matches!(id("/sys/cpufreq"), Err(Error::Format { .. })));
        assert!(matches!(id("/sys/cpu-4"), Err(Error::Format { .. })));
    }

    #[test]
    fn test_online_list_membership() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(ONLINE_FILE);
        fs::write(&path, "0,3-5,10\n")?;

        for id in [0, 3, 4, 5, 10] {
            assert!(cpu_online_in_list(&path, id)?, "cpu{} should be online", id);
        }
        for id in [1, 2, 6, 9, 11] {
            assert!(
                !cpu_online_in_list(&path, id)?,
                "cpu{} should be offline",
                id
            );
        }
        Ok(())
    }

    #[test]
    fn test_online_list_single_range() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(ONLINE_FILE);
        fs::write(&path, "0-63\n")?;

        assert!(cpu_online_in_list(&path, 0)?);
        assert!(cpu_online_in_list(&path, 63)?);
        assert!(!cpu_online_in_list(&path, 64)?);
        Ok(())
    }

    #[test]
    fn test_online_list_empty() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(ONLINE_FILE);
        fs::write(&path, "\n")?;

        assert!(matches!(
            cpu_online_in_list(&path, 0),
            Err(Error::EmptyFile { .. })
        ));
        Ok(())
    }

    #[test]
    fn test_online_list_invalid_tokens() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join(ONLINE_FILE);

        for content in ["5-3", "1-2-3", "nonsense", "0-", "-1"] {
            fs::write(&path, content)?;
            assert!(
                matches!(
                    cpu_online_in_list(&path, 0),
                    Err(Error::InvalidRange { .. })
                ),
                "{:?} should be rejected",
                content
            );
        }
        Ok(())
    }

    #[test]
    fn test_online_list_missing_file() {
        let err = cpu_online_in_list(Path::new("/no/such/online"), 0).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unique_core_count() -> Result<()> {
        let dir = TempDir::new()?;
        let bus = dir.path();
        for (id, core) in [(0, "0"), (1, "0"), (2, "1"), (3, "1")] {
            make_cpu(bus, id, Some(core), "0")?;
        }
        fs::write(bus.join(ONLINE_FILE), "0-3\n")?;

        assert_eq!(unique_cpu_property_count(bus, CPU_CORE_ID), 2);
        assert_eq!(unique_cpu_property_count(bus, CPU_PHYSICAL_PACKAGE_ID), 1);
        Ok(())
    }

    #[test]
    fn test_unique_core_count_skips_offline() -> Result<()> {
        let dir = TempDir::new()?;
        let bus = dir.path();
        for (id, core) in [(0, "0"), (1, "0"), (2, "1"), (3, "1")] {
            make_cpu(bus, id, Some(core), "0")?;
        }
        fs::write(bus.join(ONLINE_FILE), "0-1\n")?;

        assert_eq!(unique_cpu_property_count(bus, CPU_CORE_ID), 1);
        Ok(())
    }

    #[test]
    fn test_unique_core_count_no_online_file() -> Result<()> {
        let dir = TempDir::new()?;
        let bus = dir.path();
        for (id, core) in [(0, "0"), (1, "0"), (2, "1"), (3, "1")] {
            make_cpu(bus, id, Some(core), "0")?;
        }

        assert_eq!(unique_cpu_property_count(bus, CPU_CORE_ID), 2);
        Ok(())
    }

    #[test]
    fn test_unique_count_distinct_packages() -> Result<()> {
        let dir = TempDir::new()?;
        let bus = dir.path();
        // Same core id on two different sockets counts twice.
        make_cpu(bus, 0, Some("0"), "0")?;
        make_cpu(bus, 1, Some("0"), "1")?;

        assert_eq!(unique_cpu_property_count(bus, CPU_CORE_ID), 2);
        Ok(())
    }

    #[test]
    fn test_unique_count_defaults_missing_property() -> Result<()> {
        let dir = TempDir::new()?;
        let bus = dir.path();
        make_cpu(bus, 0, Some("0"), "0")?;
        make_cpu(bus, 1, Some("1"), "0")?;
        make_cpu(bus, 2, None, "0")?;

        // cpu2 has no core_id file and is taken as "0", collapsing into cpu0.
        assert_eq!(unique_cpu_property_count(bus, CPU_CORE_ID), 2);
        Ok(())
    }

    #[test]
    fn test_unique_count_empty_bus() -> Result<()> {
        let dir = TempDir::new()?;
        assert_eq!(unique_cpu_property_count(dir.path(), CPU_CORE_ID), 0);
        Ok(())
    }

    #[test]
    fn test_unique_count_ignores_non_cpu_dirs() -> Result<()> {
        let dir = TempDir::new()?;
        let bus = dir.path();
        make_cpu(bus, 0, Some("0"), "0")?;
        make_cpu(bus, 1, Some("1"), "0")?;
        fs::create_dir_all(bus.join("cpufreq"))?;
        fs::create_dir_all(bus.join("cpuidle"))?;

        assert_eq!(unique_cpu_property_count(bus, CPU_CORE_ID), 2);
        Ok(())
    }

    #[test]
    fn test_unique_count_missing_bus() {
        let bus = PathBuf::from("/no/such/bus");
        assert_eq!(unique_cpu_property_count(&bus, CPU_CORE_ID), 0);
    }
}
