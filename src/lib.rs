// Copyright (c) Meta Platforms, Inc. and affiliates.

// This software may be used and distributed according to the terms of the
// GNU General Public License version 2.

//! # Sysfs machine topology
//!
//! A crate that reads machine topology out of the kernel's sysfs-style
//! pseudo-filesystem trees: CPU cores and packages, the cache hierarchy,
//! online/offline CPU state, block and network devices, NUMA node memory
//! info, huge-page counters and the system UUID.
//!
//! Every read goes through a [`SysFs`] handle carrying a root prefix, so the
//! same queries can run against the live `/sys` or against a relocated tree
//! such as a mounted image or a container's view of the host:
//!
//!```no_run
//!     use sysfs_topology::SysFs;
//!
//!     let live = SysFs::real();
//!     let image = SysFs::new("/mnt/host-image");
//!
//!     let disks = image.block_devices();
//!     let cores = live.unique_cpu_property_count(sysfs_topology::CPU_CORE_ID);
//!```
//!
//! Reads are synchronous and stateless; a `SysFs` is cheap to clone and safe
//! to share across threads. Results always reflect the filesystem at call
//! time, so a hotplug event between two reads can be observed mid-scan.
//! Nothing here installs a logger; the degraded-read warnings go through the
//! `log` facade and surface however the embedding application configures it.

mod error;
pub use error::Error;
pub use error::Result;

mod misc;

mod sysfs;
pub use sysfs::CacheInfo;
pub use sysfs::SysFs;
pub use sysfs::ROOT_ENV_VAR;

mod cpus;
pub use cpus::cpu_id_from_path;
pub use cpus::cpu_online_in_list;
pub use cpus::unique_cpu_property_count;
pub use cpus::CPU_CORE_ID;
pub use cpus::CPU_PHYSICAL_PACKAGE_ID;
