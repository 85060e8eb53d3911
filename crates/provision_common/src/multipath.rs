//! Multipath device detection and teardown helpers.
//!
//! Built on the udev property database plus `multipathd` / `dmsetup`
//! queries. Classification of a device (map, member path, partition) is
//! driven entirely by its udev properties, so every predicate accepts an
//! already-fetched mapping to avoid repeated queries.

use crate::command::{run_checked, CommandRunner};
use crate::error::ProvisionError;
use crate::udev::admin::{udevadm_info, udevadm_settle, SettleOptions};
use crate::udev::properties::{PropertyMapping, PropertyValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

const SHOW_PATHS_FMT: &str = "device='%d' serial='%z' multipath='%m'";
const SHOW_MAPS_FMT: &str = "name='%n' multipath='%w' sysfs='%d' paths='%N'";

/// Removal commands are retried this many times, with a settle in between.
const DEFAULT_REMOVE_RETRIES: usize = 10;

/// One path (member device) reported by `multipathd show paths`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipathPath {
    /// Kernel device name, e.g. "sda".
    pub device: String,
    pub serial: String,
    /// Owning multipath map name, or "orphan" while unassigned.
    pub multipath: String,
}

/// One map (aggregate device) reported by `multipathd show maps`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultipathMap {
    pub name: String,
    /// WWID of the map.
    pub multipath: String,
    /// Kernel device name, e.g. "dm-0".
    pub sysfs: String,
    pub paths: String,
}

/// Parse one line of `key='value'` pairs as emitted by the multipathd raw
/// format strings above. Empty values are kept.
fn load_shell_content(line: &str) -> Result<BTreeMap<String, String>, ProvisionError> {
    let tokens = shlex::split(line).ok_or_else(|| ProvisionError::MalformedPropertyLine {
        line: line.to_string(),
        reason: "unparseable shell content".to_string(),
    })?;

    let mut data = BTreeMap::new();
    for token in tokens {
        let (key, value) =
            token
                .split_once('=')
                .ok_or_else(|| ProvisionError::MalformedPropertyLine {
                    line: line.to_string(),
                    reason: format!("token `{token}` is not a key=value pair"),
                })?;
        data.insert(key.to_string(), value.to_string());
    }
    Ok(data)
}

fn field(data: &BTreeMap<String, String>, key: &str, line: &str) -> Result<String, ProvisionError> {
    data.get(key)
        .cloned()
        .ok_or_else(|| ProvisionError::MalformedPropertyLine {
            line: line.to_string(),
            reason: format!("missing `{key}` field"),
        })
}

/// Query multipathd for the current path list.
pub fn show_paths(runner: &dyn CommandRunner) -> Result<Vec<MultipathPath>, ProvisionError> {
    let output = run_checked(
        runner,
        "multipathd",
        &["show", "paths", "raw", "format", SHOW_PATHS_FMT],
    )?;

    let mut paths = Vec::new();
    for line in output.stdout.lines().filter(|l| !l.is_empty()) {
        let data = load_shell_content(line)?;
        debug!("extracted multipath path fields: {:?}", data);
        paths.push(MultipathPath {
            device: field(&data, "device", line)?,
            serial: field(&data, "serial", line)?,
            multipath: field(&data, "multipath", line)?,
        });
    }
    Ok(paths)
}

/// Query multipathd for the current map list.
pub fn show_maps(runner: &dyn CommandRunner) -> Result<Vec<MultipathMap>, ProvisionError> {
    let output = run_checked(
        runner,
        "multipathd",
        &["show", "maps", "raw", "format", SHOW_MAPS_FMT],
    )?;

    let mut maps = Vec::new();
    for line in output.stdout.lines().filter(|l| !l.is_empty()) {
        let data = load_shell_content(line)?;
        debug!("extracted multipath map fields: {:?}", data);
        maps.push(MultipathMap {
            name: field(&data, "name", line)?,
            multipath: field(&data, "multipath", line)?,
            sysfs: field(&data, "sysfs", line)?,
            paths: field(&data, "paths", line)?,
        });
    }
    Ok(maps)
}

/// Build a `{DM_NAME: /dev/dm-X}` map from `dmsetup ls` output.
pub fn dmname_to_blkdev_mapping(
    runner: &dyn CommandRunner,
) -> Result<BTreeMap<String, String>, ProvisionError> {
    let output = run_checked(runner, "dmsetup", &["ls", "-o", "blkdevname"])?;

    let mut mapping = BTreeMap::new();
    if output.stdout.trim() == "No devices found" {
        return Ok(mapping);
    }
    for line in output.stdout.lines().filter(|l| !l.is_empty()) {
        let Some((dm_name, blkdev)) = line.split_once('\t') else {
            continue;
        };
        // (dm-1) -> /dev/dm-1
        let blkdev = blkdev.trim().trim_matches(|c| c == '(' || c == ')');
        mapping.insert(dm_name.to_string(), format!("/dev/{blkdev}"));
    }
    Ok(mapping)
}

fn property<'a>(info: &'a PropertyMapping, key: &str) -> Option<&'a str> {
    info.get(key).and_then(PropertyValue::as_str)
}

fn info_or_query(
    runner: &dyn CommandRunner,
    devpath: &str,
    info: Option<&PropertyMapping>,
) -> Result<PropertyMapping, ProvisionError> {
    match info {
        Some(existing) => Ok(existing.clone()),
        None => udevadm_info(runner, devpath),
    }
}

/// Check if `devpath` is a multipath map device.
pub fn is_mpath_device(
    runner: &dyn CommandRunner,
    devpath: &str,
    info: Option<&PropertyMapping>,
) -> Result<bool, ProvisionError> {
    let info = info_or_query(runner, devpath, info)?;
    let result = property(&info, "DM_UUID").is_some_and(|uuid| uuid.starts_with("mpath-"));
    debug!("{} is multipath device? {}", devpath, result);
    Ok(result)
}

/// Check if `devpath` is a member (a path) of a multipath map.
pub fn is_mpath_member(
    runner: &dyn CommandRunner,
    devpath: &str,
    info: Option<&PropertyMapping>,
) -> Result<bool, ProvisionError> {
    let info = info_or_query(runner, devpath, info)?;
    let result = property(&info, "DM_MULTIPATH_DEVICE_PATH") == Some("1");
    debug!("{} is multipath device member? {}", devpath, result);
    Ok(result)
}

/// Check if `devpath` is a partition on top of a multipath map.
pub fn is_mpath_partition(
    runner: &dyn CommandRunner,
    devpath: &str,
    info: Option<&PropertyMapping>,
) -> Result<bool, ProvisionError> {
    let mut result = false;
    if devpath.starts_with("/dev/dm-") {
        let info = info_or_query(runner, devpath, info)?;
        result = info.contains_key("DM_PART") && info.contains_key("DM_MPATH");
    }
    debug!("{} is multipath device partition? {}", devpath, result);
    Ok(result)
}

/// Return the mpath id and partition number of a multipath partition.
pub fn mpath_partition_to_mpath_id_and_partnumber(
    runner: &dyn CommandRunner,
    devpath: &str,
) -> Result<Option<(String, String)>, ProvisionError> {
    let info = udevadm_info(runner, devpath)?;
    match (property(&info, "DM_MPATH"), property(&info, "DM_PART")) {
        (Some(mpath), Some(part)) => Ok(Some((mpath.to_string(), part.to_string()))),
        _ => Ok(None),
    }
}

/// Return the DM_NAME of `devpath`, if it has one.
pub fn find_mpath_id(
    runner: &dyn CommandRunner,
    devpath: &str,
) -> Result<Option<String>, ProvisionError> {
    let info = udevadm_info(runner, devpath)?;
    Ok(property(&info, "DM_NAME").map(str::to_string))
}

/// Return the mpath id owning the member device at `devpath`.
///
/// Device-mapper nodes are maps, not members; passing one is a caller bug.
pub fn find_mpath_id_by_path(
    runner: &dyn CommandRunner,
    devpath: &str,
    paths: Option<&[MultipathPath]>,
) -> Result<Option<String>, ProvisionError> {
    if devpath.starts_with("/dev/dm-") {
        return Err(ProvisionError::InvalidArgument(format!(
            "find_mpath_id_by_path does not handle device-mapper devices: {devpath}"
        )));
    }

    let fetched;
    let paths = match paths {
        Some(p) => p,
        None => {
            fetched = show_paths(runner)?;
            &fetched
        }
    };

    Ok(paths
        .iter()
        .find(|path| devpath == format!("/dev/{}", path.device))
        .map(|path| path.multipath.clone()))
}

/// Return the device nodes of every member of `multipath_id`.
///
/// Freshly triggered paths can still be orphans; re-settle and re-query a
/// few times before accepting the answer.
pub fn find_mpath_members(
    runner: &dyn CommandRunner,
    multipath_id: &str,
    paths: Option<&[MultipathPath]>,
) -> Result<Vec<String>, ProvisionError> {
    let fetched;
    let paths = match paths {
        Some(p) => p,
        None => {
            let mut current = show_paths(runner)?;
            for _ in 0..5 {
                if current.iter().any(|p| p.multipath.contains("orphan")) {
                    udevadm_settle(runner, &SettleOptions::default())?;
                    current = show_paths(runner)?;
                } else {
                    break;
                }
            }
            fetched = current;
            &fetched
        }
    };

    Ok(paths
        .iter()
        .filter(|path| path.multipath == multipath_id)
        .map(|path| format!("/dev/{}", path.device))
        .collect())
}

/// Resolve an mpath id (and optional partition number) to its device-mapper
/// name and block device, e.g. ("mpatha-part1", Some("/dev/dm-3")).
pub fn find_mpath_id_by_parent(
    runner: &dyn CommandRunner,
    multipath_id: &str,
    partnum: Option<u32>,
) -> Result<(String, Option<String>), ProvisionError> {
    let devmap = dmname_to_blkdev_mapping(runner)?;
    debug!("dm_name blk map: {:?}", devmap);
    let dm_name = match partnum {
        Some(partnum) => format!("{multipath_id}-part{partnum}"),
        None => multipath_id.to_string(),
    };
    let blkdev = devmap.get(&dm_name).cloned();
    Ok((dm_name, blkdev))
}

/// Return the mpath id of `device`, whatever its role: a map or partition
/// answers from its own properties, a member is resolved through the path
/// list, anything else is not multipath at all.
pub fn get_mpath_id_from_device(
    runner: &dyn CommandRunner,
    device: &str,
    info: Option<&PropertyMapping>,
) -> Result<Option<String>, ProvisionError> {
    let info = info_or_query(runner, device, info)?;
    // /dev/dm-X
    if is_mpath_device(runner, device, Some(&info))?
        || is_mpath_partition(runner, device, Some(&info))?
    {
        return Ok(property(&info, "DM_NAME").map(str::to_string));
    }
    // /dev/sdX
    if is_mpath_member(runner, device, Some(&info))? {
        return find_mpath_id_by_path(runner, device, None);
    }
    Ok(None)
}

/// Request multipath to force reload devmaps.
pub fn reload(runner: &dyn CommandRunner) -> Result<(), ProvisionError> {
    run_checked(runner, "multipath", &["-r"])?;
    Ok(())
}

/// Return the mpath ids which are partitions of `mpath_id`.
pub fn find_mpath_partitions(
    runner: &dyn CommandRunner,
    mpath_id: &str,
) -> Result<Vec<String>, ProvisionError> {
    if mpath_id.is_empty() {
        return Err(ProvisionError::InvalidArgument(
            "invalid mpath_id: must be non-empty".to_string(),
        ));
    }

    let prefix = format!("{mpath_id}-");
    Ok(dmname_to_blkdev_mapping(runner)?
        .into_keys()
        .filter(|dm_name| dm_name.starts_with(&prefix))
        .collect())
}

/// Remove a multipath partition mapping, settling after each attempt.
pub fn remove_partition(runner: &dyn CommandRunner, devpath: &str) -> Result<(), ProvisionError> {
    debug!("removing multipath partition: {}", devpath);
    for _ in 0..DEFAULT_REMOVE_RETRIES {
        run_checked(runner, "dmsetup", &["remove", "--force", "--retry", devpath])?;
        udevadm_settle(runner, &SettleOptions::default())?;
        if !Path::new(devpath).exists() {
            return Ok(());
        }
    }
    Err(ProvisionError::RemovalFailed(devpath.to_string()))
}

/// Remove a multipath device mapping, settling after each attempt.
pub fn remove_map(runner: &dyn CommandRunner, map_id: &str) -> Result<(), ProvisionError> {
    debug!("removing multipath map: {}", map_id);
    let devpath = format!("/dev/mapper/{map_id}");
    for _ in 0..DEFAULT_REMOVE_RETRIES {
        // multipath -f returns 1 when the map is already being torn down;
        // both 0 and 1 count as accepted here.
        let output = runner.run("multipath", &["-v3", "-R3", "-f", map_id])?;
        if output.exit_code != 0 && output.exit_code != 1 {
            return Err(ProvisionError::CommandFailed {
                command: format!("multipath -v3 -R3 -f {map_id}"),
                exit_code: output.exit_code,
                stderr: output.stderr,
            });
        }
        udevadm_settle(runner, &SettleOptions::default())?;
        if !Path::new(&devpath).exists() {
            return Ok(());
        }
    }
    Err(ProvisionError::RemovalFailed(devpath))
}
