// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Current process report

use std::{collections::BTreeMap, env, path::PathBuf, time::Instant};

use nix::{
    sys::{
        resource::{UsageWho, getrusage},
        stat::{Mode, umask},
    },
    unistd::{getgid, getpid, getuid},
};
use serde::Serialize;
use tracing::debug;

use crate::{DiagnosticsError, DiagnosticsResult, human_size};

/// Memory usage of the current process, in bytes
///
/// Fields the platform cannot report are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessMemory {
    /// Resident set size
    pub resident: Option<u64>,
    /// Virtual memory size
    pub virtual_size: Option<u64>,
    /// Peak resident set size
    pub max_resident: Option<u64>,
}

impl ProcessMemory {
    /// The same figures rendered with [`human_size`]
    pub fn humanize(&self) -> BTreeMap<&'static str, String> {
        [
            ("resident", self.resident),
            ("virtualSize", self.virtual_size),
            ("maxResident", self.max_resident),
        ]
        .into_iter()
        .filter_map(|(key, bytes)| bytes.map(|b| (key, human_size(b))))
        .collect()
    }
}

/// Facts about the running process
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessReport {
    /// Process id
    pub pid: i32,
    /// Process name as the OS sees it
    pub title: Option<String>,
    /// Command-line arguments, program first
    pub argv: Vec<String>,
    /// Absolute path of the executable
    pub exec_path: Option<PathBuf>,
    /// Working directory
    pub cwd: PathBuf,
    /// CPU architecture the binary was built for
    pub arch: &'static str,
    /// Operating system family the binary was built for
    pub platform: &'static str,
    /// Memory usage in bytes
    pub memory: ProcessMemory,
    /// Memory usage for people
    pub human_memory: BTreeMap<&'static str, String>,
    /// Seconds since diagnostics were initialized
    pub uptime: f64,
    /// File mode creation mask
    pub umask: u32,
    /// Real user id
    pub uid: u32,
    /// Real group id
    pub gid: u32,
}

pub(crate) fn collect(started: Instant) -> DiagnosticsResult<ProcessReport> {
    let cwd = env::current_dir().map_err(|source| DiagnosticsError::Io {
        what: "working directory",
        source,
    })?;

    let memory = memory()?;

    Ok(ProcessReport {
        pid: getpid().as_raw(),
        title: title(),
        argv: env::args_os()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect(),
        exec_path: env::current_exe().ok(),
        cwd,
        arch: env::consts::ARCH,
        platform: env::consts::OS,
        human_memory: memory.humanize(),
        memory,
        uptime: started.elapsed().as_secs_f64(),
        umask: current_umask(),
        uid: getuid().as_raw(),
        gid: getgid().as_raw(),
    })
}

fn title() -> Option<String> {
    proc_comm().or_else(|| {
        env::current_exe()
            .ok()
            .and_then(|path| path.file_name().map(|name| name.to_string_lossy().into_owned()))
    })
}

#[cfg(target_os = "linux")]
fn proc_comm() -> Option<String> {
    std::fs::read_to_string("/proc/self/comm")
        .ok()
        .map(|comm| comm.trim_end().to_string())
}

#[cfg(not(target_os = "linux"))]
fn proc_comm() -> Option<String> {
    None
}

fn memory() -> DiagnosticsResult<ProcessMemory> {
    let usage = getrusage(UsageWho::RUSAGE_SELF).map_err(|source| DiagnosticsError::Os {
        what: "resource usage",
        source,
    })?;

    // ru_maxrss is kilobytes on Linux and bytes on macOS
    let max_rss = u64::try_from(usage.max_rss()).ok();
    let max_resident = if cfg!(target_os = "macos") {
        max_rss
    } else {
        max_rss.map(|kb| kb * 1024)
    };

    let (resident, virtual_size) = statm().unwrap_or((None, None));

    Ok(ProcessMemory {
        resident,
        virtual_size,
        max_resident,
    })
}

/// Resident and virtual size from `/proc/self/statm`
#[cfg(target_os = "linux")]
fn statm() -> Option<(Option<u64>, Option<u64>)> {
    use nix::unistd::{SysconfVar, sysconf};

    let page_size = sysconf(SysconfVar::PAGE_SIZE)
        .ok()
        .flatten()
        .and_then(|size| u64::try_from(size).ok())?;
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    Some(parse_statm(&statm, page_size))
}

#[cfg(not(target_os = "linux"))]
fn statm() -> Option<(Option<u64>, Option<u64>)> {
    None
}

/// Parse `size resident ...` page counts into `(resident, virtual)` bytes
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_statm(statm: &str, page_size: u64) -> (Option<u64>, Option<u64>) {
    let mut fields = statm
        .split_whitespace()
        .map(|field| field.parse::<u64>().ok().map(|pages| pages * page_size));
    let virtual_size = fields.next().flatten();
    let resident = fields.next().flatten();
    (resident, virtual_size)
}

fn current_umask() -> u32 {
    proc_umask().unwrap_or_else(swap_umask)
}

#[cfg(target_os = "linux")]
fn proc_umask() -> Option<u32> {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .as_deref()
        .and_then(parse_status_umask)
}

#[cfg(not(target_os = "linux"))]
fn proc_umask() -> Option<u32> {
    None
}

fn swap_umask() -> u32 {
    // umask can only be read by setting it; hold the most restrictive mask
    // for the instant it is swapped out.
    debug!("reading umask by swapping it");
    let previous = umask(Mode::from_bits_truncate(0o077));
    umask(previous);
    u32::from(previous.bits())
}

/// The `Umask:` line of `/proc/self/status`, an octal value
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_status_umask(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Umask:"))
        .and_then(|value| u32::from_str_radix(value.trim(), 8).ok())
}
