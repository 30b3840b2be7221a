// SPDX-FileCopyrightText: 2025 Semiotic Labs
//
// SPDX-License-Identifier: Apache-2.0

//! Host operating system report

use std::{collections::BTreeMap, env, path::PathBuf, thread};

use nix::{sys::utsname::uname, unistd::gethostname};
use serde::Serialize;

use crate::{DiagnosticsError, DiagnosticsResult, human_size};

/// Processor summary
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CpuSummary {
    /// Logical processors available
    pub count: usize,
    /// Model name of the first processor
    pub model: Option<String>,
    /// Clock speed of the first processor in MHz
    pub speed: Option<u32>,
}

/// System memory, in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SystemMemory {
    /// Installed memory
    pub total: Option<u64>,
    /// Unused memory
    pub free: Option<u64>,
}

/// Facts about the host operating system
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OsReport {
    /// Host name
    pub hostname: String,
    /// Byte order, `LE` or `BE`
    pub endianness: &'static str,
    /// Kernel name, e.g. `Linux`
    #[serde(rename = "type")]
    pub os_type: String,
    /// Operating system family the binary was built for
    pub platform: &'static str,
    /// Kernel release
    pub release: String,
    /// Machine hardware name
    pub arch: String,
    /// Processor summary
    pub cpus: CpuSummary,
    /// 1, 5 and 15 minute load averages, to four decimal places
    pub load_avg: Option<[f64; 3]>,
    /// Memory in bytes
    pub memory: SystemMemory,
    /// Memory for people
    pub human_memory: BTreeMap<&'static str, String>,
    /// Seconds since boot
    pub uptime: Option<u64>,
    /// Directory for temporary files
    pub tmp_dir: PathBuf,
}

pub(crate) fn collect() -> DiagnosticsResult<OsReport> {
    let hostname = gethostname().map_err(|source| DiagnosticsError::Os {
        what: "hostname",
        source,
    })?;
    let uts = uname().map_err(|source| DiagnosticsError::Os {
        what: "kernel identification",
        source,
    })?;
    let system = system_info();

    let human_memory = [("total", system.memory.total), ("free", system.memory.free)]
        .into_iter()
        .filter_map(|(key, bytes)| bytes.map(|b| (key, human_size(b))))
        .collect();

    Ok(OsReport {
        hostname: hostname.to_string_lossy().into_owned(),
        endianness: if cfg!(target_endian = "little") {
            "LE"
        } else {
            "BE"
        },
        os_type: uts.sysname().to_string_lossy().into_owned(),
        platform: env::consts::OS,
        release: uts.release().to_string_lossy().into_owned(),
        arch: uts.machine().to_string_lossy().into_owned(),
        cpus: cpus(),
        load_avg: system.load_avg,
        memory: system.memory,
        human_memory,
        uptime: system.uptime,
        tmp_dir: env::temp_dir(),
    })
}

#[derive(Debug, Default)]
struct SystemInfo {
    load_avg: Option<[f64; 3]>,
    memory: SystemMemory,
    uptime: Option<u64>,
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn system_info() -> SystemInfo {
    match nix::sys::sysinfo::sysinfo() {
        Ok(info) => {
            let (one, five, fifteen) = info.load_average();
            SystemInfo {
                load_avg: Some([round4(one), round4(five), round4(fifteen)]),
                memory: SystemMemory {
                    total: Some(info.ram_total()),
                    free: Some(info.ram_unused()),
                },
                uptime: Some(info.uptime().as_secs()),
            }
        }
        Err(error) => {
            tracing::warn!(%error, "sysinfo unavailable");
            SystemInfo::default()
        }
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn system_info() -> SystemInfo {
    SystemInfo::default()
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn cpus() -> CpuSummary {
    let count = thread::available_parallelism().map_or(1, usize::from);
    let (model, speed) = cpuinfo().map_or((None, None), |info| parse_cpuinfo(&info));
    CpuSummary {
        count,
        model,
        speed,
    }
}

#[cfg(target_os = "linux")]
fn cpuinfo() -> Option<String> {
    std::fs::read_to_string("/proc/cpuinfo").ok()
}

#[cfg(not(target_os = "linux"))]
fn cpuinfo() -> Option<String> {
    None
}

/// Model name and MHz of the first processor listed in `/proc/cpuinfo`
fn parse_cpuinfo(info: &str) -> (Option<String>, Option<u32>) {
    let field = |name: &str| {
        info.lines().find_map(|line| {
            let (key, value) = line.split_once(':')?;
            (key.trim() == name).then(|| value.trim().to_string())
        })
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let speed = field("cpu MHz")
        .and_then(|mhz| mhz.parse::<f64>().ok())
        .map(|mhz| mhz.round() as u32);

    (field("model name"), speed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_processor() {
        let info = "processor\t: 0\nmodel name\t: Example CPU @ 2.40GHz\ncpu MHz\t\t: 2399.998\n\n\
                    processor\t: 1\nmodel name\t: Other CPU\ncpu MHz\t\t: 1000.000\n";
        let (model, speed) = parse_cpuinfo(info);
        assert_eq!(model.as_deref(), Some("Example CPU @ 2.40GHz"));
        assert_eq!(speed, Some(2400));
    }

    #[test]
    fn missing_cpuinfo_fields_are_none() {
        assert_eq!(parse_cpuinfo("processor\t: 0\n"), (None, None));
    }

    #[test]
    fn rounds_to_four_places() {
        assert!((round4(0.123_456) - 0.1235).abs() < f64::EPSILON);
        assert!((round4(2.0) - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn collects_host_facts() {
        let report = collect().unwrap();
        assert!(!report.hostname.is_empty());
        assert!(!report.os_type.is_empty());
        assert!(report.cpus.count >= 1);
        assert!(matches!(report.endianness, "LE" | "BE"));

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("type").is_some());
        assert!(json.get("loadAvg").is_some());
        assert!(json.get("tmpDir").is_some());
    }
}
