//! Best-effort discovery of the build environment.
//!
//! Python interpreters, C toolchains and package mirrors are probed so
//! the user can pick from what is actually installed instead of typing
//! paths. Everything here is advisory: probes absorb their own failures
//! and return empty results, never errors.

use camino::Utf8PathBuf;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

/// A Python interpreter found on this machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredInterpreter {
    /// Display label, e.g. `python3.12`.
    pub name: String,
    pub path: Utf8PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainKind {
    Msvc,
    Mingw64,
    Clang,
    Gcc,
}

/// A C compiler toolchain usable as the compilation backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredToolchain {
    pub kind: ToolchainKind,
    pub name: String,
    pub path: Utf8PathBuf,
}

/// Reachability of one package mirror. `latency_ms` is `None` when the
/// probe failed or timed out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorStatus {
    pub name: String,
    pub url: String,
    pub latency_ms: Option<u64>,
}

/// Mirrors probed by default, in no particular order.
pub const DEFAULT_PIP_MIRRORS: &[(&str, &str)] = &[
    ("PyPI", "pypi.org:443"),
    ("Tsinghua", "pypi.tuna.tsinghua.edu.cn:443"),
    ("Aliyun", "mirrors.aliyun.com:443"),
    ("USTC", "pypi.mirrors.ustc.edu.cn:443"),
];

const MIRROR_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

pub trait InterpreterDiscovery {
    fn discover_interpreters(&self) -> Vec<DiscoveredInterpreter>;
}

pub trait ToolchainDiscovery {
    fn discover_toolchains(&self) -> Vec<DiscoveredToolchain>;
}

pub trait MirrorProbe {
    /// Probe all known mirrors and rank them fastest first, unreachable
    /// mirrors last.
    fn probe_mirrors(&self) -> Vec<MirrorStatus>;
}

/// Discovery against the real system: PATH lookups, conventional install
/// locations and TCP connect probes.
pub struct SystemDiscovery;

impl SystemDiscovery {
    pub fn new() -> Self {
        Self
    }

    /// Search PATH for an executable by name.
    fn find_in_path(name: &str) -> Option<Utf8PathBuf> {
        let path_var = std::env::var_os("PATH")?;
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(name);
            #[cfg(windows)]
            let candidate_exe = dir.join(format!("{name}.exe"));
            if candidate.is_file() {
                return Utf8PathBuf::try_from(candidate).ok();
            }
            #[cfg(windows)]
            if candidate_exe.is_file() {
                return Utf8PathBuf::try_from(candidate_exe).ok();
            }
        }
        None
    }
}

impl Default for SystemDiscovery {
    fn default() -> Self {
        Self::new()
    }
}

impl InterpreterDiscovery for SystemDiscovery {
    fn discover_interpreters(&self) -> Vec<DiscoveredInterpreter> {
        let candidates = [
            "python3.13",
            "python3.12",
            "python3.11",
            "python3.10",
            "python3",
            "python",
        ];

        let mut found = Vec::new();
        for name in candidates {
            if let Some(path) = Self::find_in_path(name) {
                // The same binary often appears under several names.
                if !found.iter().any(|i: &DiscoveredInterpreter| i.path == path) {
                    found.push(DiscoveredInterpreter {
                        name: name.to_string(),
                        path,
                    });
                }
            }
        }
        found
    }
}

impl ToolchainDiscovery for SystemDiscovery {
    fn discover_toolchains(&self) -> Vec<DiscoveredToolchain> {
        let candidates: &[(&str, ToolchainKind)] = &[
            ("cl", ToolchainKind::Msvc),
            ("x86_64-w64-mingw32-gcc", ToolchainKind::Mingw64),
            ("clang", ToolchainKind::Clang),
            ("gcc", ToolchainKind::Gcc),
        ];

        candidates
            .iter()
            .filter_map(|(name, kind)| {
                Self::find_in_path(name).map(|path| DiscoveredToolchain {
                    kind: *kind,
                    name: name.to_string(),
                    path,
                })
            })
            .collect()
    }
}

impl MirrorProbe for SystemDiscovery {
    fn probe_mirrors(&self) -> Vec<MirrorStatus> {
        let mut statuses: Vec<MirrorStatus> = DEFAULT_PIP_MIRRORS
            .iter()
            .map(|(name, url)| MirrorStatus {
                name: name.to_string(),
                url: url.to_string(),
                latency_ms: probe_latency(url),
            })
            .collect();

        // Fastest first; unreachable mirrors sink to the bottom.
        statuses.sort_by_key(|s| s.latency_ms.unwrap_or(u64::MAX));
        statuses
    }
}

fn probe_latency(url: &str) -> Option<u64> {
    let addr = url.to_socket_addrs().ok()?.next()?;
    let started = Instant::now();
    TcpStream::connect_timeout(&addr, MIRROR_PROBE_TIMEOUT).ok()?;
    Some(started.elapsed().as_millis() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interpreter_discovery_absorbs_failures() {
        // Regardless of what is installed, discovery never panics and
        // never returns duplicate paths.
        let found = SystemDiscovery::new().discover_interpreters();
        for (i, a) in found.iter().enumerate() {
            for b in &found[i + 1..] {
                assert_ne!(a.path, b.path);
            }
        }
    }

    #[test]
    fn test_mirror_ranking_puts_unreachable_last() {
        let mut statuses = vec![
            MirrorStatus {
                name: "slow".into(),
                url: "slow:443".into(),
                latency_ms: Some(400),
            },
            MirrorStatus {
                name: "dead".into(),
                url: "dead:443".into(),
                latency_ms: None,
            },
            MirrorStatus {
                name: "fast".into(),
                url: "fast:443".into(),
                latency_ms: Some(12),
            },
        ];
        statuses.sort_by_key(|s| s.latency_ms.unwrap_or(u64::MAX));

        let order: Vec<&str> = statuses.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(order, vec!["fast", "slow", "dead"]);
    }
}
