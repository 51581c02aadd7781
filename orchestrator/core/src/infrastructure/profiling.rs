// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Process Profiling
//!
//! A [`ProfileSession`] spans one server open/close cycle. Output files are
//! created up front so a bad path fails startup instead of shutdown. On
//! [`ProfileSession::stop`] the CPU profile (user/system CPU and wall time
//! consumed during the session) and a heap snapshot (peak resident set) are
//! written as JSON.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::server_config::ProfilingConfig;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("Failed to write profile {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize profile: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct ResourceUsage {
    user_seconds: f64,
    system_seconds: f64,
    max_rss_kib: u64,
}

#[derive(Debug, Serialize)]
pub struct CpuProfile {
    pub started_at: DateTime<Utc>,
    pub stopped_at: DateTime<Utc>,
    pub wall_seconds: f64,
    pub user_cpu_seconds: f64,
    pub system_cpu_seconds: f64,
}

#[derive(Debug, Serialize)]
pub struct HeapSnapshot {
    pub captured_at: DateTime<Utc>,
    pub max_rss_kib: u64,
}

pub struct ProfileSession {
    cpu: Option<(PathBuf, File)>,
    mem: Option<(PathBuf, File)>,
    started_at: DateTime<Utc>,
    started: Instant,
    baseline: ResourceUsage,
}

impl ProfileSession {
    /// Returns `None` when neither profile path is configured
    pub fn start(config: &ProfilingConfig) -> Result<Option<Self>, ProfileError> {
        if config.cpu_profile.is_none() && config.mem_profile.is_none() {
            return Ok(None);
        }

        let cpu = config.cpu_profile.as_deref().map(create).transpose()?;
        let mem = config.mem_profile.as_deref().map(create).transpose()?;

        if let Some((path, _)) = &cpu {
            info!(path = %path.display(), "CPU profiling enabled");
        }

        Ok(Some(Self {
            cpu,
            mem,
            started_at: Utc::now(),
            started: Instant::now(),
            baseline: resource_usage().unwrap_or_default(),
        }))
    }

    pub fn stop(self) -> Result<(), ProfileError> {
        let usage = match resource_usage() {
            Some(usage) => usage,
            None => {
                warn!("Resource usage unavailable on this platform, writing empty profile");
                self.baseline
            }
        };

        if let Some((path, file)) = self.cpu {
            let profile = CpuProfile {
                started_at: self.started_at,
                stopped_at: Utc::now(),
                wall_seconds: self.started.elapsed().as_secs_f64(),
                user_cpu_seconds: (usage.user_seconds - self.baseline.user_seconds).max(0.0),
                system_cpu_seconds: (usage.system_seconds - self.baseline.system_seconds).max(0.0),
            };
            serde_json::to_writer_pretty(&file, &profile)?;
            file.sync_all().map_err(|source| ProfileError::Io { path: path.clone(), source })?;
            info!(path = %path.display(), "CPU profile written");
        }

        if let Some((path, file)) = self.mem {
            let snapshot = HeapSnapshot {
                captured_at: Utc::now(),
                max_rss_kib: usage.max_rss_kib,
            };
            serde_json::to_writer_pretty(&file, &snapshot)?;
            file.sync_all().map_err(|source| ProfileError::Io { path: path.clone(), source })?;
            info!(path = %path.display(), "Heap snapshot written");
        }

        Ok(())
    }
}

fn create(path: &Path) -> Result<(PathBuf, File), ProfileError> {
    File::create(path)
        .map(|file| (path.to_path_buf(), file))
        .map_err(|source| ProfileError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(unix)]
fn resource_usage() -> Option<ResourceUsage> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::zeroed();
    // SAFETY: getrusage only writes into the provided struct
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: zero-initialised and filled in by a successful getrusage
    let usage = unsafe { usage.assume_init() };

    let seconds = |tv: libc::timeval| tv.tv_sec as f64 + tv.tv_usec as f64 / 1_000_000.0;

    // macOS reports bytes, Linux kilobytes
    #[cfg(target_os = "macos")]
    let max_rss_kib = usage.ru_maxrss as u64 / 1024;
    #[cfg(not(target_os = "macos"))]
    let max_rss_kib = usage.ru_maxrss as u64;

    Some(ResourceUsage {
        user_seconds: seconds(usage.ru_utime),
        system_seconds: seconds(usage.ru_stime),
        max_rss_kib,
    })
}

#[cfg(not(unix))]
fn resource_usage() -> Option<ResourceUsage> {
    None
}
