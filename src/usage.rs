//! Process resource-usage snapshots.

use std::time::Instant;

/// Resource counters for the calling process, as reported by `getrusage`.
///
/// CPU times are in seconds. `max_rss` keeps the platform's unit
/// (kilobytes on Linux, bytes on macOS).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResourceUsage {
    pub user_cpu: f64,
    pub system_cpu: f64,
    pub max_rss: i64,
    pub nswap: i64,
    pub inblock: i64,
    pub oublock: i64,
}

impl ResourceUsage {
    /// Read the current counters for this process.
    ///
    /// A failing `getrusage` call yields zeroed counters.
    #[cfg(unix)]
    pub fn current() -> Self {
        let mut raw = std::mem::MaybeUninit::<libc::rusage>::zeroed();
        // SAFETY: `raw` is a valid, writable rusage and RUSAGE_SELF is always accepted.
        let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, raw.as_mut_ptr()) };
        if rc != 0 {
            log::debug!("getrusage failed: {}", std::io::Error::last_os_error());
            return Self::default();
        }
        // SAFETY: zero-initialized and filled in by a successful getrusage.
        let raw = unsafe { raw.assume_init() };
        Self {
            user_cpu: timeval_secs(&raw.ru_utime),
            system_cpu: timeval_secs(&raw.ru_stime),
            max_rss: raw.ru_maxrss as i64,
            nswap: raw.ru_nswap as i64,
            inblock: raw.ru_inblock as i64,
            oublock: raw.ru_oublock as i64,
        }
    }

    #[cfg(not(unix))]
    pub fn current() -> Self {
        Self::default()
    }
}

#[cfg(unix)]
fn timeval_secs(tv: &libc::timeval) -> f64 {
    tv.tv_sec as f64 + 1e-6 * tv.tv_usec as f64
}

/// Monotonic timestamp paired with a resource-usage reading.
#[derive(Debug, Clone, Copy)]
pub struct UsageSnapshot {
    pub at: Instant,
    pub usage: ResourceUsage,
}

impl UsageSnapshot {
    /// Snapshot for the beginning of a window: clock first, then counters.
    pub fn open() -> Self {
        let at = Instant::now();
        let usage = ResourceUsage::current();
        Self { at, usage }
    }

    /// Snapshot for the end of a window: counters first, then clock.
    pub fn close() -> Self {
        let usage = ResourceUsage::current();
        let at = Instant::now();
        Self { at, usage }
    }
}
