//! Open-file budget for indexing workers.

/// Descriptors one indexing task holds: the file being read and its mapping.
pub const FDS_PER_WORKER: usize = 2;

/// Descriptors one SQLite connection holds in WAL mode: database, `-wal`, `-shm`.
pub const FDS_PER_CONNECTION: usize = 3;

/// Share of the soft limit handed to workers once storage is accounted for.
const WORKER_SHARE_PERCENT: usize = 80;

/// Soft RLIMIT_NOFILE, or `None` when unlimited or unknown.
#[cfg(unix)]
pub fn max_open_fds() -> Option<u64> {
    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rlim) } != 0
        || rlim.rlim_cur == libc::RLIM_INFINITY
    {
        return None;
    }
    Some(rlim.rlim_cur)
}

#[cfg(not(unix))]
pub fn max_open_fds() -> Option<u64> {
    None
}

/// Workers that fit under `limit` descriptors next to a storage pool of `pool_size`
/// connections. Never less than one.
pub fn workers_within(limit: u64, pool_size: usize) -> usize {
    let limit = usize::try_from(limit).unwrap_or(usize::MAX);
    let usable = limit
        .saturating_sub(pool_size.saturating_mul(FDS_PER_CONNECTION))
        .saturating_mul(WORKER_SHARE_PERCENT)
        / 100;
    (usable / FDS_PER_WORKER).max(1)
}

/// [`workers_within`] the process limit, or `None` when there is no limit to respect.
pub fn max_workers_by_fd_limit(pool_size: usize) -> Option<usize> {
    max_open_fds().map(|limit| workers_within(limit, pool_size))
}
