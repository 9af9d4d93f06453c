/// Monotonic timestamp in nanoseconds.
///
/// Each side of a pingpong stamps with its own monotonic clock, so only
/// differences between same-host values are meaningful.
#[inline(always)]
pub fn monotonic_ns() -> u64 {
    let mut t = libc::timespec {
        tv_sec: 0,
        tv_nsec: 0,
    };
    unsafe {
        libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut t);
    }
    t.tv_sec as u64 * 1_000_000_000 + t.tv_nsec as u64
}
