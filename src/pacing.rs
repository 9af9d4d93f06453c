use crate::clock;
use std::hint::spin_loop;
use std::thread;
use std::time::Duration;

/// Empirical hand-back thresholds, in nanoseconds, for the sleep-then-spin
/// loop: sampled per (target interval, acceptable error %). The scheduler is
/// asked to sleep `interval - threshold` and the remainder is spun. Entries
/// are sorted ascending on both levels. Tighter error budgets need earlier
/// hand-back because nanosleep wake-up latency is tens of microseconds.
const CALIBRATION: &[(u64, &[(u64, u64)])] = &[
    // 10us targets are below wake-up latency; spin the whole interval.
    (10_000, &[(1, 560_000), (3, 558_000), (5, 556_000), (10, 551_000)]),
    (100_000, &[(1, 548_000), (3, 522_000), (5, 497_000), (10, 463_000)]),
    (
        1_000_000,
        &[(1, 418_000), (3, 371_000), (5, 342_000), (10, 305_000)],
    ),
    (
        10_000_000,
        &[(1, 262_000), (3, 204_000), (5, 165_000), (10, 118_000)],
    ),
];

/// Largest entry with key `<= key`, clamped to the table ends. Lookup never
/// extrapolates past the sampled range.
fn lookup_le<'a, V>(table: &'a [(u64, V)], key: u64) -> &'a V {
    let mut found = &table[0].1;
    for (k, v) in table {
        if *k > key {
            break;
        }
        found = v;
    }
    found
}

/// Hand-back threshold for pacing at `interval_ns` with at most
/// `max_err_pct` percent cadence error.
pub fn spin_threshold(interval_ns: u64, max_err_pct: u64) -> u64 {
    let by_err = lookup_le(CALIBRATION, interval_ns);
    *lookup_le(by_err, max_err_pct)
}

/// Sleeps for `ns` nanoseconds: coarse `thread::sleep` while more than the
/// calibrated threshold remains, then a busy spin on the monotonic clock for
/// the rest. OS sleep granularity alone cannot hold a nanosecond cadence,
/// and spinning the whole interval would burn a core.
pub fn sleep_ns(ns: u64, max_err_pct: u64) {
    if ns == 0 {
        return;
    }

    let threshold = spin_threshold(ns, max_err_pct);
    let start = clock::monotonic_ns();
    let mut remaining = ns;

    if ns > threshold {
        thread::sleep(Duration::from_nanos(ns - threshold));
        let elapsed = clock::monotonic_ns() - start;
        if elapsed >= ns {
            // Overslept past the whole interval.
            return;
        }
        remaining = ns - elapsed;
    }

    let spin_start = clock::monotonic_ns();
    while clock::monotonic_ns() - spin_start < remaining {
        spin_loop();
    }
}
