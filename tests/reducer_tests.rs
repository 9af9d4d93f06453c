use assert_no_alloc::{AllocDisabler, assert_no_alloc};
use pingpong_rtt::{NUM_BUCKETS, PingpongPayload, Reducer, ReducerMode, WriteOutcome};
use std::fs;
use std::path::PathBuf;

#[cfg(debug_assertions)]
#[global_allocator]
static ALLOC: AllocDisabler = AllocDisabler;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("pingpong_{}_{}.dat", name, std::process::id()))
}

fn completed(id: u32, ts: [u64; 4]) -> PingpongPayload {
    let mut p = PingpongPayload::new(id);
    p.phase = 2;
    p.ts = ts;
    p
}

#[test]
fn test_all_timestamps_line_format() {
    let path = temp_path("all_format");
    let mut reducer = Reducer::create(ReducerMode::AllTimestamps, Some(&path)).unwrap();

    let out = reducer.write(&completed(7, [10, 20, 30, 40])).unwrap();
    assert_eq!(out, WriteOutcome::Recorded);
    reducer.close().unwrap();

    let text = fs::read_to_string(&path).unwrap();
    assert_eq!(text, "7: 10 20 30 40\n");
    let _ = fs::remove_file(&path);
}

#[test]
fn test_all_timestamps_one_line_per_round() {
    let path = temp_path("all_many");
    let mut reducer = Reducer::create(ReducerMode::AllTimestamps, Some(&path)).unwrap();

    for id in 1..=5 {
        reducer
            .write(&completed(id, [1, 2, 3, 4]))
            .unwrap();
    }
    reducer.close().unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 5);
    for (i, line) in lines.iter().enumerate() {
        assert!(line.starts_with(&format!("{}: ", i + 1)));
    }
    let _ = fs::remove_file(&path);
}

#[test]
fn test_min_max_emits_two_annotated_lines() {
    let path = temp_path("minmax");
    let mut reducer = Reducer::create(ReducerMode::MinMax, Some(&path)).unwrap();

    for (id, rtt) in [(1u32, 100u64), (2, 50), (3, 200), (4, 50)] {
        reducer.write(&completed(id, [0, 0, 0, rtt])).unwrap();
    }
    reducer.close().unwrap();

    let text = fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0], "2: 0 0 0 50 (LATENCY 50 ns)");
    assert_eq!(lines[1], "3: 0 0 0 200 (LATENCY 200 ns)");
    let _ = fs::remove_file(&path);
}

#[test]
fn test_min_max_without_payloads_emits_nothing() {
    let path = temp_path("minmax_empty");
    let reducer = Reducer::create(ReducerMode::MinMax, Some(&path)).unwrap();
    reducer.close().unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "");
    let _ = fs::remove_file(&path);
}

fn parse_rows(text: &str) -> Vec<[u64; 5]> {
    text.lines()
        .map(|line| {
            let fields: Vec<u64> = line
                .split_whitespace()
                .map(|f| f.parse().unwrap())
                .collect();
            fields.try_into().unwrap()
        })
        .collect()
}

#[test]
fn test_histogram_warm_up_then_single_bucket_hits() {
    let path = temp_path("hist_warmup");
    let mut reducer = Reducer::create(
        ReducerMode::Histogram {
            send_interval_ns: 1_000_000,
        },
        Some(&path),
    )
    .unwrap();

    let first = reducer.write(&completed(1, [0; 4])).unwrap();
    assert_eq!(first, WriteOutcome::WarmUp);

    let second = reducer.write(&completed(2, [1_000_000; 4])).unwrap();
    assert_eq!(second, WriteOutcome::Recorded);

    reducer.close().unwrap();

    let rows = parse_rows(&fs::read_to_string(&path).unwrap());
    assert_eq!(rows.len(), NUM_BUCKETS);

    // Exactly one hit per counter array.
    for col in 0..5 {
        let total: u64 = rows.iter().map(|r| r[col]).sum();
        assert_eq!(total, 1, "column {col}");
    }
    // Deltas of one interval land mid-window; lockstep timestamps mean zero
    // absolute latency.
    assert_eq!(rows[NUM_BUCKETS / 2][..4], [1, 1, 1, 1]);
    assert_eq!(rows[0][4], 1);
    let _ = fs::remove_file(&path);
}

#[test]
fn test_histogram_stray_delta_skips_relative_round_only() {
    let path = temp_path("hist_stray");
    let mut reducer = Reducer::create(
        ReducerMode::Histogram {
            send_interval_ns: 1_000_000,
        },
        Some(&path),
    )
    .unwrap();

    reducer.write(&completed(1, [0; 4])).unwrap();
    // ts[1] jumps by 3ms, outside the relative window; the absolute latency
    // (just under 500us) is still in range.
    let out = reducer
        .write(&completed(2, [1_000_000, 3_000_000, 3_000_010, 1_500_000]))
        .unwrap();
    assert_eq!(out, WriteOutcome::Skipped);

    reducer.close().unwrap();

    let rows = parse_rows(&fs::read_to_string(&path).unwrap());
    for col in 0..4 {
        let total: u64 = rows.iter().map(|r| r[col]).sum();
        assert_eq!(total, 0, "relative column {col} must stay untouched");
    }
    let abs_total: u64 = rows.iter().map(|r| r[4]).sum();
    assert_eq!(abs_total, 1);
    let _ = fs::remove_file(&path);
}

#[test]
fn test_hot_path_writes_do_not_allocate() {
    let mut minmax = Reducer::with_writer(ReducerMode::MinMax, Box::new(std::io::sink()));
    let mut histogram = Reducer::with_writer(
        ReducerMode::Histogram {
            send_interval_ns: 1_000_000,
        },
        Box::new(std::io::sink()),
    );

    let warm_up = completed(1, [0; 4]);
    let steady = completed(2, [1_000_000; 4]);

    assert_no_alloc(|| {
        histogram.write(&warm_up).unwrap();
        histogram.write(&steady).unwrap();
        minmax.write(&completed(3, [0, 0, 0, 100])).unwrap();
        minmax.write(&completed(4, [0, 0, 0, 50])).unwrap();
    });

    minmax.close().unwrap();
    histogram.close().unwrap();
}
