use hdrhistogram::Histogram;
use spdlog::info;
use std::time::Instant;

/// Periodic progress and RTT-distribution logging for a running experiment.
///
/// Purely observational: it never touches the persisted output. Recording is
/// sampled to keep hot-path overhead down at high packet rates.
pub struct RunReporter {
    name: String,
    report_interval: u64,
    sample_rate: u64,
    count: u64,
    histogram: Histogram<u64>,
    last_instant: Instant,
    start_instant: Instant,
}

impl RunReporter {
    pub fn new(name: impl Into<String>, report_interval: u64, sample_rate: u64) -> Self {
        assert!(report_interval > 0, "report_interval must be positive");
        assert!(sample_rate > 0, "sample_rate must be positive");
        // Range: 1ns to 1,000s
        // 3 significant figures
        let histogram = Histogram::<u64>::new_with_bounds(1, 1_000_000_000_000, 3).unwrap();
        let now = Instant::now();
        Self {
            name: name.into(),
            report_interval,
            sample_rate,
            count: 0,
            histogram,
            last_instant: now,
            start_instant: now,
        }
    }

    pub fn record(&mut self, rtt_ns: u64) {
        self.count += 1;
        if self.count.is_multiple_of(self.sample_rate) {
            let clamped = rtt_ns.clamp(1, 1_000_000_000_000);
            self.histogram.record(clamped).unwrap();
        }
        if self.count.is_multiple_of(self.report_interval) {
            let now = Instant::now();
            let rate =
                self.report_interval as f64 / now.duration_since(self.last_instant).as_secs_f64();
            info!(
                "[{}] {} rounds, {:.0} rounds/s, rtt {}",
                self.name,
                self.count,
                rate,
                self.format_stats()
            );
            self.last_instant = now;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn finish(&self) {
        info!(
            "[{}] finished: {} rounds in {:.2?}, rtt {}",
            self.name,
            self.count,
            self.start_instant.elapsed(),
            self.format_stats()
        );
    }

    fn format_stats(&self) -> String {
        if self.histogram.len() == 0 {
            return "no samples".into();
        }
        format!(
            "min={} p50={} p99={} p999={} max={}",
            fmt_ns(self.histogram.min() as f64),
            fmt_ns(self.histogram.value_at_quantile(0.5) as f64),
            fmt_ns(self.histogram.value_at_quantile(0.99) as f64),
            fmt_ns(self.histogram.value_at_quantile(0.999) as f64),
            fmt_ns(self.histogram.max() as f64),
        )
    }
}

fn fmt_ns(nanos: f64) -> String {
    if nanos < 1000.0 {
        format!("{:.1}ns", nanos)
    } else if nanos < 1_000_000.0 {
        format!("{:.1}us", nanos / 1000.0)
    } else if nanos < 1_000_000_000.0 {
        format!("{:.1}ms", nanos / 1_000_000.0)
    } else {
        format!("{:.2}s", nanos / 1_000_000_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counts_every_round() {
        let mut reporter = RunReporter::new("test", 1_000, 1);
        for rtt in [1_500, 2_500, 900_000] {
            reporter.record(rtt);
        }
        assert_eq!(reporter.count(), 3);
        let stats = reporter.format_stats();
        assert!(stats.contains("p50="), "unexpected stats: {stats}");
    }

    #[test]
    fn test_sampling_thins_the_histogram() {
        let mut reporter = RunReporter::new("test", 1_000, 10);
        for _ in 0..100 {
            reporter.record(5_000);
        }
        assert_eq!(reporter.count(), 100);
        assert_eq!(reporter.histogram.len(), 10);
    }
}
