use crate::config::RunConfig;
use crate::stats::StatsSnapshot;
use std::fmt;

pub const BANNER: &str = concat!("barrage ", env!("CARGO_PKG_VERSION"), " - Layer 7");

/// One-line description of a run, printed before it starts.
pub struct Header<'a>(pub &'a RunConfig);

impl fmt::Display for Header<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let config = self.0;
        writeln!(f, "{}", BANNER)?;
        write!(
            f,
            "Target: {} | Workers: {} | Sockets/cycle: {} | Method: {}",
            config.target.url(),
            config.workers,
            config.sockets,
            config.method
        )?;
        if config.dry_run {
            write!(f, " | DRY RUN")?;
        }
        Ok(())
    }
}

/// Final statistics table.
pub struct Report<'a> {
    pub config: &'a RunConfig,
    pub snapshot: &'a StatsSnapshot,
}

impl fmt::Display for Report<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.snapshot;
        let rows = [
            ("Method", self.config.method.to_string()),
            ("RPS (total)", format!("{:.2}/s", s.rate)),
            ("Max RPS (per worker)", format!("{} RPS", self.config.rate_limit)),
            ("Total requests", s.total.to_string()),
            ("Succeeded (2xx/3xx)", s.success.to_string()),
            ("Failed (4xx/5xx/transport)", s.failure.to_string()),
            ("Avg latency", format!("{:.2} ms", s.avg_latency_ms)),
            ("Max latency", format!("{:.2} ms", s.max_latency_ms)),
            ("Runtime", format!("{:.2} seconds", s.elapsed_secs)),
        ];

        let label_width = rows.iter().map(|(label, _)| label.len()).max().unwrap_or(0);
        let value_width = rows.iter().map(|(_, value)| value.len()).max().unwrap_or(0);
        let rule = format!("+-{}-+-{}-+", "-".repeat(label_width), "-".repeat(value_width));

        writeln!(f, "{}", self.config.target.url())?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "| {:<label_width$} | {:<value_width$} |", "Metric", "Value")?;
        writeln!(f, "{}", rule)?;
        for (label, value) in &rows {
            writeln!(f, "| {:<label_width$} | {:>value_width$} |", label, value)?;
        }
        write!(f, "{}", rule)
    }
}
