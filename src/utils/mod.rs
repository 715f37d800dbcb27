use chrono::NaiveDate;
use std::time::{Duration, Instant};
use tracing::info;

/// Logs when a CLI command starts and, on drop, how long it took.
pub struct Timer {
    label: &'static str,
    start: Instant,
}

impl Timer {
    pub fn start(label: &'static str) -> Self {
        info!("⏱  {}…", label);
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        info!("⏱  {} done in {:.2?}", self.label, self.elapsed());
    }
}

/// `1234567` → `"1,234,567"`.
pub fn fmt_number(n: i64) -> String {
    let digits = n.unsigned_abs().to_string();
    let groups: Vec<&str> = digits
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|c| std::str::from_utf8(c).unwrap_or_default())
        .collect();
    let sign = if n < 0 { "-" } else { "" };
    format!("{}{}", sign, groups.join(","))
}

pub fn fmt_date(d: Option<NaiveDate>) -> String {
    d.map(|d| d.to_string()).unwrap_or_else(|| "—".to_string())
}
