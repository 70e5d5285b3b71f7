use std::time::Duration;

/// Format a duration for log lines: "15m", "1h 30m", "2.5s", "100ms"
pub fn fmt_duration(d: Duration) -> String {
    let ms = d.as_millis() as u64;
    let secs = d.as_secs();
    if ms < 1_000 { return format!("{}ms", ms); }
    if secs < 60 {
        return if ms % 1_000 == 0 { format!("{}s", secs) }
               else { format!("{:.1}s", ms as f64 / 1_000.0) };
    }
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    match (h, m, s) {
        (0, m, 0) => format!("{}m", m),
        (0, m, s) => format!("{}m {}s", m, s),
        (h, 0, 0) => format!("{}h", h),
        (h, m, _) => format!("{}h {}m", h, m),
    }
}
