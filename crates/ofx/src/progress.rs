//! 📊 progress.rs: "Are we there yet?" asked ninety million offer rows, in unison.
//!
//! 🚀 One [`ProgressMetrics`] per file being read. It counts bytes and rows, keeps a
//! short sliding window for rates, and paints a small borderless comfy-table under an
//! indicatif bar. When stderr is not a terminal, indicatif quietly draws nothing.
//!
//! ⚠️ Watching the bar will not make it go faster. Science has been consulted.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

const MIB: u64 = 1024 * 1024;

// ⏱️ Rates are averaged over this much recent history so one slow chunk doesn't cause panic.
const RATE_WINDOW: Duration = Duration::from_secs(5);

/// 📦 Bytes, scaled to the size of the whole file so the units don't jump around mid-run.
pub(crate) fn format_bytes(bytes: u64, file_size: u64) -> String {
    if file_size >= MIB {
        format!("{:.2} MiB", bytes as f64 / MIB as f64)
    } else if file_size >= 1024 {
        format!("{:.2} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{} bytes", bytes)
    }
}

/// 🔢 1234567 → "1,234,567". Eyes everywhere say thank you.
pub(crate) fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// ⏱️ MM:SS, or HH:MM:SS when the load has become a lifestyle.
pub(crate) fn format_duration(duration: Duration) -> String {
    let total = duration.as_secs();
    let (hours, minutes, seconds) = (total / 3600, (total % 3600) / 60, total % 60);
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq)]
struct Rates {
    rows_per_sec: f64,
    mib_per_sec: f64,
}

/// 📊 Read-side progress for one file.
pub(crate) struct ProgressMetrics {
    label: String,
    total_size: u64,
    bytes_read: u64,
    rows_read: u64,
    bar: ProgressBar,
    // (when, bytes so far, rows so far)
    samples: VecDeque<(Instant, u64, u64)>,
    started: Instant,
}

impl std::fmt::Debug for ProgressMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar does not derive Debug, and nobody wants to read one anyway
        f.debug_struct("ProgressMetrics")
            .field("label", &self.label)
            .field("total_size", &self.total_size)
            .field("bytes_read", &self.bytes_read)
            .field("rows_read", &self.rows_read)
            .finish()
    }
}

impl ProgressMetrics {
    /// 🚀 `total_size` is the file size in bytes; 0 means "no idea", which disables percent and ETA.
    pub(crate) fn new(label: impl Into<String>, total_size: u64) -> Self {
        let bar = ProgressBar::new(total_size);
        // -- 🎨 the template is a constant; if indicatif ever rejects it we fall back to its default look
        let style = ProgressStyle::default_bar()
            .template("{msg}\n| [{bar:40.cyan/blue}]")
            .map(|style| style.progress_chars("=>-"))
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);

        let started = Instant::now();
        let mut samples = VecDeque::new();
        samples.push_back((started, 0, 0));

        Self {
            label: label.into(),
            total_size,
            bytes_read: 0,
            rows_read: 0,
            bar,
            samples,
            started,
        }
    }

    /// 🔄 Account for one more page: `bytes` off the disk, `rows` of data in it.
    pub(crate) fn update(&mut self, bytes: u64, rows: u64) {
        self.bytes_read += bytes;
        self.rows_read += rows;
        let rates = self.sample(Instant::now());
        self.render(rates);
        self.bar.set_position(self.bytes_read);
    }

    /// ✅ EOF. Ring the bell.
    pub(crate) fn finish(&self) {
        self.bar.finish();
    }

    pub(crate) fn rows_read(&self) -> u64 {
        self.rows_read
    }

    fn percent(&self) -> f64 {
        if self.total_size == 0 {
            return 0.0;
        }
        (self.bytes_read as f64 / self.total_size as f64) * 100.0
    }

    // 📈 Push a sample for `now`, drop the ones older than the window, diff against the oldest.
    fn sample(&mut self, now: Instant) -> Rates {
        while let Some(&(at, _, _)) = self.samples.front() {
            if now.duration_since(at) <= RATE_WINDOW {
                break;
            }
            self.samples.pop_front();
        }
        self.samples.push_back((now, self.bytes_read, self.rows_read));

        let Some(&(oldest_at, oldest_bytes, oldest_rows)) = self.samples.front() else {
            return Rates::default();
        };
        let elapsed = now.duration_since(oldest_at).as_secs_f64();
        if elapsed <= 0.0 {
            return Rates::default();
        }
        Rates {
            rows_per_sec: self.rows_read.saturating_sub(oldest_rows) as f64 / elapsed,
            mib_per_sec: self.bytes_read.saturating_sub(oldest_bytes) as f64 / elapsed / MIB as f64,
        }
    }

    // 🔮 Linear extrapolation: assumes the rest of the file looks like the part we've seen.
    fn remaining(&self) -> String {
        let percent = self.percent();
        if percent <= 0.0 {
            return "--:--".to_string();
        }
        let elapsed = self.started.elapsed().as_secs_f64();
        let left = elapsed / (percent / 100.0) - elapsed;
        if left > 0.0 {
            format_duration(Duration::from_secs_f64(left))
        } else {
            "--:--".to_string()
        }
    }

    fn render(&self, rates: Rates) {
        let right = |text: String| Cell::new(text).set_alignment(CellAlignment::Right);

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            right(format!("{} rows/s", format_number(rates.rows_per_sec as u64))),
            right(format!("{} rows", format_number(self.rows_read))),
        ]);
        table.add_row(vec![
            right(format!("{:.2} MiB/s", rates.mib_per_sec)),
            right(format!(
                "{} / {}",
                format_bytes(self.bytes_read, self.total_size),
                format_bytes(self.total_size, self.total_size)
            )),
        ]);
        table.add_row(vec![
            right(format!("{} elapsed", format_duration(self.started.elapsed()))),
            right(format!("{:.2}% | {} remaining", self.percent(), self.remaining())),
        ]);

        self.bar.set_message(format!("reading: {}\n{}", self.label, table));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn the_one_where_big_numbers_get_commas() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(999), "999");
        assert_eq!(format_number(1_000), "1,000");
        assert_eq!(format_number(90_211_342), "90,211,342");
    }

    #[test]
    fn the_one_where_units_follow_the_file_size() {
        assert_eq!(format_bytes(512, 1000), "512 bytes");
        assert_eq!(format_bytes(2048, 4096), "2.00 KiB");
        assert_eq!(format_bytes(400 * MIB, 400 * MIB), "400.00 MiB", "a mid-sized file reads in MiB");
        assert_eq!(format_bytes(MIB / 2, 2 * MIB), "0.50 MiB");
        assert_eq!(format_bytes(3 * MIB, 1024 * MIB), "3.00 MiB");
    }

    #[test]
    fn the_one_where_long_loads_grow_an_hour_column() {
        assert_eq!(format_duration(Duration::from_secs(65)), "01:05");
        assert_eq!(format_duration(Duration::from_secs(3 * 3600 + 7)), "03:00:07");
    }

    #[test]
    fn the_one_where_totals_accumulate_and_unknown_sizes_have_no_eta() {
        let mut progress = ProgressMetrics::new("offers.csv", 0);
        progress.update(100, 3);
        progress.update(50, 2);

        assert_eq!(progress.rows_read(), 5);
        assert_eq!(progress.percent(), 0.0);
        assert_eq!(progress.remaining(), "--:--");
        progress.finish();
    }
}
