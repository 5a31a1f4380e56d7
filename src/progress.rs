//! Progress reporting for folder scans
//!
//! The reconciler reports once per processed file through the
//! [`Progress`] trait. The console implementation draws an indicatif
//! progress bar; [`NoProgress`] is used in silent mode and in tests.

use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Per-file scan progress callback
pub trait Progress {
    fn report(&self, done: usize, total: usize);
}

/// Discards all progress reports
#[derive(Debug, Default)]
pub struct NoProgress;

impl Progress for NoProgress {
    fn report(&self, _done: usize, _total: usize) {}
}

/// Progress bar for interactive scans
pub struct ConsoleProgress {
    bar: ProgressBar,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.green} {pos}/{len} {msg}")
                .expect("Invalid progress template"),
        );
        Self { bar }
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Default for ConsoleProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Progress for ConsoleProgress {
    fn report(&self, done: usize, total: usize) {
        if self.bar.length() != Some(total as u64) {
            self.bar.set_length(total as u64);
        }
        self.bar.set_position(done as u64);
    }
}

/// Format a number with thousands separators
fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary after a scan completes
pub fn print_summary(
    found: u64,
    added: u64,
    removed: u64,
    non_dicom: u64,
    duration: Duration,
    db_path: &str,
    db_size: Option<u64>,
) {
    println!();
    println!("{}", style("Scan Complete").green().bold());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Files found:").bold(), format_number(found));
    println!("  {} {}", style("Indexed:").bold(), format_number(added));
    if removed > 0 {
        println!("  {} {}", style("Removed:").bold(), format_number(removed));
    }
    if non_dicom > 0 {
        println!(
            "  {} {}",
            style("Not DICOM:").yellow().bold(),
            format_number(non_dicom)
        );
    }
    println!(
        "  {} {:.1}s",
        style("Duration:").bold(),
        duration.as_secs_f64()
    );
    if let Some(size) = db_size {
        println!(
            "  {} {} ({})",
            style("Database:").bold(),
            db_path,
            format_size(size, BINARY)
        );
    } else {
        println!("  {} {}", style("Database:").bold(), db_path);
    }
    println!();
}
