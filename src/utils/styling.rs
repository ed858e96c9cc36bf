//! Terminal styling helpers

use console::{style, Emoji};
use std::path::Path;

// Emoji icons with fallbacks for terminals that don't support them
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[*] ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", ">> ");
pub static FOLDER: Emoji<'_, '_> = Emoji("📂 ", "");
pub static CLOCK: Emoji<'_, '_> = Emoji("⏱️  ", "");
pub static SAVE: Emoji<'_, '_> = Emoji("💾 ", "");

/// Print the application banner
pub fn print_banner(version: &str) {
    println!();
    println!(
        "    {} {}",
        style("tabreg").cyan().bold(),
        style(format!("v{}", version)).dim()
    );
    println!(
        "    {}",
        style("load · clean · reshape · aggregate · model").dim()
    );
    println!("    {}", style("━".repeat(50)).dim());
}

/// Print the config file and dataset count
pub fn print_config(config: &Path, datasets: usize, timeout_secs: u64) {
    println!(
        "    {} Config:   {}",
        FOLDER,
        truncate_string(&config.display().to_string(), 40)
    );
    println!("       Datasets: {}", style(datasets).yellow());
    println!("       Timeout:  {}s", style(timeout_secs).yellow());
}

/// Print a step header with styling
pub fn print_step_header(step_num: u8, title: &str) {
    println!();
    println!(
        "    {} {} {}",
        style(format!("STEP {}", step_num)).cyan().bold(),
        style("│").dim(),
        style(title).white().bold()
    );
    println!("    {}", style("─".repeat(50)).dim());
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("    {} {}", style("✓").green().bold(), style(message).green());
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("    {} {}", INFO, message);
}

/// Print where a file was written
pub fn print_saved(path: &Path) {
    println!("    {} {}", SAVE, path.display());
}

/// Print elapsed time for a step
pub fn print_step_time(elapsed: std::time::Duration) {
    println!(
        "    {} {}",
        CLOCK,
        style(format!("{:.2}s", elapsed.as_secs_f64())).dim()
    );
}

/// Print the final completion message
pub fn print_completion() {
    println!();
    println!(
        "    {} {}",
        ROCKET,
        style("Pipeline complete!").green().bold()
    );
    println!();
}

fn truncate_string(s: &str, max_len: usize) -> String {
    let count = s.chars().count();
    if count <= max_len {
        s.to_string()
    } else {
        let tail: String = s.chars().skip(count - max_len + 3).collect();
        format!("...{}", tail)
    }
}
