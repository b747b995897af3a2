//! Terminal styling utilities

use console::{style, Emoji};
use std::path::Path;

use crate::config::ChurnConfig;

// Emoji icons with fallbacks for terminals that don't support them
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "[*] ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", ">> ");
pub static FOLDER: Emoji<'_, '_> = Emoji("📂 ", "");
pub static DATABASE: Emoji<'_, '_> = Emoji("🗄️  ", "");
pub static MODEL: Emoji<'_, '_> = Emoji("🧠 ", "");
pub static SAVE: Emoji<'_, '_> = Emoji("💾 ", "");
pub static SCALES: Emoji<'_, '_> = Emoji("⚖️  ", "");

/// Print the application banner
pub fn print_banner(version: &str) {
    let banner = r#"
     ___ _                   ___ _
    / __| |_ _  _ _ _ _ _   | __| |_____ __ __
   | (__| ' \ || | '_| ' \  | _|| / _ \ V  V /
    \___|_||_\_,_|_| |_||_| |_| |_\___/\_/\_/
    "#;

    println!();
    println!("{}", style(banner).cyan().bold());
    println!(
        "    {}",
        style("Customer churn: segment, train, score, explain").dim()
    );
    println!("    {}", style(format!("v{}", version)).dim());
    println!("    {}", style("━".repeat(50)).dim());
    println!();
}

/// Print the configuration card for a command
pub fn print_config(config: &ChurnConfig) {
    let box_width = 56;
    let line = "─".repeat(box_width - 2);

    let source = if config.use_sql {
        format!("{} ({})", config.store_dir.display(), config.sql.table_name)
    } else {
        config.data_path.display().to_string()
    };

    println!("    ┌{}┐", line);
    println!(
        "    │ {}{}│",
        style("⚙️  Configuration").cyan().bold(),
        " ".repeat(box_width - 20)
    );
    println!("    ├{}┤", line);
    println!(
        "    │  {} Source: {:<39}│",
        if config.use_sql { &DATABASE } else { &FOLDER },
        truncate_string(&source, 38)
    );
    println!(
        "    │  {} Model:  {:<39}│",
        MODEL,
        truncate_path(&config.model_path, 38)
    );
    println!(
        "    │  {} Output: {:<39}│",
        SAVE,
        truncate_path(&config.pred_out_path, 38)
    );
    println!("    ├{}┤", line);
    println!(
        "    │  {} Threshold: {:<36}│",
        SCALES,
        style(format!("{:.2}", config.threshold)).yellow()
    );
    println!("    └{}┘", line);
    println!();
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

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("    {} {}", style("⚠").yellow().bold(), style(message).yellow());
}

/// Print the final completion message
pub fn print_completion(message: &str) {
    println!();
    println!("    {} {}", ROCKET, style(message).green().bold());
    println!();
}

fn truncate_path(path: &Path, max_len: usize) -> String {
    truncate_string(&path.display().to_string(), max_len)
}

fn truncate_string(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        s.to_string()
    } else {
        let tail: String = chars[chars.len() - (max_len - 3)..].iter().collect();
        format!("...{}", tail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_string() {
        assert_eq!(truncate_string("short", 10), "short");
        assert_eq!(truncate_string("data/Customer_Data.csv", 10), "...ata.csv");
    }
}
