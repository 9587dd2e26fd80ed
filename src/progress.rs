//! Human-readable progress lines on stdout.

use std::io::Write;

use colored::Colorize;

use crate::clients::entities::{CatalogMatch, SuggestionRow};

/// `For: <artist>` and the track, padded into two columns.
pub fn row_label(row: &SuggestionRow) -> String {
    format!("{:<35}{:<40}", format!("For: {}", row.artist), row.track)
}

/// Result column of a row line.
pub fn match_label(found: Option<&CatalogMatch>) -> String {
    match found {
        None => "Found: NOTHING!".to_string(),
        Some(m) => format!(
            "Found: {}\t{:<35}{}",
            m.track_id.as_deref().unwrap_or_default(),
            m.artist_names.join(", "),
            m.display_name
        ),
    }
}

pub fn row_result(row: &SuggestionRow, found: Option<&CatalogMatch>) {
    let label = match_label(found);
    if found.is_some() {
        println!("{}{}", row_label(row), label.green());
    } else {
        println!("{}{}", row_label(row), label.red());
    }
}

/// Starts a line that a later `done`/`failed` completes.
pub fn begin(message: &str) {
    print!("{message}");
    std::io::stdout().flush().ok();
}

pub fn done() {
    println!("{}", "Done.".green());
}

pub fn failed() {
    println!("{}", "Failed.".red());
}

pub fn notice(message: &str) {
    println!("{}", message.yellow());
}
