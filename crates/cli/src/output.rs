//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use companion_lib::models::{PointOfInterestRecord, SyncStatus};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// One table row per point of interest
#[derive(Tabled, Serialize)]
pub struct PoiRow {
    #[tabled(rename = "#")]
    pub index: usize,
    #[tabled(rename = "Title")]
    pub title: String,
    #[tabled(rename = "Distance")]
    pub distance: String,
    #[tabled(rename = "Address")]
    pub address: String,
    #[tabled(rename = "Phones")]
    pub phones: String,
    #[tabled(rename = "Location")]
    pub location: String,
}

impl PoiRow {
    pub fn new(index: usize, record: &PointOfInterestRecord) -> Self {
        Self {
            index: index + 1,
            title: record.title.clone(),
            distance: format_distance(&record.distance),
            address: record.address.clone(),
            phones: record.phone_numbers.join(", "),
            location: record
                .coordinate
                .map(|c| format!("{:.4}, {:.4}", c.latitude, c.longitude))
                .unwrap_or_else(|| "-".to_string()),
        }
    }
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => {
            if let Ok(json) = serde_json::to_string_pretty(&items) {
                println!("{}", json);
            }
        }
    }
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Distances arrive as meters in text form; anything else is shown verbatim
pub fn format_distance(distance: &str) -> String {
    match distance.trim().parse::<f64>() {
        Ok(meters) if meters >= 1000.0 => format!("{:.1} km", meters / 1000.0),
        Ok(meters) => format!("{:.0} m", meters),
        Err(_) => distance.to_string(),
    }
}

/// Color status based on value
pub fn color_status(status: SyncStatus) -> String {
    match status {
        SyncStatus::Ok => status.as_str().green().to_string(),
        SyncStatus::LocalTransportSendFailed => status.as_str().yellow().to_string(),
        _ => status.as_str().red().to_string(),
    }
}
