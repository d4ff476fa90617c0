//! Subcommand implementations

pub mod decode;
pub mod simulate;

use crate::output::{self, color_status, OutputFormat, PoiRow};
use colored::Colorize;
use companion_lib::models::{PointOfInterestRecord, SyncStatus};
use serde::Serialize;

/// Decoded or synchronized list, as printed by every subcommand
#[derive(Serialize)]
pub struct PoiReport {
    pub status: SyncStatus,
    pub status_code: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nearest: Option<String>,
    pub pois: Vec<PoiRow>,
}

impl PoiReport {
    pub fn new(
        status: SyncStatus,
        records: &[PointOfInterestRecord],
        nearest: Option<&PointOfInterestRecord>,
    ) -> Self {
        Self {
            status,
            status_code: status.code(),
            message: (!status.is_ok()).then(|| status.message().to_string()),
            nearest: nearest.map(|r| r.title.clone()),
            pois: records
                .iter()
                .enumerate()
                .map(|(i, r)| PoiRow::new(i, r))
                .collect(),
        }
    }

    pub fn print(&self, format: OutputFormat) -> anyhow::Result<()> {
        match format {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(self)?);
            }
            OutputFormat::Table => {
                println!("Status:   {}", color_status(self.status));
                if let Some(message) = &self.message {
                    println!("Message:  {}", message.yellow());
                }
                if let Some(nearest) = &self.nearest {
                    println!("Nearest:  {}", nearest.cyan());
                }
                println!();
                output::print_table(&self.pois, format);
            }
        }
        Ok(())
    }
}
