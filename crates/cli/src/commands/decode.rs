//! Decode a reply or push payload captured to a file

use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use companion_lib::{
    models::{Payload, SyncStatus},
    sync::{decode_push, decode_reply, InboundPush, NoCategoryStyles, SyncOutcome},
};
use std::path::Path;

use super::PoiReport;
use crate::output::{print_info, OutputFormat};

/// How to interpret the payload
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum PayloadKind {
    /// Classify like an inbound push (result list or nearest point)
    #[default]
    Auto,
    /// Reply to a refresh request
    Reply,
}

pub fn read_payload(path: &Path) -> Result<Payload> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read payload from {:?}", path))?;
    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON in {:?}", path))?;

    match value {
        serde_json::Value::Object(payload) => Ok(payload),
        other => bail!("Payload must be a JSON object, found {}", json_kind(&other)),
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Decode a payload file and print the resulting records
pub fn decode_file(path: &Path, kind: PayloadKind, format: OutputFormat) -> Result<()> {
    let payload = read_payload(path)?;
    build_report(&payload, kind, format).print(format)
}

fn build_report(payload: &Payload, kind: PayloadKind, format: OutputFormat) -> PoiReport {
    let push = match kind {
        PayloadKind::Reply => InboundPush::Result(decode_reply(payload, &NoCategoryStyles)),
        PayloadKind::Auto => decode_push(payload, &NoCategoryStyles),
    };

    match push {
        InboundPush::Result(SyncOutcome::Success(records)) => {
            PoiReport::new(SyncStatus::Ok, &records, records.first())
        }
        InboundPush::Result(SyncOutcome::Failure(status)) => PoiReport::new(status, &[], None),
        InboundPush::Nearest(nearest) => {
            if matches!(format, OutputFormat::Table) {
                print_info("Nearest point of interest push");
            }
            let records: Vec<_> = nearest.into_iter().collect();
            PoiReport::new(SyncStatus::Ok, &records, records.first())
        }
    }
}
