//! Wire payload decoding
//!
//! Inbound payloads are untyped key/value maps. Everything is converted into
//! `SyncOutcome` / `InboundPush` here; nothing past this module looks at raw
//! payload keys. Individual record fields fall back to fixed placeholders so
//! one malformed entry never discards the rest of the batch.

use crate::models::{CategoryId, Coordinate, Payload, PointOfInterestRecord, Rgba, SyncStatus};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, warn};

pub const STATUS_KEY: &str = "status";
pub const LIST_KEY: &str = "listOfPOIs";
pub const SINGLE_KEY: &str = "singlePOI";

pub const DEFAULT_TITLE: &str = "unknown";
pub const DEFAULT_DISTANCE: &str = "?";
pub const DEFAULT_ADDRESS: &str = "no Address available";

/// Maps a category to its display color
pub trait CategoryLookup: Send + Sync {
    fn color_for(&self, category: CategoryId) -> Option<Rgba>;
}

/// Lookup without any category styles; every record renders white
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCategoryStyles;

impl CategoryLookup for NoCategoryStyles {
    fn color_for(&self, _category: CategoryId) -> Option<Rgba> {
        None
    }
}

/// Result of a request/reply exchange or a full-list push
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Success(Vec<PointOfInterestRecord>),
    Failure(SyncStatus),
}

impl SyncOutcome {
    pub fn status(&self) -> SyncStatus {
        match self {
            SyncOutcome::Success(_) => SyncStatus::Ok,
            SyncOutcome::Failure(status) => *status,
        }
    }
}

/// Classified payload pushed by the peer outside a request/reply exchange
#[derive(Debug, Clone, PartialEq)]
pub enum InboundPush {
    /// Full result set, handled like a reply
    Result(SyncOutcome),
    /// Only the nearest point changed
    Nearest(Option<PointOfInterestRecord>),
}

/// Request sent to the peer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyRequest {
    /// Kilometers
    pub max_radius: f64,
    pub max_results: u32,
}

impl NearbyRequest {
    pub fn to_payload(&self) -> Payload {
        match serde_json::to_value(self) {
            Ok(Value::Object(payload)) => payload,
            _ => Payload::new(),
        }
    }

    /// Parse a request; `None` if either parameter is missing or invalid
    pub fn from_payload(payload: &Payload) -> Option<Self> {
        serde_json::from_value::<Self>(Value::Object(payload.clone()))
            .ok()
            .filter(|request| request.max_radius.is_finite() && request.max_radius >= 0.0)
    }
}

/// Wire shape of one point-of-interest entry. All fields travel as strings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PeerPoi {
    pub title: String,
    /// Meters
    pub distance: String,
    pub address: String,
    /// Comma-separated
    pub phones: String,
    pub latitude: String,
    pub longitude: String,
    pub group_category: String,
    pub category_id: String,
}

impl PeerPoi {
    pub fn new(title: impl Into<String>, distance_meters: u32) -> Self {
        Self {
            title: title.into(),
            distance: distance_meters.to_string(),
            ..Default::default()
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_phones(mut self, phones: &[&str]) -> Self {
        self.phones = phones.join(",");
        self
    }

    pub fn with_coordinate(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = latitude.to_string();
        self.longitude = longitude.to_string();
        self
    }

    pub fn with_category(mut self, group: u8, category: u8) -> Self {
        self.group_category = group.to_string();
        self.category_id = category.to_string();
        self
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

/// Build a reply payload. The list is only included for `SyncStatus::Ok`.
pub fn encode_reply(status: SyncStatus, pois: &[PeerPoi]) -> Payload {
    let mut payload = Payload::new();
    payload.insert(STATUS_KEY.to_string(), json!(status.code()));
    if status.is_ok() {
        let list = pois.iter().map(PeerPoi::to_value).collect();
        payload.insert(LIST_KEY.to_string(), Value::Array(list));
    }
    payload
}

/// Build a "nearest changed" push payload
pub fn encode_nearest(poi: Option<&PeerPoi>) -> Payload {
    let mut payload = Payload::new();
    payload.insert(STATUS_KEY.to_string(), json!(SyncStatus::Ok.code()));
    if let Some(poi) = poi {
        payload.insert(SINGLE_KEY.to_string(), poi.to_value());
    }
    payload
}

/// Extract the status. Missing or non-integer status decodes as `Unknown`.
pub fn decode_status(payload: &Payload) -> SyncStatus {
    match payload.get(STATUS_KEY).and_then(Value::as_i64) {
        Some(code) => SyncStatus::from_code(code),
        None => {
            debug!("Payload has no usable status field");
            SyncStatus::Unknown
        }
    }
}

/// Decode a reply payload
pub fn decode_reply(payload: &Payload, lookup: &dyn CategoryLookup) -> SyncOutcome {
    let status = decode_status(payload);
    if !status.is_ok() {
        return SyncOutcome::Failure(status);
    }

    let records = match payload.get(LIST_KEY) {
        Some(Value::Array(entries)) => entries
            .iter()
            .map(|entry| decode_record(entry, lookup))
            .collect(),
        Some(other) => {
            warn!(kind = %value_kind(other), "POI list is not an array, treating as empty");
            Vec::new()
        }
        None => Vec::new(),
    };
    SyncOutcome::Success(records)
}

/// Decode a payload delivered by one of the push channels
pub fn decode_push(payload: &Payload, lookup: &dyn CategoryLookup) -> InboundPush {
    if !decode_status(payload).is_ok() || payload.contains_key(LIST_KEY) {
        return InboundPush::Result(decode_reply(payload, lookup));
    }

    let nearest = payload
        .get(SINGLE_KEY)
        .filter(|value| !value.is_null())
        .map(|value| decode_record(value, lookup));
    InboundPush::Nearest(nearest)
}

/// Decode one entry, defaulting every field that is missing or malformed
pub fn decode_record(entry: &Value, lookup: &dyn CategoryLookup) -> PointOfInterestRecord {
    let Some(fields) = entry.as_object() else {
        warn!(kind = %value_kind(entry), "POI entry is not a map, using placeholders");
        return placeholder_record();
    };

    let category = match (
        parse_field::<u8>(fields, "groupCategory"),
        parse_field::<u8>(fields, "categoryId"),
    ) {
        (Some(group), Some(category)) => Some(CategoryId { group, category }),
        _ => None,
    };
    let color = category
        .and_then(|id| lookup.color_for(id))
        .unwrap_or(Rgba::WHITE);

    let coordinate = match (
        parse_field::<f64>(fields, "latitude"),
        parse_field::<f64>(fields, "longitude"),
    ) {
        (Some(latitude), Some(longitude))
            if latitude.is_finite()
                && longitude.is_finite()
                && (-90.0..=90.0).contains(&latitude)
                && (-180.0..=180.0).contains(&longitude) =>
        {
            Some(Coordinate {
                latitude,
                longitude,
            })
        }
        _ => None,
    };

    let phone_numbers = text_field(fields, "phones")
        .map(|phones| {
            phones
                .split(',')
                .map(str::trim)
                .filter(|phone| !phone.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    PointOfInterestRecord {
        title: text_field(fields, "title").unwrap_or_else(|| DEFAULT_TITLE.to_string()),
        distance: text_field(fields, "distance").unwrap_or_else(|| DEFAULT_DISTANCE.to_string()),
        address: text_field(fields, "address")
            .filter(|address| !address.is_empty())
            .unwrap_or_else(|| DEFAULT_ADDRESS.to_string()),
        phone_numbers,
        category,
        color,
        coordinate,
    }
}

fn placeholder_record() -> PointOfInterestRecord {
    PointOfInterestRecord {
        title: DEFAULT_TITLE.to_string(),
        distance: DEFAULT_DISTANCE.to_string(),
        address: DEFAULT_ADDRESS.to_string(),
        phone_numbers: Vec::new(),
        category: None,
        color: Rgba::WHITE,
        coordinate: None,
    }
}

/// String field, also accepting bare numbers
fn text_field(fields: &Payload, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_field<T: std::str::FromStr>(fields: &Payload, key: &str) -> Option<T> {
    text_field(fields, key)?.trim().parse().ok()
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "map",
    }
}
