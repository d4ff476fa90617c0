//! Core data models for the companion sync layer

use serde::{Deserialize, Serialize};
use std::fmt;

/// Key/value payload exchanged with the peer device
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// RGBA color, one byte per channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::new(255, 255, 255, 255);

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Category identifier as understood by the category lookup collaborator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CategoryId {
    pub group: u8,
    pub category: u8,
}

/// Geographic position of a point of interest
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// A point of interest as shown on the companion device.
///
/// Equality only looks at `title`, `distance`, `color` and `category`. Two
/// records that differ only in address, phone numbers or coordinate compare
/// equal, so a changed address alone never causes a row refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PointOfInterestRecord {
    pub title: String,
    /// Pre-formatted by the peer, never interpreted here
    pub distance: String,
    pub address: String,
    pub phone_numbers: Vec<String>,
    pub category: Option<CategoryId>,
    pub color: Rgba,
    pub coordinate: Option<Coordinate>,
}

impl PartialEq for PointOfInterestRecord {
    fn eq(&self, other: &Self) -> bool {
        self.title == other.title
            && self.distance == other.distance
            && self.color == other.color
            && self.category == other.category
    }
}

impl Eq for PointOfInterestRecord {}

/// Outcome classification carried by every data source update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Ok,
    PeerLocationNotAuthorized,
    PeerLocationUnavailable,
    PeerCannotExtractCoordinates,
    LocalTransportSendFailed,
    Unknown,
}

impl SyncStatus {
    /// Decode a wire status code. Unrecognized codes map to `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => SyncStatus::Ok,
            1 => SyncStatus::PeerLocationNotAuthorized,
            2 => SyncStatus::PeerLocationUnavailable,
            3 => SyncStatus::PeerCannotExtractCoordinates,
            4 => SyncStatus::LocalTransportSendFailed,
            _ => SyncStatus::Unknown,
        }
    }

    /// Wire status code
    pub fn code(&self) -> i64 {
        match self {
            SyncStatus::Ok => 0,
            SyncStatus::PeerLocationNotAuthorized => 1,
            SyncStatus::PeerLocationUnavailable => 2,
            SyncStatus::PeerCannotExtractCoordinates => 3,
            SyncStatus::LocalTransportSendFailed => 4,
            SyncStatus::Unknown => -1,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, SyncStatus::Ok)
    }

    /// Text shown in the single placeholder row
    pub fn message(&self) -> &'static str {
        match self {
            SyncStatus::Ok => "No points of interest nearby",
            SyncStatus::PeerLocationNotAuthorized => {
                "Location access is not authorized on the phone"
            }
            SyncStatus::PeerLocationUnavailable => "The phone cannot determine its location",
            SyncStatus::PeerCannotExtractCoordinates => "The phone could not read the request",
            SyncStatus::LocalTransportSendFailed => "The phone is not reachable",
            SyncStatus::Unknown => "Unknown error",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Ok => "ok",
            SyncStatus::PeerLocationNotAuthorized => "peer_location_not_authorized",
            SyncStatus::PeerLocationUnavailable => "peer_location_unavailable",
            SyncStatus::PeerCannotExtractCoordinates => "peer_cannot_extract_coordinates",
            SyncStatus::LocalTransportSendFailed => "local_transport_send_failed",
            SyncStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current view of the nearby points of interest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceState {
    pub current_list: Vec<PointOfInterestRecord>,
    pub nearest: Option<PointOfInterestRecord>,
    pub status: SyncStatus,
    pub error_detail: String,
}

impl Default for DataSourceState {
    fn default() -> Self {
        Self {
            current_list: Vec::new(),
            nearest: None,
            status: SyncStatus::Ok,
            error_detail: String::new(),
        }
    }
}
