//! Simulated primary device
//!
//! Answers refresh requests from a `NearbyProvider` and can push updates to
//! the companion over each delivery channel. The real primary device is an
//! opaque service; this stands in for it in the agent, the CLI and tests.

use crate::models::{Payload, SyncStatus};
use crate::sync::{encode_nearest, encode_reply, NearbyRequest, PeerPoi};
use crate::transport::{Session, SessionEvent, TransportError};
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

/// Source of nearby points of interest on the primary device
pub trait NearbyProvider: Send + Sync {
    /// Points within `max_radius_km`, sorted by increasing distance
    fn nearby(&self, max_radius_km: f64, max_results: u32) -> Result<Vec<PeerPoi>, SyncStatus>;
}

/// Serves a fixed list
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    pois: Vec<PeerPoi>,
}

impl StaticProvider {
    /// Entries are sorted by distance; unparsable distances sort last
    pub fn new(mut pois: Vec<PeerPoi>) -> Self {
        pois.sort_by(|a, b| distance_meters(a).total_cmp(&distance_meters(b)));
        Self { pois }
    }

    /// Load a JSON array of entries
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read POI fixture from {:?}", path))?;
        let pois: Vec<PeerPoi> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse POI fixture {:?}", path))?;
        Ok(Self::new(pois))
    }

    pub fn pois(&self) -> &[PeerPoi] {
        &self.pois
    }
}

impl NearbyProvider for StaticProvider {
    fn nearby(&self, max_radius_km: f64, max_results: u32) -> Result<Vec<PeerPoi>, SyncStatus> {
        let max_meters = max_radius_km * 1000.0;
        Ok(self
            .pois
            .iter()
            .filter(|poi| distance_meters(poi) <= max_meters)
            .take(max_results as usize)
            .cloned()
            .collect())
    }
}

/// Always answers with the same failure, e.g. location permission denied
#[derive(Debug, Clone, Copy)]
pub struct FailingProvider(pub SyncStatus);

impl NearbyProvider for FailingProvider {
    fn nearby(&self, _max_radius_km: f64, _max_results: u32) -> Result<Vec<PeerPoi>, SyncStatus> {
        Err(self.0)
    }
}

/// A handful of landmarks around central Paris
pub fn demo_pois() -> Vec<PeerPoi> {
    vec![
        PeerPoi::new("Louvre", 800)
            .with_address("Rue de Rivoli, 75001 Paris")
            .with_phones(&["+33 1 40 20 50 50"])
            .with_coordinate(48.8606, 2.3376)
            .with_category(1, 2),
        PeerPoi::new("Musee d'Orsay", 1200)
            .with_address("1 Rue de la Legion d'Honneur, 75007 Paris")
            .with_phones(&["+33 1 40 49 48 14"])
            .with_coordinate(48.8600, 2.3266)
            .with_category(1, 2),
        PeerPoi::new("Notre-Dame", 1500)
            .with_address("6 Parvis Notre-Dame, 75004 Paris")
            .with_coordinate(48.8530, 2.3499)
            .with_category(1, 5),
        PeerPoi::new("Tour Eiffel", 3400)
            .with_address("Champ de Mars, 75007 Paris")
            .with_phones(&["+33 8 92 70 12 39"])
            .with_coordinate(48.8584, 2.2945)
            .with_category(1, 1),
        PeerPoi::new("Sacre-Coeur", 4100)
            .with_address("35 Rue du Chevalier de la Barre, 75018 Paris")
            .with_coordinate(48.8867, 2.3431)
            .with_category(1, 5),
    ]
}

fn distance_meters(poi: &PeerPoi) -> f64 {
    poi.distance.trim().parse().unwrap_or(f64::INFINITY)
}

/// Primary-device side of the session
#[derive(Clone)]
pub struct PrimaryResponder {
    session: Arc<dyn Session>,
    provider: Arc<dyn NearbyProvider>,
}

impl PrimaryResponder {
    pub fn new(session: Arc<dyn Session>, provider: Arc<dyn NearbyProvider>) -> Self {
        Self { session, provider }
    }

    /// Build the reply for one request payload
    pub fn answer(&self, request: &Payload) -> Payload {
        let Some(request) = NearbyRequest::from_payload(request) else {
            warn!("Malformed nearby request");
            return encode_reply(SyncStatus::PeerCannotExtractCoordinates, &[]);
        };

        match self.provider.nearby(request.max_radius, request.max_results) {
            Ok(mut pois) => {
                pois.truncate(request.max_results as usize);
                debug!(count = pois.len(), "Answering nearby request");
                encode_reply(SyncStatus::Ok, &pois)
            }
            Err(status) => encode_reply(status, &[]),
        }
    }

    /// Answer requests until shutdown or until the session goes away
    pub async fn run(
        self,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        info!("Starting simulated primary device");

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(SessionEvent::RequestReceived { payload, responder }) => {
                        if !responder.reply(self.answer(&payload)) {
                            debug!("Companion stopped waiting for reply");
                        }
                    }
                    Some(other) => debug!(event = ?other, "Primary session event"),
                    None => break,
                },
                _ = shutdown.recv() => {
                    info!("Shutting down simulated primary device");
                    break;
                }
            }
        }
    }

    /// Push the current nearest point through the latest-snapshot channel
    pub fn announce_nearest(&self, max_radius_km: f64) -> Result<(), TransportError> {
        let nearest = self
            .provider
            .nearby(max_radius_km, 1)
            .ok()
            .and_then(|pois| pois.into_iter().next());
        self.session.push_latest(encode_nearest(nearest.as_ref()))
    }

    /// Queue a full result list for guaranteed delivery
    pub fn announce_results(&self, max_radius_km: f64, max_results: u32) -> Result<(), TransportError> {
        let request = NearbyRequest {
            max_radius: max_radius_km,
            max_results,
        };
        self.session.push_guaranteed(self.answer(&request.to_payload()))
    }

    /// Push a full result list live; only works while the companion is reachable
    pub async fn push_live(&self, max_radius_km: f64, max_results: u32) -> Result<(), TransportError> {
        let request = NearbyRequest {
            max_radius: max_radius_km,
            max_results,
        };
        self.session
            .send_request(self.answer(&request.to_payload()))
            .await
            .map(|_ack| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::{decode_reply, NoCategoryStyles, SyncOutcome};
    use crate::transport::MemoryLink;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn provider() -> StaticProvider {
        StaticProvider::new(vec![
            PeerPoi::new("Orsay", 1200),
            PeerPoi::new("Louvre", 800),
            PeerPoi::new("Versailles", 17000),
        ])
    }

    fn responder(provider: impl NearbyProvider + 'static) -> PrimaryResponder {
        let (_link, _companion, primary) = MemoryLink::pair();
        PrimaryResponder::new(Arc::new(primary.session), Arc::new(provider))
    }

    #[test]
    fn test_static_provider_sorts_and_filters() {
        let provider = provider();
        assert_eq!(provider.pois()[0].title, "Louvre");

        let near = provider.nearby(10.0, 10).unwrap();
        let titles: Vec<&str> = near.iter().map(|p| p.title.as_str()).collect();
        assert_eq!(titles, vec!["Louvre", "Orsay"]);

        assert_eq!(provider.nearby(10.0, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_answer_success_and_malformed() {
        let responder = responder(provider());
        let request = NearbyRequest {
            max_radius: 10.0,
            max_results: 10,
        };

        match decode_reply(&responder.answer(&request.to_payload()), &NoCategoryStyles) {
            SyncOutcome::Success(records) => assert_eq!(records.len(), 2),
            other => panic!("unexpected outcome: {:?}", other),
        }

        assert_eq!(
            decode_reply(&responder.answer(&Payload::new()), &NoCategoryStyles),
            SyncOutcome::Failure(SyncStatus::PeerCannotExtractCoordinates)
        );
    }

    #[test]
    fn test_answer_provider_failure() {
        let responder = responder(FailingProvider(SyncStatus::PeerLocationNotAuthorized));
        let request = NearbyRequest {
            max_radius: 10.0,
            max_results: 10,
        };
        assert_eq!(
            decode_reply(&responder.answer(&request.to_payload()), &NoCategoryStyles),
            SyncOutcome::Failure(SyncStatus::PeerLocationNotAuthorized)
        );
    }

    #[test]
    fn test_demo_pois_are_decodable() {
        let provider = StaticProvider::new(demo_pois());
        let pois = provider.nearby(10.0, 10).unwrap();
        assert_eq!(pois.len(), demo_pois().len());
        assert_eq!(pois[0].title, "Louvre");
    }

    #[test]
    fn test_fixture_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"title": "Louvre", "distance": "800", "latitude": "48.86", "longitude": "2.33"}}]"#
        )
        .unwrap();

        let provider = StaticProvider::from_json_file(file.path()).unwrap();
        assert_eq!(provider.pois().len(), 1);
        assert_eq!(provider.pois()[0].title, "Louvre");
        assert_eq!(provider.pois()[0].phones, "");
    }

    #[test]
    fn test_fixture_file_missing() {
        let result = StaticProvider::from_json_file("/nonexistent/pois.json");
        assert!(result.is_err());
    }
}
