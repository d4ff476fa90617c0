//! Run a full companion/primary exchange in-process

use anyhow::{Context, Result};
use clap::ValueEnum;
use companion_lib::{
    models::SyncStatus,
    peer::{demo_pois, FailingProvider, NearbyProvider, PrimaryResponder, StaticProvider},
    sync::{Presenter, Row, RowBuffer, SyncConfig, SyncInbox, SyncWorker},
    transport::{MemoryLink, Session},
};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::debug;

use super::PoiReport;
use crate::output::{print_info, print_success, OutputFormat};

/// Status the simulated phone answers with
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum PeerStatus {
    #[default]
    Ok,
    NotAuthorized,
    Unavailable,
    BadRequest,
}

impl PeerStatus {
    fn failure(self) -> Option<SyncStatus> {
        match self {
            PeerStatus::Ok => None,
            PeerStatus::NotAuthorized => Some(SyncStatus::PeerLocationNotAuthorized),
            PeerStatus::Unavailable => Some(SyncStatus::PeerLocationUnavailable),
            PeerStatus::BadRequest => Some(SyncStatus::PeerCannotExtractCoordinates),
        }
    }
}

pub struct SimulateOptions {
    pub max_radius_km: f64,
    pub max_results: u32,
    pub fixture: Option<PathBuf>,
    pub peer_status: PeerStatus,
    pub disconnected: bool,
    pub timeout: Duration,
}

/// Outcome of one simulated exchange
pub struct Simulation {
    pub report: PoiReport,
    pub rows: Vec<Row>,
    pub complication_refreshes: usize,
}

fn provider(options: &SimulateOptions) -> Result<Arc<dyn NearbyProvider>> {
    if let Some(status) = options.peer_status.failure() {
        return Ok(Arc::new(FailingProvider(status)));
    }
    let provider = match &options.fixture {
        Some(path) => StaticProvider::from_json_file(path)?,
        None => StaticProvider::new(demo_pois()),
    };
    Ok(Arc::new(provider))
}

/// Activate both sides and wait for the first data source update
pub async fn run_simulation(options: &SimulateOptions) -> Result<Simulation> {
    let inbox = SyncInbox::new();
    let (link, companion, primary) = MemoryLink::pair_into(inbox.sender());
    let (shutdown_tx, _) = broadcast::channel(1);

    let primary_session = Arc::new(primary.session);
    let responder = PrimaryResponder::new(primary_session.clone(), provider(options)?);
    tokio::spawn(responder.run(primary.events, shutdown_tx.subscribe()));

    let rows = RowBuffer::new();
    let refreshes = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&refreshes);
    let presenter = Presenter::new(
        Box::new(rows.clone()),
        Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }),
    );

    let companion_session = Arc::new(companion);
    let (worker, sync) = SyncWorker::new(
        companion_session.clone(),
        inbox,
        Box::new(presenter),
        SyncConfig::new(options.max_radius_km, options.max_results),
    );
    tokio::spawn(worker.run(shutdown_tx.subscribe()));

    let mut state = sync.subscribe();
    if options.disconnected {
        link.set_connected(false);
    }
    primary_session.activate();
    companion_session.activate();

    tokio::time::timeout(options.timeout, state.changed())
        .await
        .context("Timed out waiting for the companion to sync")?
        .context("Sync worker stopped unexpectedly")?;

    let snapshot = sync.snapshot();
    debug!(status = %snapshot.status, count = snapshot.current_list.len(), "Simulation finished");
    if shutdown_tx.send(()).is_err() {
        debug!("Simulation tasks already stopped");
    }

    Ok(Simulation {
        report: PoiReport::new(
            snapshot.status,
            &snapshot.current_list,
            snapshot.nearest.as_ref(),
        ),
        rows: rows.rows(),
        complication_refreshes: refreshes.load(Ordering::SeqCst),
    })
}

/// Run the simulation and print the rendered rows
pub async fn simulate(options: SimulateOptions, format: OutputFormat) -> Result<()> {
    let simulation = run_simulation(&options).await?;

    if matches!(format, OutputFormat::Table) {
        print_info(&format!(
            "Requested up to {} points within {} km",
            options.max_results, options.max_radius_km
        ));
    }
    simulation.report.print(format)?;

    if matches!(format, OutputFormat::Table) {
        println!();
        for (index, row) in simulation.rows.iter().enumerate() {
            match row {
                Row::Poi(record) => println!("  row {}: {}", index, record.title),
                Row::Placeholder(message) => println!("  row {}: [{}]", index, message),
                Row::Blank => println!("  row {}: <blank>", index),
            }
        }
        print_success(&format!(
            "{} row(s) rendered, {} complication refresh(es)",
            simulation.rows.len(),
            simulation.complication_refreshes
        ));
    }

    Ok(())
}
