//! Wall-clock drivers: the tick and reconciliation passes each run on their
//! own `tokio` interval against a shared engine.
use anyhow::Result;
use idleworks_engine::memory::MemoryWorld;
use idleworks_engine::{
    EngineConfig, OwnerId, Position, ProducerTypeId, ProductionEngine, ReconciliationReport,
    TickReport, Timestamp,
};
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};

#[derive(Debug, Clone, Copy)]
pub struct RealtimeOptions {
    pub duration: Duration,
    pub tick_period: Duration,
    pub reconcile_period: Duration,
}

impl RealtimeOptions {
    #[must_use]
    pub const fn from_config(config: &EngineConfig, duration: Duration) -> Self {
        Self {
            duration,
            tick_period: config.tick_period(),
            reconcile_period: config.reconcile_period(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RealtimeSummary {
    pub ran_for: Duration,
    pub tick_passes: u64,
    pub reconcile_passes: u64,
    pub ticks: TickReport,
    pub reconciliation: ReconciliationReport,
    pub saved_on_shutdown: usize,
}

/// One online and one offline owner with a few producers each.
pub fn populate_demo(engine: &ProductionEngine, world: &MemoryWorld) -> Result<usize> {
    let online = OwnerId(1);
    let offline = OwnerId(2);
    world.presence.set_online(online, true);

    let layout = [
        (online, "cobblestone", 0),
        (online, "coal", 1),
        (offline, "iron", 0),
        (offline, "sand", 1),
    ];
    for (owner, type_id, slot) in layout {
        let position = Position::new("overworld", slot, 64, i32::try_from(owner.0).unwrap_or(0));
        engine.place_producer(owner, &ProducerTypeId::new(type_id), position, Timestamp::ZERO)?;
    }
    Ok(layout.len())
}

fn elapsed_timestamp(started: Instant) -> Timestamp {
    Timestamp::from_millis(u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX))
}

/// Run `pass` every `period` until `duration` has elapsed since `started`.
/// Passes never overlap; late ones are skipped rather than bunched. The
/// loop also wakes at the deadline, so a long period cannot outlive the run.
async fn drive<F>(period: Duration, started: Instant, duration: Duration, mut pass: F) -> u64
where
    F: FnMut(Timestamp),
{
    let deadline = started + duration;
    let mut interval = time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval.tick().await;

    let mut passes = 0;
    loop {
        tokio::select! {
            _ = interval.tick() => {}
            () = time::sleep_until(deadline) => break,
        }
        if started.elapsed() > duration {
            break;
        }
        pass(elapsed_timestamp(started));
        passes += 1;
    }
    passes
}

/// Drive `engine` on the wall clock, then shut it down.
pub async fn run_realtime(engine: Arc<ProductionEngine>, options: RealtimeOptions) -> Result<RealtimeSummary> {
    let started = Instant::now();
    info!(
        "realtime run for {:?} (tick {:?}, reconcile {:?})",
        options.duration, options.tick_period, options.reconcile_period
    );

    let ticker = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut totals = TickReport::default();
            let passes = drive(options.tick_period, started, options.duration, |now| {
                totals.absorb(&engine.tick(now));
            })
            .await;
            (passes, totals)
        })
    };
    let reconciler = {
        let engine = Arc::clone(&engine);
        tokio::spawn(async move {
            let mut totals = ReconciliationReport::default();
            let passes = drive(options.reconcile_period, started, options.duration, |now| {
                let report = engine.run_reconciliation(now);
                debug!("reconciliation at {now}: {report:?}");
                totals.absorb(&report);
            })
            .await;
            (passes, totals)
        })
    };

    let (tick_passes, ticks) = ticker.await?;
    let (reconcile_passes, reconciliation) = reconciler.await?;
    let saved_on_shutdown = engine.shutdown();

    Ok(RealtimeSummary {
        ran_for: started.elapsed(),
        tick_passes,
        reconcile_passes,
        ticks,
        reconciliation,
        saved_on_shutdown,
    })
}
