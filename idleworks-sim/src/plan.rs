use anyhow::{Context, Result};
use idleworks_engine::memory::MemoryWorld;
use idleworks_engine::{
    Catalog, EngineConfig, EngineError, OwnerId, Producer, ProducerId, ProducerTypeId,
    ProductionEngine, ReconciliationReport, Settlement, TickReport, Timestamp, UpgradeReceipt,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

/// Which periodic drivers run while virtual time advances.
#[derive(Debug, Clone, Copy, Default)]
pub struct Drivers {
    pub tick_every: Option<Duration>,
    pub reconcile_every: Option<Duration>,
}

impl Drivers {
    #[must_use]
    pub const fn ticking(every: Duration) -> Self {
        Self {
            tick_every: Some(every),
            reconcile_every: None,
        }
    }

    #[must_use]
    pub const fn both(tick_every: Duration, reconcile_every: Duration) -> Self {
        Self {
            tick_every: Some(tick_every),
            reconcile_every: Some(reconcile_every),
        }
    }
}

/// Engine plus in-memory world on a virtual clock.
pub struct Sandbox {
    engine: ProductionEngine,
    world: MemoryWorld,
    now: Timestamp,
    labels: BTreeMap<&'static str, ProducerId>,
    ticks: TickReport,
    reconciliation: ReconciliationReport,
    settlements: Vec<Settlement>,
    receipts: Vec<UpgradeReceipt>,
    refusals: Vec<EngineError>,
    marks: BTreeMap<&'static str, u64>,
}

impl Sandbox {
    pub fn new(config: EngineConfig, catalog: Arc<Catalog>) -> Result<Self> {
        let world = MemoryWorld::new();
        let engine = ProductionEngine::new(config, catalog, world.collaborators())
            .context("building sandbox engine")?;
        Ok(Self {
            engine,
            world,
            now: Timestamp::ZERO,
            labels: BTreeMap::new(),
            ticks: TickReport::default(),
            reconciliation: ReconciliationReport::default(),
            settlements: Vec::new(),
            receipts: Vec::new(),
            refusals: Vec::new(),
            marks: BTreeMap::new(),
        })
    }

    #[must_use]
    pub const fn now(&self) -> Timestamp {
        self.now
    }

    #[must_use]
    pub const fn engine(&self) -> &ProductionEngine {
        &self.engine
    }

    pub fn place(&mut self, label: &'static str, owner: OwnerId, type_id: &str) -> Result<ProducerId> {
        let producer = self
            .engine
            .place_producer(owner, &ProducerTypeId::new(type_id), Default::default(), self.now)
            .with_context(|| format!("placing {label} ({type_id})"))?;
        self.labels.insert(label, producer.id);
        Ok(producer.id)
    }

    pub fn id(&self, label: &str) -> Result<ProducerId> {
        self.labels
            .get(label)
            .copied()
            .with_context(|| format!("no producer labelled {label}"))
    }

    #[must_use]
    pub fn balance(&self, owner: OwnerId) -> u64 {
        self.world.wallet.balance(owner)
    }

    pub fn set_online(&self, owner: OwnerId, online: bool) {
        self.world.presence.set_online(owner, online);
    }

    /// Bring an owner online and settle their absence.
    pub fn connect(&mut self, owner: OwnerId) {
        self.world.presence.set_online(owner, true);
        let settled = self.engine.owner_connected(owner, self.now);
        self.settlements.extend(settled);
    }

    pub fn credit(&self, owner: OwnerId, amount: u64) {
        self.world.wallet.credit(owner, amount);
    }

    pub fn set_luck(&self, label: &str, luck: f64) -> Result<()> {
        self.engine.set_luck(self.id(label)?, luck)?;
        Ok(())
    }

    /// Move the clock without running any driver.
    pub fn jump(&mut self, span: Duration) {
        self.now = self.now + span;
    }

    pub fn tick(&mut self) -> TickReport {
        let report = self.engine.tick(self.now);
        self.ticks.absorb(&report);
        report
    }

    pub fn reconcile(&mut self) -> ReconciliationReport {
        let report = self.engine.run_reconciliation(self.now);
        self.reconciliation.absorb(&report);
        report
    }

    /// Advance by `span`, firing each driver on its own period. When both
    /// are due at the same instant the tick runs first.
    pub fn run_for(&mut self, span: Duration, drivers: Drivers) {
        let end = self.now + span;
        let mut next_tick = drivers.tick_every.map(|every| self.now + every);
        let mut next_reconcile = drivers.reconcile_every.map(|every| self.now + every);
        loop {
            let due_tick = next_tick.filter(|at| *at <= end);
            let due_reconcile = next_reconcile.filter(|at| *at <= end);
            match (due_tick, due_reconcile) {
                (Some(tick_at), Some(reconcile_at)) if reconcile_at < tick_at => {
                    self.now = reconcile_at;
                    self.reconcile();
                    next_reconcile = drivers.reconcile_every.map(|every| reconcile_at + every);
                }
                (Some(tick_at), _) => {
                    self.now = tick_at;
                    self.tick();
                    next_tick = drivers.tick_every.map(|every| tick_at + every);
                }
                (None, Some(reconcile_at)) => {
                    self.now = reconcile_at;
                    self.reconcile();
                    next_reconcile = drivers.reconcile_every.map(|every| reconcile_at + every);
                }
                (None, None) => break,
            }
        }
        self.now = end;
    }

    /// Upgrade, recording the receipt or the refusal.
    pub fn upgrade(&mut self, label: &str, payer: OwnerId) -> Result<bool> {
        match self.engine.upgrade(self.id(label)?, payer) {
            Ok(receipt) => {
                self.receipts.push(receipt);
                Ok(true)
            }
            Err(err) => {
                self.refusals.push(err);
                Ok(false)
            }
        }
    }

    /// Collect and return the collected quantity.
    pub fn collect(&mut self, label: &str, owner: OwnerId) -> Result<u64> {
        let batches = self.engine.collect(self.id(label)?, owner)?;
        Ok(batches.iter().map(|batch| batch.quantity).sum())
    }

    pub fn remove(&mut self, label: &str) -> Result<()> {
        self.engine.remove_producer(self.id(label)?)?;
        Ok(())
    }

    pub fn mark(&mut self, key: &'static str, value: u64) {
        self.marks.insert(key, value);
    }

    #[must_use]
    pub fn finish(self, seed: u64) -> SimulationSummary {
        let catalog = self.engine.catalog();
        let producers = self
            .labels
            .iter()
            .map(|(label, id)| {
                let live = self.engine.producer(*id);
                let stored = self.world.store.record(*id);
                let (interval, actions_per_minute) = live
                    .as_ref()
                    .or(stored.as_ref())
                    .and_then(|producer| {
                        catalog.get(&producer.type_id).map(|producer_type| {
                            (
                                producer_type.scaling.interval(producer.tier()),
                                producer_type.scaling.actions_per_minute(producer.tier()),
                            )
                        })
                    })
                    .unwrap_or_default();
                (
                    *label,
                    ProducerOutcome {
                        live,
                        stored,
                        interval,
                        actions_per_minute,
                    },
                )
            })
            .collect();
        SimulationSummary {
            seed,
            config: self.engine.config().clone(),
            end: self.now,
            producers,
            ticks: self.ticks,
            reconciliation: self.reconciliation,
            settlements: self.settlements,
            receipts: self.receipts,
            refusals: self.refusals,
            marks: self.marks,
            sink_batches: self.world.sink.delivered().len(),
            notices: self.world.presentation.notices().len(),
            rng_draws: self.engine.rng_draws(),
        }
    }
}

/// Final state of one labelled producer.
#[derive(Debug, Clone)]
pub struct ProducerOutcome {
    /// Registered snapshot; `None` after removal.
    pub live: Option<Producer>,
    /// Persisted record; `None` after deletion.
    pub stored: Option<Producer>,
    pub interval: Duration,
    pub actions_per_minute: u32,
}

/// Complete record of a virtual-clock run.
#[derive(Debug, Clone)]
pub struct SimulationSummary {
    pub seed: u64,
    pub config: EngineConfig,
    pub end: Timestamp,
    pub producers: BTreeMap<&'static str, ProducerOutcome>,
    pub ticks: TickReport,
    pub reconciliation: ReconciliationReport,
    pub settlements: Vec<Settlement>,
    pub receipts: Vec<UpgradeReceipt>,
    pub refusals: Vec<EngineError>,
    pub marks: BTreeMap<&'static str, u64>,
    pub sink_batches: usize,
    pub notices: usize,
    pub rng_draws: (u64, u64),
}

impl SimulationSummary {
    pub fn outcome(&self, label: &str) -> Result<&ProducerOutcome> {
        self.producers
            .get(label)
            .with_context(|| format!("no producer labelled {label}"))
    }

    pub fn live(&self, label: &str) -> Result<&Producer> {
        self.outcome(label)?
            .live
            .as_ref()
            .with_context(|| format!("{label} is no longer registered"))
    }

    pub fn mark(&self, key: &str) -> Result<u64> {
        self.marks
            .get(key)
            .copied()
            .with_context(|| format!("mark {key} was never recorded"))
    }

    /// Offline cap in actions for a labelled producer.
    pub fn offline_cap(&self, label: &str) -> Result<u64> {
        Ok(self
            .config
            .max_offline_actions(self.outcome(label)?.actions_per_minute))
    }
}

pub type SimulationScript = fn(&mut Sandbox) -> Result<()>;

/// Assertion hook run after a simulation completes.
type SimulationExpectationFn = Arc<dyn Fn(&SimulationSummary) -> Result<()> + Send + Sync + 'static>;

#[derive(Clone)]
pub struct SimulationExpectation(SimulationExpectationFn);

impl std::fmt::Debug for SimulationExpectation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationExpectation").finish()
    }
}

impl SimulationExpectation {
    pub fn evaluate(&self, summary: &SimulationSummary) -> Result<()> {
        (self.0)(summary)
    }
}

impl<F> From<F> for SimulationExpectation
where
    F: Fn(&SimulationSummary) -> Result<()> + Send + Sync + 'static,
{
    fn from(f: F) -> Self {
        Self(Arc::new(f))
    }
}

/// A scripted run plus the checks its summary must pass.
#[derive(Debug, Clone)]
pub struct SimulationPlan {
    pub script: SimulationScript,
    pub expectations: Vec<SimulationExpectation>,
}

impl SimulationPlan {
    #[must_use]
    pub fn new(script: SimulationScript) -> Self {
        Self {
            script,
            expectations: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_expectation(mut self, expectation: impl Into<SimulationExpectation>) -> Self {
        self.expectations.push(expectation.into());
        self
    }

    /// Run the script on a fresh sandbox seeded with `seed`.
    pub fn run(&self, config: &EngineConfig, catalog: &Arc<Catalog>, seed: u64) -> Result<SimulationSummary> {
        let mut sandbox = Sandbox::new(config.clone().with_seed(seed), Arc::clone(catalog))?;
        (self.script)(&mut sandbox).context("scenario script failed")?;
        Ok(sandbox.finish(seed))
    }

    /// First failing expectation, if any.
    #[must_use]
    pub fn evaluate(&self, summary: &SimulationSummary) -> Option<String> {
        self.expectations
            .iter()
            .find_map(|expectation| expectation.evaluate(summary).err())
            .map(|err| format!("{err:#}"))
    }
}
