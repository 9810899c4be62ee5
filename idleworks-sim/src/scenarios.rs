use anyhow::ensure;
use idleworks_engine::{EngineError, OwnerId, Timestamp, upgrade_cost};
use std::time::Duration;

use crate::plan::{Drivers, Sandbox, SimulationPlan, SimulationSummary};

const ALICE: OwnerId = OwnerId(1);
const BOB: OwnerId = OwnerId(2);
const CAROL: OwnerId = OwnerId(3);

const SECOND: Duration = Duration::from_secs(1);
const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(3_600);

#[derive(Debug, Clone)]
pub struct TestScenario {
    pub name: String,
    pub plan: SimulationPlan,
}

impl TestScenario {
    #[must_use]
    pub fn simulation(name: impl Into<String>, plan: SimulationPlan) -> Self {
        Self {
            name: name.into(),
            plan,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn steady_tick() -> SimulationPlan {
    SimulationPlan::new(|sandbox: &mut Sandbox| {
        sandbox.set_online(ALICE, true);
        sandbox.place("cobble", ALICE, "cobblestone")?;
        sandbox.run_for(MINUTE, Drivers::ticking(SECOND));
        Ok(())
    })
    .with_expectation(|summary: &SimulationSummary| {
        let outcome = summary.outcome("cobble")?;
        let producer = summary.live("cobble")?;
        let expected = millis(MINUTE) / millis(outcome.interval);
        ensure!(
            summary.ticks.fired as u64 == expected,
            "expected {expected} actions in a minute, saw {}",
            summary.ticks.fired
        );
        ensure!(
            producer.last_action().as_millis() == expected * millis(outcome.interval),
            "phase drifted to {}",
            producer.last_action()
        );
        let accounted = producer.storage().used() as u64 + summary.sink_batches as u64;
        ensure!(accounted == expected, "{accounted} batches accounted for {expected} actions");
        Ok(())
    })
}

fn drift_free_phase() -> SimulationPlan {
    SimulationPlan::new(|sandbox: &mut Sandbox| {
        sandbox.set_online(ALICE, true);
        sandbox.jump(Duration::from_millis(250));
        sandbox.place("coal", ALICE, "coal")?;
        sandbox.run_for(10 * MINUTE, Drivers::ticking(Duration::from_millis(1_700)));
        Ok(())
    })
    .with_expectation(|summary: &SimulationSummary| {
        let interval = millis(summary.outcome("coal")?.interval);
        let last = summary.live("coal")?.last_action().as_millis();
        ensure!(
            last - 250 == summary.ticks.fired as u64 * interval,
            "{} actions moved the phase to {last}",
            summary.ticks.fired
        );
        ensure!(last <= summary.end.as_millis(), "phase ran ahead of the clock");
        ensure!(
            summary.end.as_millis() - last < interval + 1_700,
            "producer fell behind: last action {last}"
        );
        Ok(())
    })
}

fn offline_two_hours() -> SimulationPlan {
    SimulationPlan::new(|sandbox: &mut Sandbox| {
        sandbox.place("cobble", ALICE, "cobblestone")?;
        let period = sandbox.engine().config().reconcile_period();
        sandbox.run_for(2 * HOUR, Drivers::both(SECOND, period));
        sandbox.reconcile();
        Ok(())
    })
    .with_expectation(|summary: &SimulationSummary| {
        let interval = millis(summary.outcome("cobble")?.interval);
        let owed = millis(2 * HOUR) / interval;
        ensure!(summary.ticks.fired == 0, "offline owner was ticked");
        ensure!(
            summary.reconciliation.actions_granted == owed,
            "granted {} of {owed} actions",
            summary.reconciliation.actions_granted
        );
        ensure!(summary.reconciliation.capped == 0, "two hours should not hit the cap");
        ensure!(
            summary.live("cobble")?.last_action() == Timestamp::from_millis(owed * interval),
            "phase not carried to the last whole interval"
        );
        Ok(())
    })
}

fn offline_cap() -> SimulationPlan {
    SimulationPlan::new(|sandbox: &mut Sandbox| {
        sandbox.place("cobble", ALICE, "cobblestone")?;
        sandbox.jump(50 * HOUR);
        let first = sandbox.reconcile();
        sandbox.mark("first_pass", first.actions_granted);
        sandbox.reconcile();
        Ok(())
    })
    .with_expectation(|summary: &SimulationSummary| {
        let cap = summary.offline_cap("cobble")?;
        let interval = millis(summary.outcome("cobble")?.interval);
        ensure!(summary.mark("first_pass")? == cap, "first pass exceeded or missed the cap");
        ensure!(
            summary.reconciliation.actions_granted == 2 * cap,
            "backlog should carry into the second pass"
        );
        ensure!(summary.reconciliation.capped == 2, "both passes should be capped");
        ensure!(
            summary.live("cobble")?.last_action() == Timestamp::from_millis(2 * cap * interval),
            "phase must advance by exactly the credited actions"
        );
        Ok(())
    })
}

fn reconnect_settlement() -> SimulationPlan {
    SimulationPlan::new(|sandbox: &mut Sandbox| {
        sandbox.place("cobble", ALICE, "cobblestone")?;
        sandbox.jump(3 * HOUR + 2 * SECOND);
        sandbox.connect(ALICE);
        let phase = sandbox.engine().producer(sandbox.id("cobble")?).map(|p| p.last_action());
        sandbox.mark("phase_after_connect", phase.unwrap_or_default().as_millis());
        sandbox.run_for(MINUTE, Drivers::ticking(SECOND));
        Ok(())
    })
    .with_expectation(|summary: &SimulationSummary| {
        let interval = millis(summary.outcome("cobble")?.interval);
        let owed = (millis(3 * HOUR) + 2_000) / interval;
        let cap = summary.offline_cap("cobble")?;
        ensure!(summary.settlements.len() == 1, "expected one settlement");
        let settlement = &summary.settlements[0];
        ensure!(settlement.actions == owed.min(cap), "settled {} actions", settlement.actions);
        ensure!(settlement.forfeited == owed.saturating_sub(cap), "unexpected forfeit");
        ensure!(summary.notices == 1, "owner should be told once");
        let resumed = summary.live("cobble")?.last_action().as_millis() - summary.mark("phase_after_connect")?;
        ensure!(
            resumed == summary.ticks.fired as u64 * interval,
            "online ticks did not resume on phase"
        );
        ensure!(summary.ticks.fired > 0, "scheduler never resumed");
        Ok(())
    })
}

fn upgrade_ladder() -> SimulationPlan {
    SimulationPlan::new(|sandbox: &mut Sandbox| {
        let config = sandbox.engine().config().clone();
        let budget: u64 = (1..config.max_tier)
            .map(|tier| upgrade_cost(config.base_upgrade_cost, tier))
            .sum();
        sandbox.credit(ALICE, budget);
        sandbox.place("cobble", ALICE, "cobblestone")?;
        while sandbox.upgrade("cobble", ALICE)? {}
        sandbox.mark("balance", sandbox.balance(ALICE));
        Ok(())
    })
    .with_expectation(|summary: &SimulationSummary| {
        let max_tier = summary.config.max_tier;
        ensure!(
            summary.receipts.len() == usize::from(max_tier - 1),
            "{} upgrades before the top tier",
            summary.receipts.len()
        );
        ensure!(summary.live("cobble")?.tier() == max_tier, "did not reach the top tier");
        ensure!(
            summary.refusals == vec![EngineError::MaxTierReached { tier: max_tier }],
            "expected a single max-tier refusal, got {:?}",
            summary.refusals
        );
        ensure!(summary.mark("balance")? == 0, "budget was not spent exactly");
        ensure!(
            summary
                .receipts
                .windows(2)
                .all(|pair| pair[1].interval <= pair[0].interval && pair[1].capacity >= pair[0].capacity),
            "upgrades must never slow a producer or shrink its storage"
        );
        Ok(())
    })
}

fn storage_overflow() -> SimulationPlan {
    SimulationPlan::new(|sandbox: &mut Sandbox| {
        sandbox.set_online(ALICE, true);
        sandbox.place("iron", ALICE, "iron")?;
        sandbox.run_for(2 * MINUTE, Drivers::ticking(SECOND));
        let first = sandbox.collect("iron", ALICE)?;
        sandbox.mark("first_collect", first);
        let second = sandbox.collect("iron", ALICE)?;
        sandbox.mark("second_collect", second);
        Ok(())
    })
    .with_expectation(|summary: &SimulationSummary| {
        let producer = summary.live("iron")?;
        let capacity = producer.storage().capacity() as u64;
        ensure!(summary.ticks.fired as u64 > capacity, "scenario never filled storage");
        ensure!(
            summary.sink_batches as u64 == summary.ticks.fired as u64 - capacity,
            "{} batches reached the world",
            summary.sink_batches
        );
        ensure!(summary.mark("first_collect")? > 0, "first collect was empty");
        ensure!(summary.mark("second_collect")? == 0, "storage drained twice");
        ensure!(producer.storage().used() == 0, "storage not empty after collect");
        Ok(())
    })
}

fn removal_cancels() -> SimulationPlan {
    SimulationPlan::new(|sandbox: &mut Sandbox| {
        sandbox.set_online(ALICE, true);
        sandbox.place("kept", ALICE, "cobblestone")?;
        sandbox.place("removed", ALICE, "cobblestone")?;
        sandbox.run_for(30 * SECOND, Drivers::ticking(SECOND));
        sandbox.remove("removed")?;
        sandbox.run_for(30 * SECOND, Drivers::ticking(SECOND));
        Ok(())
    })
    .with_expectation(|summary: &SimulationSummary| {
        let removed = summary.outcome("removed")?;
        ensure!(removed.live.is_none(), "removed producer is still registered");
        ensure!(removed.stored.is_none(), "removed producer is still persisted");
        ensure!(summary.ticks.examined == 30 * 2 + 30, "removed producer kept being examined");
        let interval = millis(summary.outcome("kept")?.interval);
        let last = summary.live("kept")?.last_action().as_millis();
        ensure!(
            last == millis(MINUTE) / interval * interval,
            "surviving producer lost its cadence"
        );
        Ok(())
    })
}

fn mixed_owners() -> SimulationPlan {
    SimulationPlan::new(|sandbox: &mut Sandbox| {
        let layout = [
            ("alice-cobble", ALICE, "cobblestone"),
            ("alice-coal", ALICE, "coal"),
            ("bob-iron", BOB, "iron"),
            ("bob-sand", BOB, "sand"),
            ("carol-gravel", CAROL, "gravel"),
            ("carol-ice", CAROL, "ice"),
        ];
        for (label, owner, type_id) in layout {
            sandbox.place(label, owner, type_id)?;
            sandbox.set_luck(label, 0.25)?;
        }
        let drivers = Drivers::both(SECOND, sandbox.engine().config().reconcile_period());

        sandbox.set_online(ALICE, true);
        sandbox.run_for(30 * MINUTE, drivers);
        sandbox.jump(90 * SECOND);
        sandbox.connect(BOB);
        sandbox.set_online(ALICE, false);
        sandbox.run_for(30 * MINUTE, drivers);

        for owner in [ALICE, BOB, CAROL] {
            sandbox.set_online(owner, false);
        }
        sandbox.reconcile();
        Ok(())
    })
    .with_expectation(|summary: &SimulationSummary| {
        ensure!(
            summary.ticks.faults == 0 && summary.reconciliation.faults == 0,
            "bundled catalog produced faults"
        );
        ensure!(summary.ticks.bonus <= summary.ticks.fired, "more bonuses than actions");
        ensure!(
            !summary.settlements.is_empty() && summary.settlements.iter().all(|s| s.owner == BOB),
            "only the reconnecting owner settles on login"
        );
        for (label, outcome) in &summary.producers {
            let producer = summary.live(label)?;
            let behind = summary.end.saturating_since(producer.last_action());
            ensure!(
                behind < outcome.interval,
                "{label} is {behind:?} behind after the final pass"
            );
        }
        Ok(())
    })
}

pub fn get_scenario(name: &str) -> Option<TestScenario> {
    let (name, plan) = match name.to_lowercase().as_str() {
        "steady-tick" | "steady" => ("Steady Online Ticking", steady_tick()),
        "drift-free-phase" | "drift" => ("Drift-Free Phase", drift_free_phase()),
        "offline-two-hours" | "offline" => ("Offline Two Hours", offline_two_hours()),
        "offline-cap" | "cap" => ("Offline Cap", offline_cap()),
        "reconnect-settlement" | "reconnect" => ("Reconnect Settlement", reconnect_settlement()),
        "upgrade-ladder" | "upgrades" => ("Upgrade Ladder", upgrade_ladder()),
        "storage-overflow" | "overflow" => ("Storage Overflow", storage_overflow()),
        "removal-cancels" | "removal" => ("Removal Cancels Scheduling", removal_cancels()),
        "mixed-owners" | "mixed" => ("Mixed Owners", mixed_owners()),
        _ => return None,
    };
    Some(TestScenario::simulation(name, plan))
}

pub fn list_scenarios() -> Vec<(&'static str, &'static str)> {
    vec![
        ("steady-tick", "Steady Online Ticking"),
        ("drift-free-phase", "Drift-Free Phase"),
        ("offline-two-hours", "Offline Two Hours"),
        ("offline-cap", "Offline Cap"),
        ("reconnect-settlement", "Reconnect Settlement"),
        ("upgrade-ladder", "Upgrade Ladder"),
        ("storage-overflow", "Storage Overflow"),
        ("removal-cancels", "Removal Cancels Scheduling"),
        ("mixed-owners", "Mixed Owners"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use idleworks_engine::{Catalog, EngineConfig};
    use std::sync::Arc;

    fn run(key: &str, seed: u64) -> Option<String> {
        let scenario = get_scenario(key).expect("scenario registered");
        let summary = scenario
            .plan
            .run(&EngineConfig::default(), &Arc::new(Catalog::bundled().clone()), seed)
            .expect("script runs");
        scenario.plan.evaluate(&summary)
    }

    #[test]
    fn every_listed_scenario_resolves() {
        for (key, description) in list_scenarios() {
            let scenario = get_scenario(key).unwrap_or_else(|| panic!("{key} missing"));
            assert_eq!(scenario.name, description);
        }
        assert!(get_scenario("UPGRADES").is_some());
        assert!(get_scenario("nope").is_none());
    }

    #[test]
    fn every_scenario_passes_on_bundled_data() {
        for (key, _) in list_scenarios() {
            for seed in [1, 1337] {
                assert_eq!(run(key, seed), None, "{key} failed with seed {seed}");
            }
        }
    }
}
