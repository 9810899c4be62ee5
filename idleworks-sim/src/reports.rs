use anyhow::Result;
use colored::Colorize;
use std::io::Write;
use std::time::Duration;

use crate::clock::RealtimeSummary;
use crate::tester::ScenarioResult;

#[allow(clippy::cast_precision_loss)]
fn success_rate(results: &[ScenarioResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let passed = results.iter().filter(|r| r.passed).count();
    (passed as f64 / results.len() as f64) * 100.0
}

pub fn generate_console_report(
    out: &mut dyn Write,
    results: &[ScenarioResult],
    total_duration: Duration,
) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Scenario Results Summary".bright_cyan().bold())?;
    writeln!(out, "{}", "===========================".cyan())?;

    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();

    writeln!(out, "Total runs: {total}")?;
    writeln!(out, "Passed: {}", passed.to_string().green())?;
    writeln!(out, "Failed: {}", (total - passed).to_string().red())?;
    writeln!(out, "Success rate: {:.1}%", success_rate(results))?;
    writeln!(out, "Total time: {total_duration:?}")?;
    writeln!(out)?;

    for result in results {
        let status = if result.passed {
            "✅ PASS".green()
        } else {
            "❌ FAIL".red()
        };

        writeln!(out, "{} {} (seed {})", status, result.scenario_name.bold(), result.seed)?;
        writeln!(
            out,
            "   Iterations: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(out, "   Average time: {:?}", result.average_duration)?;

        if !result.failures.is_empty() {
            writeln!(out, "   Failures:")?;
            for failure in &result.failures {
                writeln!(out, "     • {}", failure.red())?;
            }
        }
        writeln!(out)?;
    }

    let fastest = results.iter().min_by_key(|r| r.average_duration);
    let slowest = results.iter().max_by_key(|r| r.average_duration);
    if let (Some(fastest), Some(slowest)) = (fastest, slowest) {
        writeln!(out, "{}", "⚡ Performance Summary".bright_yellow().bold())?;
        writeln!(out, "{}", "=====================".yellow())?;
        writeln!(
            out,
            "Fastest: {} ({:?})",
            fastest.scenario_name.green(),
            fastest.average_duration
        )?;
        writeln!(
            out,
            "Slowest: {} ({:?})",
            slowest.scenario_name.yellow(),
            slowest.average_duration
        )?;
    }
    Ok(())
}

pub fn generate_json_report(out: &mut dyn Write, results: &[ScenarioResult]) -> Result<()> {
    let json_output = serde_json::to_string_pretty(results)?;
    writeln!(out, "{json_output}")?;
    Ok(())
}

pub fn generate_markdown_report(out: &mut dyn Write, results: &[ScenarioResult]) -> Result<()> {
    writeln!(out, "# Idleworks Scenario Results\n")?;

    let total = results.len();
    let passed = results.iter().filter(|r| r.passed).count();

    writeln!(out, "## Summary\n")?;
    writeln!(out, "- **Total runs**: {total}")?;
    writeln!(out, "- **Passed**: {passed}")?;
    writeln!(out, "- **Failed**: {}", total - passed)?;
    writeln!(out, "- **Success rate**: {:.1}%\n", success_rate(results))?;

    writeln!(out, "## Detailed Results\n")?;

    for result in results {
        let status = if result.passed { "✅" } else { "❌" };

        writeln!(out, "### {} {} (seed {})\n", status, result.scenario_name, result.seed)?;
        writeln!(
            out,
            "- **Iterations**: {}/{} successful",
            result.successful_iterations, result.iterations_run
        )?;
        writeln!(out, "- **Average time**: {:?}", result.average_duration)?;

        if !result.failures.is_empty() {
            writeln!(out, "- **Failures**:")?;
            for failure in &result.failures {
                writeln!(out, "  - {failure}")?;
            }
        }
        writeln!(out)?;
    }
    Ok(())
}

pub fn generate_realtime_report(
    out: &mut dyn Write,
    summary: &RealtimeSummary,
    report: &str,
) -> Result<()> {
    match report {
        "json" => writeln!(out, "{}", serde_json::to_string_pretty(summary)?)?,
        "markdown" => {
            writeln!(out, "# Idleworks Realtime Run\n")?;
            writeln!(out, "- **Ran for**: {:?}", summary.ran_for)?;
            writeln!(out, "- **Tick passes**: {}", summary.tick_passes)?;
            writeln!(out, "- **Reconciliation passes**: {}", summary.reconcile_passes)?;
            writeln!(out, "- **Actions fired online**: {}", summary.ticks.fired)?;
            writeln!(
                out,
                "- **Actions granted offline**: {}",
                summary.reconciliation.actions_granted
            )?;
            writeln!(out, "- **Producers saved on shutdown**: {}", summary.saved_on_shutdown)?;
        }
        _ => {
            writeln!(out)?;
            writeln!(out, "{}", "⏱️  Realtime Run Summary".bright_cyan().bold())?;
            writeln!(out, "{}", "=======================".cyan())?;
            writeln!(out, "Ran for: {:?}", summary.ran_for)?;
            writeln!(
                out,
                "Passes: {} tick / {} reconciliation",
                summary.tick_passes, summary.reconcile_passes
            )?;
            writeln!(
                out,
                "Online: {} fired, {} bonus, {} overflowed",
                summary.ticks.fired.to_string().green(),
                summary.ticks.bonus,
                summary.ticks.overflowed
            )?;
            writeln!(
                out,
                "Offline: {} actions over {} settlements",
                summary.reconciliation.actions_granted.to_string().green(),
                summary.reconciliation.settled
            )?;
            writeln!(out, "Saved on shutdown: {}", summary.saved_on_shutdown)?;
        }
    }
    Ok(())
}
