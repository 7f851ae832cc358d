use anyhow::{Result, ensure};
use std::sync::Arc;
use std::time::Duration;

use teller_game::{DialogueProgram, SlipKind};

use super::TestScenario;
use crate::logic::host::TranscriptEntry;
use crate::logic::{OptionPolicy, PlayPlan, PlaySummary, play};

pub fn catalog_scenarios() -> Vec<TestScenario> {
    vec![
        TestScenario::new(
            "smoke",
            "Smoke",
            "Short first day with default choices",
            PlayPlan::default().with_day_length(Duration::from_secs(45)),
        )
        .with_expectation(opens_with_manager)
        .with_expectation(every_day_reaches_terminal)
        .with_expectation(lines_render_cleanly),
        TestScenario::new(
            "two-days",
            "Two Full Days",
            "Both authored days at full length, variables carried over",
            PlayPlan::default().with_days(vec![0, 1]),
        )
        .with_expectation(every_day_reaches_terminal)
        .with_expectation(served_counts_customers)
        .with_expectation(credits_roll)
        .with_expectation(lines_render_cleanly),
        TestScenario::new(
            "ledger",
            "Slip Ledger",
            "Every customer hands over exactly one matching slip",
            PlayPlan::default().with_days(vec![0, 1]),
        )
        .with_expectation(slips_match_customers),
        TestScenario::new(
            "grumpy-teller",
            "Grumpy Teller",
            "Always pick the last option; complaints are tracked",
            PlayPlan::default()
                .with_policy(OptionPolicy::Last)
                .with_day_length(Duration::from_secs(90)),
        )
        .with_expectation(every_day_reaches_terminal)
        .with_expectation(complaints_follow_rude_customers)
        .with_expectation(locked_option_never_chosen),
        TestScenario::new(
            "random-choices",
            "Random Choices",
            "Random option picks across both days",
            PlayPlan::default()
                .with_days(vec![0, 1])
                .with_policy(OptionPolicy::Random)
                .with_day_length(Duration::from_secs(90)),
        )
        .with_expectation(every_day_reaches_terminal)
        .with_expectation(no_node_errors)
        .with_expectation(lines_render_cleanly),
        TestScenario::new(
            "replay",
            "Deterministic Replay",
            "Same seed, same transcript",
            PlayPlan::default()
                .with_policy(OptionPolicy::Random)
                .with_day_length(Duration::from_secs(60)),
        )
        .with_expectation(replays_identically),
    ]
}

pub fn find_scenario(key: &str) -> Option<TestScenario> {
    catalog_scenarios()
        .into_iter()
        .find(|scenario| scenario.key == key || scenario.name.eq_ignore_ascii_case(key))
}

fn opens_with_manager(_plan: &PlayPlan, summary: &PlaySummary) -> Result<()> {
    let first = summary
        .days
        .first()
        .and_then(|day| day.nodes.first())
        .map(|node| node.name.as_str());
    ensure!(
        first == Some("Manager_Day1"),
        "day opened with {first:?} instead of Manager_Day1"
    );
    Ok(())
}

fn every_day_reaches_terminal(plan: &PlayPlan, summary: &PlaySummary) -> Result<()> {
    ensure!(
        summary.days.len() == plan.days.len(),
        "played {} of {} days",
        summary.days.len(),
        plan.days.len()
    );
    for day in &summary.days {
        ensure!(
            day.failure.is_none(),
            "day {} failed: {}",
            day.index,
            day.failure.as_deref().unwrap_or_default()
        );
        ensure!(
            day.reached_terminal(),
            "day {} ended without finishing {}",
            day.index,
            day.terminal_node
        );
    }
    Ok(())
}

fn lines_render_cleanly(_plan: &PlayPlan, summary: &PlaySummary) -> Result<()> {
    let broken = summary.lines().filter(|line| *line == "ERROR").count();
    ensure!(broken == 0, "{broken} lines failed to render");
    ensure!(summary.lines().next().is_some(), "no lines were presented");
    Ok(())
}

fn no_node_errors(_plan: &PlayPlan, summary: &PlaySummary) -> Result<()> {
    for day in &summary.days {
        if let Some(node) = day.nodes.iter().find(|n| n.error.is_some()) {
            anyhow::bail!(
                "day {} node {} failed: {}",
                day.index,
                node.name,
                node.error.as_deref().unwrap_or_default()
            );
        }
    }
    Ok(())
}

fn served_counts_customers(_plan: &PlayPlan, summary: &PlaySummary) -> Result<()> {
    let customers = summary.days.iter().map(|d| d.customers().count()).sum::<usize>();
    let served = summary.variables.number("$served");
    #[allow(clippy::cast_precision_loss)]
    let expected = customers as f64;
    ensure!(
        (served - expected).abs() < f64::EPSILON,
        "$served is {served} but {customers} customers came in"
    );
    Ok(())
}

fn credits_roll(_plan: &PlayPlan, summary: &PlaySummary) -> Result<()> {
    let last = summary.lines().last();
    ensure!(
        last == Some("Thanks for playing."),
        "last line was {last:?}"
    );
    Ok(())
}

fn slips_match_customers(_plan: &PlayPlan, summary: &PlaySummary) -> Result<()> {
    for day in &summary.days {
        let customers: Vec<&str> = day.customers().map(|n| n.name.as_str()).collect();
        ensure!(
            customers.len() == day.slips.len(),
            "day {}: {} customers but {} slips",
            day.index,
            customers.len(),
            day.slips.len()
        );
        for (name, slip) in customers.iter().zip(&day.slips) {
            let expected = if name.contains("Withdrawal") {
                SlipKind::Withdrawal
            } else {
                SlipKind::Deposit
            };
            ensure!(slip.kind == expected, "{name} produced a {:?} slip", slip.kind);
            ensure!(slip.amount_cents > 0, "{name} produced an empty slip");
        }
    }
    Ok(())
}

fn complaints_follow_rude_customers(_plan: &PlayPlan, summary: &PlaySummary) -> Result<()> {
    let rude = summary
        .days
        .iter()
        .flat_map(|d| d.nodes.iter())
        .filter(|n| n.name == "RandomDeposit_Rude")
        .count();
    let complaints = summary.variables.number("$complaints");
    #[allow(clippy::cast_precision_loss)]
    let expected = rude as f64;
    ensure!(
        (complaints - expected).abs() < f64::EPSILON,
        "{complaints} complaints for {rude} rude depositors"
    );
    Ok(())
}

fn locked_option_never_chosen(_plan: &PlayPlan, summary: &PlaySummary) -> Result<()> {
    let chose_locked = summary.transcript.iter().any(|entry| {
        matches!(entry, TranscriptEntry::Chose { text } if text == "Sir, there's a queue.")
    });
    ensure!(
        !chose_locked,
        "picked an option whose condition failed"
    );
    Ok(())
}

fn replays_identically(plan: &PlayPlan, summary: &PlaySummary) -> Result<()> {
    let program = Arc::new(DialogueProgram::load_default()?);
    let again = play(plan, summary.seed, program)?;
    ensure!(
        again.transcript_digest() == summary.transcript_digest(),
        "replay digest {} differs from {}",
        again.transcript_digest(),
        summary.transcript_digest()
    );
    ensure!(again.days == summary.days, "replay scheduled a different day");
    Ok(())
}
