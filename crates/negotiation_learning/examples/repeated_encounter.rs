//! Repeated Encounter Demonstration
//!
//! Plays three negotiations against the same scripted counterpart and shows what
//! the opponent model learns within a session and what carries over between them:
//! - Issue weights from repeated values
//! - Estimated utilities for candidate bids
//! - Learned data and Q-values reloaded from disk
//!
//! Run with: RUST_LOG=info cargo run --example repeated_encounter

use negotiation_learning::*;
use std::path::Path;

const OPPONENT: &str = "stubborn_supplier";
const ROUNDS: usize = 8;

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    println!("=== Repeated Encounter Demo ===\n");

    let storage = tempfile::TempDir::new()?;
    let config = SessionConfig::new(ModelConfig::warm_start());

    for encounter in 1..=3 {
        play(encounter, storage.path(), config.clone())?;
    }

    println!("\n=== Demo Complete ===");
    Ok(())
}

fn domain() -> Domain {
    Domain::new("supply_contract")
        .with_issue("price", [80, 90, 100, 110])
        .with_issue("quantity", [100, 250, 500])
        .with_issue("delivery", ["express", "standard", "economy"])
}

/// The counterpart insists on a high price and slowly concedes on the rest.
fn counterpart_offer(round: usize, encounter: usize) -> Bid {
    let price = if round + encounter > ROUNDS { 100 } else { 110 };
    let quantity = [500, 500, 250, 250, 100][round.min(4)];
    let delivery = if round % 2 == 0 { "economy" } else { "standard" };
    Bid::new()
        .with("price", price)
        .with("quantity", quantity)
        .with("delivery", delivery)
}

fn play(
    encounter: usize,
    storage: &Path,
    config: SessionConfig,
) -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("--- Encounter {} ---", encounter);

    let clock = ManualProgress::new(0.0);
    let mut session = NegotiationSession::new(domain(), clock.clone(), config)?;

    let prior = session.load(Some(storage), Some(OPPONENT))?;
    println!(
        "  Prior sessions: {}, prior agreements: {}",
        prior
            .get(keys::SESSION_COUNT)
            .and_then(LearnedValue::as_i64)
            .unwrap_or(0),
        prior
            .get(keys::AGREEMENT_COUNT)
            .and_then(LearnedValue::as_i64)
            .unwrap_or(0)
    );
    println!("  Restored Q-values: {}", session.model().q_table().len());

    for round in 0..ROUNDS {
        clock.set(round as f64 / ROUNDS as f64);

        let offer = counterpart_offer(round, encounter);
        let reward = if offer.value_for("price") == Some(&IssueValue::from(100)) {
            1.0
        } else {
            0.0
        };
        session.receive_bid(offer, reward)?;
        session.record_own_bid(
            Bid::new()
                .with("price", 90)
                .with("quantity", 250)
                .with("delivery", "express"),
        )?;
    }

    let model = session.model();
    for issue in model.domain().issue_names() {
        println!(
            "  weight({:>8}) = {:.3}",
            issue,
            model.issue_weight(issue).unwrap_or_default()
        );
    }

    let candidates = [
        Bid::new().with("price", 110).with("quantity", 500).with("delivery", "economy"),
        Bid::new().with("price", 90).with("quantity", 100).with("delivery", "express"),
    ];
    for candidate in &candidates {
        println!(
            "  estimated opponent utility of {:?} = {:.3}",
            candidate.iter().map(|(_, v)| v.to_string()).collect::<Vec<_>>(),
            session.get_utility(Some(candidate))
        );
    }

    clock.set(0.95);
    if encounter == 2 {
        session.end_without_agreement()?;
        println!("  No agreement");
    } else {
        let record = session.reach_agreement(&candidates[0], false)?;
        println!(
            "  Agreement #{} at t = {:.2}",
            record.agreement_count, record.acceptance_time
        );
    }

    session.save(Some(storage), None)?;
    println!("  Saved {} learned entries\n", session.learned_data().len());
    Ok(())
}
