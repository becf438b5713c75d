use std::path::Path;

use crate::commands::{load_config, open_store};
use crate::core::Ledger;

/// Create a team account with a credit limit.
pub fn team_add(project_root: &Path, team_id: &str, credit_limit_cents: i64) -> anyhow::Result<()> {
    let config = load_config(project_root)?;
    let store = open_store(project_root, &config)?;
    let ledger = Ledger::new(store);

    let team = ledger.ensure_team(team_id, credit_limit_cents)?;
    println!(
        "Team {}: balance {}c, credit limit {}c",
        team.team_id, team.balance_cents, team.credit_limit_cents
    );
    Ok(())
}

/// Fund (or with a negative amount, correct) a team balance.
pub fn team_credit(
    project_root: &Path,
    team_id: &str,
    amount_cents: i64,
    note: Option<&str>,
    actor: &str,
) -> anyhow::Result<()> {
    let config = load_config(project_root)?;
    let store = open_store(project_root, &config)?;
    let ledger = Ledger::new(store);

    let team = ledger.adjust(
        team_id,
        amount_cents,
        note.unwrap_or("manual adjustment"),
        actor,
    )?;
    println!("Team {} balance: {}c", team.team_id, team.balance_cents);
    Ok(())
}

/// Print a team's balance and its transaction history.
pub fn team_show(project_root: &Path, team_id: &str) -> anyhow::Result<()> {
    let config = load_config(project_root)?;
    let store = open_store(project_root, &config)?;
    let ledger = Ledger::new(store);

    let team = ledger.balance(team_id)?;
    println!(
        "Team {}: balance {}c, credit limit {}c",
        team.team_id, team.balance_cents, team.credit_limit_cents
    );

    let transactions = ledger.transactions(team_id)?;
    if transactions.is_empty() {
        println!("No transactions.");
        return Ok(());
    }
    println!();
    for tx in &transactions {
        println!(
            "{}  {:<12}  {:>+7}c  -> {:>7}c  {}",
            tx.created_at.format("%Y-%m-%d %H:%M:%S"),
            format!("{:?}", tx.kind).to_lowercase(),
            tx.amount_cents,
            tx.balance_after_cents,
            tx.note
        );
    }
    Ok(())
}
