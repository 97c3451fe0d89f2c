//! Prospect commands — `prospector add|list|move|history|stats`.

use std::sync::Arc;

use anyhow::{Context, Result};
use uuid::Uuid;

use prospector::crm::listing::{ProspectFilter, SortKey};
use prospector::crm::models::{Prospect, Stage};
use prospector::crm::payload::ProspectPayload;
use prospector::crm::reconciler::Reconciled;
use prospector::crm::server::open_database;
use prospector::crm::service::ProspectService;
use prospector::errors::CrmError;
use prospector::prospector_config::ProspectorConfig;

/// Fields accepted by `prospector add`.
pub struct NewProspect {
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub stage: Option<String>,
    pub temperature: Option<String>,
}

fn open_service(config: &ProspectorConfig) -> Result<ProspectService> {
    let db = open_database(&config.db_path())?;
    Ok(ProspectService::new(Arc::new(db)))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).with_context(|| format!("Invalid prospect id: {}", raw))
}

fn amount(prospect: &Prospect) -> String {
    prospect
        .fields
        .estimated_amount
        .map(|a| format!("{:.2}", a))
        .unwrap_or_else(|| "-".to_string())
}

/// Report a partial write as a warning; the record did change.
fn report_outcome(result: Result<Reconciled, CrmError>) -> Result<Option<Reconciled>> {
    let err = match result {
        Ok(reconciled) => return Ok(Some(reconciled)),
        Err(err) => err,
    };
    if let Some(prospect) = err.persisted_prospect() {
        println!(
            "{} {} is now {} but its history was not recorded: {}",
            console::style("Warning:").yellow().bold(),
            prospect.fields.name,
            prospect.stage(),
            err
        );
        return Ok(None);
    }
    Err(err.into())
}

pub async fn cmd_add(config: &ProspectorConfig, new: NewProspect) -> Result<()> {
    let service = open_service(config)?;
    let payload = ProspectPayload {
        company: new.company,
        email: new.email,
        stage: new.stage,
        temperature: new.temperature,
        ..ProspectPayload::named(new.name)
    };
    let prospect = service.create_prospect(payload).await?;
    println!(
        "{} {} ({})",
        console::style("Created").green().bold(),
        prospect.fields.name,
        prospect.id
    );
    Ok(())
}

pub async fn cmd_list(
    config: &ProspectorConfig,
    stage: Option<&str>,
    temperature: Option<&str>,
    search: Option<&str>,
    sort: Option<&str>,
    json: bool,
) -> Result<()> {
    let filter =
        ProspectFilter::from_raw(stage, temperature, search).map_err(anyhow::Error::msg)?;
    let sort = match sort {
        Some(s) => s.parse::<SortKey>().map_err(anyhow::Error::msg)?,
        None => SortKey::default(),
    };
    let service = open_service(config)?;
    let listing = service.list_prospects(&filter, sort).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    if listing.prospects.is_empty() {
        println!();
        if listing.store_empty {
            println!("No prospects yet. Create your first one with 'prospector add --name <NAME>'.");
        } else {
            println!("No prospects match the current filters.");
        }
        println!();
        return Ok(());
    }

    println!();
    println!(
        "{:<36}  {:<20} {:<18} {:<18} {:<6} {:>12}",
        "ID", "Name", "Company", "Stage", "Temp", "Amount"
    );
    println!("{}", "-".repeat(115));
    for p in &listing.prospects {
        println!(
            "{:<36}  {:<20} {:<18} {:<18} {:<6} {:>12}",
            p.id,
            p.fields.name,
            p.fields.company.as_deref().unwrap_or("-"),
            p.stage().label(),
            p.fields.temperature.label(),
            amount(p)
        );
    }
    println!();
    println!("{} prospect(s)", listing.prospects.len());
    Ok(())
}

pub async fn cmd_move(config: &ProspectorConfig, id: &str, stage: &str) -> Result<()> {
    let id = parse_id(id)?;
    let stage: Stage = stage
        .trim()
        .to_lowercase()
        .parse()
        .map_err(anyhow::Error::msg)?;
    let service = open_service(config)?;

    if let Some(result) = report_outcome(service.move_stage(id, stage).await)? {
        if result.is_noop() {
            println!(
                "{} is already in {}; nothing to do.",
                result.prospect.fields.name,
                stage.label()
            );
        } else {
            println!(
                "{} {} -> {}",
                console::style("Moved").green().bold(),
                result.prospect.fields.name,
                stage.label()
            );
        }
    }
    Ok(())
}

pub async fn cmd_history(config: &ProspectorConfig, id: &str) -> Result<()> {
    let id = parse_id(id)?;
    let service = open_service(config)?;
    let prospect = service.get_prospect(id).await?;
    let history = service.get_history(id).await?;

    println!();
    println!("{}", console::style(format!("History for {}", prospect.fields.name)).bold());
    println!();
    if history.is_empty() {
        println!("  No changes recorded.");
    }
    for entry in &history {
        let previous = if entry.previous_value.is_empty() {
            "(empty)"
        } else {
            entry.previous_value.as_str()
        };
        let new = if entry.new_value.is_empty() {
            "(empty)"
        } else {
            entry.new_value.as_str()
        };
        println!(
            "  {}  {:<18} {} -> {}",
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.field_changed,
            console::style(previous).dim(),
            new
        );
    }
    println!();
    Ok(())
}

pub async fn cmd_stats(config: &ProspectorConfig) -> Result<()> {
    let service = open_service(config)?;
    let today = chrono::Local::now().date_naive();
    let stats = service.dashboard(today).await?;

    println!();
    println!("{}", console::style("Pipeline").bold().cyan());
    println!();
    println!("  Active prospects:    {}", stats.active);
    println!("  Pipeline value:      {:.2}", stats.pipeline_value);
    println!("  Hot prospects:       {}", stats.hot);
    println!(
        "  Actions this week:   {} ({} to {})",
        stats.actions_this_week, stats.week_start, stats.week_end
    );
    println!();
    println!("{}", console::style("By stage").bold());
    for share in &stats.distribution {
        println!(
            "  {:<18} {:>4}  {:>5.1}%",
            share.label, share.count, share.percentage
        );
    }
    if !stats.upcoming.is_empty() {
        println!();
        println!("{}", console::style("Upcoming actions").bold());
        for action in &stats.upcoming {
            println!(
                "  {}  {:<20} {}",
                action.next_action_date,
                action.name,
                action.next_action.as_deref().unwrap_or("-")
            );
        }
    }
    println!();
    Ok(())
}
