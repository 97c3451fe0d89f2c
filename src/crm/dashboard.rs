//! Pipeline summary statistics.

use chrono::{Datelike, Duration, NaiveDate};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use super::models::{Prospect, Stage, Temperature};

const UPCOMING_LIMIT: usize = 5;

#[derive(Debug, Clone, Serialize)]
pub struct UpcomingAction {
    pub prospect_id: Uuid,
    pub name: String,
    pub company: Option<String>,
    pub next_action: Option<String>,
    pub next_action_date: NaiveDate,
}

#[derive(Debug, Clone, Serialize)]
pub struct StageShare {
    pub stage: Stage,
    pub label: &'static str,
    pub count: usize,
    /// Share of the active count, 0–100.
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardStats {
    /// Prospects not marked lost.
    pub active: usize,
    /// Sum of estimated amounts; missing amounts count as zero.
    pub pipeline_value: Decimal,
    pub hot: usize,
    /// Active prospects whose next action falls in the current
    /// Sunday-to-Saturday week.
    pub actions_this_week: usize,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub upcoming: Vec<UpcomingAction>,
    pub distribution: Vec<StageShare>,
}

/// Sunday and Saturday bounding the week that contains `today`.
pub fn week_bounds(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let offset = today.weekday().num_days_from_sunday() as i64;
    let start = today - Duration::days(offset);
    (start, start + Duration::days(6))
}

pub fn summarize(prospects: &[Prospect], today: NaiveDate) -> DashboardStats {
    let active: Vec<&Prospect> = prospects
        .iter()
        .filter(|p| p.stage() != Stage::Lost)
        .collect();
    let (week_start, week_end) = week_bounds(today);

    let pipeline_value: Decimal = active
        .iter()
        .filter_map(|p| p.fields.estimated_amount)
        .sum();
    let hot = active
        .iter()
        .filter(|p| p.fields.temperature == Temperature::Hot)
        .count();
    let actions_this_week = active
        .iter()
        .filter_map(|p| p.fields.next_action_date)
        .filter(|d| *d >= week_start && *d <= week_end)
        .count();

    let mut upcoming: Vec<UpcomingAction> = active
        .iter()
        .filter_map(|p| {
            p.fields.next_action_date.map(|date| UpcomingAction {
                prospect_id: p.id,
                name: p.fields.name.clone(),
                company: p.fields.company.clone(),
                next_action: p.fields.next_action.clone(),
                next_action_date: date,
            })
        })
        .collect();
    upcoming.sort_by_key(|u| u.next_action_date);
    upcoming.truncate(UPCOMING_LIMIT);

    let total = active.len();
    let distribution = Stage::ALL
        .into_iter()
        .filter(|s| *s != Stage::Lost)
        .map(|stage| {
            let count = active.iter().filter(|p| p.stage() == stage).count();
            let percentage = if total == 0 {
                0.0
            } else {
                count as f64 * 100.0 / total as f64
            };
            StageShare {
                stage,
                label: stage.label(),
                count,
                percentage,
            }
        })
        .collect();

    DashboardStats {
        active: total,
        pipeline_value,
        hot,
        actions_this_week,
        week_start,
        week_end,
        upcoming,
        distribution,
    }
}
