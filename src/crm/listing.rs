//! List/filter view over the prospect collection.
//!
//! Filtering and ordering are pure functions over whatever the store
//! returned, so the board and the list share one sort implementation.

use std::cmp::Ordering;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::models::{Prospect, Stage, Temperature};

/// Caller-selectable ordering for lists and board columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    CreatedDesc,
    CreatedAsc,
    UpdatedDesc,
    NameAsc,
    AmountDesc,
    NextActionAsc,
}

impl SortKey {
    pub const ALL: [SortKey; 6] = [
        SortKey::CreatedDesc,
        SortKey::CreatedAsc,
        SortKey::UpdatedDesc,
        SortKey::NameAsc,
        SortKey::AmountDesc,
        SortKey::NextActionAsc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatedDesc => "created_desc",
            Self::CreatedAsc => "created_asc",
            Self::UpdatedDesc => "updated_desc",
            Self::NameAsc => "name_asc",
            Self::AmountDesc => "amount_desc",
            Self::NextActionAsc => "next_action_asc",
        }
    }

    /// Compare two prospects under this key. Missing values sort last.
    pub fn compare(&self, a: &Prospect, b: &Prospect) -> Ordering {
        match self {
            Self::CreatedDesc => b.created_at.cmp(&a.created_at),
            Self::CreatedAsc => a.created_at.cmp(&b.created_at),
            Self::UpdatedDesc => b.updated_at.cmp(&a.updated_at),
            Self::NameAsc => a
                .fields
                .name
                .to_lowercase()
                .cmp(&b.fields.name.to_lowercase()),
            Self::AmountDesc => none_last(
                a.fields.estimated_amount,
                b.fields.estimated_amount,
                |x, y| y.cmp(x),
            ),
            Self::NextActionAsc => none_last(
                a.fields.next_action_date,
                b.fields.next_action_date,
                |x, y| x.cmp(y),
            ),
        }
    }
}

fn none_last<T>(a: Option<T>, b: Option<T>, cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => cmp(&x, &y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("Invalid sort key: {}", s))
    }
}

/// Stable sort; prospects that compare equal keep their incoming order.
pub fn sort_prospects(prospects: &mut [Prospect], sort: SortKey) {
    prospects.sort_by(|a, b| sort.compare(a, b));
}

/// Conjunctive filter. `None` on a dimension means "all".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProspectFilter {
    pub stage: Option<Stage>,
    pub temperature: Option<Temperature>,
    pub search: Option<String>,
}

impl ProspectFilter {
    /// Build a filter from raw query values. Blank or `"all"` disables a
    /// dimension; anything else must name a stage or temperature.
    pub fn from_raw(
        stage: Option<&str>,
        temperature: Option<&str>,
        search: Option<&str>,
    ) -> Result<Self, String> {
        Ok(Self {
            stage: parse_choice(stage)?,
            temperature: parse_choice(temperature)?,
            search: search
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string),
        })
    }

    pub fn matches(&self, prospect: &Prospect) -> bool {
        let fields = &prospect.fields;
        if self.stage.is_some_and(|s| s != fields.stage) {
            return false;
        }
        if self.temperature.is_some_and(|t| t != fields.temperature) {
            return false;
        }
        match self.search.as_deref() {
            None => true,
            Some(term) if term.trim().is_empty() => true,
            Some(term) => {
                let needle = term.to_lowercase();
                [
                    Some(fields.name.as_str()),
                    fields.company.as_deref(),
                    fields.email.as_deref(),
                ]
                .into_iter()
                .flatten()
                .any(|haystack| haystack.to_lowercase().contains(&needle))
            }
        }
    }
}

fn parse_choice<T>(raw: Option<&str>) -> Result<Option<T>, String>
where
    T: FromStr<Err = String>,
{
    match raw.map(|s| s.trim().to_lowercase()) {
        None => Ok(None),
        Some(s) if s.is_empty() || s == "all" => Ok(None),
        Some(s) => s.parse().map(Some),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProspectListing {
    pub prospects: Vec<Prospect>,
    /// True only when the store holds no prospects at all, as opposed to
    /// the filter matching nothing.
    pub store_empty: bool,
}

/// Filter then order the full collection.
pub fn apply(all: Vec<Prospect>, filter: &ProspectFilter, sort: SortKey) -> ProspectListing {
    let store_empty = all.is_empty();
    let mut prospects: Vec<Prospect> = all.into_iter().filter(|p| filter.matches(p)).collect();
    sort_prospects(&mut prospects, sort);
    ProspectListing {
        prospects,
        store_empty,
    }
}
