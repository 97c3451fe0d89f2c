use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Funnel stage a prospect currently occupies.
///
/// The first six variants form the ordered funnel; `Paid` and `Lost` are
/// terminal and may be entered from any stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    New,
    Contacted,
    MeetingScheduled,
    MeetingDone,
    ProposalSent,
    Negotiating,
    Paid,
    Lost,
}

impl Stage {
    /// Every stage in board order.
    pub const ALL: [Stage; 8] = [
        Stage::New,
        Stage::Contacted,
        Stage::MeetingScheduled,
        Stage::MeetingDone,
        Stage::ProposalSent,
        Stage::Negotiating,
        Stage::Paid,
        Stage::Lost,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Contacted => "contacted",
            Self::MeetingScheduled => "meeting_scheduled",
            Self::MeetingDone => "meeting_done",
            Self::ProposalSent => "proposal_sent",
            Self::Negotiating => "negotiating",
            Self::Paid => "paid",
            Self::Lost => "lost",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::New => "New",
            Self::Contacted => "Contacted",
            Self::MeetingScheduled => "Meeting Scheduled",
            Self::MeetingDone => "Meeting Done",
            Self::ProposalSent => "Proposal Sent",
            Self::Negotiating => "Negotiating",
            Self::Paid => "Paid",
            Self::Lost => "Lost",
        }
    }

    /// Color token used by the board column header and status badges.
    pub fn color(&self) -> &'static str {
        match self {
            Self::New => "status-new",
            Self::Contacted => "status-contacted",
            Self::MeetingScheduled => "status-meeting-scheduled",
            Self::MeetingDone => "status-meeting-done",
            Self::ProposalSent => "status-proposal-sent",
            Self::Negotiating => "status-negotiating",
            Self::Paid => "status-paid",
            Self::Lost => "status-lost",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Paid | Self::Lost)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "contacted" => Ok(Self::Contacted),
            "meeting_scheduled" => Ok(Self::MeetingScheduled),
            "meeting_done" => Ok(Self::MeetingDone),
            "proposal_sent" => Ok(Self::ProposalSent),
            "negotiating" => Ok(Self::Negotiating),
            "paid" => Ok(Self::Paid),
            "lost" => Ok(Self::Lost),
            _ => Err(format!("Invalid stage: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Temperature {
    Hot,
    Warm,
    Cold,
}

impl Temperature {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hot => "hot",
            Self::Warm => "warm",
            Self::Cold => "cold",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Hot => "Hot",
            Self::Warm => "Warm",
            Self::Cold => "Cold",
        }
    }
}

impl std::fmt::Display for Temperature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Temperature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hot" => Ok(Self::Hot),
            "warm" => Ok(Self::Warm),
            "cold" => Ok(Self::Cold),
            _ => Err(format!("Invalid temperature: {}", s)),
        }
    }
}

/// How soon the prospect says they will commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Commitment {
    Immediate,
    ThirtyDays,
    Exploring,
    NotInterested,
}

impl Commitment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Immediate => "immediate",
            Self::ThirtyDays => "thirty_days",
            Self::Exploring => "exploring",
            Self::NotInterested => "not_interested",
        }
    }
}

impl std::fmt::Display for Commitment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Commitment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "immediate" => Ok(Self::Immediate),
            "thirty_days" => Ok(Self::ThirtyDays),
            "exploring" => Ok(Self::Exploring),
            "not_interested" => Ok(Self::NotInterested),
            _ => Err(format!("Invalid commitment: {}", s)),
        }
    }
}

/// The editable part of a prospect, already coerced to stored types.
///
/// This is the snapshot the change reconciler compares; identity and
/// timestamps live on [`Prospect`] and never take part in a diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProspectFields {
    pub name: String,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Option<String>,
    pub stage: Stage,
    pub temperature: Temperature,
    pub commitment: Option<Commitment>,
    pub product_interest: Option<String>,
    pub estimated_amount: Option<Decimal>,
    pub next_action: Option<String>,
    pub next_action_date: Option<NaiveDate>,
    pub last_meeting_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub sensitivity: Option<u8>,
    pub summary: Option<String>,
    #[serde(default)]
    pub objections: Vec<String>,
    #[serde(default)]
    pub key_quotes: Vec<String>,
}

impl ProspectFields {
    /// Minimal record with defaults for everything but the name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            company: None,
            email: None,
            phone: None,
            source: None,
            stage: Stage::New,
            temperature: Temperature::Warm,
            commitment: None,
            product_interest: None,
            estimated_amount: None,
            next_action: None,
            next_action_date: None,
            last_meeting_date: None,
            notes: None,
            sensitivity: None,
            summary: None,
            objections: Vec::new(),
            key_quotes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prospect {
    pub id: Uuid,
    #[serde(flatten)]
    pub fields: ProspectFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Prospect {
    pub fn stage(&self) -> Stage {
        self.fields.stage
    }
}

/// One audit record per changed field per mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub prospect_id: Uuid,
    pub field_changed: String,
    pub previous_value: String,
    pub new_value: String,
    pub created_at: DateTime<Utc>,
}
