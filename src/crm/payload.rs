//! Raw form payloads and their coercion into stored field values.
//!
//! Forms send strings for almost everything (`""` for an untouched input,
//! `"1500.00"` for a number box). The reconciler must compare what will be
//! stored, so every payload goes through [`ProspectPayload::coerce`] first.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use super::models::{Commitment, ProspectFields, Stage, Temperature};
use crate::errors::CrmError;

const DATE_FORMAT: &str = "%Y-%m-%d";
const MAX_SENSITIVITY: u8 = 10;

/// A number as a form may submit it: a JSON number or its text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NumberInput {
    Number(Decimal),
    Text(String),
}

/// Full replacement payload for a prospect, as submitted by a form.
///
/// Absent and blank values both mean "no value". `stage` and `temperature`
/// always hold a value: on create they fall back to `new` and `warm`, on
/// update to the record's current ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProspectPayload {
    pub name: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub source: Option<String>,
    pub stage: Option<String>,
    pub temperature: Option<String>,
    pub commitment: Option<String>,
    pub product_interest: Option<String>,
    pub estimated_amount: Option<NumberInput>,
    pub next_action: Option<String>,
    pub next_action_date: Option<String>,
    pub last_meeting_date: Option<String>,
    pub notes: Option<String>,
    pub sensitivity: Option<NumberInput>,
    pub summary: Option<String>,
    pub objections: Option<Vec<String>>,
    pub key_quotes: Option<Vec<String>>,
}

impl ProspectPayload {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Coerce a create payload into the values that will be stored.
    pub fn coerce(self) -> Result<ProspectFields, CrmError> {
        self.coerce_with(Stage::New, Temperature::Warm)
    }

    /// Coerce an update payload for `current`. A missing stage or
    /// temperature keeps the current one.
    pub fn coerce_update(self, current: &ProspectFields) -> Result<ProspectFields, CrmError> {
        self.coerce_with(current.stage, current.temperature)
    }

    fn coerce_with(
        self,
        stage: Stage,
        temperature: Temperature,
    ) -> Result<ProspectFields, CrmError> {
        let name = text(self.name)
            .ok_or_else(|| CrmError::validation("name is required"))?;

        Ok(ProspectFields {
            name,
            company: text(self.company),
            email: text(self.email),
            phone: text(self.phone),
            source: text(self.source),
            stage: parse_enum::<Stage>(self.stage)?.unwrap_or(stage),
            temperature: parse_enum::<Temperature>(self.temperature)?.unwrap_or(temperature),
            commitment: parse_enum::<Commitment>(self.commitment)?,
            product_interest: text(self.product_interest),
            estimated_amount: amount(self.estimated_amount)?,
            next_action: text(self.next_action),
            next_action_date: date("next_action_date", self.next_action_date)?,
            last_meeting_date: date("last_meeting_date", self.last_meeting_date)?,
            notes: text(self.notes),
            sensitivity: sensitivity(self.sensitivity)?,
            summary: text(self.summary),
            objections: list(self.objections),
            key_quotes: list(self.key_quotes),
        })
    }
}

impl From<&ProspectFields> for ProspectPayload {
    fn from(fields: &ProspectFields) -> Self {
        Self {
            name: Some(fields.name.clone()),
            company: fields.company.clone(),
            email: fields.email.clone(),
            phone: fields.phone.clone(),
            source: fields.source.clone(),
            stage: Some(fields.stage.as_str().to_string()),
            temperature: Some(fields.temperature.as_str().to_string()),
            commitment: fields.commitment.map(|c| c.as_str().to_string()),
            product_interest: fields.product_interest.clone(),
            estimated_amount: fields.estimated_amount.map(NumberInput::Number),
            next_action: fields.next_action.clone(),
            next_action_date: fields.next_action_date.map(|d| d.to_string()),
            last_meeting_date: fields.last_meeting_date.map(|d| d.to_string()),
            notes: fields.notes.clone(),
            sensitivity: fields.sensitivity.map(|s| NumberInput::Number(Decimal::from(s))),
            summary: fields.summary.clone(),
            objections: Some(fields.objections.clone()),
            key_quotes: Some(fields.key_quotes.clone()),
        }
    }
}

fn text(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn list(values: Option<Vec<String>>) -> Vec<String> {
    values
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| text(Some(v)))
        .collect()
}

fn parse_enum<T>(value: Option<String>) -> Result<Option<T>, CrmError>
where
    T: FromStr<Err = String>,
{
    text(value)
        .map(|v| T::from_str(&v.to_lowercase()).map_err(CrmError::Validation))
        .transpose()
}

fn number(field: &str, value: Option<NumberInput>) -> Result<Option<Decimal>, CrmError> {
    match value {
        None => Ok(None),
        Some(NumberInput::Number(n)) => Ok(Some(n.normalize())),
        Some(NumberInput::Text(s)) => match text(Some(s)) {
            None => Ok(None),
            Some(s) => Decimal::from_str(&s)
                .map(|n| Some(n.normalize()))
                .map_err(|_| {
                    CrmError::validation(format!("{} must be a number, got '{}'", field, s))
                }),
        },
    }
}

fn amount(value: Option<NumberInput>) -> Result<Option<Decimal>, CrmError> {
    number("estimated_amount", value)
}

fn sensitivity(value: Option<NumberInput>) -> Result<Option<u8>, CrmError> {
    let Some(n) = number("sensitivity", value)? else {
        return Ok(None);
    };
    n.fract()
        .is_zero()
        .then(|| n.to_u8())
        .flatten()
        .filter(|s| *s <= MAX_SENSITIVITY)
        .map(Some)
        .ok_or_else(|| {
            CrmError::validation(format!(
                "sensitivity must be a whole number between 0 and {}, got {}",
                MAX_SENSITIVITY, n
            ))
        })
}

fn date(field: &str, value: Option<String>) -> Result<Option<NaiveDate>, CrmError> {
    text(value)
        .map(|v| {
            NaiveDate::parse_from_str(&v, DATE_FORMAT).map_err(|_| {
                CrmError::validation(format!("{} must be a YYYY-MM-DD date, got '{}'", field, v))
            })
        })
        .transpose()
}
