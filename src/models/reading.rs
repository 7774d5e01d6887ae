// Field extraction from reading documents + the API view of a reading

use std::fmt;

use chrono::{DateTime, Utc};
use mongodb::bson::{Bson, Document};
use serde::Serialize;

use super::{ComfortLevel, ComfortStatus, classic_thi};
use crate::config::FieldNames;

/// Why a field could not be read as a number.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldError {
    Missing,
    NotNumeric(String),
    NonFinite,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing => write!(f, "missing"),
            Self::NotNumeric(found) => write!(f, "not numeric ({found})"),
            Self::NonFinite => write!(f, "not finite"),
        }
    }
}

/// Coerce a document field to f64. Accepts doubles, 32/64-bit ints and numeric strings.
pub fn numeric_field(doc: &Document, name: &str) -> Result<f64, FieldError> {
    let value = match doc.get(name) {
        None | Some(Bson::Null) => return Err(FieldError::Missing),
        Some(Bson::Double(v)) => *v,
        Some(Bson::Int32(v)) => f64::from(*v),
        Some(Bson::Int64(v)) => *v as f64,
        Some(Bson::String(s)) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| FieldError::NotNumeric(format!("string {s:?}")))?,
        Some(other) => {
            return Err(FieldError::NotNumeric(format!("{:?}", other.element_type())));
        }
    };
    if value.is_finite() {
        Ok(value)
    } else {
        Err(FieldError::NonFinite)
    }
}

/// Timestamp as BSON date, epoch millis or an RFC 3339 string.
pub fn timestamp_field(doc: &Document, name: &str) -> Option<DateTime<Utc>> {
    match doc.get(name)? {
        Bson::DateTime(dt) => DateTime::from_timestamp_millis(dt.timestamp_millis()),
        Bson::Int64(ms) => DateTime::from_timestamp_millis(*ms),
        Bson::String(s) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

/// `_id` rendered for humans and JSON: ObjectIds as hex, strings as-is.
pub fn id_string(id: &Bson) -> String {
    match id {
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One reading as served by GET /api/readings. Unreadable fields are null.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadingView {
    pub id: Option<String>,
    pub temp: Option<f64>,
    pub hum: Option<f64>,
    pub thi: Option<f64>,
    pub thi_forecast: Option<f64>,
    pub comfort: Option<ComfortStatus>,
    pub timestamp: Option<String>,
}

impl ReadingView {
    pub fn from_document(doc: &Document, fields: &FieldNames) -> Self {
        let temp = numeric_field(doc, &fields.temperature).ok();
        let hum = numeric_field(doc, &fields.humidity).ok();
        let thi = temp.zip(hum).map(|(t, h)| classic_thi(t, h));
        Self {
            id: doc.get("_id").map(id_string),
            temp,
            hum,
            thi,
            thi_forecast: numeric_field(doc, &fields.forecast).ok(),
            comfort: thi.map(|v| ComfortLevel::from_thi(v).into()),
            timestamp: timestamp_field(doc, &fields.timestamp).map(|dt| dt.to_rfc3339()),
        }
    }
}
