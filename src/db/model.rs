//! Row models returned by repositories and the DTOs accepted on create.
//!
//! Keep these structs focused on the data that crosses the store boundary.
//! Business rules live in `repo` and `completion`.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Worker {
    pub id: i64,
    pub name: String,
    pub role: Option<String>,
    pub contact: Option<String>,
    pub hours: Option<f64>,
    pub sector: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct WorkDone {
    pub id: i64,
    pub task: String,
    pub date: NaiveDate,
    pub worker_id: Option<i64>,
    pub sector: Option<String>,
    pub cattle_count: Option<i64>,
    pub cost: Option<f64>,
    pub duration: Option<f64>,
    pub equipment: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct WorkToDo {
    pub id: i64,
    pub task: String,
    pub due_date: Option<NaiveDate>,
    pub worker_id: Option<i64>,
    pub sector: Option<String>,
    pub cattle_count: Option<i64>,
    pub cost: Option<f64>,
    pub duration: Option<f64>,
    pub equipment: Option<String>,
    pub priority: Option<String>,
    pub nb: bool,
    pub status: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub id: i64,
    pub message: String,
    pub worker_id: Option<i64>,
    pub timestamp: NaiveDateTime,
}

/// Snapshot of a deleted row. `item_data` is whatever the source row
/// serialized to at deletion time.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct TrashItem {
    pub id: i64,
    pub item_type: String,
    pub item_data: Json<Value>,
    pub deleted_at: NaiveDateTime,
}

#[derive(Debug, Clone, FromRow, Serialize, PartialEq)]
pub struct CattleHealth {
    pub id: i64,
    pub animal_id: String,
    pub age: Option<i64>,
    pub body_temp: Option<f64>,
    pub heart_rate: Option<i64>,
    pub movement: Option<String>,
    pub location: Option<String>,
    pub timestamp: NaiveDateTime,
}

#[derive(Debug, Clone, FromRow, Serialize, PartialEq)]
pub struct Infrastructure {
    pub id: i64,
    pub sector: String,
    pub fence_integrity: Option<f64>,
    pub barn_temp: Option<f64>,
    pub humidity: Option<f64>,
    pub air_quality: Option<String>,
    pub feed_level: Option<f64>,
    pub water_level: Option<f64>,
    pub pump_status: Option<String>,
    pub condition: Option<String>,
    pub capacity_level: Option<f64>,
    pub timestamp: NaiveDateTime,
}

/// Login record. Never serialized: the hash stays server-side.
#[derive(Debug, Clone, FromRow)]
pub struct Farmer {
    pub id: i64,
    pub name: String,
    pub location: Option<String>,
    pub password_hash: String,
}

/// Public view of a farmer returned by `GET /api/auth/user`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FarmerProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub name: String,
    pub location: String,
}

impl FarmerProfile {
    pub fn guest() -> Self {
        Self {
            id: None,
            name: String::new(),
            location: String::new(),
        }
    }
}

impl From<Farmer> for FarmerProfile {
    fn from(f: Farmer) -> Self {
        Self {
            id: Some(f.id),
            name: f.name,
            location: f.location.unwrap_or_default(),
        }
    }
}

/// Create bodies go through the same value rules as partial updates:
/// numeric strings, RFC 3339 dates, and `""` meaning absent.
mod lenient {
    use chrono::NaiveDate;
    use serde::de::{Deserializer, Error as _};
    use serde::Deserialize;
    use serde_json::Value;

    use crate::db::query::{as_integer, as_real, as_text, is_blank, parse_date};

    fn present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
        Ok(Option::<Value>::deserialize(d)?.filter(|v| !is_blank(v)))
    }

    fn parsed<'de, D, T>(d: D, what: &str, f: impl Fn(&Value) -> Option<T>) -> Result<Option<T>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match present(d)? {
            None => Ok(None),
            Some(v) => f(&v)
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid {what}: {v}"))),
        }
    }

    pub fn text<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
        parsed(d, "text", as_text)
    }

    pub fn required_text<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(text(d)?.unwrap_or_default())
    }

    pub fn integer<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
        parsed(d, "integer", as_integer)
    }

    pub fn real<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f64>, D::Error> {
        parsed(d, "number", as_real)
    }

    pub fn date<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
        parsed(d, "date", |v| v.as_str().and_then(parse_date))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewWorker {
    #[serde(default, deserialize_with = "lenient::required_text")]
    pub name: String,
    #[serde(default, deserialize_with = "lenient::text")]
    pub role: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub contact: Option<String>,
    #[serde(default, deserialize_with = "lenient::real")]
    pub hours: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub sector: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewWorkDone {
    #[serde(default, deserialize_with = "lenient::required_text")]
    pub task: String,
    /// Defaults to today.
    #[serde(default, deserialize_with = "lenient::date")]
    pub date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub worker_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub sector: Option<String>,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub cattle_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient::real")]
    pub cost: Option<f64>,
    #[serde(default, deserialize_with = "lenient::real")]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub equipment: Option<String>,
    /// Defaults to "completed".
    #[serde(default, deserialize_with = "lenient::text")]
    pub status: Option<String>,
}

/// `nb` is deliberately absent: new tasks always start unconfirmed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewWorkToDo {
    #[serde(default, deserialize_with = "lenient::required_text")]
    pub task: String,
    #[serde(default, deserialize_with = "lenient::date")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub worker_id: Option<i64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub sector: Option<String>,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub cattle_count: Option<i64>,
    #[serde(default, deserialize_with = "lenient::real")]
    pub cost: Option<f64>,
    #[serde(default, deserialize_with = "lenient::real")]
    pub duration: Option<f64>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub equipment: Option<String>,
    #[serde(default, deserialize_with = "lenient::text")]
    pub priority: Option<String>,
    /// Defaults to "pending".
    #[serde(default, deserialize_with = "lenient::text")]
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NewNotification {
    #[serde(default, deserialize_with = "lenient::required_text")]
    pub message: String,
    #[serde(default, deserialize_with = "lenient::integer")]
    pub worker_id: Option<i64>,
}

/// `{ data, total }` envelope for list endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
}

/// Empty strings from form inputs are stored as NULL.
pub(crate) fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|s| !s.trim().is_empty())
}
