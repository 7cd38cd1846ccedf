//! Writes for the IoT tables. Cattle readings are appended; infrastructure
//! keeps one row per sector and only overwrites the columns a reading carries.

use serde::{Deserialize, Serialize};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, info, instrument};

use super::model::{CattleHealth, Infrastructure};
use super::query::SqlValue;
use super::Pool;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CattleReading {
    pub animal_id: String,
    pub age: Option<i64>,
    pub body_temp: Option<f64>,
    pub heart_rate: Option<i64>,
    pub movement: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InfrastructureReading {
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
}

impl InfrastructureReading {
    /// Measured columns carried by this reading, in table order.
    fn measured(&self) -> Vec<(&'static str, SqlValue)> {
        let real = |name, v: Option<f64>| v.map(|x| (name, SqlValue::Real(x)));
        let text = |name, v: &Option<String>| v.clone().map(|s| (name, SqlValue::Text(s)));
        [
            real("fence_integrity", self.fence_integrity),
            real("barn_temp", self.barn_temp),
            real("humidity", self.humidity),
            text("air_quality", &self.air_quality),
            real("feed_level", self.feed_level),
            real("water_level", self.water_level),
            text("pump_status", &self.pump_status),
            text("condition", &self.condition),
            real("capacity_level", self.capacity_level),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Body accepted by the IoT webhook.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SensorPayload {
    #[serde(default)]
    pub cattle: Vec<CattleReading>,
    #[serde(default)]
    pub infrastructure: Vec<InfrastructureReading>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct IngestReport {
    pub cattle: usize,
    pub infrastructure: usize,
}

async fn insert_cattle_on(conn: &mut SqliteConnection, r: &CattleReading) -> Result<CattleHealth> {
    if r.animal_id.trim().is_empty() {
        return Err(Error::bad_input("animal_id is required"));
    }
    let row = sqlx::query_as::<_, CattleHealth>(
        "INSERT INTO cattle_health (animal_id, age, body_temp, heart_rate, movement, location) \
         VALUES (?, ?, ?, ?, ?, ?) RETURNING *",
    )
    .bind(&r.animal_id)
    .bind(r.age)
    .bind(r.body_temp)
    .bind(r.heart_rate)
    .bind(&r.movement)
    .bind(&r.location)
    .fetch_one(conn)
    .await?;
    Ok(row)
}

fn upsert_statement(r: &InfrastructureReading) -> QueryBuilder<'static, Sqlite> {
    let measured = r.measured();
    let mut qb = QueryBuilder::new("INSERT INTO infrastructure (sector");
    for (name, _) in &measured {
        qb.push(", ").push(*name);
    }
    qb.push(", timestamp) VALUES (").push_bind(r.sector.clone());
    let names: Vec<&'static str> = measured.iter().map(|(n, _)| *n).collect();
    for (_, value) in measured {
        qb.push(", ");
        value.push_to(&mut qb);
    }
    qb.push(", CURRENT_TIMESTAMP) ON CONFLICT (sector) DO UPDATE SET ");
    for name in names {
        qb.push(name).push(" = excluded.").push(name).push(", ");
    }
    qb.push("timestamp = excluded.timestamp RETURNING *");
    qb
}

async fn upsert_infrastructure_on(
    conn: &mut SqliteConnection,
    r: &InfrastructureReading,
) -> Result<Infrastructure> {
    if r.sector.trim().is_empty() {
        return Err(Error::bad_input("sector is required"));
    }
    let mut qb = upsert_statement(r);
    debug!(sql = qb.sql(), "infrastructure upsert");
    let row = qb.build_query_as::<Infrastructure>().fetch_one(conn).await?;
    Ok(row)
}

#[instrument(skip_all, fields(animal = %reading.animal_id))]
pub async fn insert_cattle(pool: &Pool, reading: &CattleReading) -> Result<CattleHealth> {
    let mut conn = pool.acquire().await?;
    insert_cattle_on(&mut conn, reading).await
}

#[instrument(skip_all, fields(sector = %reading.sector))]
pub async fn upsert_infrastructure(
    pool: &Pool,
    reading: &InfrastructureReading,
) -> Result<Infrastructure> {
    let mut conn = pool.acquire().await?;
    upsert_infrastructure_on(&mut conn, reading).await
}

/// Store a webhook batch. All readings land or none do.
#[instrument(skip_all)]
pub async fn ingest(pool: &Pool, payload: &SensorPayload) -> Result<IngestReport> {
    let mut tx = pool.begin().await?;
    for r in &payload.cattle {
        insert_cattle_on(&mut tx, r).await?;
    }
    for r in &payload.infrastructure {
        upsert_infrastructure_on(&mut tx, r).await?;
    }
    tx.commit().await?;
    let report = IngestReport {
        cattle: payload.cattle.len(),
        infrastructure: payload.infrastructure.len(),
    };
    info!(cattle = report.cattle, infrastructure = report.infrastructure, "sensor payload stored");
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_pool() -> Pool {
        let pool = crate::db::init_pool("sqlite::memory:").await.unwrap();
        crate::db::run_migrations(&pool).await.unwrap();
        pool
    }

    #[test]
    fn upsert_only_names_measured_columns() {
        let r = InfrastructureReading {
            sector: "Feed Silo".into(),
            feed_level: Some(91.0),
            ..Default::default()
        };
        let qb = upsert_statement(&r);
        assert_eq!(
            qb.sql(),
            "INSERT INTO infrastructure (sector, feed_level, timestamp) VALUES (?, ?, CURRENT_TIMESTAMP) \
             ON CONFLICT (sector) DO UPDATE SET feed_level = excluded.feed_level, timestamp = excluded.timestamp RETURNING *"
        );
    }

    #[tokio::test]
    async fn infrastructure_keeps_one_row_per_sector() {
        let pool = setup_pool().await;
        let first = upsert_infrastructure(
            &pool,
            &InfrastructureReading {
                sector: "Hay Barn".into(),
                feed_level: Some(85.0),
                humidity: Some(45.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let second = upsert_infrastructure(
            &pool,
            &InfrastructureReading {
                sector: "Hay Barn".into(),
                feed_level: Some(60.0),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.feed_level, Some(60.0));
        // humidity was not part of the second reading
        assert_eq!(second.humidity, Some(45.0));

        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM infrastructure")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 1);
    }

    #[tokio::test]
    async fn ingest_is_all_or_nothing() {
        let pool = setup_pool().await;
        let payload: SensorPayload = serde_json::from_value(serde_json::json!({
            "cattle": [
                {"animal_id": "Angus7", "age": 3, "body_temp": 38.9, "heart_rate": 74},
                {"animal_id": ""}
            ]
        }))
        .unwrap();
        let err = ingest(&pool, &payload).await.unwrap_err();
        assert!(matches!(err, Error::BadInput(_)));
        let rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cattle_health")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(rows, 0);

        let payload: SensorPayload = serde_json::from_value(serde_json::json!({
            "cattle": [{"animal_id": "Hereford12", "movement": "Resting"}],
            "infrastructure": [{"sector": "Manure Storage", "capacity_level": 71}]
        }))
        .unwrap();
        let report = ingest(&pool, &payload).await.unwrap();
        assert_eq!(report, IngestReport { cattle: 1, infrastructure: 1 });
    }
}
