//! Simulated sensor feed and the clustered farm map.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, instrument};

use crate::db::model::{CattleHealth, Infrastructure};
use crate::db::sensors::{self, CattleReading, InfrastructureReading};
use crate::db::Pool;
use crate::error::Result;

/// `[min_lon, min_lat, max_lon, max_lat]` of the simulated herd.
pub const MAP_BBOX: [f64; 4] = [24.4, -33.7, 24.6, -33.5];
pub const MAP_POINTS: usize = 144;
pub const CLUSTER_MAX_KM: f64 = 0.05;
pub const CLUSTER_MIN_POINTS: usize = 3;

const EARTH_RADIUS_KM: f64 = 6371.0088;

pub const SECTORS: &[&str] = &[
    "Pasture 1",
    "Pasture 2",
    "Pasture 3",
    "Pasture 4",
    "Main Barn",
    "Horse Stables",
    "Feed Silo",
    "Hay Barn",
    "Water Pump Station",
    "Calf Roping Arena",
    "Equipment Shed",
    "Perimeter Fencing",
    "Cattle Corrals",
    "Manure Storage",
    "Veterinary Station",
];

/// Which gauges a sector reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectorKind {
    Grazing,
    Housing,
    FeedSilo,
    HayBarn,
    PumpStation,
    EquipmentShed,
    ManureStorage,
}

impl SectorKind {
    pub fn of(sector: &str) -> Option<SectorKind> {
        let kind = match sector {
            "Pasture 1" | "Pasture 2" | "Pasture 3" | "Pasture 4" | "Perimeter Fencing"
            | "Cattle Corrals" => SectorKind::Grazing,
            "Main Barn" | "Horse Stables" | "Calf Roping Arena" | "Veterinary Station" => {
                SectorKind::Housing
            }
            "Feed Silo" => SectorKind::FeedSilo,
            "Hay Barn" => SectorKind::HayBarn,
            "Water Pump Station" => SectorKind::PumpStation,
            "Equipment Shed" => SectorKind::EquipmentShed,
            "Manure Storage" => SectorKind::ManureStorage,
            _ => return None,
        };
        Some(kind)
    }
}

fn whole<R: Rng>(rng: &mut R, low: u32, span: u32) -> f64 {
    f64::from(rng.gen_range(low..low + span))
}

pub fn random_cattle<R: Rng>(rng: &mut R) -> CattleReading {
    let breed = if rng.gen_bool(0.5) { "Angus" } else { "Hereford" };
    CattleReading {
        animal_id: format!("{}{}", breed, rng.gen_range(1..=144u32)),
        age: Some(rng.gen_range(2..=6)),
        body_temp: Some(38.5 + rng.gen::<f64>()),
        heart_rate: Some(rng.gen_range(70..80)),
        movement: Some("Grazing".to_string()),
        location: Some("Pasture 1".to_string()),
    }
}

pub fn random_infrastructure<R: Rng>(rng: &mut R, sector: &str) -> InfrastructureReading {
    let mut r = InfrastructureReading {
        sector: sector.to_string(),
        ..Default::default()
    };
    let Some(kind) = SectorKind::of(sector) else {
        return r;
    };
    match kind {
        SectorKind::Grazing => {
            r.fence_integrity = Some(whole(rng, 90, 10));
            r.water_level = Some(whole(rng, 70, 30));
        }
        SectorKind::Housing => {
            r.barn_temp = Some(whole(rng, 20, 10));
            r.humidity = Some(whole(rng, 50, 30));
            let quality = if rng.gen_bool(0.8) { "Good" } else { "Excellent" };
            r.air_quality = Some(quality.to_string());
        }
        SectorKind::FeedSilo => {
            r.feed_level = Some(whole(rng, 80, 20));
        }
        SectorKind::HayBarn => {
            r.feed_level = Some(whole(rng, 80, 20));
            r.humidity = Some(whole(rng, 40, 30));
        }
        SectorKind::PumpStation => {
            r.water_level = Some(whole(rng, 70, 30));
            let status = if rng.gen_bool(0.9) { "Operational" } else { "Faulty" };
            r.pump_status = Some(status.to_string());
        }
        SectorKind::EquipmentShed => {
            let condition = if rng.gen_bool(0.9) { "Operational" } else { "Needs Repair" };
            r.condition = Some(condition.to_string());
        }
        SectorKind::ManureStorage => {
            r.capacity_level = Some(whole(rng, 50, 50));
        }
    }
    r
}

#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub cattle: CattleHealth,
    pub infrastructure: Infrastructure,
}

/// Store one random cattle reading and one random sector update.
#[instrument(skip_all)]
pub async fn simulate(pool: &Pool) -> Result<SimulationReport> {
    let (cattle, infra) = {
        let mut rng = rand::thread_rng();
        let sector = SECTORS.choose(&mut rng).copied().unwrap_or(SECTORS[0]);
        (random_cattle(&mut rng), random_infrastructure(&mut rng, sector))
    };
    let cattle = sensors::insert_cattle(pool, &cattle).await?;
    let infrastructure = sensors::upsert_infrastructure(pool, &infra).await?;
    info!(animal = %cattle.animal_id, sector = %infrastructure.sector, "simulated IoT update");
    Ok(SimulationReport {
        cattle,
        infrastructure,
    })
}

/// Great-circle distance in kilometres between `(lon, lat)` pairs.
pub fn haversine_km(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lon1, lat1) = (a.0.to_radians(), a.1.to_radians());
    let (lon2, lat2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().atan2((1.0 - h).sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DbscanLabel {
    Core,
    Edge,
    Noise,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Membership {
    pub label: DbscanLabel,
    pub cluster: Option<usize>,
}

/// Density clustering of `(lon, lat)` points. A point whose neighbourhood
/// (itself included) within `max_km` holds at least `min_points` points is a
/// core point; non-core points reachable from a core point are edges.
pub fn dbscan(points: &[(f64, f64)], max_km: f64, min_points: usize) -> Vec<Membership> {
    let neighbours = |i: usize| -> Vec<usize> {
        (0..points.len())
            .filter(|&j| haversine_km(points[i], points[j]) <= max_km)
            .collect()
    };

    let mut out = vec![
        Membership {
            label: DbscanLabel::Noise,
            cluster: None,
        };
        points.len()
    ];
    let mut visited = vec![false; points.len()];
    let mut next_cluster = 0;

    for i in 0..points.len() {
        if visited[i] {
            continue;
        }
        visited[i] = true;
        let seed = neighbours(i);
        if seed.len() < min_points {
            continue;
        }

        let cluster = next_cluster;
        next_cluster += 1;
        out[i] = Membership {
            label: DbscanLabel::Core,
            cluster: Some(cluster),
        };

        let mut queue = seed;
        while let Some(j) = queue.pop() {
            if out[j].cluster.is_none() {
                out[j] = Membership {
                    label: DbscanLabel::Edge,
                    cluster: Some(cluster),
                };
            }
            if visited[j] {
                continue;
            }
            visited[j] = true;
            let reach = neighbours(j);
            if reach.len() >= min_points {
                out[j].label = DbscanLabel::Core;
                queue.extend(reach);
            }
        }
    }
    out
}

pub fn random_points<R: Rng>(rng: &mut R, count: usize, bbox: [f64; 4]) -> Vec<(f64, f64)> {
    let [min_lon, min_lat, max_lon, max_lat] = bbox;
    (0..count)
        .map(|_| (rng.gen_range(min_lon..max_lon), rng.gen_range(min_lat..max_lat)))
        .collect()
}

/// GeoJSON `FeatureCollection` of the points, each tagged with its
/// `dbscan` label and, when clustered, its `cluster` id.
pub fn feature_collection(points: &[(f64, f64)], labels: &[Membership]) -> Value {
    let features: Vec<Value> = points
        .iter()
        .zip(labels)
        .map(|(&(lon, lat), m)| {
            let mut properties = json!({ "dbscan": m.label });
            if let Some(c) = m.cluster {
                properties["cluster"] = json!(c);
            }
            json!({
                "type": "Feature",
                "properties": properties,
                "geometry": { "type": "Point", "coordinates": [lon, lat] },
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}

pub fn map_data() -> Value {
    let points = random_points(&mut rand::thread_rng(), MAP_POINTS, MAP_BBOX);
    let labels = dbscan(&points, CLUSTER_MAX_KM, CLUSTER_MIN_POINTS);
    feature_collection(&points, &labels)
}
