use async_trait::async_trait;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

use herdbook::config::{self, Config};
use herdbook::db;
use herdbook::error::{Error, Result};
use herdbook::server::{start_server, AppState};
use herdbook::weather::WeatherService;

#[derive(Clone, Default)]
struct RecordingWeather {
    forecast_calls: Arc<Mutex<Vec<(f64, f64)>>>,
    suggestion_calls: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl RecordingWeather {
    fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }
}

fn forecast_body() -> Value {
    let times: Vec<String> = (0..24).map(|h| format!("2025-09-08T{h:02}:00")).collect();
    let flat = |v: f64| vec![json!(v); 24];
    json!({
        "hourly": {
            "time": times,
            "temperature_2m": flat(21.0),
            "relative_humidity_2m": flat(55.0),
            "wind_speed_10m": flat(12.0),
            "precipitation": flat(0.0),
            "cloud_cover": flat(20.0),
            "precipitation_probability": flat(5.0),
            "snowfall": flat(0.0)
        },
        "daily": {
            "time": ["2025-09-08", "2025-09-09"],
            "temperature_2m_max": [24.0, 26.0],
            "temperature_2m_min": [10.0, 12.0],
            "sunrise": ["2025-09-08T06:12", "2025-09-09T06:11"],
            "sunset": ["2025-09-08T18:01", "2025-09-09T18:02"],
            "precipitation_probability_max": [5, 70]
        }
    })
}

#[async_trait]
impl WeatherService for RecordingWeather {
    async fn forecast(&self, latitude: f64, longitude: f64) -> Result<Value> {
        self.forecast_calls.lock().await.push((latitude, longitude));
        if self.fail {
            return Err(Error::upstream("Weather API fetch failed", "timeout of 5000ms exceeded"));
        }
        Ok(forecast_body())
    }

    async fn suggestions(&self, query: &str) -> Result<Value> {
        self.suggestion_calls.lock().await.push(query.to_string());
        Ok(json!({"results": [{"name": query, "country": "South Africa"}]}))
    }
}

struct TestServer {
    base: String,
    http: reqwest::Client,
    pool: db::Pool,
    _shutdown: oneshot::Sender<()>,
    _dir: tempfile::TempDir,
}

impl TestServer {
    async fn start(auth_enabled: bool, weather: RecordingWeather) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/herdbook.db", dir.path().display());
        let pool = db::init_pool(&url).await.unwrap();
        db::run_migrations(&pool).await.unwrap();

        let mut cfg: Config = serde_yaml::from_str(config::example()).unwrap();
        cfg.auth.enabled = auth_enabled;
        cfg.auth.secret = "test-secret".into();
        let state = AppState::new(pool.clone(), &cfg, Arc::new(weather));
        let bind: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let (shutdown, addr) = start_server(state, bind, &[]).await.unwrap();
        Self {
            base: format!("http://{addr}"),
            http: reqwest::Client::new(),
            pool,
            _shutdown: shutdown,
            _dir: dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self.http.get(self.url(path)).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn send(&self, method: reqwest::Method, path: &str, body: Option<Value>) -> (u16, Value) {
        let mut req = self.http.request(method, self.url(path));
        if let Some(b) = body {
            req = req.json(&b);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap_or(Value::Null))
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        self.send(reqwest::Method::POST, path, Some(body)).await
    }
}

#[tokio::test]
async fn health_reports_ok() {
    let srv = TestServer::start(false, RecordingWeather::default()).await;
    let (status, body) = srv.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn worker_crud_round_trip() {
    let srv = TestServer::start(false, RecordingWeather::default()).await;
    let (status, created) = srv
        .post(
            "/api/crm/workers",
            json!({"name": "A", "role": "Herder", "contact": "a@x.com", "hours": 40, "sector": "Pasture 1"}),
        )
        .await;
    assert_eq!(status, 201);
    let id = created["id"].as_i64().unwrap();
    assert_eq!(created["hours"], 40.0);

    let (status, fetched) = srv.get(&format!("/api/crm/workers/{id}")).await;
    assert_eq!(status, 200);
    assert_eq!(fetched, created);

    let (status, updated) = srv
        .send(
            reqwest::Method::PUT,
            &format!("/api/crm/workers/{id}"),
            Some(json!({"sector": "Main Barn"})),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(updated["sector"], "Main Barn");
    assert_eq!(updated["role"], "Herder");

    let (status, page) = srv.get("/api/crm/workers?search=main%20BARN&sort=bogus&order=up").await;
    assert_eq!(status, 200);
    assert_eq!(page["total"], 1);
    assert_eq!(page["data"][0]["id"], id);

    let (status, _) = srv
        .send(reqwest::Method::DELETE, &format!("/api/crm/workers/{id}"), None)
        .await;
    assert_eq!(status, 204);
    // idempotent
    let (status, _) = srv
        .send(reqwest::Method::DELETE, &format!("/api/crm/workers/{id}"), None)
        .await;
    assert_eq!(status, 204);

    let (status, body) = srv.get(&format!("/api/crm/workers/{id}")).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "Worker not found");

    let (_, trash) = srv.get("/api/crm/trash").await;
    assert_eq!(trash["total"], 1);
    assert_eq!(trash["data"][0]["item_type"], "workers");
    assert_eq!(trash["data"][0]["item_data"]["name"], "A");

    let (status, cleared) = srv.send(reqwest::Method::DELETE, "/api/crm/trash", None).await;
    assert_eq!(status, 200);
    assert_eq!(cleared["deleted"], 1);
}

#[tokio::test]
async fn update_missing_row_is_404() {
    let srv = TestServer::start(false, RecordingWeather::default()).await;
    let (status, body) = srv
        .send(
            reqwest::Method::PUT,
            "/api/crm/work_done/99",
            Some(json!({"cost": 12.5})),
        )
        .await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "Work Done not found");
}

#[tokio::test]
async fn bad_bodies_are_400_with_json_error() {
    let srv = TestServer::start(false, RecordingWeather::default()).await;
    let resp = srv
        .http
        .post(srv.url("/api/crm/workers"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "CRM Workers create error");
    assert!(body["details"].is_string());

    let (status, _) = srv
        .send(reqwest::Method::PUT, "/api/crm/workers/1", Some(json!([1, 2])))
        .await;
    assert_eq!(status, 400);

    let (status, body) = srv
        .send(reqwest::Method::PUT, "/api/crm/workers/abc", Some(json!({})))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "CRM Workers update error");
}

#[tokio::test]
async fn create_accepts_same_values_as_update() {
    let srv = TestServer::start(false, RecordingWeather::default()).await;
    let (status, worker) = srv
        .post("/api/crm/workers", json!({"name": "A", "hours": "40"}))
        .await;
    assert_eq!(status, 201);
    assert_eq!(worker["hours"], 40.0);

    let (status, task) = srv
        .post(
            "/api/crm/work_to_do",
            json!({"task": "Dip cattle", "due_date": "2025-09-10T08:00:00Z", "cost": "12.5"}),
        )
        .await;
    assert_eq!(status, 201);
    assert_eq!(task["due_date"], "2025-09-10");
    assert_eq!(task["cost"], 12.5);

    let id = task["id"].as_i64().unwrap();
    let (status, updated) = srv
        .send(
            reqwest::Method::PUT,
            &format!("/api/crm/work_to_do/{id}"),
            Some(json!({"due_date": "2025-09-11T08:00:00Z", "cost": "7"})),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(updated["due_date"], "2025-09-11");
    assert_eq!(updated["cost"], 7.0);

    let (status, body) = srv
        .post("/api/crm/workers", json!({"name": "B", "hours": "lots"}))
        .await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "CRM Workers create error");
}

#[tokio::test]
async fn completion_confirms_then_archives() {
    let srv = TestServer::start(false, RecordingWeather::default()).await;
    let (_, task) = srv
        .post(
            "/api/crm/work_to_do",
            json!({"task": "Dip cattle", "worker_id": 4, "due_date": "2025-09-12", "nb": true}),
        )
        .await;
    let id = task["id"].as_i64().unwrap();
    assert_eq!(task["nb"], false);
    assert_eq!(task["status"], "pending");

    let path = format!("/api/crm/work_to_do/complete/{id}");
    let (status, confirmed) = srv.post(&path, json!({})).await;
    assert_eq!(status, 200);
    assert_eq!(confirmed["nb"], true);
    assert_eq!(confirmed["id"], id);

    let (status, done) = srv.post(&path, json!({})).await;
    assert_eq!(status, 201);
    assert_eq!(done["status"], "completed");
    assert_eq!(done["task"], "Dip cattle");

    let (status, body) = srv.post(&path, json!({})).await;
    assert_eq!(status, 404);
    assert_eq!(body["error"], "Work To-Do not found");

    let (_, list) = srv.get("/api/crm/work_done").await;
    assert_eq!(list["total"], 1);
}

#[tokio::test]
async fn writes_need_token_when_auth_enabled() {
    let srv = TestServer::start(true, RecordingWeather::default()).await;
    // bcrypt("Farmer123!"), the format existing farmer rows carry
    let hash = "$2b$04$aBo2Qi3EBVbFcq/MX.97xek0gulXlEZOPIMtgsDVf8s3Ck2w9OsVq";
    db::upsert_farmer(&srv.pool, "John Doe", Some("Eastern Cape"), hash)
        .await
        .unwrap();

    let (status, body) = srv.post("/api/crm/workers", json!({"name": "B"})).await;
    assert_eq!(status, 401);
    assert_eq!(body, json!({"error": "No valid token provided"}));

    // reads stay open
    let (status, _) = srv.get("/api/crm/workers").await;
    assert_eq!(status, 200);
    let (_, guest) = srv.get("/api/auth/user").await;
    assert_eq!(guest, json!({"name": "", "location": ""}));

    let (status, body) = srv
        .post("/api/auth/login", json!({"name": "John Doe", "password": "nope"}))
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["error"], "Login failed");
    assert_eq!(body["details"], "Invalid password");

    let (status, body) = srv
        .post("/api/auth/login", json!({"name": "Nobody", "password": "Farmer123!"}))
        .await;
    assert_eq!(status, 401);
    assert_eq!(body["details"], "Farmer not found");

    let (status, body) = srv
        .post("/api/auth/login", json!({"name": "John Doe", "password": "Farmer123!"}))
        .await;
    assert_eq!(status, 200);
    let token = body["token"].as_str().unwrap().to_string();

    let resp = srv
        .http
        .post(srv.url("/api/crm/workers"))
        .bearer_auth(&token)
        .json(&json!({"name": "B"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 201);

    let resp = srv
        .http
        .get(srv.url("/api/auth/user"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap();
    let me: Value = resp.json().await.unwrap();
    assert_eq!(me["name"], "John Doe");
    assert_eq!(me["location"], "Eastern Cape");

    let resp = srv
        .http
        .delete(srv.url("/api/crm/workers/1"))
        .bearer_auth("forged.token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
}

#[tokio::test]
async fn webhook_is_open_and_feeds_listings() {
    let srv = TestServer::start(true, RecordingWeather::default()).await;
    let (status, body) = srv
        .post(
            "/api/webhook/iot",
            json!({
                "cattle": [{"animal_id": "Angus12", "age": 4, "body_temp": 38.7, "heart_rate": 72}],
                "infrastructure": [{"sector": "Feed Silo", "feed_level": 88}]
            }),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Webhook data processed");

    let (_, cattle) = srv.get("/api/iot/cattle?search=angus").await;
    assert_eq!(cattle["total"], 1);
    let (_, infra) = srv.get("/api/iot/infrastructure?sort=feed_level&order=asc").await;
    assert_eq!(infra["data"][0]["sector"], "Feed Silo");

    // simulate is a write and needs a token here
    let (status, _) = srv.post("/api/iot/simulate", json!({})).await;
    assert_eq!(status, 401);
}

#[tokio::test]
async fn simulate_and_map() {
    let srv = TestServer::start(false, RecordingWeather::default()).await;
    let (status, body) = srv.post("/api/iot/simulate", json!({})).await;
    assert_eq!(status, 201);
    assert!(body["cattle"]["animal_id"].is_string());

    let (status, map) = srv.get("/api/iot/map").await;
    assert_eq!(status, 200);
    assert_eq!(map["type"], "FeatureCollection");
    assert_eq!(map["features"].as_array().unwrap().len(), 144);
}

#[tokio::test]
async fn weather_uses_defaults_and_reports_upstream_failures() {
    let weather = RecordingWeather::default();
    let srv = TestServer::start(false, weather.clone()).await;

    let (status, body) = srv.get("/api/weather?latitude=-33.6&longitude=").await;
    assert_eq!(status, 200);
    assert!(body["today"]["temperature"].is_number());
    assert_eq!(body["sevenDay"][0]["condition"], "rainy");
    assert_eq!(weather.forecast_calls.lock().await.as_slice(), &[(-33.6, 26.4194)]);

    let (status, body) = srv.get("/api/weather/suggestions").await;
    assert_eq!(status, 400);
    assert_eq!(body["error"], "Suggestions fetch error");

    let (status, body) = srv.get("/api/weather/suggestions?q=Graaff-Reinet").await;
    assert_eq!(status, 200);
    assert_eq!(body["results"][0]["name"], "Graaff-Reinet");

    let failing = TestServer::start(false, RecordingWeather::failing()).await;
    let (status, body) = failing.get("/api/weather").await;
    assert_eq!(status, 500);
    assert_eq!(body["error"], "Weather fetch error");
    assert!(body["details"].as_str().unwrap().contains("timeout"));
}
