//! Open-Meteo response shapes and the reduction into a today / seven-day view.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

pub const HOURLY_VARIABLES: &[&str] = &[
    "temperature_2m",
    "relative_humidity_2m",
    "wind_speed_10m",
    "precipitation",
    "soil_moisture_0_to_1cm",
    "uv_index",
    "apparent_temperature",
    "wind_gusts_10m",
    "evapotranspiration",
    "cloud_cover",
    "precipitation_probability",
    "snowfall",
];

pub const DAILY_VARIABLES: &[&str] = &[
    "temperature_2m_max",
    "temperature_2m_min",
    "precipitation_sum",
    "sunrise",
    "sunset",
    "precipitation_probability_max",
    "snowfall_sum",
];

pub const FORECAST_DAYS: u32 = 8;

type Series = Vec<Option<f64>>;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Hourly {
    pub time: Vec<String>,
    pub temperature_2m: Series,
    pub relative_humidity_2m: Series,
    pub wind_speed_10m: Series,
    pub precipitation: Series,
    pub soil_moisture_0_to_1cm: Series,
    pub uv_index: Series,
    pub apparent_temperature: Series,
    pub wind_gusts_10m: Series,
    pub evapotranspiration: Series,
    pub cloud_cover: Series,
    pub precipitation_probability: Series,
    pub snowfall: Series,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Daily {
    pub time: Vec<String>,
    pub temperature_2m_max: Series,
    pub temperature_2m_min: Series,
    pub precipitation_sum: Series,
    pub sunrise: Vec<Option<String>>,
    pub sunset: Vec<Option<String>>,
    pub precipitation_probability_max: Series,
    pub snowfall_sum: Series,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawForecast {
    pub hourly: Option<Hourly>,
    pub daily: Option<Daily>,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Snowy,
    Rainy,
    Cloudy,
    Sunny,
}

impl Condition {
    pub fn classify(precipitation_probability: f64, snowfall: f64, cloud_cover: f64) -> Self {
        if snowfall > 0.0 {
            Condition::Snowy
        } else if precipitation_probability > 50.0 {
            Condition::Rainy
        } else if cloud_cover > 80.0 {
            Condition::Cloudy
        } else {
            Condition::Sunny
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SunExposure {
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Today {
    pub temperature: f64,
    pub humidity: f64,
    pub wind_speed: f64,
    pub precipitation: f64,
    pub soil_moisture: f64,
    pub sun_exposure: SunExposure,
    pub heat_index: f64,
    pub wind_chill: f64,
    pub uv_index: f64,
    pub evapotranspiration: f64,
    pub condition: Condition,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DayForecast {
    pub date: String,
    pub max_temp: f64,
    pub min_temp: f64,
    pub precipitation: f64,
    pub precipitation_probability: f64,
    pub snowfall: f64,
    pub sunrise: Option<String>,
    pub sunset: Option<String>,
    pub wind_speed: f64,
    pub humidity: f64,
    pub condition: Condition,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeatherReport {
    pub today: Today,
    pub seven_day: Vec<DayForecast>,
}

fn at(series: &[Option<f64>], i: usize) -> f64 {
    series.get(i).copied().flatten().unwrap_or(0.0)
}

fn text_at(series: &[Option<String>], i: usize) -> Option<String> {
    series.get(i).cloned().flatten()
}

/// Mean of the 24 hourly values starting at the first hour of `date`.
/// Missing values count as zero; an unknown date averages to zero.
fn daily_average(hourly: &Hourly, series: &[Option<f64>], date: &str) -> f64 {
    let Some(start) = hourly.time.iter().position(|t| t.starts_with(date)) else {
        return 0.0;
    };
    let day = series.iter().skip(start).take(24);
    let n = day.len();
    if n == 0 {
        return 0.0;
    }
    day.map(|v| v.unwrap_or(0.0)).sum::<f64>() / n as f64
}

fn format_day(raw: &str) -> Result<String> {
    let prefix = raw.get(..10).unwrap_or(raw);
    NaiveDate::parse_from_str(prefix, "%Y-%m-%d")
        .map(|d| d.to_string())
        .map_err(|e| Error::upstream(format!("Invalid date string: {raw}"), e))
}

/// Reduce a forecast response to today's conditions (at `now`'s hour) and
/// the next seven days.
pub fn process_forecast(raw: &Value, now: DateTime<Utc>) -> Result<WeatherReport> {
    let parsed: RawForecast = serde_json::from_value(raw.clone())
        .map_err(|e| Error::upstream("Invalid weather response", e))?;
    let (Some(hourly), Some(daily)) = (parsed.hourly, parsed.daily) else {
        return Err(Error::upstream(
            "Weather processing failed",
            "Missing daily or hourly data in response",
        ));
    };

    let hour = now.format("%Y-%m-%dT%H").to_string();
    let i = hourly
        .time
        .iter()
        .position(|t| t.starts_with(&hour))
        .unwrap_or(0);

    let today = Today {
        temperature: at(&hourly.temperature_2m, i),
        humidity: at(&hourly.relative_humidity_2m, i),
        wind_speed: at(&hourly.wind_speed_10m, i),
        precipitation: at(&hourly.precipitation, i),
        soil_moisture: at(&hourly.soil_moisture_0_to_1cm, i),
        sun_exposure: SunExposure {
            sunrise: text_at(&daily.sunrise, 0),
            sunset: text_at(&daily.sunset, 0),
        },
        heat_index: at(&hourly.apparent_temperature, i),
        wind_chill: at(&hourly.wind_gusts_10m, i),
        uv_index: at(&hourly.uv_index, i),
        evapotranspiration: at(&hourly.evapotranspiration, i),
        condition: Condition::classify(
            at(&hourly.precipitation_probability, i),
            at(&hourly.snowfall, i),
            at(&hourly.cloud_cover, i),
        ),
    };

    let mut seven_day = Vec::with_capacity(7);
    for (d, time) in daily.time.iter().enumerate().skip(1).take(7) {
        let probability = at(&daily.precipitation_probability_max, d);
        let snowfall = at(&daily.snowfall_sum, d);
        seven_day.push(DayForecast {
            date: format_day(time)?,
            max_temp: at(&daily.temperature_2m_max, d),
            min_temp: at(&daily.temperature_2m_min, d),
            precipitation: at(&daily.precipitation_sum, d),
            precipitation_probability: probability,
            snowfall,
            sunrise: text_at(&daily.sunrise, d),
            sunset: text_at(&daily.sunset, d),
            wind_speed: daily_average(&hourly, &hourly.wind_speed_10m, time),
            humidity: daily_average(&hourly, &hourly.relative_humidity_2m, time),
            condition: Condition::classify(
                probability,
                snowfall,
                daily_average(&hourly, &hourly.cloud_cover, time),
            ),
        });
    }

    Ok(WeatherReport { today, seven_day })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    /// Two days of hourly data plus three daily entries.
    fn sample() -> Value {
        let times: Vec<String> = ["2025-09-08", "2025-09-09"]
            .iter()
            .flat_map(|d| (0..24).map(move |h| format!("{d}T{h:02}:00")))
            .collect();
        let flat = |v: f64| vec![json!(v); 48];
        let mut cloud = vec![json!(10.0); 24];
        cloud.extend(vec![json!(90.0); 24]);
        let mut wind: Vec<Value> = (0..24).map(|h| json!(h as f64)).collect();
        wind.extend(vec![json!(4.0); 24]);
        json!({
            "hourly": {
                "time": times,
                "temperature_2m": flat(18.5),
                "relative_humidity_2m": flat(60.0),
                "wind_speed_10m": wind,
                "precipitation": flat(0.0),
                "soil_moisture_0_to_1cm": flat(0.3),
                "uv_index": flat(5.0),
                "apparent_temperature": flat(17.0),
                "wind_gusts_10m": flat(20.0),
                "evapotranspiration": flat(0.1),
                "cloud_cover": cloud,
                "precipitation_probability": flat(10.0),
                "snowfall": flat(0.0)
            },
            "daily": {
                "time": ["2025-09-08", "2025-09-09", "2025-09-10"],
                "temperature_2m_max": [22.0, 24.0, 19.0],
                "temperature_2m_min": [9.0, 11.0, 8.0],
                "precipitation_sum": [0.0, 0.0, 4.2],
                "sunrise": ["2025-09-08T06:12", "2025-09-09T06:11", "2025-09-10T06:10"],
                "sunset": ["2025-09-08T18:01", "2025-09-09T18:02", "2025-09-10T18:02"],
                "precipitation_probability_max": [5, 20, 80],
                "snowfall_sum": [0.0, 0.0, null]
            }
        })
    }

    #[test]
    fn today_uses_current_hour() {
        let now = Utc.with_ymd_and_hms(2025, 9, 8, 13, 20, 0).unwrap();
        let report = process_forecast(&sample(), now).unwrap();
        assert_eq!(report.today.wind_speed, 13.0);
        assert_eq!(report.today.temperature, 18.5);
        assert_eq!(report.today.sun_exposure.sunrise.as_deref(), Some("2025-09-08T06:12"));
        assert_eq!(report.today.condition, Condition::Sunny);
    }

    #[test]
    fn unknown_hour_falls_back_to_first() {
        let now = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        let report = process_forecast(&sample(), now).unwrap();
        assert_eq!(report.today.wind_speed, 0.0);
    }

    #[test]
    fn seven_day_skips_today_and_averages_hourly() {
        let now = Utc.with_ymd_and_hms(2025, 9, 8, 0, 0, 0).unwrap();
        let report = process_forecast(&sample(), now).unwrap();
        assert_eq!(report.seven_day.len(), 2);

        let tomorrow = &report.seven_day[0];
        assert_eq!(tomorrow.date, "2025-09-09");
        assert_eq!(tomorrow.max_temp, 24.0);
        assert_eq!(tomorrow.wind_speed, 4.0);
        assert_eq!(tomorrow.humidity, 60.0);
        assert_eq!(tomorrow.condition, Condition::Cloudy);

        let after = &report.seven_day[1];
        assert_eq!(after.precipitation, 4.2);
        assert_eq!(after.condition, Condition::Rainy);
        // no hourly data for that day
        assert_eq!(after.wind_speed, 0.0);
        assert_eq!(after.snowfall, 0.0);
    }

    #[test]
    fn missing_sections_are_upstream_errors() {
        let now = Utc::now();
        let err = process_forecast(&json!({"hourly": {}}), now).unwrap_err();
        assert!(matches!(err, Error::Upstream { .. }));
        assert!(err.to_string().contains("Missing daily or hourly data"));
    }

    #[test]
    fn serializes_camel_case() {
        let now = Utc.with_ymd_and_hms(2025, 9, 8, 1, 0, 0).unwrap();
        let v = serde_json::to_value(process_forecast(&sample(), now).unwrap()).unwrap();
        assert!(v["today"]["windSpeed"].is_number());
        assert!(v["today"]["sunExposure"]["sunset"].is_string());
        assert_eq!(v["sevenDay"][0]["condition"], "cloudy");
        assert_eq!(v["sevenDay"][1]["precipitationProbability"], 80.0);
    }

    #[test]
    fn conditions_in_priority_order() {
        assert_eq!(Condition::classify(90.0, 1.0, 100.0), Condition::Snowy);
        assert_eq!(Condition::classify(51.0, 0.0, 100.0), Condition::Rainy);
        assert_eq!(Condition::classify(50.0, 0.0, 81.0), Condition::Cloudy);
        assert_eq!(Condition::classify(0.0, 0.0, 0.0), Condition::Sunny);
    }
}
