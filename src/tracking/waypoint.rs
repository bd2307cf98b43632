//! Timestamped pointing targets and the prediction file format.
//!
//! Files come from the pass predictor as JSON. Accepted shapes:
//!
//! - a bare array of waypoint objects
//! - an object holding the array under `Pasadas_predecidas`,
//!   `trackPredictionCelestial` or `waypoints`, optionally wrapped in
//!   `postDataPred`
//!
//! Each entry carries `time` (alias `Tiempo_Cordenada`), `azimuth` (alias
//! `az`), `elevation` (alias `el`) and optional sub-satellite point fields
//! `lat`, `long`, `elev`.

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Keys under which predictor output carries the waypoint list.
const LIST_KEYS: [&str; 3] = ["Pasadas_predecidas", "trackPredictionCelestial", "waypoints"];

/// One timestamped pointing target.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Waypoint {
    /// Earliest time the rotor should be commanded to this position.
    pub time: DateTime<Utc>,
    /// Target azimuth in degrees.
    pub azimuth: f64,
    /// Target elevation in degrees.
    pub elevation: f64,
    /// Sub-satellite point, carried through untouched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ground_track: Option<GroundTrack>,
}

/// Target location over the ground at the waypoint's time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroundTrack {
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Altitude in metres.
    pub altitude: Option<f64>,
}

impl Waypoint {
    /// Waypoint without ground-track metadata.
    pub fn new(time: DateTime<Utc>, azimuth: f64, elevation: f64) -> Self {
        Self {
            time,
            azimuth,
            elevation,
            ground_track: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawWaypoint {
    #[serde(alias = "Tiempo_Cordenada")]
    time: Option<String>,
    #[serde(alias = "az")]
    azimuth: Option<f64>,
    #[serde(alias = "el")]
    elevation: Option<f64>,
    lat: Option<f64>,
    long: Option<f64>,
    elev: Option<f64>,
    #[serde(rename = "Error")]
    error: Option<Value>,
}

impl RawWaypoint {
    fn into_waypoint(self) -> Result<Waypoint> {
        if let Some(error) = self.error {
            bail!("predictor reported an error: {error}");
        }
        let time = self.time.ok_or_else(|| anyhow!("missing time"))?;
        let time = parse_time(&time)?;
        let (azimuth, elevation) = match (self.azimuth, self.elevation) {
            (Some(az), Some(el)) => (az, el),
            _ => bail!("entry at {time} has no azimuth/elevation (ground-track only sample?)"),
        };
        let ground_track = match (self.lat, self.long) {
            (Some(latitude), Some(longitude)) => Some(GroundTrack {
                latitude,
                longitude,
                altitude: self.elev,
            }),
            _ => None,
        };

        Ok(Waypoint {
            time,
            azimuth,
            elevation,
            ground_track,
        })
    }
}

/// Parse an RFC 3339 timestamp, or a naive one in local time.
pub fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Ok(t.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .with_context(|| format!("unrecognised timestamp '{s}'"))?;

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| anyhow!("timestamp '{s}' does not exist in the local timezone"))
}

/// Parse waypoints from predictor JSON.
pub fn parse_waypoints(json: &str) -> Result<Vec<Waypoint>> {
    let root: Value = serde_json::from_str(json).context("waypoint file is not valid JSON")?;
    let list = find_list(&root)?;

    list.iter()
        .enumerate()
        .map(|(i, entry)| {
            let raw: RawWaypoint = serde_json::from_value(entry.clone())
                .with_context(|| format!("waypoint #{i} is malformed"))?;
            raw.into_waypoint()
                .with_context(|| format!("waypoint #{i} rejected"))
        })
        .collect()
}

/// Read and parse a waypoint file.
pub fn load_waypoints(path: impl AsRef<Path>) -> Result<Vec<Waypoint>> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read waypoint file {}", path.display()))?;
    parse_waypoints(&contents).with_context(|| format!("in {}", path.display()))
}

fn find_list(root: &Value) -> Result<&Vec<Value>> {
    match root {
        Value::Array(list) => Ok(list),
        Value::Object(map) => {
            if let Some(inner) = map.get("postDataPred") {
                return find_list(inner);
            }
            LIST_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_array))
                .ok_or_else(|| anyhow!("no waypoint list found (expected one of {LIST_KEYS:?})"))
        }
        _ => bail!("expected a JSON array or object of waypoints"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_predictor_output() {
        let json = r#"{
            "Numero_Pasada": 1,
            "Pasadas_predecidas": [
                {"Tiempo_Cordenada": "2024-05-01T12:00:00Z", "az": 10.5, "el": 20.0,
                 "lat": -33.45, "long": -70.66, "elev": 512000.0},
                {"Tiempo_Cordenada": "2024-05-01T12:00:05Z", "az": 15.0, "el": 25.0}
            ]
        }"#;

        let waypoints = parse_waypoints(json).unwrap();
        assert_eq!(waypoints.len(), 2);
        assert_eq!(waypoints[0].azimuth, 10.5);
        assert_eq!(
            waypoints[0].ground_track,
            Some(GroundTrack {
                latitude: -33.45,
                longitude: -70.66,
                altitude: Some(512000.0),
            })
        );
        assert_eq!(
            waypoints[1].time - waypoints[0].time,
            chrono::Duration::seconds(5)
        );
        assert!(waypoints[1].ground_track.is_none());
    }

    #[test]
    fn test_parse_wrapped_celestial_request() {
        let json = r#"{"postDataPred": {"trackPredictionCelestial": [
            {"time": "2024-05-01T12:00:00+02:00", "azimuth": 1.0, "elevation": 2.0}
        ]}}"#;

        let waypoints = parse_waypoints(json).unwrap();
        assert_eq!(waypoints[0].time, parse_time("2024-05-01T10:00:00Z").unwrap());
    }

    #[test]
    fn test_parse_bare_array_with_local_time() {
        let json = r#"[{"time": "2024-05-01T12:00:00", "az": 1.0, "el": 2.0}]"#;
        let waypoints = parse_waypoints(json).unwrap();

        let expected = Local
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(waypoints[0].time, expected);
    }

    #[test]
    fn test_ground_track_only_entry_rejected() {
        let json = r#"[{"Tiempo_Cordenada": "2024-05-01T12:00:00Z", "lat": 1.0, "long": 2.0}]"#;
        let err = parse_waypoints(json).unwrap_err();
        assert!(format!("{err:#}").contains("no azimuth/elevation"));
    }

    #[test]
    fn test_predictor_error_marker_rejected() {
        let json = r#"{"Pasadas_predecidas": [{"Error": "No hay pasadas"}]}"#;
        let err = parse_waypoints(json).unwrap_err();
        assert!(format!("{err:#}").contains("No hay pasadas"));
    }

    #[test]
    fn test_missing_list_rejected() {
        assert!(parse_waypoints(r#"{"passes": []}"#).is_err());
        assert!(parse_waypoints("42").is_err());
        assert!(parse_waypoints("not json").is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pass.json");
        std::fs::write(
            &path,
            r#"{"waypoints": [{"time": "2024-05-01T12:00:00Z", "az": 90, "el": 45}]}"#,
        )
        .unwrap();

        let waypoints = load_waypoints(&path).unwrap();
        assert_eq!(waypoints, vec![Waypoint::new(
            parse_time("2024-05-01T12:00:00Z").unwrap(),
            90.0,
            45.0
        )]);

        assert!(load_waypoints(dir.path().join("missing.json")).is_err());
    }
}
