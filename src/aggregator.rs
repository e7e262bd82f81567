use serde::Serialize;

use crate::{
    config::Config,
    error::ControlError,
    models::{Reading, SensorGroup},
    psychro,
};

/// Temperature assumed for a wet room when neither the room itself nor the
/// normal rooms report one.
pub const DEFAULT_ROOM_TEMPERATURE: f64 = 21.0;

/// Averages of one sensor group. Either field is `None` when no sensor in
/// the group reported it.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RoomSample {
    pub avg_temperature: Option<f64>,
    pub avg_humidity: Option<f64>,
}

impl RoomSample {
    pub fn dew_point(&self) -> Option<f64> {
        psychro::dew_point(self.avg_temperature, self.avg_humidity)
    }
}

/// A wet room after its humidity offset has been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectedRoom {
    pub source_id: String,
    pub humidity: f64,
    pub temperature: f64,
    pub dew_point: Option<f64>,
}

/// Display-only classification of a humidity value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HumidityStatus {
    Dry,
    Normal,
    Humid,
}

impl HumidityStatus {
    pub fn classify(humidity: f64) -> Self {
        if humidity <= 50.0 {
            Self::Dry
        } else if humidity >= 70.0 {
            Self::Humid
        } else {
            Self::Normal
        }
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Average temperature and humidity over `ids`, each field over the sensors
/// that reported it.
pub fn aggregate<F>(ids: &[String], mut read: F) -> RoomSample
where
    F: FnMut(&str) -> Option<Reading>,
{
    let mut temperatures = Vec::with_capacity(ids.len());
    let mut humidities = Vec::with_capacity(ids.len());

    for reading in ids.iter().filter_map(|id| read(id)) {
        temperatures.extend(*reading.temperature());
        humidities.extend(*reading.relative_humidity());
    }

    RoomSample {
        avg_temperature: mean(&temperatures),
        avg_humidity: mean(&humidities),
    }
}

/// Offset-corrected humidity and dew point per wet room, in configuration
/// order. Rooms without a humidity value are left out.
pub fn correct_wet_rooms<F>(
    ids: &[String],
    offsets: &[f64],
    fallback_temperature: Option<f64>,
    mut read: F,
) -> Vec<CorrectedRoom>
where
    F: FnMut(&str) -> Option<Reading>,
{
    ids.iter()
        .enumerate()
        .filter_map(|(index, id)| {
            let reading = read(id)?;
            let raw = (*reading.relative_humidity())?;
            let offset = offsets.get(index).copied().unwrap_or(0.0);
            let humidity = (raw + offset).clamp(0.0, 100.0);
            let temperature = (*reading.temperature())
                .or(fallback_temperature)
                .unwrap_or(DEFAULT_ROOM_TEMPERATURE);

            Some(CorrectedRoom {
                source_id: id.clone(),
                humidity,
                temperature,
                dew_point: psychro::dew_point(Some(temperature), Some(humidity)),
            })
        })
        .collect()
}

/// Immutable view of every sensor group, taken at the start of a cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub outdoor: RoomSample,
    pub normal: RoomSample,
    /// Raw wet-room averages, before offsets.
    pub wet: RoomSample,
    pub wet_rooms: Vec<CorrectedRoom>,
}

impl Snapshot {
    /// Build a snapshot from the configured groups, looking every sensor up
    /// through `read`.
    pub fn from_readings<F>(config: &Config, mut read: F) -> Self
    where
        F: FnMut(&str) -> Option<Reading>,
    {
        let mut lookup = |id: &str| {
            let reading = read(id).filter(|r| !r.is_empty());
            if reading.is_none() {
                let error = ControlError::MissingReading {
                    sensor: id.to_string(),
                };
                tracing::debug!(%error, "Skipping sensor");
            }
            reading
        };

        let outdoor = aggregate(config.outdoor_sensors(), &mut lookup);
        let normal = aggregate(config.normal_sensors(), &mut lookup);
        let wet = aggregate(config.wet_sensors(), &mut lookup);
        let wet_rooms = correct_wet_rooms(
            config.wet_sensors(),
            config.wet_offsets(),
            normal.avg_temperature,
            &mut lookup,
        );

        report_empty(SensorGroup::Outdoor, config.outdoor_sensors(), &outdoor);
        report_empty(SensorGroup::Normal, config.normal_sensors(), &normal);
        report_empty(SensorGroup::Wet, config.wet_sensors(), &wet);
        if !config.wet_sensors().is_empty() && wet_rooms.is_empty() {
            let error = ControlError::EmptyAggregate {
                group: SensorGroup::Wet,
                field: "humidity",
            };
            tracing::warn!(%error, "No wet room can be evaluated");
        }

        Self {
            outdoor,
            normal,
            wet,
            wet_rooms,
        }
    }

    /// Dew point of the outdoor reference.
    pub fn outdoor_dew_point(&self) -> Option<f64> {
        self.outdoor.dew_point()
    }

    /// Dew point of the normal rooms, the target the gate compares against.
    pub fn target_dew_point(&self) -> Option<f64> {
        self.normal.dew_point()
    }

    /// Corrected wet-room humidities, index-paired with [`Self::room_dew_points`].
    pub fn humidities(&self) -> Vec<f64> {
        self.wet_rooms.iter().map(|room| room.humidity).collect()
    }

    /// Wet-room dew points. Stops at the first room without one so that
    /// index `i` always belongs to the same room as `humidities()[i]`.
    pub fn room_dew_points(&self) -> Vec<f64> {
        self.wet_rooms.iter().map_while(|room| room.dew_point).collect()
    }

    pub fn average_wet_humidity(&self) -> Option<f64> {
        mean(&self.humidities())
    }

    /// Average humidity the wet rooms would settle at if fully ventilated
    /// with outdoor air, each at its own temperature.
    pub fn reachable_humidity(&self) -> Option<f64> {
        let outdoor = self.outdoor_dew_point()?;
        let values: Vec<f64> = self
            .wet_rooms
            .iter()
            .filter_map(|room| psychro::relative_humidity_from_dew_point(room.temperature, outdoor))
            .collect();
        mean(&values)
    }
}

fn report_empty(group: SensorGroup, ids: &[String], sample: &RoomSample) {
    if ids.is_empty() {
        return;
    }
    let missing = [
        ("temperature", sample.avg_temperature),
        ("humidity", sample.avg_humidity),
    ];
    for (field, value) in missing {
        if value.is_none() {
            let error = ControlError::EmptyAggregate { group, field };
            tracing::debug!(%error, "Group average unavailable");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use fake::Fake;

    use super::*;

    fn ids(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn readings(values: Vec<Reading>) -> HashMap<String, Reading> {
        values
            .into_iter()
            .map(|r| (r.source_id().clone(), r))
            .collect()
    }

    #[test]
    fn averages_each_field_over_the_sensors_that_reported_it() {
        let map = readings(vec![
            Reading::new("a", Some(20.0), None),
            Reading::new("b", None, Some(60.0)),
            Reading::new("c", Some(22.0), Some(40.0)),
        ]);

        let sample = aggregate(&ids(&["a", "b", "c", "missing"]), |id| map.get(id).cloned());

        assert_eq!(sample.avg_temperature, Some(21.0));
        assert_eq!(sample.avg_humidity, Some(50.0));
    }

    #[test]
    fn empty_group_is_unavailable_not_zero() {
        let sample = aggregate(&ids(&["a"]), |_| None);
        assert_eq!(sample, RoomSample::default());
        assert_eq!(sample.dew_point(), None);
    }

    #[test]
    fn random_readings_average_within_their_range() {
        let values: Vec<Reading> = (0..8)
            .map(|i| {
                Reading::new(
                    format!("s{i}"),
                    Some((15.0..25.0).fake::<f64>()),
                    Some((30.0..90.0).fake::<f64>()),
                )
            })
            .collect();
        let group: Vec<String> = values.iter().map(|r| r.source_id().clone()).collect();
        let map = readings(values);

        let sample = aggregate(&group, |id| map.get(id).cloned());

        let t = sample.avg_temperature.unwrap();
        let h = sample.avg_humidity.unwrap();
        assert!((15.0..25.0).contains(&t));
        assert!((30.0..90.0).contains(&h));
    }

    #[test]
    fn wet_rooms_apply_offsets_and_temperature_fallbacks() {
        let map = readings(vec![
            Reading::new("bath", Some(24.0), Some(97.0)),
            Reading::new("laundry", None, Some(60.0)),
            Reading::new("kitchen", Some(20.0), None),
        ]);

        let rooms = correct_wet_rooms(
            &ids(&["bath", "kitchen", "laundry"]),
            &[5.0, 0.0, -2.5],
            Some(19.0),
            |id| map.get(id).cloned(),
        );

        assert_eq!(rooms.len(), 2);
        assert_eq!(rooms[0].source_id, "bath");
        assert_eq!(rooms[0].humidity, 100.0);
        assert_eq!(rooms[0].temperature, 24.0);
        assert_eq!(rooms[1].source_id, "laundry");
        assert_eq!(rooms[1].humidity, 57.5);
        assert_eq!(rooms[1].temperature, 19.0);
        assert_eq!(
            rooms[1].dew_point,
            psychro::dew_point(Some(19.0), Some(57.5))
        );
    }

    #[test]
    fn wet_room_without_any_temperature_uses_default() {
        let rooms = correct_wet_rooms(&ids(&["bath"]), &[], None, |id| {
            Some(Reading::new(id, None, Some(70.0)))
        });

        assert_eq!(rooms[0].temperature, DEFAULT_ROOM_TEMPERATURE);
        assert!(rooms[0].dew_point.is_some());
    }

    #[test]
    fn snapshot_pairs_humidity_and_dew_point_lists() {
        let snapshot = Snapshot {
            wet_rooms: vec![
                CorrectedRoom {
                    source_id: "a".into(),
                    humidity: 80.0,
                    temperature: 22.0,
                    dew_point: Some(18.0),
                },
                CorrectedRoom {
                    source_id: "b".into(),
                    humidity: 60.0,
                    temperature: 22.0,
                    dew_point: None,
                },
            ],
            ..Default::default()
        };

        assert_eq!(snapshot.humidities(), vec![80.0, 60.0]);
        assert_eq!(snapshot.room_dew_points(), vec![18.0]);
        assert_eq!(snapshot.average_wet_humidity(), Some(70.0));
    }

    #[test]
    fn snapshot_aggregates_each_group_independently() {
        let (config, _) = Config::from_value(&serde_json::json!({
            "outdoor_sensors": ["garden"],
            "normal_sensors": ["living"],
            "wet_sensors": ["bath", "laundry"],
            "wet_offsets": [4, 0],
        }));
        let map = readings(vec![
            Reading::new("garden", Some(4.0), Some(80.0)),
            Reading::new("living", Some(21.0), Some(45.0)),
            Reading::new("bath", Some(24.0), Some(70.0)),
            Reading::new("laundry", Some(18.0), Some(60.0)),
        ]);

        let snapshot = Snapshot::from_readings(&config, |id| map.get(id).cloned());

        assert_eq!(snapshot.outdoor.avg_humidity, Some(80.0));
        assert_eq!(snapshot.normal.avg_temperature, Some(21.0));
        assert_eq!(snapshot.wet.avg_temperature, Some(21.0));
        assert_eq!(snapshot.wet.avg_humidity, Some(65.0));
        assert_eq!(snapshot.humidities(), vec![74.0, 60.0]);
    }

    #[test]
    fn classifies_humidity_for_display() {
        assert_eq!(HumidityStatus::classify(50.0), HumidityStatus::Dry);
        assert_eq!(HumidityStatus::classify(50.1), HumidityStatus::Normal);
        assert_eq!(HumidityStatus::classify(70.0), HumidityStatus::Humid);
        assert_eq!(HumidityStatus::Humid.to_string(), "humid");
    }
}
