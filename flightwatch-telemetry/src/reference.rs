//! Reference tables injected at startup: airports, noise by altitude and
//! CO2 by aircraft type.

use serde::{Deserialize, Serialize};

/// An airport of interest and the radius around it that counts as nearby.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airport {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub radius_miles: f64,
}

impl Airport {
    pub fn new(name: impl Into<String>, latitude: f64, longitude: f64, radius_miles: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
            radius_miles,
        }
    }
}

/// One row of a noise table: the level heard for aircraft up to this altitude.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseLevel {
    pub altitude_ft: i64,
    pub db: f64,
}

/// Altitude to noise tables by direction and wake category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseTableSet {
    pub climbing_heavy: Vec<NoiseLevel>,
    pub climbing_medium: Vec<NoiseLevel>,
    pub descending_heavy: Vec<NoiseLevel>,
    pub descending_medium: Vec<NoiseLevel>,
}

/// Average CO2 of one landing/take-off cycle of an aircraft type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Co2Emission {
    pub aircraft_type: String,
    pub kg_per_lto: f64,
}

/// All reference data of the job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceData {
    /// Checked in order; the first airport whose box contains a position wins.
    pub airports: Vec<Airport>,
    pub noise: NoiseTableSet,
    pub co2_emissions: Vec<Co2Emission>,
}

const AIRPORT_RADIUS_MILES: f64 = 80.0;

fn levels(rows: &[(i64, f64)]) -> Vec<NoiseLevel> {
    rows.iter()
        .map(|&(altitude_ft, db)| NoiseLevel { altitude_ft, db })
        .collect()
}

impl Default for ReferenceData {
    fn default() -> Self {
        let airports = [
            ("London", 51.470020, -0.454295),
            ("Istanbul", 40.982555, 28.820829),
            ("Frankfurt", 50.110924, 8.682127),
            ("Atlanta", 33.640411, -84.419853),
            ("Paris", 49.0096906, 2.5479245),
            ("Tokyo", 35.765786, 140.386347),
            ("New York", 40.6441666667, -73.7822222222),
        ]
        .into_iter()
        .map(|(name, lat, lon)| Airport::new(name, lat, lon, AIRPORT_RADIUS_MILES))
        .collect();

        let noise = NoiseTableSet {
            climbing_heavy: levels(&[
                (500, 96.0),
                (1_000, 93.0),
                (1_500, 91.0),
                (2_000, 89.0),
                (2_500, 87.0),
                (3_000, 85.0),
            ]),
            climbing_medium: levels(&[
                (500, 89.0),
                (1_000, 86.0),
                (1_500, 84.0),
                (2_000, 82.0),
                (2_500, 80.0),
                (3_000, 78.0),
            ]),
            descending_heavy: levels(&[
                (500, 92.0),
                (1_000, 89.0),
                (1_500, 87.0),
                (2_000, 85.0),
                (2_500, 83.0),
                (3_000, 81.0),
            ]),
            descending_medium: levels(&[
                (500, 85.0),
                (1_000, 82.0),
                (1_500, 80.0),
                (2_000, 78.0),
                (2_500, 76.0),
                (3_000, 74.0),
            ]),
        };

        let co2_emissions = [
            ("A319", 2_169.0),
            ("A320", 2_440.0),
            ("A321", 3_021.0),
            ("A332", 5_600.0),
            ("A333", 5_910.0),
            ("A388", 13_564.0),
            ("B737", 2_454.0),
            ("B738", 2_566.0),
            ("B739", 2_734.0),
            ("B744", 10_406.0),
            ("B77W", 7_957.0),
            ("B788", 5_374.0),
            ("E190", 1_604.0),
        ]
        .into_iter()
        .map(|(aircraft_type, kg_per_lto)| Co2Emission {
            aircraft_type: aircraft_type.to_string(),
            kg_per_lto,
        })
        .collect();

        Self {
            airports,
            noise,
            co2_emissions,
        }
    }
}
