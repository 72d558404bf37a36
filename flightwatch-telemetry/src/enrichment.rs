//! Stateless enrichment: airport geofencing, noise and CO2 lookups.

use std::collections::{BTreeMap, HashMap};

use flightwatch_core::types::EventTime;
use serde::{Deserialize, Serialize};

use crate::aircraft::{
    ClassifiedAircraft, PositionReport, VerticalDirection, WakeTurbulenceCategory,
};
use crate::reference::{Airport, NoiseLevel, ReferenceData};

/// Statute miles per degree of latitude.
const MILES_PER_DEGREE: f64 = 69.0;

pub const NOISE_KEY_SUFFIX: &str = "_AVG_NOISE";
pub const CO2_KEY_SUFFIX: &str = "_C02_EMISSION";

/// Whether `report` is airborne below `ceiling_ft`.
pub fn is_low_altitude(report: &PositionReport, ceiling_ft: i64) -> bool {
    report.is_airborne() && report.alt < ceiling_ft
}

/// Rectangular approximation of the circle around an airport. Edges are
/// inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

impl BoundingBox {
    pub fn around(airport: &Airport) -> Self {
        let lat_delta = airport.radius_miles / MILES_PER_DEGREE;
        let lon_delta = airport.radius_miles
            / (airport.latitude.to_radians().cos() * MILES_PER_DEGREE).abs();
        Self {
            min_lat: airport.latitude - lat_delta,
            max_lat: airport.latitude + lat_delta,
            min_lon: airport.longitude - lon_delta,
            max_lon: airport.longitude + lon_delta,
        }
    }

    pub fn contains(&self, lat: f64, lon: f64) -> bool {
        (self.min_lat..=self.max_lat).contains(&lat) && (self.min_lon..=self.max_lon).contains(&lon)
    }
}

/// Finds the first configured airport whose box contains a position.
#[derive(Debug, Clone)]
pub struct AirportLocator {
    boxes: Vec<(String, BoundingBox)>,
}

impl AirportLocator {
    pub fn new(airports: &[Airport]) -> Self {
        Self {
            boxes: airports
                .iter()
                .map(|airport| (airport.name.clone(), BoundingBox::around(airport)))
                .collect(),
        }
    }

    pub fn locate(&self, lat: f64, lon: f64) -> Option<&str> {
        self.boxes
            .iter()
            .find(|(_, bounds)| bounds.contains(lat, lon))
            .map(|(name, _)| name.as_str())
    }
}

/// Smallest key `>= altitude`; 0 when there is none.
pub fn ceiling_lookup(table: &BTreeMap<i64, f64>, altitude: i64) -> f64 {
    table
        .range(altitude..)
        .next()
        .map(|(_, db)| *db)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Default)]
pub struct NoiseTables {
    climbing_heavy: BTreeMap<i64, f64>,
    climbing_medium: BTreeMap<i64, f64>,
    descending_heavy: BTreeMap<i64, f64>,
    descending_medium: BTreeMap<i64, f64>,
}

fn to_table(levels: &[NoiseLevel]) -> BTreeMap<i64, f64> {
    levels.iter().map(|l| (l.altitude_ft, l.db)).collect()
}

impl NoiseTables {
    pub fn from_reference(reference: &ReferenceData) -> Self {
        let set = &reference.noise;
        Self {
            climbing_heavy: to_table(&set.climbing_heavy),
            climbing_medium: to_table(&set.climbing_medium),
            descending_heavy: to_table(&set.descending_heavy),
            descending_medium: to_table(&set.descending_medium),
        }
    }

    /// Ascending aircraft use the climbing tables and descending ones the
    /// descending tables; heavy aircraft the heavy table, all others the
    /// medium one. Other directions have no table.
    pub fn table_for(
        &self,
        direction: VerticalDirection,
        category: WakeTurbulenceCategory,
    ) -> Option<&BTreeMap<i64, f64>> {
        let heavy = category == WakeTurbulenceCategory::Heavy;
        match (direction, heavy) {
            (VerticalDirection::Ascending, true) => Some(&self.climbing_heavy),
            (VerticalDirection::Ascending, false) => Some(&self.climbing_medium),
            (VerticalDirection::Descending, true) => Some(&self.descending_heavy),
            (VerticalDirection::Descending, false) => Some(&self.descending_medium),
            _ => None,
        }
    }

    pub fn lookup(
        &self,
        direction: VerticalDirection,
        category: WakeTurbulenceCategory,
        altitude: i64,
    ) -> f64 {
        self.table_for(direction, category)
            .map(|table| ceiling_lookup(table, altitude))
            .unwrap_or(0.0)
    }
}

/// A per-airport value derived from one classified aircraft, stamped with
/// the end of the classification window it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportMeasurement {
    pub airport: String,
    pub timestamp: EventTime,
    pub value: f64,
}

impl AirportMeasurement {
    pub fn noise_key(&self) -> String {
        format!("{}{}", self.airport, NOISE_KEY_SUFFIX)
    }

    pub fn co2_key(&self) -> String {
        format!("{}{}", self.airport, CO2_KEY_SUFFIX)
    }
}

/// Reference lookups of the job, built once from [`ReferenceData`].
#[derive(Debug, Clone)]
pub struct Enricher {
    locator: AirportLocator,
    noise: NoiseTables,
    co2_emissions: HashMap<String, f64>,
}

impl Enricher {
    pub fn new(reference: &ReferenceData) -> Self {
        Self {
            locator: AirportLocator::new(&reference.airports),
            noise: NoiseTables::from_reference(reference),
            co2_emissions: reference
                .co2_emissions
                .iter()
                .map(|e| (e.aircraft_type.clone(), e.kg_per_lto))
                .collect(),
        }
    }

    /// Attach the nearby airport to an airborne report. Airborne reports
    /// near no airport are filtered out (`None`); reports on the ground
    /// pass through without an airport.
    pub fn assign_airport(&self, report: PositionReport) -> Option<ClassifiedAircraft> {
        if !report.is_airborne() {
            return Some(ClassifiedAircraft::located(report, None));
        }
        let airport = self.locator.locate(report.lat, report.lon)?.to_string();
        Some(ClassifiedAircraft::located(report, Some(airport)))
    }

    pub fn lookup_noise(&self, aircraft: &ClassifiedAircraft) -> f64 {
        self.noise
            .lookup(aircraft.direction, aircraft.report.wtc, aircraft.report.alt)
    }

    /// CO2 per landing/take-off cycle of the aircraft type; 0 if unknown.
    pub fn lookup_co2(&self, aircraft: &ClassifiedAircraft) -> f64 {
        self.co2_emissions
            .get(&aircraft.report.aircraft_type)
            .copied()
            .unwrap_or(0.0)
    }
}

#[cfg(test)]
#[path = "tests/enrichment_tests.rs"]
mod tests;
