//! Aircraft position reports and their classified form.

use std::fmt;

use flightwatch_core::types::EventTime;
use serde::{Deserialize, Serialize};

/// ICAO wake turbulence category as reported by the feed (`WTC`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub enum WakeTurbulenceCategory {
    #[default]
    None,
    Light,
    Medium,
    Heavy,
}

impl From<u8> for WakeTurbulenceCategory {
    /// Unknown codes map to `None`.
    fn from(code: u8) -> Self {
        match code {
            1 => Self::Light,
            2 => Self::Medium,
            3 => Self::Heavy,
            _ => Self::None,
        }
    }
}

impl From<WakeTurbulenceCategory> for u8 {
    fn from(category: WakeTurbulenceCategory) -> Self {
        match category {
            WakeTurbulenceCategory::None => 0,
            WakeTurbulenceCategory::Light => 1,
            WakeTurbulenceCategory::Medium => 2,
            WakeTurbulenceCategory::Heavy => 3,
        }
    }
}

/// One aircraft observation from the feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionReport {
    #[serde(rename = "Id")]
    pub id: i64,
    /// Event time, milliseconds since epoch.
    #[serde(rename = "PosTime")]
    pub pos_time: EventTime,
    #[serde(rename = "Lat")]
    pub lat: f64,
    #[serde(rename = "Long")]
    pub lon: f64,
    /// Altitude in feet.
    #[serde(rename = "Alt", default)]
    pub alt: i64,
    #[serde(rename = "Gnd", default)]
    pub gnd: bool,
    #[serde(rename = "WTC", default)]
    pub wtc: WakeTurbulenceCategory,
    #[serde(rename = "Type", default)]
    pub aircraft_type: String,
}

impl PositionReport {
    pub fn is_airborne(&self) -> bool {
        !self.gnd && self.alt > 0
    }
}

/// Vertical motion inferred from the altitude trend of one window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerticalDirection {
    Ascending,
    Descending,
    Cruise,
    #[default]
    Unknown,
}

impl VerticalDirection {
    /// Positive slope ascends, negative descends, zero cruises and a slope
    /// that is not a finite number is unknown.
    pub fn from_slope(slope: f64) -> Self {
        if !slope.is_finite() {
            Self::Unknown
        } else if slope > 0.0 {
            Self::Ascending
        } else if slope < 0.0 {
            Self::Descending
        } else {
            Self::Cruise
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ascending => "ASCENDING",
            Self::Descending => "DESCENDING",
            Self::Cruise => "CRUISE",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for VerticalDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A position report annotated with the airport it is near and, once
/// classified, its vertical direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedAircraft {
    pub report: PositionReport,
    /// `None` when the aircraft is not near any airport of interest.
    pub airport: Option<String>,
    pub direction: VerticalDirection,
}

impl ClassifiedAircraft {
    /// A report that has been located but not yet classified.
    pub fn located(report: PositionReport, airport: Option<String>) -> Self {
        Self {
            report,
            airport,
            direction: VerticalDirection::Unknown,
        }
    }

    pub fn with_direction(mut self, direction: VerticalDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn id(&self) -> i64 {
        self.report.id
    }

    pub fn pos_time(&self) -> EventTime {
        self.report.pos_time
    }
}
