//! Time keeper records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::person::Person;

/// A place, optionally geolocated
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Place {
    pub id: i64,
    pub name: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Place {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn at(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = Some(latitude);
        self.longitude = Some(longitude);
        self
    }
}

/// A timed activity at a place, optionally with a partner
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Activity {
    pub id: i64,
    pub title: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub place: Place,
    pub partner: Option<Person>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Activity {
    pub fn new(
        title: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        place: Place,
    ) -> Self {
        Self {
            title: Some(title.into()),
            start_time,
            end_time,
            place,
            ..Default::default()
        }
    }

    pub fn with_partner(mut self, partner: Person) -> Self {
        self.partner = Some(partner);
        self
    }
}
