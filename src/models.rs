//! Typed records decoded from store rows. Relation fields are `None` unless the relation was
//! included in the query.

use crate::error::StoreError;
use crate::schema::EntityKind;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The nine bookable hourly slots, in chronological order.
pub const TIME_SLOTS: [&str; 9] = [
    "09:00", "10:00", "11:00", "12:00", "13:00", "14:00", "15:00", "16:00", "17:00",
];

/// Appointment status values as stored.
pub const STATUSES: [&str; 3] = ["scheduled", "completed", "cancelled"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decode a store row into a typed record.
pub fn decode<T: DeserializeOwned>(kind: EntityKind, row: Value) -> Result<T, StoreError> {
    serde_json::from_value(row).map_err(|e| StoreError::Decode(format!("{}: {}", kind, e)))
}

pub fn decode_all<T: DeserializeOwned>(kind: EntityKind, rows: Vec<Value>) -> Result<Vec<T>, StoreError> {
    rows.into_iter().map(|r| decode(kind, r)).collect()
}

#[derive(Clone, Debug, Deserialize)]
pub struct Owner {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub email: String,
    pub address: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub pets: Option<Vec<Pet>>,
    #[serde(default)]
    pub appointments: Option<Vec<Appointment>>,
}

impl Owner {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Vet {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub specialty: Option<String>,
    pub phone: Option<String>,
    pub email: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub visits: Option<Vec<Visit>>,
    #[serde(default)]
    pub appointments: Option<Vec<Appointment>>,
}

impl Vet {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Service {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Pet {
    pub id: i64,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub birth_date: Option<NaiveDate>,
    pub gender: Option<String>,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub owner: Option<Box<Owner>>,
    #[serde(default)]
    pub visits: Option<Vec<Visit>>,
    #[serde(default)]
    pub appointments: Option<Vec<Appointment>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Visit {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub diagnosis: String,
    pub notes: Option<String>,
    pub pet_id: i64,
    pub vet_id: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub pet: Option<Box<Pet>>,
    #[serde(default)]
    pub vet: Option<Box<Vet>>,
    #[serde(default)]
    pub services: Option<Vec<VisitService>>,
}

/// Junction row linking a visit to a service.
#[derive(Clone, Debug, Deserialize)]
pub struct VisitService {
    pub id: i64,
    pub visit_id: i64,
    pub service_id: i64,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub service: Option<Service>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Appointment {
    pub id: i64,
    pub date: DateTime<Utc>,
    pub time_slot: String,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub pet_id: i64,
    pub vet_id: i64,
    pub owner_id: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub pet: Option<Box<Pet>>,
    #[serde(default)]
    pub vet: Option<Box<Vet>>,
    #[serde(default)]
    pub owner: Option<Box<Owner>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_rows_with_and_without_relations() {
        let row = json!({
            "id": 4, "name": "Rex", "species": "dog", "breed": null, "birth_date": "2020-06-01",
            "gender": null, "owner_id": 1, "created_at": "2025-01-02T10:00:00+00:00",
            "owner": {"id": 1, "first_name": "Ona", "last_name": "Kairė", "phone": null,
                      "email": "ona@example.com", "address": null,
                      "created_at": "2025-01-01T09:00:00.123456+00:00"}
        });
        let pet: Pet = decode(EntityKind::Pet, row).unwrap();
        assert_eq!(pet.birth_date, NaiveDate::from_ymd_opt(2020, 6, 1));
        assert_eq!(pet.owner.unwrap().full_name(), "Ona Kairė");
        assert!(pet.visits.is_none());
    }

    #[test]
    fn decode_errors_name_the_entity() {
        let err = decode::<Service>(EntityKind::Service, json!({"id": "x"})).unwrap_err();
        assert!(err.to_string().contains("service"));
    }

    #[test]
    fn slots_and_statuses() {
        assert_eq!(TIME_SLOTS.len(), 9);
        assert_eq!(TIME_SLOTS.first(), Some(&"09:00"));
        assert_eq!(TIME_SLOTS.last(), Some(&"17:00"));
        let status: AppointmentStatus = serde_json::from_value(json!("cancelled")).unwrap();
        assert_eq!(status, AppointmentStatus::Cancelled);
        assert_eq!(AppointmentStatus::Scheduled.to_string(), "scheduled");
    }
}
