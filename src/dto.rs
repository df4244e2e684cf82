//! Client-facing projections of records, with derived fields. Pure functions only.

use crate::models::{
    Appointment, AppointmentStatus, Owner, Pet, Service, Vet, Visit, VisitService,
};
use crate::sort::SortFields;
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::Serialize;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_date(d: NaiveDate) -> String {
    d.format(DATE_FORMAT).to_string()
}

pub fn format_instant(dt: &DateTime<Utc>) -> String {
    format_date(dt.date_naive())
}

/// Whole years between `birth` and `today`; one less while this year's birthday is still ahead.
pub fn age_on(birth: NaiveDate, today: NaiveDate) -> i32 {
    let mut age = today.year() - birth.year();
    if (today.month(), today.day()) < (birth.month(), birth.day()) {
        age -= 1;
    }
    age
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerDto {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub email: String,
    pub address: Option<String>,
    pub pet_count: usize,
    pub created_at: String,
}

impl From<&Owner> for OwnerDto {
    fn from(o: &Owner) -> Self {
        OwnerDto {
            id: o.id,
            first_name: o.first_name.clone(),
            last_name: o.last_name.clone(),
            full_name: o.full_name(),
            phone: o.phone.clone(),
            email: o.email.clone(),
            address: o.address.clone(),
            pet_count: o.pets.as_ref().map_or(0, Vec::len),
            created_at: format_instant(&o.created_at),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PetDto {
    pub id: i64,
    pub name: String,
    pub species: String,
    pub breed: Option<String>,
    pub gender: Option<String>,
    pub birth_date: Option<String>,
    pub age: Option<i32>,
    pub owner_id: i64,
    pub owner_name: Option<String>,
    pub created_at: String,
}

impl PetDto {
    /// Projection with the age computed as of `today`.
    pub fn project(p: &Pet, today: NaiveDate) -> Self {
        PetDto {
            id: p.id,
            name: p.name.clone(),
            species: p.species.clone(),
            breed: p.breed.clone(),
            gender: p.gender.clone(),
            birth_date: p.birth_date.map(format_date),
            age: p.birth_date.map(|b| age_on(b, today)),
            owner_id: p.owner_id,
            owner_name: p.owner.as_ref().map(|o| o.full_name()),
            created_at: format_instant(&p.created_at),
        }
    }
}

impl From<&Pet> for PetDto {
    fn from(p: &Pet) -> Self {
        PetDto::project(p, Utc::now().date_naive())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VetDto {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
    pub specialty: Option<String>,
    pub phone: Option<String>,
    pub email: String,
    pub created_at: String,
}

impl From<&Vet> for VetDto {
    fn from(v: &Vet) -> Self {
        VetDto {
            id: v.id,
            first_name: v.first_name.clone(),
            last_name: v.last_name.clone(),
            full_name: v.full_name(),
            specialty: v.specialty.clone(),
            phone: v.phone.clone(),
            email: v.email.clone(),
            created_at: format_instant(&v.created_at),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceDto {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub category: Option<String>,
    pub created_at: String,
}

impl From<&Service> for ServiceDto {
    fn from(s: &Service) -> Self {
        ServiceDto {
            id: s.id,
            name: s.name.clone(),
            description: s.description.clone(),
            price: s.price,
            category: s.category.clone(),
            created_at: format_instant(&s.created_at),
        }
    }
}

/// A service line on a visit. `id` is the service id.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitServiceDto {
    pub id: i64,
    pub name: Option<String>,
    pub price: f64,
    pub notes: Option<String>,
}

impl From<&VisitService> for VisitServiceDto {
    fn from(link: &VisitService) -> Self {
        VisitServiceDto {
            id: link.service_id,
            name: link.service.as_ref().map(|s| s.name.clone()),
            price: link.service.as_ref().map_or(0.0, |s| s.price),
            notes: link.notes.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitDto {
    pub id: i64,
    pub date: String,
    pub diagnosis: String,
    pub notes: Option<String>,
    pub pet_id: i64,
    pub pet_name: Option<String>,
    pub owner_name: Option<String>,
    pub vet_id: i64,
    pub vet_name: Option<String>,
    pub services: Vec<VisitServiceDto>,
    pub total_cost: f64,
    pub created_at: String,
}

impl From<&Visit> for VisitDto {
    fn from(v: &Visit) -> Self {
        let services: Vec<VisitServiceDto> = v
            .services
            .iter()
            .flatten()
            .map(VisitServiceDto::from)
            .collect();
        let total_cost = services.iter().map(|s| s.price).sum();
        VisitDto {
            id: v.id,
            date: format_instant(&v.date),
            diagnosis: v.diagnosis.clone(),
            notes: v.notes.clone(),
            pet_id: v.pet_id,
            pet_name: v.pet.as_ref().map(|p| p.name.clone()),
            owner_name: v
                .pet
                .as_ref()
                .and_then(|p| p.owner.as_ref())
                .map(|o| o.full_name()),
            vet_id: v.vet_id,
            vet_name: v.vet.as_ref().map(|vet| vet.full_name()),
            services,
            total_cost,
            created_at: format_instant(&v.created_at),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AppointmentDto {
    pub id: i64,
    pub date: String,
    pub time_slot: String,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub pet_id: i64,
    pub pet_name: Option<String>,
    pub vet_id: i64,
    pub vet_name: Option<String>,
    pub owner_id: i64,
    pub owner_name: Option<String>,
    pub created_at: String,
}

impl From<&Appointment> for AppointmentDto {
    fn from(a: &Appointment) -> Self {
        AppointmentDto {
            id: a.id,
            date: format_instant(&a.date),
            time_slot: a.time_slot.clone(),
            status: a.status,
            notes: a.notes.clone(),
            pet_id: a.pet_id,
            pet_name: a.pet.as_ref().map(|p| p.name.clone()),
            vet_id: a.vet_id,
            vet_name: a.vet.as_ref().map(|v| v.full_name()),
            owner_id: a.owner_id,
            owner_name: a.owner.as_ref().map(|o| o.full_name()),
            created_at: format_instant(&a.created_at),
        }
    }
}

impl SortFields for OwnerDto {
    fn text_field(&self, field: &str) -> Option<&str> {
        match field {
            "fullName" => Some(&self.full_name),
            "createdAt" => Some(&self.created_at),
            _ => None,
        }
    }

    fn number_field(&self, _field: &str) -> Option<f64> {
        None
    }
}

impl SortFields for PetDto {
    fn text_field(&self, field: &str) -> Option<&str> {
        match field {
            "name" => Some(&self.name),
            "createdAt" => Some(&self.created_at),
            _ => None,
        }
    }

    fn number_field(&self, _field: &str) -> Option<f64> {
        None
    }
}

impl SortFields for VetDto {
    fn text_field(&self, field: &str) -> Option<&str> {
        match field {
            "fullName" => Some(&self.full_name),
            "createdAt" => Some(&self.created_at),
            _ => None,
        }
    }

    fn number_field(&self, _field: &str) -> Option<f64> {
        None
    }
}

impl SortFields for ServiceDto {
    fn text_field(&self, field: &str) -> Option<&str> {
        match field {
            "name" => Some(&self.name),
            "createdAt" => Some(&self.created_at),
            _ => None,
        }
    }

    fn number_field(&self, field: &str) -> Option<f64> {
        (field == "price").then_some(self.price)
    }
}

impl SortFields for VisitDto {
    fn text_field(&self, field: &str) -> Option<&str> {
        match field {
            "date" => Some(&self.date),
            "createdAt" => Some(&self.created_at),
            "name" => self.pet_name.as_deref(),
            _ => None,
        }
    }

    fn number_field(&self, field: &str) -> Option<f64> {
        (field == "totalCost").then_some(self.total_cost)
    }
}

impl SortFields for AppointmentDto {
    fn text_field(&self, field: &str) -> Option<&str> {
        match field {
            "date" => Some(&self.date),
            "createdAt" => Some(&self.created_at),
            "name" => self.pet_name.as_deref(),
            _ => None,
        }
    }

    fn number_field(&self, _field: &str) -> Option<f64> {
        None
    }
}

/// Owner with pets, upcoming appointments and recent visits.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerDashboard {
    pub owner: OwnerDto,
    pub pets: Vec<PetDto>,
    pub upcoming_appointments: Vec<AppointmentDto>,
    pub recent_visits: Vec<VisitDto>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PetHistory {
    pub pet: PetDto,
    pub owner: Option<OwnerDto>,
    pub visits: Vec<VisitDto>,
    pub total_spent: f64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyStats {
    pub visits_today: u64,
    pub appointments_today: u64,
    pub total_pets: u64,
    pub total_owners: u64,
    pub total_vets: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotStatus {
    Free,
    Busy,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotAvailability {
    pub time_slot: &'static str,
    pub status: SlotStatus,
}
