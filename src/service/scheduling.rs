//! Cross-table operations: visits with their service lines, conflict-checked appointment
//! booking, availability and read-side aggregates.

use crate::dates::{day_bounds, parse_instant, start_of_day, start_of_next_day, today};
use crate::dto::{
    AppointmentDto, DailyStats, OwnerDashboard, OwnerDto, PetDto, PetHistory, SlotAvailability,
    SlotStatus, VisitDto,
};
use crate::error::AppError;
use crate::events::{emit, DomainEvent, EventSink};
use crate::hooks::{AppointmentHooks, EntityHooks, VisitHooks};
use crate::models::{decode, decode_all, Appointment, AppointmentStatus, Owner, Pet, Visit, TIME_SLOTS};
use crate::schema::{EntityKind, PRIMARY_KEY};
use crate::service::crud::CrudEngine;
use crate::service::validation::Mode;
use crate::store::{Condition, EntityStore, Filter, FindMany, Include, OrderBy, Record};
use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Upcoming appointments and recent visits shown on an owner dashboard.
const DASHBOARD_LIMIT: u64 = 5;

/// One requested service line on a new visit.
#[derive(Clone, Debug, PartialEq)]
struct ServiceLink {
    service_id: i64,
    notes: Option<String>,
}

pub struct Scheduler {
    store: Arc<dyn EntityStore>,
    events: Arc<dyn EventSink>,
    visits: Arc<CrudEngine<VisitHooks>>,
    appointments: Arc<CrudEngine<AppointmentHooks>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn EntityStore>,
        events: Arc<dyn EventSink>,
        visits: Arc<CrudEngine<VisitHooks>>,
        appointments: Arc<CrudEngine<AppointmentHooks>>,
    ) -> Self {
        Scheduler {
            store,
            events,
            visits,
            appointments,
        }
    }

    /// Create a visit and one service line per entry of `service_ids`, atomically. Entries
    /// may be ids (number or numeric string) or objects `{serviceId, notes}`.
    pub async fn create_visit_with_services(&self, mut input: Record) -> Result<VisitDto, AppError> {
        let links = parse_service_links(input.remove("service_ids"))?;
        let data = self.visits.prepare(input, Mode::Create)?;
        let relations = self.visits.hooks().relations();

        let mut tx = self.store.begin().await?;
        let row = tx.create(EntityKind::Visit, &data, &[]).await?;
        let visit_id = row_id(EntityKind::Visit, &row)?;
        for link in &links {
            let mut line = Record::new();
            line.insert("visit_id".into(), Value::from(visit_id));
            line.insert("service_id".into(), Value::from(link.service_id));
            if let Some(notes) = &link.notes {
                line.insert("notes".into(), Value::String(notes.clone()));
            }
            tx.create(EntityKind::VisitService, &line, &[]).await?;
        }
        let row = tx
            .find_one(EntityKind::Visit, visit_id, &relations)
            .await?
            .ok_or_else(|| AppError::Internal(format!("visit {} vanished inside its transaction", visit_id)))?;
        tx.commit().await?;

        let visit: Visit = decode(EntityKind::Visit, row)?;
        tracing::info!(visit_id, pet_id = visit.pet_id, services = links.len(), "visit recorded");
        emit(
            self.events.as_ref(),
            DomainEvent::VisitRecorded {
                id: visit_id,
                pet_id: visit.pet_id,
                services: links.len(),
            },
        );
        Ok(VisitDto::from(&visit))
    }

    /// Book a slot. The status is always `scheduled`; a live appointment for the same vet,
    /// day and slot is a conflict and nothing is written.
    pub async fn create_appointment(&self, mut input: Record) -> Result<AppointmentDto, AppError> {
        input.insert(
            "status".into(),
            Value::String(AppointmentStatus::Scheduled.as_str().into()),
        );
        let data = self.appointments.prepare(input, Mode::Create)?;
        let vet_id = required_i64(&data, "vet_id")?;
        let time_slot = data
            .get("time_slot")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::Validation("timeSlot is required".into()))?
            .to_string();
        let when = data
            .get("date")
            .and_then(Value::as_str)
            .and_then(parse_instant)
            .ok_or_else(|| AppError::Validation("date must be a valid date".into()))?;
        let day = when.date_naive();

        let mut tx = self.store.begin().await?;
        let taken = tx
            .count(
                EntityKind::Appointment,
                &live_bookings(vet_id, day).and(Condition::Eq("time_slot", Value::String(time_slot.clone()))),
            )
            .await?;
        if taken > 0 {
            tracing::debug!(vet_id, %day, %time_slot, "slot already booked");
            return Err(AppError::slot_booked());
        }
        let row = tx
            .create(EntityKind::Appointment, &data, &self.appointments.hooks().relations())
            .await?;
        tx.commit().await?;

        let appointment: Appointment = decode(EntityKind::Appointment, row)?;
        tracing::info!(id = appointment.id, vet_id, %day, %time_slot, "appointment booked");
        emit(
            self.events.as_ref(),
            DomainEvent::AppointmentBooked {
                id: appointment.id,
                vet_id,
                date: day.format("%Y-%m-%d").to_string(),
                time_slot,
            },
        );
        Ok(AppointmentDto::from(&appointment))
    }

    /// Every canonical slot of the day, in order, as free or busy.
    pub async fn get_vet_availability(
        &self,
        vet_id: i64,
        day: NaiveDate,
    ) -> Result<Vec<SlotAvailability>, AppError> {
        if self.store.find_one(EntityKind::Vet, vet_id, &[]).await?.is_none() {
            return Err(AppError::not_found(EntityKind::Vet, vet_id));
        }
        let rows = self
            .store
            .find_many(EntityKind::Appointment, &FindMany::new(live_bookings(vet_id, day)))
            .await?;
        let booked: Vec<Appointment> = decode_all(EntityKind::Appointment, rows)?;
        let busy: HashSet<&str> = booked.iter().map(|a| a.time_slot.as_str()).collect();
        Ok(TIME_SLOTS
            .iter()
            .map(|slot| SlotAvailability {
                time_slot: *slot,
                status: if busy.contains(slot) {
                    SlotStatus::Busy
                } else {
                    SlotStatus::Free
                },
            })
            .collect())
    }

    pub async fn get_daily_stats(&self) -> Result<DailyStats, AppError> {
        let (from, to) = day_bounds(today());
        let visits_filter = in_range("date", from, to);
        let appointments_filter = in_range("date", from, to).and(Condition::Eq(
            "status",
            Value::String(AppointmentStatus::Scheduled.as_str().into()),
        ));
        let everything = Filter::new();
        let (visits_today, appointments_today, total_pets, total_owners, total_vets) = tokio::try_join!(
            self.store.count(EntityKind::Visit, &visits_filter),
            self.store.count(EntityKind::Appointment, &appointments_filter),
            self.store.count(EntityKind::Pet, &everything),
            self.store.count(EntityKind::Owner, &everything),
            self.store.count(EntityKind::Vet, &everything),
        )?;
        Ok(DailyStats {
            visits_today,
            appointments_today,
            total_pets,
            total_owners,
            total_vets,
        })
    }

    pub async fn get_owner_dashboard(&self, owner_id: i64) -> Result<OwnerDashboard, AppError> {
        self.get_owner_dashboard_at(owner_id, Utc::now()).await
    }

    /// Dashboard as seen at `now`: appointments earlier today than `now` are no longer upcoming.
    pub async fn get_owner_dashboard_at(
        &self,
        owner_id: i64,
        now: DateTime<Utc>,
    ) -> Result<OwnerDashboard, AppError> {
        let row = self
            .store
            .find_one(EntityKind::Owner, owner_id, &[Include::new("pets")])
            .await?
            .ok_or_else(|| AppError::not_found(EntityKind::Owner, owner_id))?;
        let owner: Owner = decode(EntityKind::Owner, row)?;
        let pets = owner.pets.clone().unwrap_or_default();
        let pet_ids: Vec<Value> = pets.iter().map(|p| Value::from(p.id)).collect();

        let upcoming = FindMany::new(upcoming_for_owner(owner_id, now))
            .includes(self.appointments.hooks().relations())
            .order_by(OrderBy::asc("date"))
            .order_by(OrderBy::asc("time_slot"))
            .limit(DASHBOARD_LIMIT);
        let recent = FindMany::new(Filter::new().and(Condition::In("pet_id", pet_ids)))
            .includes(self.visits.hooks().relations())
            .order_by(OrderBy::desc("date"))
            .limit(DASHBOARD_LIMIT);
        let (appointment_rows, visit_rows) = tokio::try_join!(
            self.store.find_many(EntityKind::Appointment, &upcoming),
            self.store.find_many(EntityKind::Visit, &recent),
        )?;
        let appointments: Vec<Appointment> = decode_all(EntityKind::Appointment, appointment_rows)?;
        let visits: Vec<Visit> = decode_all(EntityKind::Visit, visit_rows)?;

        let owner_name = owner.full_name();
        Ok(OwnerDashboard {
            owner: OwnerDto::from(&owner),
            pets: pets
                .iter()
                .map(|p| PetDto {
                    owner_name: Some(owner_name.clone()),
                    ..PetDto::from(p)
                })
                .collect(),
            upcoming_appointments: appointments.iter().map(AppointmentDto::from).collect(),
            recent_visits: visits.iter().map(VisitDto::from).collect(),
        })
    }

    /// The pet, its owner and every visit, most recent first.
    pub async fn get_full_pet_history(&self, pet_id: i64) -> Result<PetHistory, AppError> {
        let row = self
            .store
            .find_one(EntityKind::Pet, pet_id, &[Include::new("owner")])
            .await?
            .ok_or_else(|| AppError::not_found(EntityKind::Pet, pet_id))?;
        let pet: Pet = decode(EntityKind::Pet, row)?;
        let query = FindMany::new(Filter::new().and(Condition::Eq("pet_id", Value::from(pet_id))))
            .includes(vec![
                Include::new("vet"),
                Include::new("services").with(Include::new("service")),
            ])
            .order_by(OrderBy::desc("date"));
        let rows = self.store.find_many(EntityKind::Visit, &query).await?;
        let visits: Vec<Visit> = decode_all(EntityKind::Visit, rows)?;

        let pet_dto = PetDto::from(&pet);
        let owner_name = pet_dto.owner_name.clone();
        let visits: Vec<VisitDto> = visits
            .iter()
            .map(|v| VisitDto {
                pet_name: Some(pet.name.clone()),
                owner_name: owner_name.clone(),
                ..VisitDto::from(v)
            })
            .collect();
        let total_spent = visits.iter().map(|v| v.total_cost).sum();
        Ok(PetHistory {
            owner: pet.owner.as_deref().map(OwnerDto::from),
            pet: pet_dto,
            visits,
            total_spent,
        })
    }
}

fn not_cancelled() -> Condition {
    Condition::Ne(
        "status",
        Value::String(AppointmentStatus::Cancelled.as_str().into()),
    )
}

/// `from <= column < to`.
fn in_range(column: &'static str, from: DateTime<Utc>, to: DateTime<Utc>) -> Filter {
    Filter::new()
        .and(Condition::Gte(column, Value::String(from.to_rfc3339())))
        .and(Condition::Lt(column, Value::String(to.to_rfc3339())))
}

/// Live appointments of an owner on a later day, or today in a slot not yet started.
fn upcoming_for_owner(owner_id: i64, now: DateTime<Utc>) -> Filter {
    let day = now.date_naive();
    Filter::new()
        .and(Condition::Eq("owner_id", Value::from(owner_id)))
        .and(Condition::Gte("date", Value::String(start_of_day(day).to_rfc3339())))
        .and(Condition::Any(vec![
            Condition::Gte("date", Value::String(start_of_next_day(day).to_rfc3339())),
            Condition::Gte("time_slot", Value::String(now.format("%H:%M").to_string())),
        ]))
        .and(not_cancelled())
}

/// Non-cancelled appointments of a vet on a UTC calendar day.
fn live_bookings(vet_id: i64, day: NaiveDate) -> Filter {
    let (from, to) = day_bounds(day);
    let mut filter = in_range("date", from, to);
    filter.push(Condition::Eq("vet_id", Value::from(vet_id)));
    filter.push(not_cancelled());
    filter
}

fn row_id(kind: EntityKind, row: &Value) -> Result<i64, AppError> {
    row.get(PRIMARY_KEY)
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::Internal(format!("{} row without id", kind)))
}

fn required_i64(data: &Record, column: &str) -> Result<i64, AppError> {
    data.get(column)
        .and_then(Value::as_i64)
        .ok_or_else(|| AppError::Validation(format!("{} must be an integer", crate::case::to_camel_case(column))))
}

fn link_id(v: &Value) -> Option<i64> {
    match v {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_service_links(raw: Option<Value>) -> Result<Vec<ServiceLink>, AppError> {
    let items = match raw {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(_) => return Err(AppError::Validation("serviceIds must be an array".into())),
    };
    items
        .iter()
        .map(|item| {
            let (id, notes) = match item {
                Value::Object(obj) => (
                    obj.get("serviceId")
                        .or_else(|| obj.get("service_id"))
                        .or_else(|| obj.get(PRIMARY_KEY))
                        .and_then(link_id),
                    obj.get("notes").and_then(Value::as_str).map(str::to_string),
                ),
                other => (link_id(other), None),
            };
            id.map(|service_id| ServiceLink { service_id, notes })
                .ok_or_else(|| AppError::Validation("serviceIds must contain service ids".into()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn service_links_accept_ids_strings_and_objects() {
        let links = parse_service_links(Some(json!([3, "7", {"serviceId": 9, "notes": "left ear"}, {"id": "2"}])))
            .unwrap();
        assert_eq!(
            links,
            vec![
                ServiceLink { service_id: 3, notes: None },
                ServiceLink { service_id: 7, notes: None },
                ServiceLink { service_id: 9, notes: Some("left ear".into()) },
                ServiceLink { service_id: 2, notes: None },
            ]
        );
        assert!(parse_service_links(None).unwrap().is_empty());
        assert!(parse_service_links(Some(Value::Null)).unwrap().is_empty());
    }

    #[test]
    fn service_links_reject_garbage() {
        assert!(parse_service_links(Some(json!("3,7"))).is_err());
        assert!(parse_service_links(Some(json!([3, "seven"]))).is_err());
        assert!(parse_service_links(Some(json!([{"notes": "no id"}]))).is_err());
    }

    #[test]
    fn live_bookings_cover_the_whole_day() {
        let day = NaiveDate::from_ymd_opt(2025, 4, 10).unwrap();
        let filter = live_bookings(2, day);
        assert_eq!(
            filter.conditions,
            vec![
                Condition::Gte("date", json!("2025-04-10T00:00:00+00:00")),
                Condition::Lt("date", json!("2025-04-11T00:00:00+00:00")),
                Condition::Eq("vet_id", json!(2)),
                Condition::Ne("status", json!("cancelled")),
            ]
        );
    }

    #[test]
    fn upcoming_starts_at_the_current_slot() {
        let now = chrono::TimeZone::with_ymd_and_hms(&Utc, 2025, 4, 10, 12, 30, 0).unwrap();
        let filter = upcoming_for_owner(4, now);
        assert_eq!(
            filter.conditions,
            vec![
                Condition::Eq("owner_id", json!(4)),
                Condition::Gte("date", json!("2025-04-10T00:00:00+00:00")),
                Condition::Any(vec![
                    Condition::Gte("date", json!("2025-04-11T00:00:00+00:00")),
                    Condition::Gte("time_slot", json!("12:30")),
                ]),
                Condition::Ne("status", json!("cancelled")),
            ]
        );
    }
}
