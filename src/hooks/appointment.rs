use super::{date_range, id_condition, param, to_instant, to_integer, EntityHooks};
use crate::dto::AppointmentDto;
use crate::error::AppError;
use crate::events::{emit, DomainEvent, EventSink};
use crate::models::{decode, Appointment, AppointmentStatus, STATUSES, TIME_SLOTS};
use crate::schema::EntityKind;
use crate::service::{Rules, ValidationRule};
use crate::store::{Condition, Filter, Include, Record, StoreTransaction};
use serde_json::Value;
use std::collections::HashMap;

pub struct AppointmentHooks;

#[async_trait::async_trait]
impl EntityHooks for AppointmentHooks {
    type Record = Appointment;
    type Dto = AppointmentDto;

    fn kind(&self) -> EntityKind {
        EntityKind::Appointment
    }

    fn build_filter(&self, params: &HashMap<String, String>) -> Result<Filter, AppError> {
        let mut filter = Filter::new();
        for key in ["vet_id", "owner_id", "pet_id"] {
            if let Some(cond) = id_condition(params, key, key) {
                filter.push(cond);
            }
        }
        if let Some(status) = param(params, "status") {
            filter.push(Condition::Eq("status", Value::String(status.to_lowercase())));
        }
        date_range(&mut filter, params, "date")?;
        Ok(filter)
    }

    fn project_one(&self, record: &Appointment) -> AppointmentDto {
        AppointmentDto::from(record)
    }

    fn relations(&self) -> Vec<Include> {
        vec![Include::new("pet"), Include::new("vet"), Include::new("owner")]
    }

    fn validation_rules(&self) -> Rules {
        vec![
            ("date", ValidationRule::required().date()),
            ("time_slot", ValidationRule::required().one_of(&TIME_SLOTS)),
            ("status", ValidationRule::optional().one_of(&STATUSES)),
            ("pet_id", ValidationRule::required().integer()),
            ("vet_id", ValidationRule::required().integer()),
            ("owner_id", ValidationRule::required().integer()),
            ("notes", ValidationRule::optional().max_length(2000)),
        ]
    }

    fn normalize_input(&self, mut input: Record) -> Record {
        to_instant(&mut input, "date");
        for col in ["pet_id", "vet_id", "owner_id"] {
            to_integer(&mut input, col);
        }
        input
    }

    async fn after_update(
        &self,
        events: &dyn EventSink,
        before: &Appointment,
        after: &Appointment,
    ) -> Result<(), AppError> {
        if before.status != AppointmentStatus::Cancelled && after.status == AppointmentStatus::Cancelled {
            emit(events, DomainEvent::AppointmentCancelled { id: after.id });
        }
        Ok(())
    }

    /// Scheduled appointments must be cancelled or completed before they can be deleted.
    async fn before_delete(&self, tx: &mut dyn StoreTransaction, id: i64) -> Result<(), AppError> {
        let Some(row) = tx.find_one(EntityKind::Appointment, id, &[]).await? else {
            return Ok(());
        };
        let appointment: Appointment = decode(EntityKind::Appointment, row)?;
        if appointment.status == AppointmentStatus::Scheduled {
            return Err(AppError::Conflict(
                "cannot delete a scheduled appointment; cancel or complete it first".into(),
            ));
        }
        Ok(())
    }
}
