use super::{date_range, id_condition, to_instant, to_integer, trim_strings, EntityHooks};
use crate::dto::VisitDto;
use crate::error::AppError;
use crate::models::Visit;
use crate::schema::EntityKind;
use crate::service::{Rules, ValidationRule};
use crate::store::{Condition, Filter, Include, Record, StoreTransaction};
use serde_json::Value;
use std::collections::HashMap;

pub struct VisitHooks;

#[async_trait::async_trait]
impl EntityHooks for VisitHooks {
    type Record = Visit;
    type Dto = VisitDto;

    fn kind(&self) -> EntityKind {
        EntityKind::Visit
    }

    fn build_filter(&self, params: &HashMap<String, String>) -> Result<Filter, AppError> {
        let mut filter = Filter::new();
        for (key, column) in [("pet_id", "pet_id"), ("vet_id", "vet_id")] {
            if let Some(cond) = id_condition(params, key, column) {
                filter.push(cond);
            }
        }
        date_range(&mut filter, params, "date")?;
        Ok(filter)
    }

    fn project_one(&self, record: &Visit) -> VisitDto {
        VisitDto::from(record)
    }

    /// Pet with its owner, the vet, and each service line with its service.
    fn relations(&self) -> Vec<Include> {
        vec![
            Include::new("pet").with(Include::new("owner")),
            Include::new("vet"),
            Include::new("services").with(Include::new("service")),
        ]
    }

    fn validation_rules(&self) -> Rules {
        vec![
            ("date", ValidationRule::required().date()),
            ("diagnosis", ValidationRule::required().not_blank().max_length(2000)),
            ("pet_id", ValidationRule::required().integer()),
            ("vet_id", ValidationRule::required().integer()),
            ("notes", ValidationRule::optional().max_length(4000)),
        ]
    }

    fn normalize_input(&self, mut input: Record) -> Record {
        trim_strings(&mut input, &["diagnosis", "notes"]);
        to_instant(&mut input, "date");
        to_integer(&mut input, "pet_id");
        to_integer(&mut input, "vet_id");
        input
    }

    /// Service lines belong to the visit and go with it.
    async fn before_delete(&self, tx: &mut dyn StoreTransaction, id: i64) -> Result<(), AppError> {
        let lines = Filter::new().and(Condition::Eq("visit_id", Value::from(id)));
        let removed = tx.delete_where(EntityKind::VisitService, &lines).await?;
        tracing::debug!(visit_id = id, removed, "removed visit service lines");
        Ok(())
    }
}
