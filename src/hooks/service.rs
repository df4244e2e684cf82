use super::{param, search_condition, to_number, trim_strings, EntityHooks};
use crate::dto::ServiceDto;
use crate::error::AppError;
use crate::models::Service;
use crate::schema::EntityKind;
use crate::service::{Rules, ValidationRule};
use crate::store::{Condition, Filter, Record};
use std::collections::HashMap;

/// Upper bound on a single service price.
const MAX_PRICE: f64 = 100_000.0;

/// Billable clinic services.
pub struct ServiceHooks;

#[async_trait::async_trait]
impl EntityHooks for ServiceHooks {
    type Record = Service;
    type Dto = ServiceDto;

    fn kind(&self) -> EntityKind {
        EntityKind::Service
    }

    fn build_filter(&self, params: &HashMap<String, String>) -> Result<Filter, AppError> {
        let mut filter = Filter::new();
        if let Some(search) = search_condition(params, &["name", "description"]) {
            filter.push(search);
        }
        if let Some(category) = param(params, "category") {
            filter.push(Condition::EqIgnoreCase("category", category.to_string()));
        }
        Ok(filter)
    }

    fn project_one(&self, record: &Service) -> ServiceDto {
        ServiceDto::from(record)
    }

    fn validation_rules(&self) -> Rules {
        vec![
            ("name", ValidationRule::required().not_blank().max_length(150)),
            ("price", ValidationRule::optional().number().minimum(0.0).maximum(MAX_PRICE)),
            ("description", ValidationRule::optional().max_length(1000)),
            ("category", ValidationRule::optional().max_length(100)),
        ]
    }

    fn normalize_input(&self, mut input: Record) -> Record {
        trim_strings(&mut input, &["name", "description", "category"]);
        to_number(&mut input, "price");
        input
    }
}
