use super::{lowercase, param, phone_rule, search_condition, trim_strings, EntityHooks};
use crate::dto::VetDto;
use crate::error::AppError;
use crate::models::Vet;
use crate::schema::EntityKind;
use crate::service::{Rules, ValidationRule};
use crate::store::{Condition, Filter, Record};
use std::collections::HashMap;

pub struct VetHooks;

#[async_trait::async_trait]
impl EntityHooks for VetHooks {
    type Record = Vet;
    type Dto = VetDto;

    fn kind(&self) -> EntityKind {
        EntityKind::Vet
    }

    fn build_filter(&self, params: &HashMap<String, String>) -> Result<Filter, AppError> {
        let mut filter = Filter::new();
        if let Some(search) = search_condition(params, &["first_name", "last_name", "email"]) {
            filter.push(search);
        }
        if let Some(specialty) = param(params, "specialty") {
            filter.push(Condition::EqIgnoreCase("specialty", specialty.to_string()));
        }
        Ok(filter)
    }

    fn project_one(&self, record: &Vet) -> VetDto {
        VetDto::from(record)
    }

    fn validation_rules(&self) -> Rules {
        vec![
            ("first_name", ValidationRule::required().not_blank().max_length(100)),
            ("last_name", ValidationRule::required().not_blank().max_length(100)),
            ("email", ValidationRule::required().email().max_length(255)),
            ("specialty", ValidationRule::optional().max_length(100)),
            ("phone", phone_rule()),
        ]
    }

    fn normalize_input(&self, mut input: Record) -> Record {
        trim_strings(&mut input, &["first_name", "last_name", "specialty", "phone"]);
        lowercase(&mut input, "email");
        input
    }
}
