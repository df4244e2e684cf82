use super::{id_condition, param, to_day, to_integer, trim_strings, EntityHooks};
use crate::dto::PetDto;
use crate::error::AppError;
use crate::models::Pet;
use crate::schema::EntityKind;
use crate::service::{Rules, ValidationRule};
use crate::store::{Condition, Filter, Include, Record};
use std::collections::HashMap;

pub struct PetHooks;

#[async_trait::async_trait]
impl EntityHooks for PetHooks {
    type Record = Pet;
    type Dto = PetDto;

    fn kind(&self) -> EntityKind {
        EntityKind::Pet
    }

    /// `owner_id` exact, `species` exact ignoring case, `name` substring.
    fn build_filter(&self, params: &HashMap<String, String>) -> Result<Filter, AppError> {
        let mut filter = Filter::new();
        if let Some(owner) = id_condition(params, "owner_id", "owner_id") {
            filter.push(owner);
        }
        if let Some(species) = param(params, "species") {
            filter.push(Condition::EqIgnoreCase("species", species.to_string()));
        }
        if let Some(name) = param(params, "name") {
            filter.push(Condition::Contains("name", name.to_string()));
        }
        Ok(filter)
    }

    fn project_one(&self, record: &Pet) -> PetDto {
        PetDto::from(record)
    }

    fn relations(&self) -> Vec<Include> {
        vec![Include::new("owner")]
    }

    fn validation_rules(&self) -> Rules {
        vec![
            ("name", ValidationRule::required().not_blank().max_length(100)),
            ("species", ValidationRule::required().not_blank().max_length(50)),
            ("owner_id", ValidationRule::required().integer()),
            ("birth_date", ValidationRule::optional().date()),
            ("breed", ValidationRule::optional().max_length(100)),
            ("gender", ValidationRule::optional().max_length(20)),
        ]
    }

    fn normalize_input(&self, mut input: Record) -> Record {
        trim_strings(&mut input, &["name", "species", "breed", "gender"]);
        to_day(&mut input, "birth_date");
        to_integer(&mut input, "owner_id");
        input
    }
}
