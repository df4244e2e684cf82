use super::{lowercase, phone_rule, search_condition, trim_strings, EntityHooks};
use crate::dto::OwnerDto;
use crate::error::AppError;
use crate::models::Owner;
use crate::schema::EntityKind;
use crate::service::{Rules, ValidationRule};
use crate::store::{Filter, Include, Record};
use std::collections::HashMap;

pub struct OwnerHooks;

#[async_trait::async_trait]
impl EntityHooks for OwnerHooks {
    type Record = Owner;
    type Dto = OwnerDto;

    fn kind(&self) -> EntityKind {
        EntityKind::Owner
    }

    /// `search` over first name, last name and email.
    fn build_filter(&self, params: &HashMap<String, String>) -> Result<Filter, AppError> {
        let mut filter = Filter::new();
        if let Some(search) = search_condition(params, &["first_name", "last_name", "email"]) {
            filter.push(search);
        }
        Ok(filter)
    }

    fn project_one(&self, record: &Owner) -> OwnerDto {
        OwnerDto::from(record)
    }

    fn relations(&self) -> Vec<Include> {
        vec![Include::new("pets")]
    }

    fn validation_rules(&self) -> Rules {
        vec![
            ("first_name", ValidationRule::required().not_blank().max_length(100)),
            ("last_name", ValidationRule::required().not_blank().max_length(100)),
            ("email", ValidationRule::required().email().max_length(255)),
            ("phone", phone_rule()),
            ("address", ValidationRule::optional().max_length(255)),
        ]
    }

    fn normalize_input(&self, mut input: Record) -> Record {
        trim_strings(&mut input, &["first_name", "last_name", "phone", "address"]);
        lowercase(&mut input, "email");
        input
    }
}
