//! Application services: the per-entity CRUD engine, the scheduling coordinator and
//! request validation.

mod crud;
mod scheduling;
mod validation;

pub use crud::{clamp_paging, CrudEngine, ListRequest, Page, SortSpec, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
pub use scheduling::Scheduler;
pub use validation::{Format, Mode, RequestValidator, Rules, ValidationRule};
