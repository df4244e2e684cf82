//! Entity CRUD routes plus the scheduling endpoints hanging off them.
//! Visit and appointment creation go through the scheduler; everything else through the
//! entity's engine.

use crate::handlers::entity::{create, delete, list, read, update};
use crate::handlers::scheduling::{
    create_appointment, create_visit, daily_stats, owner_dashboard, pet_history, vet_availability,
};
use crate::hooks::{AppointmentHooks, OwnerHooks, PetHooks, ServiceHooks, VetHooks, VisitHooks};
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn entity_routes() -> Router<AppState> {
    Router::new()
        .route("/owners", get(list::<OwnerHooks>).post(create::<OwnerHooks>))
        .route(
            "/owners/:id",
            get(read::<OwnerHooks>)
                .patch(update::<OwnerHooks>)
                .delete(delete::<OwnerHooks>),
        )
        .route("/owners/:id/dashboard", get(owner_dashboard))
        .route("/pets", get(list::<PetHooks>).post(create::<PetHooks>))
        .route(
            "/pets/:id",
            get(read::<PetHooks>)
                .patch(update::<PetHooks>)
                .delete(delete::<PetHooks>),
        )
        .route("/pets/:id/history", get(pet_history))
        .route("/vets", get(list::<VetHooks>).post(create::<VetHooks>))
        .route(
            "/vets/:id",
            get(read::<VetHooks>)
                .patch(update::<VetHooks>)
                .delete(delete::<VetHooks>),
        )
        .route("/vets/:id/availability", get(vet_availability))
        .route("/services", get(list::<ServiceHooks>).post(create::<ServiceHooks>))
        .route(
            "/services/:id",
            get(read::<ServiceHooks>)
                .patch(update::<ServiceHooks>)
                .delete(delete::<ServiceHooks>),
        )
        .route("/visits", get(list::<VisitHooks>).post(create_visit))
        .route(
            "/visits/:id",
            get(read::<VisitHooks>)
                .patch(update::<VisitHooks>)
                .delete(delete::<VisitHooks>),
        )
        .route(
            "/appointments",
            get(list::<AppointmentHooks>).post(create_appointment),
        )
        .route(
            "/appointments/:id",
            get(read::<AppointmentHooks>)
                .patch(update::<AppointmentHooks>)
                .delete(delete::<AppointmentHooks>),
        )
        .route("/stats/daily", get(daily_stats))
}
