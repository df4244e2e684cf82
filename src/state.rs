//! Shared application state: one engine per entity, the scheduler, the store and the
//! access collaborators. Handlers extract the piece they need through `FromRef`.

use crate::auth::{AccessGate, CredentialIssuer};
use crate::events::EventSink;
use crate::hooks::{AppointmentHooks, OwnerHooks, PetHooks, ServiceHooks, VetHooks, VisitHooks};
use crate::service::{CrudEngine, Scheduler};
use crate::sort::SortResolver;
use crate::store::EntityStore;
use axum::extract::FromRef;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EntityStore>,
    pub owners: Arc<CrudEngine<OwnerHooks>>,
    pub pets: Arc<CrudEngine<PetHooks>>,
    pub vets: Arc<CrudEngine<VetHooks>>,
    pub services: Arc<CrudEngine<ServiceHooks>>,
    pub visits: Arc<CrudEngine<VisitHooks>>,
    pub appointments: Arc<CrudEngine<AppointmentHooks>>,
    pub scheduler: Arc<Scheduler>,
    pub gate: Arc<dyn AccessGate>,
    pub issuer: Arc<CredentialIssuer>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn EntityStore>,
        events: Arc<dyn EventSink>,
        gate: Arc<dyn AccessGate>,
        issuer: Arc<CredentialIssuer>,
    ) -> Self {
        let sorter = Arc::new(SortResolver::default());
        let owners = Arc::new(CrudEngine::new(OwnerHooks, store.clone(), events.clone(), sorter.clone()));
        let pets = Arc::new(CrudEngine::new(PetHooks, store.clone(), events.clone(), sorter.clone()));
        let vets = Arc::new(CrudEngine::new(VetHooks, store.clone(), events.clone(), sorter.clone()));
        let services = Arc::new(CrudEngine::new(ServiceHooks, store.clone(), events.clone(), sorter.clone()));
        let visits = Arc::new(CrudEngine::new(VisitHooks, store.clone(), events.clone(), sorter.clone()));
        let appointments = Arc::new(CrudEngine::new(AppointmentHooks, store.clone(), events.clone(), sorter));
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            events,
            visits.clone(),
            appointments.clone(),
        ));
        AppState {
            store,
            owners,
            pets,
            vets,
            services,
            visits,
            appointments,
            scheduler,
            gate,
            issuer,
        }
    }
}

macro_rules! from_state {
    ($($field:ident: $ty:ty),* $(,)?) => {
        $(
            impl FromRef<AppState> for $ty {
                fn from_ref(state: &AppState) -> Self {
                    state.$field.clone()
                }
            }
        )*
    };
}

from_state! {
    store: Arc<dyn EntityStore>,
    owners: Arc<CrudEngine<OwnerHooks>>,
    pets: Arc<CrudEngine<PetHooks>>,
    vets: Arc<CrudEngine<VetHooks>>,
    services: Arc<CrudEngine<ServiceHooks>>,
    visits: Arc<CrudEngine<VisitHooks>>,
    appointments: Arc<CrudEngine<AppointmentHooks>>,
    scheduler: Arc<Scheduler>,
    gate: Arc<dyn AccessGate>,
    issuer: Arc<CredentialIssuer>,
}
