#![allow(dead_code)]

use chrono::Duration;
use serde_json::Value;
use std::sync::Arc;
use vetclinic::auth::{password_digest, StaffAccount};
use vetclinic::store::Record;
use vetclinic::{AppState, CredentialIssuer, JwtGate, MemoryStore, RecordingSink};

pub const SECRET: &str = "integration-secret";
pub const STAFF_EMAIL: &str = "desk@clinic.lt";
pub const STAFF_PASSWORD: &str = "correct horse";

pub fn record(v: Value) -> Record {
    match v {
        Value::Object(m) => m,
        other => panic!("expected an object, got {}", other),
    }
}

pub fn staff() -> StaffAccount {
    StaffAccount {
        email: STAFF_EMAIL.into(),
        name: "Front Desk".into(),
        role: "admin".into(),
        password_sha256: password_digest(STAFF_PASSWORD),
    }
}

/// Fresh in-memory application state and the sink that records its events.
pub fn state() -> (AppState, Arc<RecordingSink>) {
    let events = Arc::new(RecordingSink::new());
    let state = AppState::new(
        Arc::new(MemoryStore::new()),
        events.clone(),
        Arc::new(JwtGate::new(SECRET)),
        Arc::new(CredentialIssuer::new(SECRET, Duration::hours(1), vec![staff()])),
    );
    (state, events)
}

pub async fn owner(state: &AppState, first: &str, email: &str) -> i64 {
    state
        .owners
        .create(record(serde_json::json!({
            "first_name": first, "last_name": "Petraitis", "email": email
        })))
        .await
        .expect("owner")
        .id
}

pub async fn pet(state: &AppState, owner_id: i64, name: &str, species: &str) -> i64 {
    state
        .pets
        .create(record(serde_json::json!({
            "name": name, "species": species, "owner_id": owner_id
        })))
        .await
        .expect("pet")
        .id
}

pub async fn vet(state: &AppState, first: &str, email: &str) -> i64 {
    state
        .vets
        .create(record(serde_json::json!({
            "first_name": first, "last_name": "Jonaitė", "email": email, "specialty": "Surgery"
        })))
        .await
        .expect("vet")
        .id
}

pub async fn service(state: &AppState, name: &str, price: f64) -> i64 {
    state
        .services
        .create(record(serde_json::json!({"name": name, "price": price})))
        .await
        .expect("service")
        .id
}
