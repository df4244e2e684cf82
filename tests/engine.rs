mod common;

use common::{owner, pet, record, service, state, vet};
use serde_json::json;
use std::collections::HashMap;
use vetclinic::events::DomainEvent;
use vetclinic::schema::EntityKind;
use vetclinic::service::{ListRequest, SortSpec};
use vetclinic::sort::Direction;
use vetclinic::store::{EntityStore, Filter};
use vetclinic::AppError;

fn request(pairs: &[(&str, &str)]) -> ListRequest {
    let params: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    ListRequest::from_params(params)
}

#[tokio::test]
async fn list_pages_are_bounded_and_counted() {
    let (state, _) = state();
    for i in 0..23 {
        owner(&state, &format!("Owner{:02}", i), &format!("o{}@example.com", i)).await;
    }

    let page = state.owners.list(&request(&[("page", "3"), ("page_size", "10")])).await.unwrap();
    assert_eq!(page.items.len(), 3);
    assert_eq!(page.total, 23);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.items[0].first_name, "Owner20");

    let page = state.owners.list(&request(&[("page", "0"), ("page_size", "500")])).await.unwrap();
    assert_eq!((page.page, page.page_size), (1, 100));
    assert_eq!(page.items.len(), 23);

    let page = state.owners.list(&ListRequest::default()).await.unwrap();
    assert_eq!((page.page, page.page_size, page.items.len()), (1, 10, 10));

    let page = state.owners.list(&request(&[("page", "9")])).await.unwrap();
    assert!(page.items.is_empty());
    assert_eq!(page.total, 23);
}

#[tokio::test]
async fn list_sorts_after_projection() {
    let (state, _) = state();
    owner(&state, "bob", "b@example.com").await;
    owner(&state, "Alice", "a@example.com").await;
    owner(&state, "Carl", "c@example.com").await;

    let mut req = ListRequest::default();
    req.sort = Some(SortSpec {
        key: "fullName".into(),
        direction: Direction::Desc,
    });
    let page = state.owners.list(&req).await.unwrap();
    let names: Vec<&str> = page.items.iter().map(|o| o.first_name.as_str()).collect();
    assert_eq!(names, ["Carl", "bob", "Alice"]);

    let page = state.owners.list(&ListRequest::default()).await.unwrap();
    let names: Vec<&str> = page.items.iter().map(|o| o.first_name.as_str()).collect();
    assert_eq!(names, ["bob", "Alice", "Carl"]);
}

#[tokio::test]
async fn species_filter_ignores_case() {
    let (state, _) = state();
    let ona = owner(&state, "Ona", "ona@example.com").await;
    pet(&state, ona, "Reksas", "Šuo").await;
    pet(&state, ona, "Murkė", "Katė").await;

    let page = state.pets.list(&request(&[("species", "šUO")])).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].name, "Reksas");
    assert_eq!(page.items[0].owner_name.as_deref(), Some("Ona Petraitis"));

    let page = state.pets.list(&request(&[("name", "murk")])).await.unwrap();
    assert_eq!(page.total, 1);

    let page = state.pets.list(&request(&[("owner_id", "nope")])).await.unwrap();
    assert_eq!(page.total, 0);
}

#[tokio::test]
async fn create_validates_and_normalizes() {
    let (state, events) = state();
    let err = state
        .owners
        .create(record(json!({"first_name": "Ona", "last_name": "K"})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m == "email is required"));

    let created = state
        .owners
        .create(record(json!({
            "id": 999, "first_name": "  Ona ", "last_name": "Kairė", "email": " ONA@Example.com",
            "created_at": "1999-01-01"
        })))
        .await
        .unwrap();
    assert_eq!(created.id, 1);
    assert_eq!(created.first_name, "Ona");
    assert_eq!(created.email, "ona@example.com");
    assert_eq!(created.full_name, "Ona Kairė");
    assert_ne!(created.created_at, "1999-01-01");
    assert_eq!(events.events(), vec![DomainEvent::Created { kind: EntityKind::Owner, id: 1 }]);

    let err = state
        .owners
        .create(record(json!({"first_name": "Other", "last_name": "K", "email": "ona@example.com"})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(ref m) if m == "email is already in use"));
}

#[tokio::test]
async fn create_with_missing_parent_is_not_found() {
    let (state, _) = state();
    let err = state
        .pets
        .create(record(json!({"name": "Rex", "species": "dog", "owner_id": 41})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(ref m) if m == "referenced ownerId does not exist"));
}

#[tokio::test]
async fn update_is_partial_and_distinguishes_missing_targets() {
    let (state, _) = state();
    let ona = owner(&state, "Ona", "ona@example.com").await;
    let rex = pet(&state, ona, "Rex", "dog").await;

    let updated = state
        .pets
        .update(rex, record(json!({"birth_date": "2020-06-01T10:00:00Z"})))
        .await
        .unwrap();
    assert_eq!(updated.birth_date.as_deref(), Some("2020-06-01"));
    assert_eq!(updated.name, "Rex");

    let unchanged = state.pets.update(rex, record(json!({"id": 5}))).await.unwrap();
    assert_eq!(unchanged, updated);

    let err = state.pets.update(rex, record(json!({"name": "  "}))).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    let err = state.pets.update(77, record(json!({"name": "Max"}))).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(ref m) if m == "pet 77 not found"));

    assert!(state.pets.get_by_id(77).await.unwrap().is_none());
}

#[tokio::test]
async fn scheduled_appointments_cannot_be_deleted() {
    let (state, events) = state();
    let ona = owner(&state, "Ona", "ona@example.com").await;
    let rex = pet(&state, ona, "Rex", "dog").await;
    let jonas = vet(&state, "Jonas", "jonas@clinic.lt").await;
    let booked = state
        .scheduler
        .create_appointment(record(json!({
            "date": "2025-04-10", "time_slot": "11:00", "pet_id": rex, "vet_id": jonas, "owner_id": ona
        })))
        .await
        .unwrap();

    let err = state.appointments.delete(booked.id).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert!(state.appointments.get_by_id(booked.id).await.unwrap().is_some());

    state
        .appointments
        .update(booked.id, record(json!({"status": "cancelled"})))
        .await
        .unwrap();
    assert!(events
        .events()
        .contains(&DomainEvent::AppointmentCancelled { id: booked.id }));

    assert_eq!(state.appointments.delete(booked.id).await.unwrap(), booked.id);
    assert!(state.appointments.get_by_id(booked.id).await.unwrap().is_none());

    let err = state.appointments.delete(booked.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn referenced_rows_are_not_deleted() {
    let (state, _) = state();
    let ona = owner(&state, "Ona", "ona@example.com").await;
    pet(&state, ona, "Rex", "dog").await;

    let err = state.owners.delete(ona).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(ref m) if m.contains("pets")));
    assert_eq!(state.owners.get_by_id(ona).await.unwrap().map(|o| o.pet_count), Some(1));
}

#[tokio::test]
async fn deleting_a_visit_removes_its_service_lines() {
    let (state, _) = state();
    let ona = owner(&state, "Ona", "ona@example.com").await;
    let rex = pet(&state, ona, "Rex", "dog").await;
    let jonas = vet(&state, "Jonas", "jonas@clinic.lt").await;
    let checkup = service(&state, "Checkup", 25.0).await;
    let visit = state
        .scheduler
        .create_visit_with_services(record(json!({
            "date": "2025-04-10", "diagnosis": "Healthy", "pet_id": rex, "vet_id": jonas,
            "service_ids": [checkup]
        })))
        .await
        .unwrap();

    let err = state.services.delete(checkup).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    state.visits.delete(visit.id).await.unwrap();
    let lines = state.store.count(EntityKind::VisitService, &Filter::new()).await.unwrap();
    assert_eq!(lines, 0);
    state.services.delete(checkup).await.unwrap();
}

#[tokio::test]
async fn ids_beyond_int8_are_rejected_as_input() {
    let (state, _) = state();
    let err = state
        .pets
        .create(record(json!({"name": "Rex", "species": "dog", "owner_id": u64::MAX})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m == "ownerId must be an integer"));
}

#[tokio::test]
async fn contact_and_price_rules() {
    let (state, _) = state();
    let err = state
        .owners
        .create(record(json!({
            "first_name": "Ona", "last_name": "K", "email": "ona@example.com", "phone": "call me"
        })))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m == "phone does not match required pattern"));

    let ona = owner(&state, "Ona", "ona@example.com").await;
    let err = state.owners.update(ona, record(json!({"phone": "12"}))).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m == "phone must be at least 5 characters"));
    let updated = state
        .owners
        .update(ona, record(json!({"phone": " +370 (600) 12-345 "})))
        .await
        .unwrap();
    assert_eq!(updated.phone.as_deref(), Some("+370 (600) 12-345"));

    let err = state
        .services
        .create(record(json!({"name": "Transplant", "price": 250000})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m == "price must be at most 100000"));
}

#[tokio::test]
async fn cancellation_is_announced_once() {
    let (state, events) = state();
    let ona = owner(&state, "Ona", "ona@example.com").await;
    let rex = pet(&state, ona, "Rex", "dog").await;
    let jonas = vet(&state, "Jonas", "jonas@clinic.lt").await;
    let booked = state
        .scheduler
        .create_appointment(record(json!({
            "date": "2025-04-10", "time_slot": "11:00", "pet_id": rex, "vet_id": jonas, "owner_id": ona
        })))
        .await
        .unwrap();

    let err = state
        .appointments
        .update(booked.id, record(json!({"status": "Cancelled"})))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    state
        .appointments
        .update(booked.id, record(json!({"status": "cancelled"})))
        .await
        .unwrap();
    state
        .appointments
        .update(booked.id, record(json!({"notes": "owner called"})))
        .await
        .unwrap();
    state
        .appointments
        .update(booked.id, record(json!({"status": "cancelled"})))
        .await
        .unwrap();

    let cancelled = events
        .events()
        .into_iter()
        .filter(|e| matches!(e, DomainEvent::AppointmentCancelled { .. }))
        .count();
    assert_eq!(cancelled, 1);
}

#[tokio::test]
async fn date_filters_are_whole_days_and_strict() {
    let (state, _) = state();
    let ona = owner(&state, "Ona", "ona@example.com").await;
    let rex = pet(&state, ona, "Rex", "dog").await;
    let jonas = vet(&state, "Jonas", "jonas@clinic.lt").await;
    for (date, diagnosis) in [
        ("2025-04-09T23:59:59Z", "Before"),
        ("2025-04-10T00:00:00Z", "Midnight"),
        ("2025-04-10T23:59:59.9995Z", "Last instant"),
        ("2025-04-11T00:00:00Z", "Next day"),
    ] {
        state
            .scheduler
            .create_visit_with_services(record(json!({
                "date": date, "diagnosis": diagnosis, "pet_id": rex, "vet_id": jonas
            })))
            .await
            .unwrap();
    }

    let page = state
        .visits
        .list(&request(&[("date_from", "2025-04-10"), ("date_to", "2025-04-10")]))
        .await
        .unwrap();
    let found: Vec<&str> = page.items.iter().map(|v| v.diagnosis.as_str()).collect();
    assert_eq!(found, ["Midnight", "Last instant"]);
    assert_eq!(page.total, 2);

    let err = state
        .visits
        .list(&request(&[("date_from", "last tuesday")]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m == "dateFrom must be a valid date"));

    let err = state
        .appointments
        .list(&request(&[("date_to", "2025-13-01")]))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(ref m) if m == "dateTo must be a valid date"));
}
