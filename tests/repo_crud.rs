//! Repository CRUD, versioning, soft delete, lazy completion, and paging
//! against a real in-memory store.

mod common;

use common::{eager_fruit_mapping, fresh_factory, fruit_mapping, nutrition_mapping, Fruit, Nutrition};
use groundwork::{Lazy, LockMode, PageFilter, RepoError, Repository, SqliteRepository};
use rusqlite::types::Value;

#[test]
fn insert_assigns_identity_version_and_audit_stamp() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    let mut apple = Fruit::new("Apple", "Rosaceae", 52);
    repo.insert(&mut apple).unwrap();

    assert!(apple.state.id.is_some());
    assert_eq!(apple.state.version, Some(1));
    let audit = apple.state.audit.as_ref().unwrap();
    assert_eq!(audit.created_by, "system");
    assert!(audit.last_updated_by.is_none());

    let loaded = repo.get(apple.state.id.unwrap()).unwrap().unwrap();
    assert_eq!(loaded.name, "Apple");
    assert_eq!(loaded.family, "Rosaceae");
    assert_eq!(loaded.calories, 52);
    assert_eq!(loaded.state.version, Some(1));
    assert!(!loaded.state.is_deleted());
}

#[test]
fn get_returns_none_for_missing_rows() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    assert!(repo.get(404).unwrap().is_none());
}

#[test]
fn update_advances_the_version_and_stamps_the_updater() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    let mut banana = Fruit::new("Banana", "Musaceae", 89);
    repo.insert(&mut banana).unwrap();

    banana.calories = 95;
    repo.update(&mut banana).unwrap();
    assert_eq!(banana.state.version, Some(2));

    let loaded = repo.get(banana.state.id.unwrap()).unwrap().unwrap();
    assert_eq!(loaded.calories, 95);
    assert_eq!(loaded.state.version, Some(2));
    let audit = loaded.state.audit.unwrap();
    assert_eq!(audit.last_updated_by.as_deref(), Some("system"));
}

#[test]
fn concurrent_update_of_the_same_version_is_stale() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    let mut cherry = Fruit::new("Cherry", "Rosaceae", 50);
    repo.insert(&mut cherry).unwrap();
    let key = cherry.state.id.unwrap();

    let mut first = repo.get(key).unwrap().unwrap();
    let mut second = repo.get(key).unwrap().unwrap();

    first.calories = 51;
    repo.update(&mut first).unwrap();

    second.calories = 52;
    let err = repo.update(&mut second).unwrap_err();
    assert!(matches!(err, RepoError::StaleVersion { .. }));
}

#[test]
fn failed_update_leaves_the_in_memory_instance_unstamped() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    let mut date = Fruit::new("Date", "Arecaceae", 282);
    repo.insert(&mut date).unwrap();
    let key = date.state.id.unwrap();

    let mut winner = repo.get(key).unwrap().unwrap();
    let mut loser = repo.get(key).unwrap().unwrap();
    winner.calories = 283;
    repo.update(&mut winner).unwrap();

    loser.calories = 284;
    let err = repo.update(&mut loser).unwrap_err();
    assert!(matches!(err, RepoError::StaleVersion { .. }));

    let audit = loser.state.audit.as_ref().unwrap();
    assert!(audit.last_updated_by.is_none());
    assert!(audit.last_updated_date.is_none());
    assert_eq!(loser.state.version, Some(1));
}

#[test]
fn update_of_a_vanished_row_is_not_found() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    let mut fig = Fruit::new("Fig", "Moraceae", 74);
    repo.insert(&mut fig).unwrap();
    repo.delete(&fig).unwrap();

    fig.calories = 75;
    let err = repo.update(&mut fig).unwrap_err();
    assert!(matches!(err, RepoError::NotFound { .. }));
}

#[test]
fn update_of_a_transient_instance_is_rejected() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    let mut transient = Fruit::new("Ghost", "None", 0);
    let err = repo.update(&mut transient).unwrap_err();
    assert!(matches!(err, RepoError::TransientInstance { .. }));
}

#[test]
fn soft_delete_writes_the_tombstone_and_keeps_the_row_readable() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    let mut mango = Fruit::new("Mango", "Anacardiaceae", 60);
    repo.insert(&mut mango).unwrap();
    let key = mango.state.id.unwrap();

    assert!(repo.delete_by_id(key, true).unwrap());

    let loaded = repo.get(key).unwrap().unwrap();
    assert!(loaded.state.is_deleted());
    let stamp = loaded.state.soft_delete.unwrap();
    assert_eq!(stamp.deleted_by, "system");
    assert_eq!(loaded.state.version, Some(1));
}

#[test]
fn hard_delete_removes_the_row_and_reports_misses() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    let mut lime = Fruit::new("Lime", "Rutaceae", 30);
    repo.insert(&mut lime).unwrap();
    let key = lime.state.id.unwrap();

    assert!(repo.delete_by_id(key, false).unwrap());
    assert!(repo.get(key).unwrap().is_none());
    assert!(!repo.delete_by_id(key, false).unwrap());
}

#[test]
fn save_or_update_dispatches_on_identity() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    let mut pear = Fruit::new("Pear", "Rosaceae", 57);
    repo.save_or_update(&mut pear).unwrap();
    assert_eq!(pear.state.version, Some(1));

    pear.calories = 58;
    repo.save_or_update(&mut pear).unwrap();
    assert_eq!(pear.state.version, Some(2));
}

#[test]
fn merge_reattaches_a_detached_copy_and_preserves_the_creation_stamp() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    let mut plum = Fruit::new("Plum", "Rosaceae", 46);
    repo.insert(&mut plum).unwrap();
    let created_by = plum.state.audit.as_ref().unwrap().created_by.clone();

    let mut detached = plum.clone();
    detached.state.audit = None;
    detached.calories = 48;

    let merged = repo.merge(&detached).unwrap();
    assert_eq!(merged.calories, 48);
    assert_eq!(merged.state.version, Some(2));
    assert_eq!(merged.state.audit.as_ref().unwrap().created_by, created_by);

    let loaded = repo.get(plum.state.id.unwrap()).unwrap().unwrap();
    assert_eq!(loaded.calories, 48);
}

#[test]
fn merge_on_a_transient_instance_persists_a_copy() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    let transient = Fruit::new("Quince", "Rosaceae", 57);
    let merged = repo.merge(&transient).unwrap();

    assert!(transient.state.id.is_none());
    assert!(merged.state.id.is_some());
    assert_eq!(merged.state.version, Some(1));
    assert_eq!(repo.get_all().count(&session).unwrap(), 1);
}

#[test]
fn refresh_overwrites_in_memory_changes() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    let mut kiwi = Fruit::new("Kiwi", "Actinidiaceae", 61);
    repo.insert(&mut kiwi).unwrap();

    kiwi.calories = 999;
    repo.refresh(&mut kiwi).unwrap();
    assert_eq!(kiwi.calories, 61);
}

#[test]
fn is_valid_is_a_typed_unimplemented_fault() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    let peach = Fruit::new("Peach", "Rosaceae", 39);
    assert!(matches!(
        repo.is_valid(&peach).unwrap_err(),
        RepoError::NotImplemented("is_valid")
    ));
}

#[test]
fn get_identifier_requires_a_tracked_instance() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    let mut grape = Fruit::new("Grape", "Vitaceae", 67);
    repo.insert(&mut grape).unwrap();
    assert_eq!(repo.get_identifier(&grape).unwrap(), grape.state.id.unwrap());

    let other_session = factory.open_session().unwrap();
    let other_repo = SqliteRepository::<Fruit>::new(&other_session, fruit_mapping());
    assert!(matches!(
        other_repo.get_identifier(&grape).unwrap_err(),
        RepoError::NotTracked { .. }
    ));
}

#[test]
fn get_locked_write_intent_returns_the_row() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    let mut melon = Fruit::new("Melon", "Cucurbitaceae", 34);
    repo.insert(&mut melon).unwrap();
    let key = melon.state.id.unwrap();

    let locked = repo.get_locked(key, LockMode::Write).unwrap().unwrap();
    assert_eq!(locked.name, "Melon");
    assert_eq!(locked.state.version, Some(1));
}

#[test]
fn lazy_properties_complete_with_one_projection_read() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let nutrition_repo = SqliteRepository::<Nutrition>::new(&session, nutrition_mapping());
    let fruit_repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    let mut nutrition = Nutrition::new(10.4, 13.8);
    nutrition_repo.insert(&mut nutrition).unwrap();
    let nutrition_key = nutrition.state.id.unwrap();

    let mut apple = Fruit::new("Apple", "Rosaceae", 52);
    apple.nutrition = Some(Lazy::Unloaded(nutrition_key));
    fruit_repo.insert(&mut apple).unwrap();

    let mut loaded = fruit_repo.get(apple.state.id.unwrap()).unwrap().unwrap();
    assert!(loaded.genus.is_none());
    assert!(loaded.nutrition.is_none());

    fruit_repo.initialize_lazy_properties(&mut loaded).unwrap();
    assert_eq!(loaded.genus.as_deref(), Some("Apple genus"));
    let reference = loaded.nutrition.as_mut().unwrap();
    assert!(!reference.is_loaded());

    nutrition_repo.load_reference(reference).unwrap();
    let materialized = reference.loaded().unwrap();
    assert_eq!(materialized.state.id, Some(nutrition_key));
    assert!((materialized.sugar - 10.4).abs() < f64::EPSILON);
}

#[test]
fn lazy_completion_skips_references_on_mappings_without_them() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let nutrition_repo = SqliteRepository::<Nutrition>::new(&session, nutrition_mapping());
    let fruit_repo = SqliteRepository::<Fruit>::new(&session, eager_fruit_mapping());

    let mut nutrition = Nutrition::new(10.4, 13.8);
    nutrition_repo.insert(&mut nutrition).unwrap();

    let mut apple = Fruit::new("Apple", "Rosaceae", 52);
    apple.nutrition = Some(Lazy::Unloaded(nutrition.state.id.unwrap()));
    fruit_repo.insert(&mut apple).unwrap();

    let mut loaded = fruit_repo.get(apple.state.id.unwrap()).unwrap().unwrap();
    fruit_repo.initialize_lazy_properties(&mut loaded).unwrap();

    assert_eq!(loaded.genus.as_deref(), Some("Apple genus"));
    assert!(loaded.nutrition.is_none());
}

#[test]
fn paged_fetch_windows_deterministically_by_identifier() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    for i in 1..=25 {
        let mut fruit = Fruit::new(&format!("Fruit {i:02}"), "Various", i);
        repo.insert(&mut fruit).unwrap();
    }

    let page = repo.get_all_paged(None, 2, 10).unwrap();
    assert_eq!(page.page_number, 2);
    assert_eq!(page.page_size, 10);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.items.len(), 10);
    assert_eq!(page.items[0].name, "Fruit 11");
    assert_eq!(page.items[9].name, "Fruit 20");

    let last = repo.get_all_paged(None, 3, 10).unwrap();
    assert_eq!(last.items.len(), 5);
}

#[test]
fn paged_fetch_applies_an_optional_condition() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    for (name, family) in [
        ("Apple", "Rosaceae"),
        ("Pear", "Rosaceae"),
        ("Banana", "Musaceae"),
    ] {
        let mut fruit = Fruit::new(name, family, 50);
        repo.insert(&mut fruit).unwrap();
    }

    let page = repo
        .get_all_paged(
            Some(PageFilter {
                condition: Some("Family = ?".to_string()),
                values: vec![Value::Text("Rosaceae".to_string())],
            }),
            1,
            10,
        )
        .unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total_pages, 1);
}

#[test]
fn zero_page_size_is_a_precondition_fault() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());

    assert!(matches!(
        repo.get_all_paged(None, 1, 0).unwrap_err(),
        RepoError::InvalidPageRequest { .. }
    ));
    assert!(matches!(
        repo.get_all_paged(None, 0, 10).unwrap_err(),
        RepoError::InvalidPageRequest { .. }
    ));
}

#[test]
fn capability_free_entities_round_trip_without_state_columns() {
    let factory = fresh_factory();
    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Nutrition>::new(&session, nutrition_mapping());

    let mut nutrition = Nutrition::new(9.1, 11.0);
    repo.insert(&mut nutrition).unwrap();
    assert!(nutrition.state.version.is_none());
    assert!(nutrition.state.audit.is_none());

    let mut loaded = repo.get(nutrition.state.id.unwrap()).unwrap().unwrap();
    loaded.sugar = 9.5;
    repo.update(&mut loaded).unwrap();

    let reread = repo.get(nutrition.state.id.unwrap()).unwrap().unwrap();
    assert!((reread.sugar - 9.5).abs() < f64::EPSILON);
}
