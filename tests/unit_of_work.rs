//! Unit-of-work lifecycle: commit and rollback semantics, recovery, and
//! the single-active-scope context.

mod common;

use common::{fresh_factory, fruit_mapping, Fruit};
use groundwork::{
    should_commit_or_rollback, Repository, SqliteRepository, UnitOfWork, UnitOfWorkContext,
    UowError,
};

#[test]
fn commit_and_rollback_require_a_begun_transaction() {
    let factory = fresh_factory();

    let mut uow = UnitOfWork::open(&factory).unwrap();
    assert!(matches!(uow.commit().unwrap_err(), UowError::NoTransaction));
    assert!(matches!(
        uow.rollback().unwrap_err(),
        UowError::NoTransaction
    ));
}

#[test]
fn committed_work_is_visible_to_a_new_session() {
    let factory = fresh_factory();

    let mut uow = UnitOfWork::open(&factory).unwrap();
    uow.begin_transaction().unwrap();
    let key = {
        let repo = SqliteRepository::<Fruit>::new(uow.session(), fruit_mapping());
        let mut apple = Fruit::new("Apple", "Rosaceae", 52);
        repo.insert(&mut apple).unwrap();
        apple.state.id.unwrap()
    };
    uow.commit().unwrap();
    uow.session().close();

    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());
    assert!(repo.get(key).unwrap().is_some());
}

#[test]
fn rolled_back_work_leaves_no_trace() {
    let factory = fresh_factory();

    let mut uow = UnitOfWork::open(&factory).unwrap();
    uow.begin_transaction().unwrap();
    let key = {
        let repo = SqliteRepository::<Fruit>::new(uow.session(), fruit_mapping());
        let mut banana = Fruit::new("Banana", "Musaceae", 89);
        repo.insert(&mut banana).unwrap();
        banana.state.id.unwrap()
    };
    uow.rollback().unwrap();
    uow.session().close();

    let session = factory.open_session().unwrap();
    let repo = SqliteRepository::<Fruit>::new(&session, fruit_mapping());
    assert!(repo.get(key).unwrap().is_none());
}

#[test]
fn commit_is_idempotent_after_success() {
    let factory = fresh_factory();

    let mut uow = UnitOfWork::open(&factory).unwrap();
    uow.begin_transaction().unwrap();
    uow.commit().unwrap();
    uow.commit().unwrap();
    assert!(uow.transaction().unwrap().was_committed());
}

#[test]
fn rollback_is_idempotent_after_success() {
    let factory = fresh_factory();

    let mut uow = UnitOfWork::open(&factory).unwrap();
    uow.begin_transaction().unwrap();
    uow.rollback().unwrap();
    uow.rollback().unwrap();
    assert!(uow.transaction().unwrap().was_rolled_back());
}

#[test]
fn failed_rollback_recovers_onto_a_fresh_session() {
    let factory = fresh_factory();

    let mut uow = UnitOfWork::open(&factory).unwrap();
    uow.begin_transaction().unwrap();

    // Forcing the rollback statement to fail by closing the session
    // underneath it.
    uow.session().close();
    uow.rollback().unwrap();

    assert!(uow.transaction().unwrap().was_rolled_back());
    assert!(uow.session().is_open());
    uow.begin_transaction().unwrap();
    uow.commit().unwrap();
}

#[test]
fn scope_exit_predicate_follows_the_transaction_state() {
    let factory = fresh_factory();

    let mut uow = UnitOfWork::open(&factory).unwrap();
    assert!(!should_commit_or_rollback(uow.transaction()));

    uow.begin_transaction().unwrap();
    assert!(should_commit_or_rollback(uow.transaction()));

    uow.commit().unwrap();
    assert!(!should_commit_or_rollback(uow.transaction()));
}

#[test]
fn begin_transaction_reopens_a_closed_session() {
    let factory = fresh_factory();

    let mut uow = UnitOfWork::open(&factory).unwrap();
    uow.session().close();
    assert!(!uow.session().is_open());

    uow.begin_transaction().unwrap();
    assert!(uow.session().is_open());
    uow.commit().unwrap();
}

#[test]
fn context_holds_at_most_one_active_unit_of_work() {
    let factory = fresh_factory();
    let mut context = UnitOfWorkContext::new();

    context.begin(&factory).unwrap();
    assert!(context.current().is_some());
    assert!(matches!(
        context.begin(&factory).unwrap_err(),
        UowError::AlreadyActive
    ));

    let released = context.release();
    assert!(released.is_some());
    assert!(context.current().is_none());
    context.begin(&factory).unwrap();
}

#[test]
fn insert_then_soft_delete_across_two_units_of_work() {
    let factory = fresh_factory();
    let mut context = UnitOfWorkContext::new();

    let key = {
        let uow = context.begin(&factory).unwrap();
        uow.begin_transaction().unwrap();
        let key = {
            let repo = SqliteRepository::<Fruit>::new(uow.session(), fruit_mapping());
            let mut mango = Fruit::new("Mango", "Anacardiaceae", 60);
            repo.insert(&mut mango).unwrap();
            mango.state.id.unwrap()
        };
        uow.commit().unwrap();
        context.release().unwrap().session().close();
        key
    };

    let uow = context.begin(&factory).unwrap();
    uow.begin_transaction().unwrap();
    {
        let repo = SqliteRepository::<Fruit>::new(uow.session(), fruit_mapping());
        assert!(repo.delete_by_id(key, true).unwrap());
    }
    uow.commit().unwrap();

    let repo = SqliteRepository::<Fruit>::new(uow.session(), fruit_mapping());
    let loaded = repo.get(key).unwrap().unwrap();
    assert!(loaded.state.is_deleted());
}
