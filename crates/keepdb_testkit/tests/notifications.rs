//! Commit listeners and the change feed.

use keepdb_core::{
    ChangeType, Config, CoreError, CoreResult, Listener, Realm, SequenceNumber, UpdateMode, Values,
    CHANGE_EVENT,
};
use keepdb_testkit::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn counting_listener() -> (Listener, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let listener: Listener = Arc::new(move |_: &Realm, event: &str| -> CoreResult<()> {
        assert_eq!(event, CHANGE_EVENT);
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });
    (listener, calls)
}

fn commit_one(realm: &Realm) {
    realm
        .write(|r| {
            r.create(
                "TestObject",
                Values::new().with("doubleCol", 1.0),
                UpdateMode::Disallowed,
            )
            .map(drop)
        })
        .unwrap();
}

#[test]
fn same_listener_twice_fires_once_per_commit() {
    with_memory_realm(|realm| {
        let (listener, calls) = counting_listener();
        realm.on(CHANGE_EVENT, Arc::clone(&listener)).unwrap();
        realm.on(CHANGE_EVENT, Arc::clone(&listener)).unwrap();

        commit_one(realm);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        commit_one(realm);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        realm.off_all().unwrap();
        commit_one(realm);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    });
}

#[test]
fn off_removes_only_that_listener() {
    with_memory_realm(|realm| {
        let (first, first_calls) = counting_listener();
        let (second, second_calls) = counting_listener();
        realm.on(CHANGE_EVENT, Arc::clone(&first)).unwrap();
        realm.on(CHANGE_EVENT, Arc::clone(&second)).unwrap();

        realm.off(CHANGE_EVENT, &first).unwrap();
        commit_one(realm);
        assert_eq!(first_calls.load(Ordering::SeqCst), 0);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    });
}

#[test]
fn rolled_back_writes_do_not_notify() {
    with_memory_realm(|realm| {
        let (listener, calls) = counting_listener();
        realm.on(CHANGE_EVENT, listener).unwrap();
        let _ = realm.write(|_| Err::<(), _>(CoreError::aborted("no")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    });
}

#[test]
fn unknown_events_are_rejected() {
    with_memory_realm(|realm| {
        let (listener, _) = counting_listener();
        assert!(matches!(
            realm.on("commit", Arc::clone(&listener)),
            Err(CoreError::UnknownEvent { ref name }) if name == "commit"
        ));
        assert!(matches!(
            realm.off("", &listener),
            Err(CoreError::UnknownEvent { .. })
        ));
    });
}

#[test]
fn listener_error_surfaces_but_the_commit_stands() {
    with_memory_realm(|realm| {
        let (counted, calls) = counting_listener();
        let failing: Listener =
            Arc::new(|_: &Realm, _: &str| -> CoreResult<()> { Err(CoreError::aborted("listener")) });
        realm.on(CHANGE_EVENT, failing).unwrap();
        realm.on(CHANGE_EVENT, counted).unwrap();

        let err = realm
            .write(|r| {
                r.create(
                    "TestObject",
                    Values::new().with("doubleCol", 7.0),
                    UpdateMode::Disallowed,
                )
                .map(drop)
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Aborted { .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!realm.is_in_transaction());
        assert_eq!(scenarios::test_object_values(realm), vec![7.0]);
    });
}

#[test]
fn listeners_see_committed_state() {
    with_memory_realm(|realm| {
        let seen = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&seen);
        realm
            .on(
                CHANGE_EVENT,
                Arc::new(move |r: &Realm, _: &str| -> CoreResult<()> {
                    observed.store(r.objects("TestObject")?.len()?, Ordering::SeqCst);
                    Ok(())
                }),
            )
            .unwrap();
        commit_one(realm);
        commit_one(realm);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    });
}

#[test]
fn listeners_belong_to_their_handle() {
    let test = TestRealm::new();
    let other = test.second_handle(Config::new()).unwrap();
    let (listener, calls) = counting_listener();
    other.on(CHANGE_EVENT, listener).unwrap();

    commit_one(&test);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    commit_one(&other);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    other.close();
    assert!(matches!(other.off_all(), Err(CoreError::DatabaseClosed)));
}

#[test]
fn change_feed_reports_each_object() {
    let test = TestRealm::new();
    let other = test.second_handle(Config::new()).unwrap();
    let events = other.subscribe_changes().unwrap();

    scenarios::populate_int_primary(&test, 2);
    test.write(|r| {
        r.create(
            "IntPrimaryObject",
            Values::new().with("primaryCol", 0).with("valueCol", "changed"),
            UpdateMode::Upsert,
        )
        .map(drop)
    })
    .unwrap();
    test.write(|r| {
        let gone = r
            .find_by_primary_key("IntPrimaryObject", 1)?
            .expect("key 1 exists");
        r.delete(gone)
    })
    .unwrap();

    let received: Vec<_> = events.try_iter().collect();
    let kinds: Vec<ChangeType> = received.iter().map(|e| e.change_type).collect();
    assert_eq!(
        kinds,
        vec![
            ChangeType::Insert,
            ChangeType::Insert,
            ChangeType::Update,
            ChangeType::Delete
        ]
    );
    assert!(received.iter().all(|e| e.object_type == "IntPrimaryObject"));
    assert!(received.windows(2).all(|w| w[0].sequence <= w[1].sequence));
    assert!(received[3].payload.is_none());

    let history = test.changes_since(SequenceNumber::default(), 10).unwrap();
    assert_eq!(history.len(), 4);
    other.close();
}
