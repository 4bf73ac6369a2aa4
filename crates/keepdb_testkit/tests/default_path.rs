//! The process-wide default path. Kept in its own test binary since it
//! changes global state.

use keepdb_core::{default_path, set_default_path, Config, Realm};
use keepdb_testkit::prelude::*;
use std::fs;
use tempfile::tempdir;

#[test]
fn configs_without_a_path_use_the_default() {
    let dir = tempdir().unwrap();
    let default = dir.path().join("default.keepdb");
    set_default_path(&default);
    assert_eq!(default_path(), default);

    let realm = Realm::open(Config::new().schema([test_object()])).unwrap();
    let opened = fs::canonicalize(realm.path().unwrap()).unwrap();
    assert_eq!(opened, fs::canonicalize(&default).unwrap());
    scenarios::populate_test_objects(&realm, 1);
    realm.close();

    let relative = Realm::open(Config::new().path("nested.keepdb").schema([test_object()])).unwrap();
    let opened = fs::canonicalize(relative.path().unwrap()).unwrap();
    assert_eq!(
        opened,
        fs::canonicalize(dir.path()).unwrap().join("nested.keepdb")
    );
    assert!(scenarios::test_object_values(&relative).is_empty());
    relative.close();

    let again = Realm::open(Config::new()).unwrap();
    assert_eq!(scenarios::test_object_values(&again), vec![0.0]);
    again.close();
}
