//! Creating, updating, finding and deleting objects.

use keepdb_core::{CoreError, Input, Object, Realm, UpdateMode, Value, Values};
use keepdb_testkit::prelude::*;

fn value_col(realm: &Realm, key: i64) -> Option<Value> {
    realm
        .find_by_primary_key("IntPrimaryObject", key)
        .unwrap()
        .map(|object| object.get("valueCol").unwrap())
}

#[test]
fn objects_come_back_in_creation_order() {
    let test = TestRealm::new();
    scenarios::populate_test_objects(&test, 5);
    assert_eq!(
        scenarios::test_object_values(&test),
        vec![0.0, 1.0, 2.0, 3.0, 4.0]
    );
}

#[test]
fn create_outside_write_fails() {
    with_memory_realm(|realm| {
        let err = realm
            .create(
                "TestObject",
                Values::new().with("doubleCol", 1.0),
                UpdateMode::Disallowed,
            )
            .unwrap_err();
        assert!(matches!(err, CoreError::OutsideTransaction));
        assert!(err.is_transaction_state());
    });
}

#[test]
fn positional_values_follow_declared_order() {
    with_memory_realm(|realm| {
        let object = realm
            .write(|r| {
                r.create(
                    "IntPrimaryObject",
                    Values::positional([Input::from(7), Input::from("seven")]),
                    UpdateMode::Disallowed,
                )
            })
            .unwrap();
        assert_eq!(object.get("primaryCol").unwrap(), Value::Int(7));
        assert_eq!(object.get("valueCol").unwrap(), Value::String("seven".into()));

        let err = realm
            .write(|r| {
                r.create(
                    "IntPrimaryObject",
                    Values::positional([Input::from(8), Input::from("a"), Input::from("b")]),
                    UpdateMode::Disallowed,
                )
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::Configuration { .. }));
    });
}

#[test]
fn duplicate_primary_key_is_rejected() {
    with_memory_realm(|realm| {
        scenarios::populate_int_primary(realm, 1);
        let err = realm
            .write(|r| {
                r.create(
                    "IntPrimaryObject",
                    Values::new().with("primaryCol", 0).with("valueCol", "other"),
                    UpdateMode::Disallowed,
                )
            })
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::DuplicateKey { ref object_type, .. } if object_type == "IntPrimaryObject"
        ));
        assert_eq!(value_col(realm, 0), Some(Value::String("val0".into())));
    });
}

#[test]
fn upsert_leaves_unspecified_fields_unchanged() {
    with_memory_realm(|realm| {
        realm
            .write(|r| {
                r.create(
                    "IntPrimaryObject",
                    Values::new().with("primaryCol", 0).with("valueCol", "val0"),
                    UpdateMode::Disallowed,
                )
            })
            .unwrap();
        realm
            .write(|r| {
                r.create(
                    "IntPrimaryObject",
                    Values::new().with("primaryCol", 0),
                    UpdateMode::Upsert,
                )
            })
            .unwrap();
        assert_eq!(value_col(realm, 0), Some(Value::String("val0".into())));

        let same = realm
            .write(|r| {
                r.create(
                    "IntPrimaryObject",
                    Values::new().with("primaryCol", 0).with("valueCol", "val1"),
                    UpdateMode::Upsert,
                )
            })
            .unwrap();
        assert_eq!(same.get("valueCol").unwrap(), Value::String("val1".into()));
        assert_eq!(realm.objects("IntPrimaryObject").unwrap().len().unwrap(), 1);
    });
}

#[test]
fn upsert_of_a_new_key_needs_required_fields() {
    with_memory_realm(|realm| {
        let err = realm
            .write(|r| {
                r.create(
                    "IntPrimaryObject",
                    Values::new().with("primaryCol", 3),
                    UpdateMode::Upsert,
                )
            })
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::MissingRequiredProperty { ref property, .. } if property == "valueCol"
        ));
    });
}

#[test]
fn find_by_primary_key_coerces_and_reports_misses() {
    with_memory_realm(|realm| {
        scenarios::populate_int_primary(realm, 3);
        assert_eq!(value_col(realm, 2), Some(Value::String("val2".into())));
        assert_eq!(value_col(realm, 9), None);
        assert!(matches!(
            realm.find_by_primary_key("IntPrimaryObject", "2"),
            Err(CoreError::InvalidPropertyValue { .. })
        ));
        assert!(realm.find_by_primary_key("TestObject", 1).is_err());
        assert!(matches!(
            realm.find_by_primary_key("Nope", 1),
            Err(CoreError::UnknownObjectType { .. })
        ));
    });
}

#[test]
fn missing_and_mistyped_values_are_rejected() {
    with_memory_realm(|realm| {
        let err = realm
            .write(|r| {
                r.create(
                    "AllTypesObject",
                    Values::new().with("boolCol", true),
                    UpdateMode::Disallowed,
                )
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::MissingRequiredProperty { .. }));

        let err = realm
            .write(|r| {
                r.create(
                    "IntPrimaryObject",
                    Values::new().with("primaryCol", 1).with("valueCol", 5),
                    UpdateMode::Disallowed,
                )
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPropertyValue { .. }));

        let err = realm
            .write(|r| {
                r.create(
                    "IntPrimaryObject",
                    Values::new().with("primaryCol", 1).with("nope", 5),
                    UpdateMode::Disallowed,
                )
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownProperty { .. }));

        let err = realm
            .write(|r| r.create("Nope", Values::new(), UpdateMode::Disallowed))
            .unwrap_err();
        assert!(matches!(err, CoreError::UnknownObjectType { .. }));
    });
}

#[test]
fn all_types_round_trip() {
    with_memory_realm(|realm| {
        let object = realm
            .write(|r| {
                r.create(
                    "AllTypesObject",
                    Values::new()
                        .with("boolCol", true)
                        .with("intCol", 1)
                        .with("floatCol", 1.5f32)
                        .with("doubleCol", 2)
                        .with("stringCol", "s")
                        .with("dateCol", Value::Date(86_400_000))
                        .with("dataCol", vec![1u8, 2, 3]),
                    UpdateMode::Disallowed,
                )
            })
            .unwrap();
        assert_eq!(object.get("boolCol").unwrap(), Value::Bool(true));
        assert_eq!(object.get("floatCol").unwrap(), Value::Float(1.5));
        assert_eq!(object.get("doubleCol").unwrap(), Value::Double(2.0));
        assert_eq!(object.get("dateCol").unwrap().as_date(), Some(86_400_000));
        assert_eq!(object.get("dataCol").unwrap().as_data(), Some(&[1u8, 2, 3][..]));
        assert_eq!(object.get_link("objectCol").unwrap(), None);
        assert!(object.get_list("arrayCol").unwrap().is_empty());
    });
}

#[test]
fn optional_properties_default_to_null() {
    with_memory_realm(|realm| {
        let object = realm
            .write(|r| {
                r.create(
                    "NullableBasicTypesObject",
                    Values::new().with("intCol", 4),
                    UpdateMode::Disallowed,
                )
            })
            .unwrap();
        assert_eq!(object.get("intCol").unwrap(), Value::Int(4));
        for column in ["boolCol", "floatCol", "doubleCol", "stringCol", "dateCol", "dataCol"] {
            assert!(object.get(column).unwrap().is_null(), "{column}");
        }

        realm.write(|_| object.set("intCol", Input::Null)).unwrap();
        assert!(object.get("intCol").unwrap().is_null());
    });
}

#[test]
fn defaults_fill_omitted_properties() {
    with_memory_realm(|realm| {
        let object = realm
            .write(|r| r.create("DefaultValuesObject", Values::new(), UpdateMode::Disallowed))
            .unwrap();
        assert_eq!(object.get("boolCol").unwrap(), Value::Bool(true));
        assert_eq!(object.get("intCol").unwrap(), Value::Int(-1));
        assert_eq!(object.get("floatCol").unwrap(), Value::Float(-1.1));
        assert_eq!(object.get("doubleCol").unwrap(), Value::Double(-1.11));
        assert_eq!(
            object.get("stringCol").unwrap(),
            Value::String("defaultString".into())
        );
        assert_eq!(object.get("dateCol").unwrap(), Value::Date(1_700_000_000_000));
        assert_eq!(
            object.get("dataCol").unwrap(),
            Value::Data(b"defaultData".to_vec())
        );
        let linked = object.get_link("objectCol").unwrap().unwrap();
        assert_eq!(linked.get("doubleCol").unwrap(), Value::Double(1.0));
        assert!(object.get_list("arrayCol").unwrap().is_empty());

        let explicit = realm
            .write(|r| {
                r.create(
                    "DefaultValuesObject",
                    Values::new().with("intCol", 5).with("objectCol", Input::Null),
                    UpdateMode::Disallowed,
                )
            })
            .unwrap();
        assert_eq!(explicit.get("intCol").unwrap(), Value::Int(5));
        assert_eq!(explicit.get_link("objectCol").unwrap(), None);
    });
}

#[test]
fn nested_values_create_linked_objects() {
    with_memory_realm(|realm| {
        let existing = realm
            .write(|r| {
                r.create(
                    "TestObject",
                    Values::new().with("doubleCol", 9.0),
                    UpdateMode::Disallowed,
                )
            })
            .unwrap();

        let links = realm
            .write(|r| {
                r.create(
                    "LinkTypesObject",
                    Values::new()
                        .with("objectCol", Values::new().with("doubleCol", 1.0))
                        .with("objectCol1", &existing)
                        .with(
                            "arrayCol",
                            Input::List(vec![
                                Values::new().with("doubleCol", 2.0).into(),
                                Input::from(&existing),
                            ]),
                        ),
                    UpdateMode::Disallowed,
                )
            })
            .unwrap();

        assert_eq!(scenarios::test_object_values(realm), vec![9.0, 1.0, 2.0]);
        assert_eq!(links.get_link("objectCol1").unwrap(), Some(existing.clone()));
        let list = links.get_list("arrayCol").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1], existing);
    });
}

#[test]
fn deleting_a_target_clears_links_and_list_entries() {
    with_memory_realm(|realm| {
        let (target, links) = realm
            .write(|r| {
                let target = r.create(
                    "TestObject",
                    Values::new().with("doubleCol", 1.0),
                    UpdateMode::Disallowed,
                )?;
                let links = r.create(
                    "LinkTypesObject",
                    Values::new()
                        .with("objectCol", &target)
                        .with("arrayCol", Input::List(vec![Input::from(&target)])),
                    UpdateMode::Disallowed,
                )?;
                Ok((target, links))
            })
            .unwrap();

        realm.write(|r| r.delete(&target)).unwrap();
        assert!(!target.is_valid());
        assert!(matches!(target.get("doubleCol"), Err(CoreError::InvalidatedObject)));
        assert_eq!(links.get_link("objectCol").unwrap(), None);
        assert!(links.get_list("arrayCol").unwrap().is_empty());

        let err = realm.write(|r| r.delete(&target)).unwrap_err();
        assert!(matches!(err, CoreError::InvalidatedObject));
    });
}

#[test]
fn delete_rules() {
    with_memory_realm(|realm| {
        scenarios::populate_test_objects(realm, 2);
        let first = realm.objects("TestObject").unwrap().get(0).unwrap().unwrap();

        assert!(matches!(
            realm.delete(&first),
            Err(CoreError::OutsideTransaction)
        ));
        let err = realm.write(|r| r.delete(Vec::<Object>::new())).unwrap_err();
        assert!(matches!(err, CoreError::Configuration { .. }));

        let other = Realm::open_in_memory(full_schema()).unwrap();
        let foreign = other
            .write(|r| {
                r.create(
                    "TestObject",
                    Values::new().with("doubleCol", 5.0),
                    UpdateMode::Disallowed,
                )
            })
            .unwrap();
        let err = realm.write(|r| r.delete(&foreign)).unwrap_err();
        assert!(matches!(err, CoreError::Configuration { .. }));

        let err = realm
            .write(|r| {
                r.create(
                    "LinkTypesObject",
                    Values::new().with("objectCol", &foreign),
                    UpdateMode::Disallowed,
                )
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidPropertyValue { .. }));
        other.close();
    });
}

#[test]
fn deleting_from_results_shifts_later_objects_down() {
    with_memory_realm(|realm| {
        scenarios::populate_test_objects(realm, 5);
        let results = realm.objects("TestObject").unwrap();
        let next = results.get(3).unwrap().unwrap();

        realm
            .write(|r| r.delete(results.get(2)?.expect("index 2 exists")))
            .unwrap();

        assert_eq!(results.len().unwrap(), 4);
        assert_eq!(results.get(2).unwrap().unwrap(), next);
        assert_eq!(scenarios::test_object_values(realm), vec![0.0, 1.0, 3.0, 4.0]);
    });
}

#[test]
fn delete_many_and_delete_all() {
    with_memory_realm(|realm| {
        scenarios::populate_test_objects(realm, 6);
        scenarios::populate_int_primary(realm, 3);
        let results = realm.objects("TestObject").unwrap();

        let big = results.filtered(|o| Ok(o.get("doubleCol")?.as_f64() >= Some(3.0)));
        realm.write(|r| r.delete(&big)).unwrap();
        assert_eq!(scenarios::test_object_values(realm), vec![0.0, 1.0, 2.0]);
        assert!(big.is_empty().unwrap());

        let mixed = vec![
            results.get(0).unwrap().unwrap(),
            realm
                .find_by_primary_key("IntPrimaryObject", 1)
                .unwrap()
                .unwrap(),
        ];
        realm.write(|r| r.delete(mixed)).unwrap();
        assert_eq!(results.len().unwrap(), 2);
        assert_eq!(realm.objects("IntPrimaryObject").unwrap().len().unwrap(), 2);

        realm.write(|r| r.delete_all()).unwrap();
        assert!(results.is_empty().unwrap());
        assert!(realm.objects("IntPrimaryObject").unwrap().is_empty().unwrap());
    });
}

#[test]
fn deleting_while_iterating_a_snapshot_is_safe() {
    with_memory_realm(|realm| {
        scenarios::populate_test_objects(realm, 4);
        let results = realm.objects("TestObject").unwrap();
        realm
            .write(|r| {
                for object in results.iter()? {
                    r.delete(object)?;
                }
                Ok(())
            })
            .unwrap();
        assert_eq!(results.len().unwrap(), 0);
    });
}

#[test]
fn results_are_live_and_snapshots_are_not() {
    with_memory_realm(|realm| {
        let results = realm.objects("IntPrimaryObject").unwrap();
        assert_eq!(results.len().unwrap(), 0);
        scenarios::populate_int_primary(realm, 2);
        assert_eq!(results.len().unwrap(), 2);

        let frozen = results.snapshot().unwrap();
        let val1 = results.matching("valueCol", "val1").unwrap();
        realm
            .write(|r| {
                r.create(
                    "IntPrimaryObject",
                    Values::new().with("primaryCol", 9).with("valueCol", "val1"),
                    UpdateMode::Disallowed,
                )
            })
            .unwrap();
        assert_eq!(results.len().unwrap(), 3);
        assert_eq!(frozen.len().unwrap(), 2);
        assert_eq!(val1.len().unwrap(), 2);

        realm.write(|r| r.delete(&val1)).unwrap();
        assert_eq!(frozen.len().unwrap(), 1);
        assert_eq!(results.len().unwrap(), 1);
    });
}

#[test]
fn indexed_lookups_match_scans() {
    with_memory_realm(|realm| {
        realm
            .write(|r| {
                for (name, age) in [("Ann", 30), ("Bob", 40), ("Ann", 50)] {
                    r.create(
                        "PersonObject",
                        Values::new().with("name", name).with("age", age),
                        UpdateMode::Disallowed,
                    )?;
                }
                Ok(())
            })
            .unwrap();
        let people = realm.objects("PersonObject").unwrap();
        let anns = people.matching("name", "Ann").unwrap();
        let ages: Vec<f64> = anns
            .iter()
            .unwrap()
            .map(|p| p.get("age").unwrap().as_f64().unwrap())
            .collect();
        assert_eq!(ages, vec![30.0, 50.0]);

        let scanned = people.filtered(|p| Ok(p.get("name")?.as_str() == Some("Ann")));
        assert_eq!(scanned.to_vec().unwrap(), anns.to_vec().unwrap());
        assert_eq!(people.matching("married", false).unwrap().len().unwrap(), 3);
    });
}

#[test]
fn set_outside_write_fails() {
    with_memory_realm(|realm| {
        scenarios::populate_test_objects(realm, 1);
        let object = realm.objects("TestObject").unwrap().get(0).unwrap().unwrap();
        assert!(matches!(
            object.set("doubleCol", 2.0),
            Err(CoreError::OutsideTransaction)
        ));
        realm.write(|_| object.set("doubleCol", 2.0)).unwrap();
        assert_eq!(object.get("doubleCol").unwrap(), Value::Double(2.0));
    });
}

#[test]
fn changing_a_primary_key_to_a_taken_one_fails() {
    with_memory_realm(|realm| {
        scenarios::populate_int_primary(realm, 2);
        let first = realm
            .find_by_primary_key("IntPrimaryObject", 0)
            .unwrap()
            .unwrap();
        let err = realm.write(|_| first.set("primaryCol", 1)).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey { .. }));
        realm.write(|_| first.set("primaryCol", 5)).unwrap();
        assert!(realm.find_by_primary_key("IntPrimaryObject", 5).unwrap().is_some());
        assert!(realm.find_by_primary_key("IntPrimaryObject", 0).unwrap().is_none());
    });
}
