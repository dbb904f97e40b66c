//! Filter searches, result streaming and early cancellation.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::common::builders::{DeviceBuilder, GroupBuilder, UserBuilder};
use crate::common::fixtures::test_fixtures;
use crate::common::{create, id_of, open_silo, open_silo_with, patch};
use crate::{assert_consistent, assert_scim_error};
use scim_silo::context::SearchContext;
use scim_silo::{Resource, ScimType, Silo, SiloConfig, Value, parse_filter};
use serde_json::json;
use tokio::sync::mpsc;

fn fleet() -> Silo {
    let silo = open_silo();
    for body in test_fixtures::device_fleet() {
        create(&silo, &body);
    }
    silo
}

fn serials(silo: &Silo, filter: &str) -> BTreeSet<String> {
    let node = parse_filter(filter).expect("filter must parse");
    let rt = silo.registry().resource_type("Device").unwrap();
    silo.find_resources(&node, "Device")
        .expect("search must run")
        .iter()
        .flat_map(|rs| rs.values_at(rt, "serialNumber"))
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

fn set(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_indexed_equality() {
    let silo = fleet();
    assert_eq!(serials(&silo, r#"manufacturer eq "maker1""#), set(&["SN-001", "SN-006"]));
    assert_eq!(serials(&silo, r#"manufacturer eq "MAKER1""#), set(&["SN-001", "SN-006"]));
    assert!(serials(&silo, r#"manufacturer eq "nobody""#).is_empty());
}

#[test]
fn test_presence() {
    let silo = fleet();
    assert_eq!(serials(&silo, "manufacturer pr").len(), 10);
    assert!(serials(&silo, "macId pr").is_empty());
}

#[test]
fn test_ordering_comparisons() {
    let silo = fleet();
    assert_eq!(serials(&silo, "rating gt 7"), set(&["SN-008", "SN-009"]));
    assert_eq!(serials(&silo, "rating le 1"), set(&["SN-000", "SN-001"]));
    assert_eq!(serials(&silo, "price ge 75.5"), set(&["SN-008", "SN-009"]));
}

#[test]
fn test_logical_operators() {
    let silo = fleet();
    assert_eq!(
        serials(&silo, r#"manufacturer eq "maker2" and rating gt 5"#),
        set(&["SN-007"])
    );
    assert_eq!(
        serials(&silo, r#"serialNumber eq "SN-000" or serialNumber eq "SN-009""#),
        set(&["SN-000", "SN-009"])
    );
    assert_eq!(serials(&silo, "not (rating lt 8)"), set(&["SN-008", "SN-009"]));
}

#[test]
fn test_substring_operators_scan() {
    let silo = fleet();
    assert_eq!(serials(&silo, r#"serialNumber sw "sn-00""#).len(), 10);
    assert_eq!(serials(&silo, r#"serialNumber ew "7""#), set(&["SN-007"]));
    assert_eq!(serials(&silo, r#"manufacturer co "ker4""#), set(&["SN-004", "SN-009"]));
}

#[test]
fn test_search_follows_patches() {
    let silo = fleet();
    let hit = silo
        .find_resources(&parse_filter(r#"serialNumber eq "SN-003""#).unwrap(), "Device")
        .unwrap();
    let id = id_of(&hit[0]);

    patch(&silo, "Device", &id, json!([{"op": "replace", "path": "manufacturer", "value": "acme"}])).unwrap();

    assert_eq!(serials(&silo, r#"manufacturer eq "acme""#), set(&["SN-003"]));
    assert_eq!(serials(&silo, r#"manufacturer eq "maker3""#), set(&["SN-008"]));
}

#[test]
fn test_invalid_filter() {
    assert_scim_error!(parse_filter("rating gt"), 400, ScimType::InvalidFilter);
    assert_scim_error!(parse_filter(r#"rating zz "1""#), 400, ScimType::InvalidFilter);

    let silo = fleet();
    let node = parse_filter(r#"rating eq "high""#).unwrap();
    assert_scim_error!(silo.find_resources(&node, "Device"), 400, ScimType::InvalidFilter);
}

fn firmware_silo(indexed: bool) -> Silo {
    let mut config = SiloConfig::default();
    if indexed {
        config.add_index_field("Device", "firmware");
    }
    let silo = open_silo_with(config);
    create(&silo, &DeviceBuilder::new("SN-1").with_attribute("firmware", json!("QUJD")).build());
    create(&silo, &DeviceBuilder::new("SN-2").with_attribute("firmware", json!("YWJj")).build());
    create(&silo, &DeviceBuilder::new("SN-3").build());
    silo
}

#[test]
fn test_binary_equality_and_presence() {
    for indexed in [false, true] {
        let silo = firmware_silo(indexed);
        assert_eq!(serials(&silo, r#"firmware eq "QUJD""#), set(&["SN-1"]), "indexed: {}", indexed);
        assert_eq!(serials(&silo, r#"firmware eq "YWJj""#), set(&["SN-2"]), "indexed: {}", indexed);
        assert!(serials(&silo, r#"firmware eq "qujd""#).is_empty(), "indexed: {}", indexed);
        assert_eq!(serials(&silo, "firmware pr"), set(&["SN-1", "SN-2"]), "indexed: {}", indexed);
        assert_consistent!(silo);
    }
    let silo = firmware_silo(true);
    assert_eq!(silo.lookup_index("Device", "firmware", &Value::Bytes(b"ABC".to_vec())).len(), 1);
}

#[test]
fn test_unknown_attribute_matches_nothing() {
    let silo = fleet();
    assert!(serials(&silo, r#"shoeSize eq "42""#).is_empty());
    assert_eq!(serials(&silo, r#"shoeSize eq "42" or rating eq 0"#), set(&["SN-000"]));
}

#[tokio::test]
async fn test_search_streams_results() {
    let silo = Arc::new(fleet());
    let (tx, mut rx) = mpsc::channel(silo.config().search_channel_capacity);
    let ctx = SearchContext::new(parse_filter("rating ge 5").unwrap(), &["Device"]);

    let searcher = Arc::clone(&silo);
    let handle = tokio::task::spawn_blocking(move || searcher.search(ctx, tx));

    let mut received: Vec<Resource> = Vec::new();
    while let Some(rs) = rx.recv().await {
        received.push(rs);
    }
    handle.await.unwrap().unwrap();
    assert_eq!(received.len(), 5);
}

#[tokio::test]
async fn test_search_across_resource_types() {
    let silo = Arc::new(open_silo());
    let alice = id_of(&create(&silo, &UserBuilder::new("alice").with_display_name("Alice").build()));
    create(&silo, &GroupBuilder::new("Admins").with_member(&alice).build());
    create(&silo, &UserBuilder::new("bob").build());

    let (tx, mut rx) = mpsc::channel(4);
    let ctx = SearchContext::new(parse_filter("displayName pr").unwrap(), &["User", "Group"]);
    let searcher = Arc::clone(&silo);
    let handle = tokio::task::spawn_blocking(move || searcher.search(ctx, tx));

    let mut types = Vec::new();
    while let Some(rs) = rx.recv().await {
        types.push(rs.type_name);
    }
    handle.await.unwrap().unwrap();
    types.sort();
    assert_eq!(types, vec!["Group".to_string(), "User".to_string()]);
}

#[test]
fn test_dropped_receiver_stops_search() {
    let silo = Arc::new(fleet());
    let (tx, mut rx) = mpsc::channel(1);
    let ctx = SearchContext::new(parse_filter("manufacturer pr").unwrap(), &["Device"]);

    let searcher = Arc::clone(&silo);
    let handle = std::thread::spawn(move || searcher.search(ctx, tx));

    let first = rx.blocking_recv();
    assert!(first.is_some());
    drop(rx);

    assert!(handle.join().unwrap().is_ok());
}

#[test]
fn test_read_all_of_type() {
    let silo = Arc::new(fleet());
    let (tx, mut rx) = mpsc::channel(2);
    let reader = Arc::clone(&silo);
    let handle = std::thread::spawn(move || reader.read_all_of_type("Device", tx));

    let mut count = 0;
    while rx.blocking_recv().is_some() {
        count += 1;
    }
    handle.join().unwrap().unwrap();
    assert_eq!(count, 10);
}

#[test]
fn test_get_user_by_name_ignores_case() {
    let silo = open_silo();
    let alice = id_of(&create(&silo, &UserBuilder::new("Alice").build()));

    assert_eq!(id_of(&silo.get_user_by_name("alice").unwrap()), alice);
    assert_eq!(id_of(&silo.get_user_by_name("ALICE").unwrap()), alice);
    assert_scim_error!(silo.get_user_by_name("bob"), 404);
}

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn silo_with(ratings: &[Option<i64>]) -> Silo {
        let silo = open_silo();
        for (i, rating) in ratings.iter().enumerate() {
            let builder = DeviceBuilder::new(&format!("SN-{:03}", i));
            let builder = match rating {
                Some(rating) => builder.with_rating(*rating),
                None => builder,
            };
            create(&silo, &builder.build());
        }
        silo
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_and_is_intersection(
            ratings in prop::collection::vec(prop::option::of(0i64..10), 0..20),
            low in 0i64..10,
            high in 0i64..10,
        ) {
            let silo = silo_with(&ratings);
            let left = serials(&silo, &format!("rating ge {}", low));
            let right = serials(&silo, &format!("rating le {}", high));
            let both = serials(&silo, &format!("rating ge {} and rating le {}", low, high));
            prop_assert_eq!(both, left.intersection(&right).cloned().collect::<BTreeSet<_>>());
        }

        #[test]
        fn prop_not_is_complement(
            ratings in prop::collection::vec(prop::option::of(0i64..10), 0..20),
            pivot in 0i64..10,
        ) {
            let silo = silo_with(&ratings);
            let all = serials(&silo, "serialNumber pr");
            let below = serials(&silo, &format!("rating lt {}", pivot));
            let rest = serials(&silo, &format!("not (rating lt {})", pivot));
            prop_assert_eq!(rest, all.difference(&below).cloned().collect::<BTreeSet<_>>());
        }

        #[test]
        fn prop_presence_matches_stored_values(
            ratings in prop::collection::vec(prop::option::of(0i64..10), 0..20),
        ) {
            let silo = silo_with(&ratings);
            let expected: BTreeSet<String> = ratings
                .iter()
                .enumerate()
                .filter(|(_, rating)| rating.is_some())
                .map(|(i, _)| format!("SN-{:03}", i))
                .collect();
            prop_assert_eq!(serials(&silo, "rating pr"), expected);
        }
    }
}
