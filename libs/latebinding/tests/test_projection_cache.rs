//! Projection type fabrication through an engine: caching by property set,
//! namespace rotation and sharing across threads.

mod test_support;

use indexmap::IndexMap;
use latebinding::json::ToJson;
use latebinding::{LateBinding, Projection, Type, Value};
use serde_json::json;
use test_support::*;

fn selection(entries: &[(&str, LateBinding)]) -> IndexMap<String, LateBinding> {
    entries
        .iter()
        .map(|(name, expr)| (name.to_string(), expr.clone()))
        .collect()
}

fn summary() -> IndexMap<String, LateBinding> {
    selection(&[
        ("name", field("customer.name")),
        ("total", call("+", [field("price"), field("tax")])),
    ])
}

fn select(engine: &latebinding::Engine, entries: &IndexMap<String, LateBinding>) -> Projection {
    engine.select(&order(), entries).unwrap()
}

#[test]
fn test_projection_properties_follow_selection() {
    let engine = engine();
    let projection = select(&engine, &summary());
    let ty = projection.projection_type();
    assert_eq!(ty.keys().collect::<Vec<_>>(), vec!["name", "total"]);
    assert_eq!(ty.definitions()[1].ty(), &Type::DECIMAL);

    let row = projection.apply(&orders()[0]).unwrap();
    assert_eq!(row.to_json(), json!({"name": "Ada", "total": 12.5}));
}

#[test]
fn test_equal_selections_share_a_type() {
    let engine = engine();
    let first = select(&engine, &summary());
    let second = select(&engine, &summary());
    assert_eq!(first.projection_type(), second.projection_type());

    // Same properties in another order hit the same cache entry.
    let reversed = selection(&[
        ("total", call("+", [field("price"), field("tax")])),
        ("name", field("customer.name")),
    ]);
    let third = select(&engine, &reversed);
    assert_eq!(first.projection_type(), third.projection_type());

    let row = third.apply(&orders()[1]).unwrap();
    let instance = row.as_projection().unwrap();
    assert_eq!(instance.get("name"), Some(&Value::string("Grace")));
    assert_eq!(
        instance.get("total").and_then(Value::as_decimal),
        Some(rust_decimal::Decimal::new(1199, 1))
    );
}

#[test]
fn test_property_types_distinguish_projections() {
    let engine = engine();
    let by_tax = select(&engine, &selection(&[("value", field("tax"))]));
    let by_price = select(&engine, &selection(&[("value", field("price"))]));
    assert_ne!(by_tax.projection_type(), by_price.projection_type());
}

#[test]
fn test_released_type_is_fabricated_again() {
    let engine = engine();
    let first_id = select(&engine, &summary()).projection_type().id();
    let second_id = select(&engine, &summary()).projection_type().id();
    assert_ne!(first_id, second_id);
}

#[test]
fn test_null_literal_becomes_any_property() {
    let engine = engine();
    let projection = select(
        &engine,
        &selection(&[("id", field("id")), ("note", LateBinding::null())]),
    );
    assert_eq!(
        projection.projection_type().definitions()[1].ty(),
        &Type::Any
    );
    let row = projection.apply(&orders()[2]).unwrap();
    assert_eq!(row.to_json(), json!({"id": 3, "note": null}));
}

#[test]
fn test_property_names_are_case_sensitive_and_not_blank() {
    let engine = engine();
    let mut entries = summary();
    entries.insert("Name".to_string(), field("customer.address.city"));
    // Names are case sensitive, so this is a valid selection.
    assert!(engine.select(&order(), &entries).is_ok());

    let bad = selection(&[(" ", field("id"))]);
    let err = engine.select(&order(), &bad).unwrap_err();
    assert!(matches!(err, latebinding::Error::InvalidProjection(_)));
    assert_eq!(err.category(), latebinding::ErrorCategory::BadQuery);
}

#[test]
fn test_uncached_generator_resets_after_threshold() {
    let engine = engine_with(json!({
        "projection": {"reset_threshold": 2, "caching": false}
    }));
    let projections: Vec<Projection> = (0..5).map(|_| select(&engine, &summary())).collect();

    let generations: Vec<u64> = projections
        .iter()
        .map(|p| p.projection_type().namespace().generation())
        .collect();
    assert_eq!(generations, vec![0, 0, 1, 1, 2]);
    for projection in &projections {
        assert!(projection.projection_type().namespace().type_count() <= 2);
    }
    assert_eq!(engine.projections().epoch(), 2);

    // Types from discarded namespaces keep working.
    let row = projections[0].apply(&orders()[3]).unwrap();
    assert_eq!(row.to_json(), json!({"name": "Edsger", "total": 50.0}));
}

#[test]
fn test_cache_drops_entries_from_previous_namespace() {
    let engine = engine_with(json!({"projection": {"reset_threshold": 1}}));
    let summary_before = select(&engine, &summary());
    let again = select(&engine, &summary());
    assert_eq!(summary_before.projection_type(), again.projection_type());

    // The second distinct selection exceeds the threshold and rotates.
    let ids = select(&engine, &selection(&[("id", field("id"))]));
    assert_eq!(ids.projection_type().namespace().generation(), 1);

    let summary_after = select(&engine, &summary());
    assert_ne!(summary_before.projection_type(), summary_after.projection_type());
    assert!(summary_before.apply(&orders()[0]).is_ok());
}

#[test]
fn test_concurrent_selects_agree_on_one_type() {
    let engine = engine();
    let projections: Vec<Projection> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| scope.spawn(|| select(&engine, &summary())))
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });
    let first = projections[0].projection_type();
    assert!(projections
        .iter()
        .all(|p| p.projection_type() == first));
}
