//! End-to-end queries: filter, order, page and select over in-memory rows.

mod test_support;

use latebinding::json::ToJson;
use latebinding::{Error, LateBindingQuery, Type};
use serde_json::json;
use test_support::*;

#[test]
fn test_filter_and_order() {
    let engine = engine();
    let query = LateBindingQuery::new()
        .filter(call(">", [field("price"), constant(6)]))
        .order_by(field("customer.address.city"), true)
        .order_by(field("price"), false);
    let compiled = engine.compile_query(&order(), &query).unwrap();
    assert_eq!(compiled.result_type(), order());

    let rows = compiled.apply(&orders()).unwrap();
    // Basel, Geneva, then Zurich; order 3 is too cheap.
    assert_eq!(ids(&rows), vec![2, 4, 1]);
}

#[test]
fn test_filters_are_combined() {
    let engine = engine();
    let query = LateBindingQuery::new()
        .filter(call("contains", [field("tags"), constant("gift")]))
        .filter(call("<", [field("created"), constant("2024-03-01")]));
    let rows = engine
        .compile_query(&order(), &query)
        .unwrap()
        .apply(&orders())
        .unwrap();
    assert_eq!(ids(&rows), vec![1]);
}

#[test]
fn test_null_condition_excludes_row() {
    let engine = engine();
    let query = LateBindingQuery::new().filter(call(">", [field("discount"), constant(0)]));
    let rows = engine
        .compile_query(&order(), &query)
        .unwrap()
        .apply(&orders())
        .unwrap();
    assert_eq!(ids(&rows), vec![2, 4]);
}

#[test]
fn test_nulls_sort_first_and_ties_keep_input_order() {
    let engine = engine();
    let query = LateBindingQuery::new().order_by(field("discount"), true);
    let rows = engine
        .compile_query(&order(), &query)
        .unwrap()
        .apply(&orders())
        .unwrap();
    assert_eq!(ids(&rows), vec![1, 3, 4, 2]);
}

#[test]
fn test_skip_and_take() {
    let engine = engine();
    let query = LateBindingQuery::new()
        .order_by(field("id"), false)
        .skip(1)
        .take(2);
    let rows = engine
        .compile_query(&order(), &query)
        .unwrap()
        .apply(&orders())
        .unwrap();
    assert_eq!(ids(&rows), vec![3, 2]);
}

#[test]
fn test_select_shapes_results() {
    let engine = engine();
    let query = LateBindingQuery::new()
        .select("id", field("id"))
        .select("city", call("upper", [field("customer.address.city")]))
        .select("net", call("-", [field("tax"), field("discount")]))
        .filter(call("==", [field("customer.address.city"), constant("Zurich")]))
        .order_by(field("id"), true);
    let compiled = engine.compile_query(&order(), &query).unwrap();
    assert!(matches!(compiled.result_type(), Type::Projection(_)));

    let rows = compiled.apply(&orders()).unwrap();
    assert_eq!(ids(&rows), vec![1, 3]);
    assert_eq!(
        rows.to_json(),
        json!([
            {"id": 1, "city": "ZURICH", "net": null},
            {"id": 3, "city": "ZURICH", "net": null}
        ])
    );
}

#[test]
fn test_query_from_json_runs() {
    let query = LateBindingQuery::from_json_str(
        r#"{
            "select": {
                "id": {"field": "id"},
                "month": {"field": "created.month"},
                "age_days": {"call": "diff_days", "args": [
                    {"const": "2024-04-01"}, {"field": "created"}
                ]}
            },
            "filter": [{"call": "==", "args": [{"field": "tags.count"}, {"const": 1}]}],
            "order_by": [{"expression": {"field": "created"}, "ascending": false}]
        }"#,
    )
    .unwrap();
    let rows = engine()
        .compile_query(&order(), &query)
        .unwrap()
        .apply(&orders())
        .unwrap();
    assert_eq!(
        rows.to_json(),
        json!([
            {"id": 4, "month": 3, "age_days": 21},
            {"id": 2, "month": 2, "age_days": 59}
        ])
    );
}

#[test]
fn test_records_serialize_without_selection() {
    let engine = engine();
    let query = LateBindingQuery::new()
        .filter(call("==", [field("id"), constant(3)]));
    let rows = engine
        .compile_query(&order(), &query)
        .unwrap()
        .apply(&orders())
        .unwrap();
    assert_eq!(
        rows.to_json(),
        json!([{
            "id": 3,
            "price": 5.0,
            "tax": 1,
            "discount": null,
            "status": "Cancelled",
            "created": "2023-12-24T18:00:00.000",
            "tags": [],
            "customer": {"name": "Alan", "address": {"city": "Zurich", "zip": "8004"}}
        }])
    );
}

#[test]
fn test_non_boolean_filter_is_rejected() {
    let query = LateBindingQuery::new().filter(field("customer.name"));
    let err = engine().compile_query(&order(), &query).unwrap_err();
    assert!(matches!(err, Error::IncompatibleType { .. }));
}

#[test]
fn test_compile_errors_surface_from_any_part() {
    let engine = engine();
    let bad_order = LateBindingQuery::new().order_by(field("nope"), true);
    assert!(matches!(
        engine.compile_query(&order(), &bad_order),
        Err(Error::MemberNotFound { .. })
    ));

    let bad_select = LateBindingQuery::new().select("x", call("nope", []));
    assert!(matches!(
        engine.compile_query(&order(), &bad_select),
        Err(Error::NoApplicableOverload { .. })
    ));
}
