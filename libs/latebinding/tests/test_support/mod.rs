#![allow(dead_code)]

use latebinding::json::from_json;
use latebinding::{
    Engine, EnumType, LateBinding, LateBindingConfig, NumericKind, RecordType, Type, Value,
};
use serde_json::json;
use std::sync::{Arc, OnceLock};

// ---------------------------------------------------------------------------
// Sample types
// ---------------------------------------------------------------------------

pub fn address_type() -> &'static Arc<RecordType> {
    static TY: OnceLock<Arc<RecordType>> = OnceLock::new();
    TY.get_or_init(|| {
        RecordType::builder("Address")
            .field("city", Type::String)
            .field("zip", Type::String)
            .build()
            .expect("Address type")
    })
}

pub fn customer_type() -> &'static Arc<RecordType> {
    static TY: OnceLock<Arc<RecordType>> = OnceLock::new();
    TY.get_or_init(|| {
        RecordType::builder("Customer")
            .field("name", Type::String)
            .property("address", Type::Record(address_type().clone()))
            .build()
            .expect("Customer type")
    })
}

pub fn status_type() -> &'static Arc<EnumType> {
    static TY: OnceLock<Arc<EnumType>> = OnceLock::new();
    TY.get_or_init(|| {
        EnumType::new(
            "Status",
            NumericKind::I32,
            [("Open", 0), ("Shipped", 1), ("Cancelled", 2)],
        )
        .expect("Status enum")
    })
}

pub fn order_type() -> &'static Arc<RecordType> {
    static TY: OnceLock<Arc<RecordType>> = OnceLock::new();
    TY.get_or_init(|| {
        RecordType::builder("Order")
            .field("id", Type::I32)
            .field("price", Type::DECIMAL)
            .field("tax", Type::I32)
            .field("discount", Type::nullable(Type::I32))
            .field("status", Type::Enum(status_type().clone()))
            .field("created", Type::DateTime)
            .field("tags", Type::sequence(Type::String))
            .property("customer", Type::Record(customer_type().clone()))
            .build()
            .expect("Order type")
    })
}

pub fn order() -> Type {
    Type::Record(order_type().clone())
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn orders() -> Vec<Value> {
    let rows = json!([
        {
            "id": 1, "price": 10.50, "tax": 2, "discount": null, "status": "Open",
            "created": "2024-01-15T09:00:00", "tags": ["new", "gift"],
            "customer": {"name": "Ada", "address": {"city": "Zurich", "zip": "8001"}}
        },
        {
            "id": 2, "price": 99.90, "tax": 20, "discount": 5, "status": "Shipped",
            "created": "2024-02-01T12:30:00", "tags": ["bulk"],
            "customer": {"name": "Grace", "address": {"city": "Basel", "zip": "4001"}}
        },
        {
            "id": 3, "price": 5, "tax": 1, "discount": null, "status": "Cancelled",
            "created": "2023-12-24T18:00:00", "tags": [],
            "customer": {"name": "Alan", "address": {"city": "Zurich", "zip": "8004"}}
        },
        {
            "id": 4, "price": 42.00, "tax": 8, "discount": 2, "status": "Shipped",
            "created": "2024-03-10T08:15:00", "tags": ["gift"],
            "customer": {"name": "Edsger", "address": {"city": "Geneva", "zip": "1201"}}
        }
    ]);
    rows.as_array()
        .expect("fixture is an array")
        .iter()
        .map(|row| from_json(row, &order()).expect("fixture row decodes"))
        .collect()
}

// ---------------------------------------------------------------------------
// Engine helpers
// ---------------------------------------------------------------------------

pub fn engine() -> Engine {
    Engine::new(LateBindingConfig::default()).expect("default engine")
}

pub fn engine_with(config: serde_json::Value) -> Engine {
    let config = LateBindingConfig::from_json_str(&config.to_string()).expect("valid config");
    Engine::new(config).expect("engine")
}

pub fn field(path: &str) -> LateBinding {
    LateBinding::field(path)
}

pub fn constant(value: impl Into<Value>) -> LateBinding {
    LateBinding::constant(value)
}

pub fn call<const N: usize>(method: &str, args: [LateBinding; N]) -> LateBinding {
    LateBinding::call(method, args)
}

/// Ids of `rows`, read from the `id` member of records or projections.
pub fn ids(rows: &[Value]) -> Vec<i32> {
    rows.iter()
        .map(|row| {
            let id = match row {
                Value::Record(record) => record.get("id"),
                Value::Projection(instance) => instance.get("id"),
                _ => None,
            };
            match id {
                Some(Value::I32(id)) => *id,
                other => panic!("row without id: {other:?}"),
            }
        })
        .collect()
}
