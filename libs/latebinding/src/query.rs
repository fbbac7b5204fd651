//! Queries over a record type.
//!
//! A [`LateBindingQuery`] bundles the untyped parts of a request: an
//! optional selection, filters, orderings and paging. Compiling it against a
//! source type yields a [`CompiledQuery`] whose parts a storage backend can
//! translate, or which can be run directly over an in-memory slice.

use crate::ast::{LateBinding, LateBindingJson};
use crate::compiler::ExpressionCompiler;
use crate::error::{Error, Result};
use crate::eval;
use crate::expr::{BinaryOp, TypedExpr};
use crate::projection::{ProjectionType, ProjectionTypeGenerator, PropertyDefinition};
use crate::types::Type;
use crate::value::Value;
use indexmap::IndexMap;
use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub expression: LateBinding,
    pub ascending: bool,
}

impl OrderBy {
    pub fn ascending(expression: LateBinding) -> Self {
        Self {
            expression,
            ascending: true,
        }
    }

    pub fn descending(expression: LateBinding) -> Self {
        Self {
            expression,
            ascending: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LateBindingQuery {
    /// Result shape, by property name. `None` returns the source records.
    pub select: Option<IndexMap<String, LateBinding>>,
    /// Conditions every result must satisfy.
    pub filter: Vec<LateBinding>,
    pub order_by: Vec<OrderBy>,
    pub skip: Option<usize>,
    pub take: Option<usize>,
}

impl LateBindingQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(mut self, name: impl Into<String>, expression: LateBinding) -> Self {
        self.select
            .get_or_insert_with(IndexMap::new)
            .insert(name.into(), expression);
        self
    }

    pub fn filter(mut self, condition: LateBinding) -> Self {
        self.filter.push(condition);
        self
    }

    pub fn order_by(mut self, expression: LateBinding, ascending: bool) -> Self {
        self.order_by.push(OrderBy {
            expression,
            ascending,
        });
        self
    }

    pub fn skip(mut self, count: usize) -> Self {
        self.skip = Some(count);
        self
    }

    pub fn take(mut self, count: usize) -> Self {
        self.take = Some(count);
        self
    }

    /// Read a query from its JSON form:
    ///
    /// ```json
    /// {
    ///   "select": {"total": {"call": "+", "args": [{"field": "price"}, {"field": "tax"}]}},
    ///   "filter": [{"call": ">", "args": [{"field": "price"}, {"const": 10}]}],
    ///   "order_by": [{"expression": {"field": "price"}, "ascending": false}],
    ///   "skip": 0,
    ///   "take": 20
    /// }
    /// ```
    pub fn from_json_str(json: &str) -> Result<Self> {
        let wire: QueryJson =
            serde_json::from_str(json).map_err(|e| Error::MalformedExpression(e.to_string()))?;
        wire.into_query()
    }
}

#[derive(Debug, Deserialize)]
struct QueryJson {
    #[serde(default, deserialize_with = "selection_entries")]
    select: Option<Vec<(String, LateBindingJson)>>,
    #[serde(default)]
    filter: Vec<LateBindingJson>,
    #[serde(default)]
    order_by: Vec<OrderByJson>,
    #[serde(default)]
    skip: Option<usize>,
    #[serde(default)]
    take: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OrderByJson {
    expression: LateBindingJson,
    #[serde(default = "default_ascending")]
    ascending: bool,
}

fn default_ascending() -> bool {
    true
}

/// Read `select` as its raw entries so that repeated keys reach
/// [`QueryJson::into_query`] instead of overwriting each other.
fn selection_entries<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<Vec<(String, LateBindingJson)>>, D::Error>
where
    D: Deserializer<'de>,
{
    struct EntriesVisitor;

    impl<'de> Visitor<'de> for EntriesVisitor {
        type Value = Option<Vec<(String, LateBindingJson)>>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a map of property names to expressions")
        }

        fn visit_none<E: serde::de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<Self::Value, E> {
            Ok(None)
        }

        fn visit_some<D2: Deserializer<'de>>(
            self,
            deserializer: D2,
        ) -> std::result::Result<Self::Value, D2::Error> {
            deserializer.deserialize_map(self)
        }

        fn visit_map<A: MapAccess<'de>>(
            self,
            mut map: A,
        ) -> std::result::Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry::<String, LateBindingJson>()? {
                entries.push(entry);
            }
            Ok(Some(entries))
        }
    }

    deserializer.deserialize_option(EntriesVisitor)
}

impl QueryJson {
    fn into_query(self) -> Result<LateBindingQuery> {
        let select = match self.select {
            Some(entries) => {
                let mut selection = IndexMap::with_capacity(entries.len());
                for (name, expr) in entries {
                    if selection.contains_key(&name) {
                        return Err(Error::InvalidProjection(format!(
                            "property '{name}' is selected more than once"
                        )));
                    }
                    selection.insert(name, expr.into_late_binding()?);
                }
                Some(selection)
            }
            None => None,
        };
        Ok(LateBindingQuery {
            select,
            filter: self
                .filter
                .into_iter()
                .map(LateBindingJson::into_late_binding)
                .collect::<Result<_>>()?,
            order_by: self
                .order_by
                .into_iter()
                .map(|o| {
                    Ok(OrderBy {
                        expression: o.expression.into_late_binding()?,
                        ascending: o.ascending,
                    })
                })
                .collect::<Result<_>>()?,
            skip: self.skip,
            take: self.take,
        })
    }
}

// ============================================================================
// Projection
// ============================================================================

/// A compiled selection: the fabricated result type and the expression
/// that constructs an instance of it from a source record.
#[derive(Debug, Clone)]
pub struct Projection {
    projection_type: Arc<ProjectionType>,
    expression: TypedExpr,
}

impl Projection {
    pub fn projection_type(&self) -> &Arc<ProjectionType> {
        &self.projection_type
    }

    pub fn expression(&self) -> &TypedExpr {
        &self.expression
    }

    pub fn apply(&self, source: &Value) -> Result<Value> {
        self.expression.evaluate(source)
    }
}

/// Compile `selection` into a projection over `target`.
///
/// Each entry is compiled with its natural type, which becomes the type of
/// the matching property. A null literal yields an `Any` property.
pub fn compile_projection(
    compiler: &ExpressionCompiler,
    generator: &dyn ProjectionTypeGenerator,
    target: &TypedExpr,
    selection: &IndexMap<String, LateBinding>,
) -> Result<Projection> {
    let mut built = Vec::with_capacity(selection.len());
    for (name, expr) in selection {
        built.push((name.as_str(), compiler.build(target, expr)?));
    }

    let definitions: Vec<PropertyDefinition> = built
        .iter()
        .map(|(name, expr)| {
            let ty = match expr.ty() {
                Type::Null => Type::Any,
                ty => ty.clone(),
            };
            PropertyDefinition::new(*name, ty)
        })
        .collect();
    let projection_type = generator.generate(&definitions)?;

    let mut bindings = Vec::with_capacity(built.len());
    for (name, expr) in built {
        let slot = projection_type.slot_of(name).ok_or_else(|| {
            Error::InvalidProjection(format!(
                "{} has no property '{name}'",
                projection_type.name()
            ))
        })?;
        bindings.push((slot, expr));
    }

    tracing::debug!(
        "Compiled projection {} with {} properties",
        projection_type.name(),
        bindings.len()
    );
    let expression = TypedExpr::new_projection(projection_type.clone(), bindings)?;
    Ok(Projection {
        projection_type,
        expression,
    })
}

// ============================================================================
// Compiled query
// ============================================================================

#[derive(Debug, Clone)]
pub struct CompiledOrdering {
    pub key: TypedExpr,
    pub ascending: bool,
}

#[derive(Debug, Clone)]
pub struct CompiledQuery {
    source: Type,
    filter: Option<TypedExpr>,
    order_by: Vec<CompiledOrdering>,
    skip: Option<usize>,
    take: Option<usize>,
    projection: Option<Projection>,
}

impl CompiledQuery {
    /// Compile every part of `query` against records of type `source`.
    pub fn compile(
        compiler: &ExpressionCompiler,
        generator: &dyn ProjectionTypeGenerator,
        source: &Type,
        query: &LateBindingQuery,
    ) -> Result<Self> {
        let target = TypedExpr::target(source.clone());

        let mut filter: Option<TypedExpr> = None;
        for condition in &query.filter {
            let built = compiler.build_as(&target, condition, &Type::Bool)?;
            filter = Some(match filter {
                Some(previous) => TypedExpr::binary(BinaryOp::And, previous, built)?,
                None => built,
            });
        }

        let order_by = query
            .order_by
            .iter()
            .map(|o| {
                Ok(CompiledOrdering {
                    key: compiler.build(&target, &o.expression)?,
                    ascending: o.ascending,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let projection = query
            .select
            .as_ref()
            .map(|selection| compile_projection(compiler, generator, &target, selection))
            .transpose()?;

        tracing::debug!(
            "Compiled query over {}: {} filters, {} orderings, projection: {}",
            source,
            query.filter.len(),
            order_by.len(),
            projection.is_some()
        );

        Ok(Self {
            source: source.clone(),
            filter,
            order_by,
            skip: query.skip,
            take: query.take,
            projection,
        })
    }

    pub fn source(&self) -> &Type {
        &self.source
    }

    /// The AND of every filter, if any.
    pub fn filter(&self) -> Option<&TypedExpr> {
        self.filter.as_ref()
    }

    pub fn order_by(&self) -> &[CompiledOrdering] {
        &self.order_by
    }

    pub fn skip(&self) -> Option<usize> {
        self.skip
    }

    pub fn take(&self) -> Option<usize> {
        self.take
    }

    pub fn projection(&self) -> Option<&Projection> {
        self.projection.as_ref()
    }

    /// Type of each element [`apply`](Self::apply) returns.
    pub fn result_type(&self) -> Type {
        match &self.projection {
            Some(projection) => Type::Projection(projection.projection_type.clone()),
            None => self.source.clone(),
        }
    }

    /// Run the query over `records`: filter, order, skip, take, then select.
    /// Ordering is stable and places nulls first.
    pub fn apply(&self, records: &[Value]) -> Result<Vec<Value>> {
        let mut rows: Vec<(&Value, Vec<Value>)> = Vec::new();
        for record in records {
            if let Some(filter) = &self.filter {
                // A null condition excludes the record.
                if filter.evaluate(record)?.as_bool() != Some(true) {
                    continue;
                }
            }
            let keys = self
                .order_by
                .iter()
                .map(|o| o.key.evaluate(record))
                .collect::<Result<Vec<_>>>()?;
            rows.push((record, keys));
        }

        if !self.order_by.is_empty() {
            rows.sort_by(|(_, a), (_, b)| self.compare_keys(a, b));
        }

        let selected = rows
            .into_iter()
            .map(|(record, _)| record)
            .skip(self.skip.unwrap_or(0))
            .take(self.take.unwrap_or(usize::MAX));

        match &self.projection {
            Some(projection) => selected.map(|record| projection.apply(record)).collect(),
            None => Ok(selected.cloned().collect()),
        }
    }

    fn compare_keys(&self, a: &[Value], b: &[Value]) -> Ordering {
        for (ordering, (x, y)) in self.order_by.iter().zip(a.iter().zip(b)) {
            let order = eval::sort_order(x, y);
            let order = if ordering.ascending {
                order
            } else {
                order.reverse()
            };
            if order != Ordering::Equal {
                return order;
            }
        }
        Ordering::Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_keeps_selection_order() {
        let query = LateBindingQuery::new()
            .select("b", LateBinding::field("x"))
            .select("a", LateBinding::field("y"))
            .skip(2)
            .take(5);
        let keys: Vec<&str> = query
            .select
            .as_ref()
            .unwrap()
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, ["b", "a"]);
        assert_eq!(query.skip, Some(2));
        assert_eq!(query.take, Some(5));
    }

    #[test]
    fn test_query_from_json() {
        let query = LateBindingQuery::from_json_str(
            r#"{
                "select": {"name": {"field": "name"}},
                "filter": [{"call": ">", "args": [{"field": "price"}, {"const": 10}]}],
                "order_by": [{"expression": {"field": "price"}, "ascending": false},
                             {"expression": {"field": "name"}}],
                "take": 3
            }"#,
        )
        .unwrap();
        assert_eq!(query.filter.len(), 1);
        assert_eq!(query.filter[0].to_string(), ">(price, 10)");
        assert_eq!(
            query.order_by,
            vec![
                OrderBy::descending(LateBinding::field("price")),
                OrderBy::ascending(LateBinding::field("name")),
            ]
        );
        assert_eq!(query.skip, None);
        assert_eq!(query.take, Some(3));
    }

    #[test]
    fn test_repeated_selection_key_is_rejected() {
        let err = LateBindingQuery::from_json_str(
            r#"{"select": {"a": {"field": "id"}, "a": {"field": "tax"}}}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidProjection(ref msg) if msg.contains("'a'")));

        let query = LateBindingQuery::from_json_str(r#"{"select": null}"#).unwrap();
        assert!(query.select.is_none());
    }

    #[test]
    fn test_malformed_query_json() {
        assert!(matches!(
            LateBindingQuery::from_json_str(r#"{"filter": [{"nonsense": 1}]}"#),
            Err(Error::MalformedExpression(_))
        ));
    }
}
