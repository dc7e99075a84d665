use crate::core::types::{KeyValue, PackedObject};
use crate::query::ast::{AndQuery, AtomicQuery, Operand, OrQuery, QueryOperator};
use crate::schema::schema::{CollectionSchema, Slot};

impl AtomicQuery {
    /// Evaluate the predicate against one scalar value.
    ///
    /// Range operators never match null. String operators ignore case.
    pub fn matches_value(&self, value: &KeyValue) -> bool {
        if value.is_null() && self.operator.is_range() {
            return false;
        }

        match (&self.operand, self.operator) {
            (Operand::Single(x), QueryOperator::Eq | QueryOperator::Contains) => value == x,
            (Operand::Single(x), QueryOperator::Neq | QueryOperator::NotContains) => value != x,
            (Operand::Single(x), QueryOperator::Lt) => value < x,
            (Operand::Single(x), QueryOperator::Le) => value <= x,
            (Operand::Single(x), QueryOperator::Gt) => value > x,
            (Operand::Single(x), QueryOperator::Ge) => value >= x,
            (Operand::Single(x), op @ (QueryOperator::StrStartsWith
                | QueryOperator::StrEndsWith
                | QueryOperator::StrContains)) => match (value.as_text(), x.as_text()) {
                (Some(text), Some(pattern)) => {
                    let text = text.to_lowercase();
                    let pattern = pattern.to_lowercase();
                    match op {
                        QueryOperator::StrStartsWith => text.starts_with(&pattern),
                        QueryOperator::StrEndsWith => text.ends_with(&pattern),
                        _ => text.contains(&pattern),
                    }
                }
                _ => false,
            },
            (Operand::Range(lo, hi), QueryOperator::Btw | QueryOperator::GeLe) => lo <= value && value <= hi,
            (Operand::Range(lo, hi), QueryOperator::GtLe) => lo < value && value <= hi,
            (Operand::Range(lo, hi), QueryOperator::GtLt) => lo < value && value < hi,
            (Operand::Range(lo, hi), QueryOperator::GeLt) => lo <= value && value < hi,
            (Operand::Set(values), QueryOperator::In) => values.binary_search(value).is_ok(),
            (Operand::Set(values), QueryOperator::NotIn) => values.binary_search(value).is_err(),
            _ => false,
        }
    }

    /// Evaluate against a list property: negative operators require that no element hits,
    /// every other operator requires that some element matches.
    pub fn matches_list(&self, values: &[KeyValue]) -> bool {
        match (&self.operand, self.operator) {
            (Operand::Single(x), QueryOperator::NotContains) => !values.contains(x),
            (Operand::Set(set), QueryOperator::NotIn) => {
                !values.iter().any(|v| set.binary_search(v).is_ok())
            }
            _ => values.iter().any(|v| self.matches_value(v)),
        }
    }
}

/// Evaluates queries against packed objects, resolving properties through the schema
pub struct ObjectMatcher<'a> {
    schema: &'a CollectionSchema,
}

impl<'a> ObjectMatcher<'a> {
    pub fn new(schema: &'a CollectionSchema) -> Self {
        ObjectMatcher { schema }
    }

    /// Empty query (no AND branch, or only empty branches) matches everything
    pub fn matches(&self, object: &PackedObject, query: &OrQuery) -> bool {
        query.is_empty() || query.elements.iter().any(|and| self.matches_and(object, and))
    }

    pub fn matches_and(&self, object: &PackedObject, query: &AndQuery) -> bool {
        query.elements.iter().all(|atomic| self.matches_atomic(object, atomic))
    }

    pub fn matches_atomic(&self, object: &PackedObject, query: &AtomicQuery) -> bool {
        match self.schema.slot(&query.property) {
            Some(Slot::PrimaryKey) => query.matches_value(&object.primary_key),
            Some(Slot::Scalar(i)) => match object.value(i) {
                Some(value) => query.matches_value(value),
                None => query.matches_value(&KeyValue::null(&query.property)),
            },
            Some(Slot::List(i)) => query.matches_list(object.list(i).unwrap_or(&[])),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::KeyValueKind;
    use crate::schema::schema::{IndexType, PropertyDescription};

    fn schema() -> CollectionSchema {
        CollectionSchema::new("orders", PropertyDescription::primary("Id", KeyValueKind::Int))
            .with_property(PropertyDescription::ordered("Amount", KeyValueKind::Int))
            .with_property(PropertyDescription::dictionary("Town", KeyValueKind::Text))
            .with_property(PropertyDescription::list("Tags", KeyValueKind::Text, Some(IndexType::Dictionary)))
            .build()
            .unwrap()
    }

    fn order(schema: &CollectionSchema, id: i64, amount: Option<i64>, town: &str, tags: &[&str]) -> PackedObject {
        let mut builder = schema.pack(KeyValue::int("Id", id)).set(KeyValue::text("Town", town));
        if let Some(amount) = amount {
            builder = builder.set(KeyValue::int("Amount", amount));
        }
        builder
            .set_list("Tags", tags.iter().map(|t| KeyValue::text("Tags", t)).collect())
            .build()
            .unwrap()
    }

    #[test]
    fn scalar_operators() {
        let v = KeyValue::int("Amount", 10);
        assert!(AtomicQuery::eq(KeyValue::int("Amount", 10)).matches_value(&v));
        assert!(AtomicQuery::neq(KeyValue::int("Amount", 11)).matches_value(&v));
        assert!(AtomicQuery::le(KeyValue::int("Amount", 10)).matches_value(&v));
        assert!(!AtomicQuery::lt(KeyValue::int("Amount", 10)).matches_value(&v));
        assert!(AtomicQuery::between(KeyValue::int("Amount", 5), KeyValue::int("Amount", 10)).matches_value(&v));
        assert!(AtomicQuery::is_in("Amount", vec![KeyValue::int("", 3), KeyValue::int("", 10)]).matches_value(&v));
    }

    #[test]
    fn composite_ranges_respect_bound_kinds() {
        let lo = KeyValue::int("A", 1);
        let hi = KeyValue::int("A", 3);
        let q = |op| AtomicQuery::range(lo.clone(), hi.clone(), op).unwrap();

        assert!(q(QueryOperator::GeLe).matches_value(&KeyValue::int("A", 1)));
        assert!(!q(QueryOperator::GtLe).matches_value(&KeyValue::int("A", 1)));
        assert!(q(QueryOperator::GtLe).matches_value(&KeyValue::int("A", 3)));
        assert!(!q(QueryOperator::GtLt).matches_value(&KeyValue::int("A", 3)));
        assert!(q(QueryOperator::GeLt).matches_value(&KeyValue::int("A", 2)));
    }

    #[test]
    fn null_never_satisfies_a_range() {
        let null = KeyValue::null("Amount");
        assert!(!AtomicQuery::lt(KeyValue::int("Amount", 5)).matches_value(&null));
        assert!(AtomicQuery::eq(KeyValue::null("Amount")).matches_value(&null));
    }

    #[test]
    fn string_operators_ignore_case() {
        let v = KeyValue::text("Town", "Paris");
        assert!(AtomicQuery::starts_with(KeyValue::text("Town", "pa")).matches_value(&v));
        assert!(AtomicQuery::new(KeyValue::text("Town", "RIS"), QueryOperator::StrEndsWith).unwrap().matches_value(&v));
        assert!(AtomicQuery::new(KeyValue::text("Town", "ar"), QueryOperator::StrContains).unwrap().matches_value(&v));
        assert!(!AtomicQuery::starts_with(KeyValue::text("Town", "ris")).matches_value(&v));
    }

    #[test]
    fn objects_are_matched_through_their_slots() {
        let schema = schema();
        let matcher = ObjectMatcher::new(&schema);
        let obj = order(&schema, 1, Some(120), "Paris", &["urgent", "fragile"]);

        let query = OrQuery::new("orders")
            .or(AndQuery::new()
                .and(AtomicQuery::gt(KeyValue::int("Amount", 100)))
                .and(AtomicQuery::contains(KeyValue::text("Tags", "fragile"))));
        assert!(matcher.matches(&obj, &query));

        let not_tagged = AtomicQuery::new(KeyValue::text("Tags", "urgent"), QueryOperator::NotContains).unwrap();
        assert!(!matcher.matches_atomic(&obj, &not_tagged));
        assert!(matcher.matches_atomic(&obj, &AtomicQuery::eq(KeyValue::int("Id", 1))));
    }

    #[test]
    fn unset_property_behaves_as_null() {
        let schema = schema();
        let matcher = ObjectMatcher::new(&schema);
        let obj = order(&schema, 2, None, "Lyon", &[]);

        assert!(matcher.matches_atomic(&obj, &AtomicQuery::eq(KeyValue::null("Amount"))));
        assert!(!matcher.matches_atomic(&obj, &AtomicQuery::ge(KeyValue::int("Amount", 0))));
    }

    #[test]
    fn empty_or_matches_all_and_unknown_property_matches_nothing() {
        let schema = schema();
        let matcher = ObjectMatcher::new(&schema);
        let obj = order(&schema, 3, Some(1), "Nice", &[]);

        assert!(matcher.matches(&obj, &OrQuery::new("orders")));
        let unknown = OrQuery::single("orders", AtomicQuery::eq(KeyValue::int("Nope", 1)));
        assert!(!matcher.matches(&obj, &unknown));
    }
}
