//! Property-based test generators using proptest.
//!
//! Every generated value is encodable: floats are never NaN.

use persisting_codec::{Record, Value};
use proptest::prelude::*;

/// Strategy for field names.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,11}").expect("Invalid regex")
}

/// Strategy for scalar values.
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Integer),
        any::<f64>()
            .prop_filter("NaN is not encodable", |f| !f.is_nan())
            .prop_map(Value::Float),
        "[ -~]{0,24}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..32).prop_map(Value::Bytes),
    ]
}

/// Strategy for values, nested up to three levels.
pub fn value_strategy() -> impl Strategy<Value = Value> {
    scalar_strategy().prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map(field_name_strategy(), inner, 0..4)
                .prop_map(Value::Map),
        ]
    })
}

/// Strategy for records with up to `max_fields` fields.
pub fn record_strategy(max_fields: usize) -> impl Strategy<Value = Record> {
    prop::collection::btree_map(field_name_strategy(), value_strategy(), 0..=max_fields).prop_map(
        |fields| {
            fields
                .into_iter()
                .fold(Record::new(), |record, (name, value)| record.with(name, value))
        },
    )
}

/// Strategy for records that share a small set of typed columns, the shape
/// a queue usually carries.
pub fn event_record_strategy() -> impl Strategy<Value = Record> {
    (
        any::<u32>(),
        "[a-z]{1,8}",
        prop::option::of(-1.0e6f64..1.0e6),
        any::<bool>(),
    )
        .prop_map(|(id, kind, amount, flag)| {
            let record = Record::new()
                .with("id", i64::from(id))
                .with("kind", kind)
                .with("flag", flag);
            match amount {
                Some(amount) => record.with("amount", amount),
                None => record,
            }
        })
}

/// Strategy for an ordered sequence of records.
pub fn record_batch_strategy(max_len: usize) -> impl Strategy<Value = Vec<Record>> {
    prop::collection::vec(event_record_strategy(), 0..=max_len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::test_runner::TestRunner;

    #[test]
    fn generated_records_encode() {
        let mut runner = TestRunner::default();
        runner
            .run(&record_strategy(6), |record| {
                let bytes = record.encode().expect("encodable");
                prop_assert_eq!(Record::decode(&bytes).unwrap(), record);
                Ok(())
            })
            .unwrap();
    }
}
