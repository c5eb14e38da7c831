// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Individuals: a subject URI with typed values grouped by predicate.
//!
//! OBJECT frames carry an individual in MessagePack form. [`convert_to_json`]
//! turns such a body into canonical JSON:
//!
//! ```text
//! {"@":"d:ivan","rdf:type":[{"data":"v-s:Person","type":"Uri"}]}
//! ```
//!
//! Object keys are sorted, values keep their wire order.

mod resource;
mod wire;

use std::collections::BTreeMap;

use serde::ser::{Serialize, SerializeMap, Serializer};
use snafu::ensure;

pub use self::resource::{Decimal, Lang, MAX_DECIMAL_EXPONENT, Resource};
use crate::{QueueError, Result, error::MalformedPayloadSnafu};

/// JSON key holding the subject.
pub const SUBJECT_KEY: &str = "@";

/// Decode an OBJECT body and render it as canonical JSON.
pub fn convert_to_json(data: &[u8]) -> Result<String> { Individual::from_msgpack(data)?.to_json() }

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Individual {
    subject:    String,
    predicates: BTreeMap<String, Vec<Resource>>,
}

impl Individual {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject:    subject.into(),
            predicates: BTreeMap::new(),
        }
    }

    /// Append a value to `predicate`.
    #[must_use]
    pub fn with(mut self, predicate: impl Into<String>, resource: Resource) -> Self {
        self.add(predicate, resource);
        self
    }

    pub fn add(&mut self, predicate: impl Into<String>, resource: Resource) {
        self.predicates
            .entry(predicate.into())
            .or_default()
            .push(resource);
    }

    pub fn subject(&self) -> &str { &self.subject }

    pub fn get(&self, predicate: &str) -> Option<&[Resource]> {
        self.predicates.get(predicate).map(Vec::as_slice)
    }

    /// Predicates in sorted order.
    pub fn predicates(&self) -> impl Iterator<Item = (&str, &[Resource])> {
        self.predicates
            .iter()
            .map(|(predicate, values)| (predicate.as_str(), values.as_slice()))
    }

    pub fn from_msgpack(data: &[u8]) -> Result<Self> { wire::decode(data) }

    pub fn to_msgpack(&self) -> Result<Vec<u8>> { wire::encode(self) }

    pub fn to_json(&self) -> Result<String> {
        ensure!(
            !self.predicates.contains_key(SUBJECT_KEY),
            MalformedPayloadSnafu {
                reason: format!("predicate {SUBJECT_KEY:?} is reserved for the subject"),
            }
        );
        serde_json::to_string(self).map_err(|e| QueueError::MalformedPayload {
            reason: e.to_string(),
        })
    }
}

impl Serialize for Individual {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.predicates.len() + 1))?;
        let mut subject_written = false;
        for (predicate, values) in &self.predicates {
            if !subject_written && predicate.as_str() > SUBJECT_KEY {
                map.serialize_entry(SUBJECT_KEY, &self.subject)?;
                subject_written = true;
            }
            map.serialize_entry(predicate, values)?;
        }
        if !subject_written {
            map.serialize_entry(SUBJECT_KEY, &self.subject)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;
    use rmpv::Value;

    use super::*;

    fn pack(value: &Value) -> Vec<u8> {
        let mut buf = Vec::new();
        rmpv::encode::write_value(&mut buf, value).unwrap();
        buf
    }

    fn resource(fields: Vec<Value>) -> Value { Value::Array(fields) }

    #[test]
    fn test_convert_to_json() {
        let data = pack(&Value::Array(vec![
            Value::from("d:test"),
            Value::Map(vec![
                (
                    Value::from("v-s:weight"),
                    Value::Array(vec![resource(vec![
                        Value::from(32),
                        Value::from(12345),
                        Value::from(-2),
                    ])]),
                ),
                (
                    Value::from("rdfs:label"),
                    Value::Array(vec![
                        resource(vec![Value::from(2), Value::from("Ivan"), Value::from(1)]),
                        resource(vec![Value::from(2), Value::from("John"), Value::from(2)]),
                    ]),
                ),
                (
                    Value::from("rdf:type"),
                    Value::Array(vec![resource(vec![Value::from(1), Value::from("v-s:Person")])]),
                ),
                (
                    Value::from("v-s:age"),
                    Value::Array(vec![resource(vec![Value::from(4), Value::from(42)])]),
                ),
                (
                    Value::from("v-s:created"),
                    Value::Array(vec![resource(vec![Value::from(8), Value::from(0)])]),
                ),
                (
                    Value::from("v-s:active"),
                    Value::Array(vec![resource(vec![Value::from(64), Value::from(true)])]),
                ),
                (
                    Value::from("v-s:blob"),
                    Value::Array(vec![resource(vec![Value::from(128), Value::Binary(vec![1, 2])])]),
                ),
            ]),
        ]));

        let json = convert_to_json(&data).unwrap();
        assert_eq!(
            json,
            concat!(
                r#"{"@":"d:test","#,
                r#""rdf:type":[{"data":"v-s:Person","type":"Uri"}],"#,
                r#""rdfs:label":[{"data":"Ivan","lang":"RU","type":"String"},"#,
                r#"{"data":"John","lang":"EN","type":"String"}],"#,
                r#""v-s:active":[{"data":true,"type":"Boolean"}],"#,
                r#""v-s:age":[{"data":42,"type":"Integer"}],"#,
                r#""v-s:blob":[{"data":[1,2],"type":"Binary"}],"#,
                r#""v-s:created":[{"data":"1970-01-01T00:00:00Z","type":"Datetime"}],"#,
                r#""v-s:weight":[{"data":"123.45","type":"Decimal"}]}"#,
            )
        );
    }

    #[test]
    fn test_repeated_predicate_keeps_every_value() {
        let data = pack(&Value::Array(vec![
            Value::from("d:x"),
            Value::Map(vec![
                (
                    Value::from("p"),
                    Value::Array(vec![resource(vec![Value::from(4), Value::from(1)])]),
                ),
                (
                    Value::from("p"),
                    Value::Array(vec![resource(vec![Value::from(4), Value::from(2)])]),
                ),
                (Value::from("empty"), Value::Array(Vec::new())),
            ]),
        ]));

        let individual = Individual::from_msgpack(&data).unwrap();
        assert_eq!(
            individual.get("p").unwrap(),
            &[Resource::Integer(1), Resource::Integer(2)]
        );
        assert_eq!(
            individual.to_json().unwrap(),
            r#"{"@":"d:x","empty":[],"p":[{"data":1,"type":"Integer"},{"data":2,"type":"Integer"}]}"#
        );
    }

    #[test]
    fn test_subject_sorts_among_predicates() {
        let individual = Individual::new("d:x").with("#tag", Resource::Boolean(true));
        assert_eq!(
            individual.to_json().unwrap(),
            r##"{"#tag":[{"data":true,"type":"Boolean"}],"@":"d:x"}"##
        );
    }

    #[test]
    fn test_builder_roundtrip() {
        let individual = Individual::new("d:ivan")
            .with("rdf:type", Resource::uri("v-s:Person"))
            .with("v-s:birth", Resource::Datetime(DateTime::from_timestamp(-86_400, 0).unwrap()))
            .with("v-s:balance", Resource::Decimal(Decimal::new(-1050, -2)));

        let data = individual.to_msgpack().unwrap();
        assert_eq!(data[0], 0x92);
        assert_eq!(Individual::from_msgpack(&data).unwrap(), individual);
        assert_eq!(
            convert_to_json(&data).unwrap(),
            concat!(
                r#"{"@":"d:ivan","rdf:type":[{"data":"v-s:Person","type":"Uri"}],"#,
                r#""v-s:balance":[{"data":"-10.50","type":"Decimal"}],"#,
                r#""v-s:birth":[{"data":"1969-12-31T00:00:00Z","type":"Datetime"}]}"#,
            )
        );
    }

    #[test]
    fn test_malformed_top_level() {
        let cases = [
            Vec::new(),
            pack(&Value::from("just a string")),
            pack(&Value::Array(vec![Value::from("d:x")])),
            pack(&Value::Array(vec![Value::from(1), Value::Map(Vec::new())])),
            pack(&Value::Array(vec![Value::from("d:x"), Value::Array(Vec::new())])),
            {
                let mut data = pack(&Value::Array(vec![Value::from("d:x"), Value::Map(Vec::new())]));
                data.push(0xC0);
                data
            },
        ];
        for data in cases {
            assert!(
                matches!(convert_to_json(&data), Err(QueueError::MalformedPayload { .. })),
                "{data:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_reserved_predicate_rejected_on_render() {
        let individual = Individual::new("d:x").with(SUBJECT_KEY, Resource::Integer(1));
        assert!(matches!(
            individual.to_json(),
            Err(QueueError::MalformedPayload { .. })
        ));
    }
}
