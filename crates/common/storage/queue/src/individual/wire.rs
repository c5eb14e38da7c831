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

//! MessagePack wire form of an [`Individual`].
//!
//! ```text
//! [ subject, { predicate: [ [code, value, (lang | exponent)?], ... ], ... } ]
//! ```

use chrono::DateTime;
use rmpv::Value;
use snafu::ensure;

use super::{
    Individual, SUBJECT_KEY,
    resource::{Decimal, Lang, MAX_DECIMAL_EXPONENT, Resource, code},
};
use crate::{QueueError, Result, error::MalformedPayloadSnafu};

fn malformed(reason: impl Into<String>) -> QueueError {
    QueueError::MalformedPayload {
        reason: reason.into(),
    }
}

pub(super) fn decode(data: &[u8]) -> Result<Individual> {
    let mut rd = data;
    let value = rmpv::decode::read_value(&mut rd)
        .map_err(|e| malformed(format!("not a MessagePack value: {e}")))?;
    ensure!(
        rd.is_empty(),
        MalformedPayloadSnafu {
            reason: format!("{} trailing bytes", rd.len()),
        }
    );

    let Value::Array(top) = value else {
        return Err(malformed("top level is not an array"));
    };
    let [subject, predicates] = top.as_slice() else {
        return Err(malformed(format!(
            "top level has {} elements, expected 2",
            top.len()
        )));
    };
    let Value::Map(entries) = predicates else {
        return Err(malformed("predicates are not a map"));
    };

    let mut individual = Individual::new(text(subject, "subject")?);
    for (key, values) in entries {
        let predicate = text(key, "predicate")?;
        ensure!(
            predicate != SUBJECT_KEY,
            MalformedPayloadSnafu {
                reason: format!("predicate {SUBJECT_KEY:?} is reserved for the subject"),
            }
        );
        let Value::Array(values) = values else {
            return Err(malformed(format!("values of {predicate} are not an array")));
        };

        let slot = individual.predicates.entry(predicate.to_string()).or_default();
        for value in values {
            slot.push(resource(value)?);
        }
    }
    Ok(individual)
}

fn text<'a>(value: &'a Value, what: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| malformed(format!("{what} is not a UTF-8 string")))
}

fn int(value: &Value, what: &str) -> Result<i64> {
    value
        .as_i64()
        .ok_or_else(|| malformed(format!("{what} is not a signed 64-bit integer")))
}

fn resource(value: &Value) -> Result<Resource> {
    let Value::Array(items) = value else {
        return Err(malformed("resource is not an array"));
    };
    let Some((type_code, fields)) = items.split_first() else {
        return Err(malformed("empty resource"));
    };
    let type_code = type_code
        .as_u64()
        .ok_or_else(|| malformed("resource type is not an unsigned integer"))?;

    let resource = match (type_code, fields) {
        (code::URI, [uri]) => Resource::uri(text(uri, "uri")?),
        (code::STRING, [value]) => Resource::string(text(value, "string")?, Lang::None),
        (code::STRING, [value, lang]) => {
            let lang = lang
                .as_u64()
                .and_then(|l| Lang::try_from(l).ok())
                .ok_or_else(|| malformed(format!("invalid language {lang}")))?;
            Resource::string(text(value, "string")?, lang)
        }
        (code::INTEGER, [value]) => Resource::Integer(int(value, "integer")?),
        (code::DATETIME, [value]) => {
            let secs = int(value, "datetime")?;
            let at = DateTime::from_timestamp(secs, 0)
                .ok_or_else(|| malformed(format!("datetime {secs} out of range")))?;
            Resource::Datetime(at)
        }
        (code::DECIMAL, [mantissa, exponent]) => {
            let mantissa = int(mantissa, "decimal mantissa")?;
            let exponent = int(exponent, "decimal exponent")?;
            let exponent = i32::try_from(exponent)
                .ok()
                .filter(|e| e.unsigned_abs() <= MAX_DECIMAL_EXPONENT)
                .ok_or_else(|| malformed(format!("decimal exponent {exponent} out of range")))?;
            Resource::Decimal(Decimal::new(mantissa, exponent))
        }
        (code::BOOLEAN, [value]) => Resource::Boolean(
            value
                .as_bool()
                .ok_or_else(|| malformed("boolean is not a bool"))?,
        ),
        (code::BINARY, [value]) => match value {
            Value::Binary(bytes) => Resource::Binary(bytes.clone()),
            _ => return Err(malformed("binary is not a bin")),
        },
        (other, fields) => {
            return Err(malformed(format!(
                "unknown resource type {other} with {} fields",
                fields.len()
            )));
        }
    };
    Ok(resource)
}

pub(super) fn encode(individual: &Individual) -> Result<Vec<u8>> {
    let predicates = individual
        .predicates
        .iter()
        .map(|(predicate, values)| {
            (
                Value::from(predicate.as_str()),
                Value::Array(values.iter().map(resource_value).collect()),
            )
        })
        .collect();
    let value = Value::Array(vec![
        Value::from(individual.subject.as_str()),
        Value::Map(predicates),
    ]);

    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &value).map_err(|e| malformed(e.to_string()))?;
    Ok(buf)
}

fn resource_value(resource: &Resource) -> Value {
    let mut items = vec![Value::from(resource.type_code())];
    match resource {
        Resource::Uri(uri) => items.push(Value::from(uri.as_str())),
        Resource::String { text, lang } => {
            items.push(Value::from(text.as_str()));
            if *lang != Lang::None {
                items.push(Value::from(lang.code()));
            }
        }
        Resource::Integer(value) => items.push(Value::from(*value)),
        Resource::Datetime(at) => items.push(Value::from(at.timestamp())),
        Resource::Decimal(decimal) => {
            items.push(Value::from(decimal.mantissa));
            items.push(Value::from(decimal.exponent));
        }
        Resource::Boolean(value) => items.push(Value::from(*value)),
        Resource::Binary(bytes) => items.push(Value::Binary(bytes.clone())),
    }
    Value::Array(items)
}
