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

use std::fmt;

use chrono::{DateTime, Utc};
use serde::ser::{Serialize, SerializeStruct, Serializer};

/// Wire type codes.
pub(crate) mod code {
    pub const URI: u64 = 1;
    pub const STRING: u64 = 2;
    pub const INTEGER: u64 = 4;
    pub const DATETIME: u64 = 8;
    pub const DECIMAL: u64 = 32;
    pub const BOOLEAN: u64 = 64;
    pub const BINARY: u64 = 128;
}

/// Largest absolute decimal exponent accepted from the wire.
pub const MAX_DECIMAL_EXPONENT: u32 = 308;

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Language tag of a string value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Lang {
    #[default]
    None = 0,
    Ru   = 1,
    En   = 2,
}

impl Lang {
    pub const fn code(self) -> u8 { self as u8 }

    /// JSON rendering, `None` for untagged strings.
    pub const fn tag(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Ru => Some("RU"),
            Self::En => Some("EN"),
        }
    }
}

impl TryFrom<u64> for Lang {
    type Error = u64;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Ru),
            2 => Ok(Self::En),
            other => Err(other),
        }
    }
}

/// Exact decimal `mantissa * 10^exponent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Decimal {
    pub mantissa: i64,
    pub exponent: i32,
}

impl Decimal {
    pub const fn new(mantissa: i64, exponent: i32) -> Self { Self { mantissa, exponent } }
}

impl fmt::Display for Decimal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.mantissa == 0 && self.exponent >= 0 {
            return f.write_str("0");
        }

        let sign = if self.mantissa < 0 { "-" } else { "" };
        let digits = self.mantissa.unsigned_abs().to_string();
        let scale = self.exponent.unsigned_abs() as usize;

        if self.exponent >= 0 {
            write!(f, "{sign}{digits}{}", "0".repeat(scale))
        } else if digits.len() > scale {
            let (int, frac) = digits.split_at(digits.len() - scale);
            write!(f, "{sign}{int}.{frac}")
        } else {
            write!(f, "{sign}0.{}{digits}", "0".repeat(scale - digits.len()))
        }
    }
}

/// One typed value of a predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    Uri(String),
    String { text: String, lang: Lang },
    Integer(i64),
    /// Second precision, UTC.
    Datetime(DateTime<Utc>),
    Decimal(Decimal),
    Boolean(bool),
    Binary(Vec<u8>),
}

impl Resource {
    pub fn uri(uri: impl Into<String>) -> Self { Self::Uri(uri.into()) }

    pub fn string(text: impl Into<String>, lang: Lang) -> Self {
        Self::String {
            text: text.into(),
            lang,
        }
    }

    /// Type name used in JSON.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Uri(_) => "Uri",
            Self::String { .. } => "String",
            Self::Integer(_) => "Integer",
            Self::Datetime(_) => "Datetime",
            Self::Decimal(_) => "Decimal",
            Self::Boolean(_) => "Boolean",
            Self::Binary(_) => "Binary",
        }
    }

    pub(crate) const fn type_code(&self) -> u64 {
        match self {
            Self::Uri(_) => code::URI,
            Self::String { .. } => code::STRING,
            Self::Integer(_) => code::INTEGER,
            Self::Datetime(_) => code::DATETIME,
            Self::Decimal(_) => code::DECIMAL,
            Self::Boolean(_) => code::BOOLEAN,
            Self::Binary(_) => code::BINARY,
        }
    }
}

/// Serializes as `{"data": .., "lang": .., "type": ..}`, keys in sorted order.
impl Serialize for Resource {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let lang = match self {
            Self::String { lang, .. } => lang.tag(),
            _ => None,
        };
        let mut state = serializer.serialize_struct("Resource", 2 + usize::from(lang.is_some()))?;

        match self {
            Self::Uri(uri) => state.serialize_field("data", uri)?,
            Self::String { text, .. } => state.serialize_field("data", text)?,
            Self::Integer(value) => state.serialize_field("data", value)?,
            Self::Datetime(at) => {
                state.serialize_field("data", &at.format(DATETIME_FORMAT).to_string())?;
            }
            Self::Decimal(decimal) => state.serialize_field("data", &decimal.to_string())?,
            Self::Boolean(value) => state.serialize_field("data", value)?,
            Self::Binary(bytes) => state.serialize_field("data", bytes)?,
        }
        if let Some(lang) = lang {
            state.serialize_field("lang", lang)?;
        }
        state.serialize_field("type", self.type_name())?;
        state.end()
    }
}
