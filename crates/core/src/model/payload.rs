//! Bucket payloads
//!
//! A payload holds exactly one typed value. Setters are write-once: once a
//! field is populated every further set fails, and documents that populate
//! more than one field are rejected at parse time.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Kind of value held by a [`Payload`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PayloadType {
    /// Single double
    DoubleValue,
    /// Array of doubles
    DoubleArray,
    /// Single long
    LongValue,
    /// Array of longs
    LongArray,
    /// Single string
    StringValue,
    /// Array of strings
    StringArray,
    /// String-keyed map of arbitrary JSON
    Map,
}

impl PayloadType {
    /// JSON field name for this kind
    pub fn as_str(&self) -> &'static str {
        match self {
            PayloadType::DoubleValue => "doubleValue",
            PayloadType::DoubleArray => "doubleArray",
            PayloadType::LongValue => "longValue",
            PayloadType::LongArray => "longArray",
            PayloadType::StringValue => "stringValue",
            PayloadType::StringArray => "stringArray",
            PayloadType::Map => "map",
        }
    }
}

impl fmt::Display for PayloadType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload mutation or parse failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// A value is already present
    #[error("Payload already holds a {0}; payloads are write-once")]
    AlreadySet(PayloadType),

    /// A parsed document populated more than one field
    #[error("Payload populates {0} fields, expected at most one")]
    MultipleValues(usize),
}

/// Typed value attached to a bucket
///
/// Equality is structural, so array payloads compare element-wise.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawPayload")]
pub struct Payload {
    #[serde(skip_serializing_if = "Option::is_none")]
    double_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    double_array: Option<Vec<f64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    long_value: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    long_array: Option<Vec<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    string_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    string_array: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    map: Option<BTreeMap<String, Value>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawPayload {
    #[serde(default)]
    double_value: Option<f64>,
    #[serde(default)]
    double_array: Option<Vec<f64>>,
    #[serde(default)]
    long_value: Option<i64>,
    #[serde(default)]
    long_array: Option<Vec<i64>>,
    #[serde(default)]
    string_value: Option<String>,
    #[serde(default)]
    string_array: Option<Vec<String>>,
    #[serde(default)]
    map: Option<BTreeMap<String, Value>>,
}

impl TryFrom<RawPayload> for Payload {
    type Error = PayloadError;

    fn try_from(raw: RawPayload) -> Result<Self, Self::Error> {
        let payload = Payload {
            double_value: raw.double_value,
            double_array: raw.double_array,
            long_value: raw.long_value,
            long_array: raw.long_array,
            string_value: raw.string_value,
            string_array: raw.string_array,
            map: raw.map,
        };
        let populated = payload.populated_count();
        if populated > 1 {
            return Err(PayloadError::MultipleValues(populated));
        }
        Ok(payload)
    }
}

macro_rules! payload_accessors {
    ($($field:ident, $setter:ident, $ctor:ident, $ty:ty, $kind:ident;)*) => {
        $(
            #[doc = concat!("Payload holding a `", stringify!($field), "`")]
            pub fn $ctor(value: $ty) -> Self {
                Payload {
                    $field: Some(value),
                    ..Payload::default()
                }
            }

            #[doc = concat!("Set the `", stringify!($field), "`, failing if any value is present")]
            pub fn $setter(&mut self, value: $ty) -> Result<(), PayloadError> {
                self.check_empty()?;
                self.$field = Some(value);
                Ok(())
            }
        )*

        /// Kind of the populated value, `None` when empty
        pub fn fetch_type(&self) -> Option<PayloadType> {
            $(
                if self.$field.is_some() {
                    return Some(PayloadType::$kind);
                }
            )*
            None
        }

        fn populated_count(&self) -> usize {
            0 $(+ usize::from(self.$field.is_some()))*
        }
    };
}

impl Payload {
    payload_accessors! {
        double_value, set_double_value, from_double, f64, DoubleValue;
        double_array, set_double_array, from_double_array, Vec<f64>, DoubleArray;
        long_value, set_long_value, from_long, i64, LongValue;
        long_array, set_long_array, from_long_array, Vec<i64>, LongArray;
        string_value, set_string_value, from_string, String, StringValue;
        string_array, set_string_array, from_string_array, Vec<String>, StringArray;
        map, set_map, from_map, BTreeMap<String, Value>, Map;
    }

    /// Double value, if that is the populated kind
    pub fn double_value(&self) -> Option<f64> {
        self.double_value
    }

    /// Double array, if that is the populated kind
    pub fn double_array(&self) -> Option<&[f64]> {
        self.double_array.as_deref()
    }

    /// Long value, if that is the populated kind
    pub fn long_value(&self) -> Option<i64> {
        self.long_value
    }

    /// Long array, if that is the populated kind
    pub fn long_array(&self) -> Option<&[i64]> {
        self.long_array.as_deref()
    }

    /// String value, if that is the populated kind
    pub fn string_value(&self) -> Option<&str> {
        self.string_value.as_deref()
    }

    /// String array, if that is the populated kind
    pub fn string_array(&self) -> Option<&[String]> {
        self.string_array.as_deref()
    }

    /// Map, if that is the populated kind
    pub fn map(&self) -> Option<&BTreeMap<String, Value>> {
        self.map.as_ref()
    }

    /// True when no value has been set
    pub fn is_empty(&self) -> bool {
        self.fetch_type().is_none()
    }

    fn check_empty(&self) -> Result<(), PayloadError> {
        match self.fetch_type() {
            Some(kind) => Err(PayloadError::AlreadySet(kind)),
            None => Ok(()),
        }
    }
}
