use paste::paste;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The declared type of a metric.
///
/// A metric's datatype is fixed by the first value written under its name;
/// later writes must carry the same datatype.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Boolean,
    Integer,
    Float,
    Text,
    Bytes,
}

/// A scalar metric value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum MetricValue {
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl MetricValue {
    pub fn datatype(&self) -> DataType {
        match self {
            MetricValue::Boolean(_) => DataType::Boolean,
            MetricValue::Integer(_) => DataType::Integer,
            MetricValue::Float(_) => DataType::Float,
            MetricValue::Text(_) => DataType::Text,
            MetricValue::Bytes(_) => DataType::Bytes,
        }
    }
}

macro_rules! impl_from_for_value_variant {
    ($variant:ident, [$($type:ty),* $(,)?]) => {
        $(
            impl From<$type> for MetricValue {
                fn from(value: $type) -> Self {
                    MetricValue::$variant(value.into())
                }
            }
        )*
    };
}

impl_from_for_value_variant!(Boolean, [bool]);
impl_from_for_value_variant!(Integer, [i8, i16, i32, i64, u8, u16, u32]);
impl_from_for_value_variant!(Float, [f32, f64]);
impl_from_for_value_variant!(Text, [String, &str]);
impl_from_for_value_variant!(Bytes, [Vec<u8>]);

#[derive(Debug, Error, PartialEq)]
pub enum FromValueError {
    #[error("value variant type was invalid")]
    InvalidVariantType,
}

macro_rules! impl_value_variant_accessors {
    ($($variant:ident => $type:ty),* $(,)?) => {
        paste! {
            impl MetricValue {
                $(
                    #[doc = "Borrow the inner value if this is a `" $variant "`."]
                    pub fn [<as_ $variant:lower>](&self) -> Option<&$type> {
                        if let MetricValue::$variant(v) = self { Some(v) } else { None }
                    }
                )*
            }

            $(
                impl TryFrom<MetricValue> for $type {
                    type Error = FromValueError;
                    fn try_from(value: MetricValue) -> Result<Self, Self::Error> {
                        if let MetricValue::$variant(v) = value {
                            Ok(v)
                        } else {
                            Err(FromValueError::InvalidVariantType)
                        }
                    }
                }
            )*
        }
    };
}

impl_value_variant_accessors!(
    Boolean => bool,
    Integer => i64,
    Float => f64,
    Text => String,
    Bytes => Vec<u8>,
);
