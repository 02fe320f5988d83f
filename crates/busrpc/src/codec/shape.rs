// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Payload shapes and zero values.
//!
//! A structural codec such as BSON can only carry documents at the top
//! level, so scalars and sequences are boxed in a single-field carrier.
//! The boxing decision is made from the [`Shape`] of the Rust type being
//! decoded, found by probing its `Deserialize` implementation: the first
//! `deserialize_*` hint the type asks for reveals what it expects.

use serde::de::value::{Error as ValueError, StrDeserializer};
use serde::de::{self, DeserializeOwned, DeserializeSeed, Deserializer, IntoDeserializer, Visitor};
use serde_json::Value;
use std::cell::Cell;

/// Coarse shape of a payload value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Number, boolean, string, char, timestamp, unit
    Scalar,
    /// Array, tuple, byte buffer
    Sequence,
    /// Struct or map
    Record,
    /// Decided by the data (self-describing values, enums)
    Dynamic,
}

impl Shape {
    /// Shape expected by `T`'s `Deserialize` implementation.
    pub fn of<T: DeserializeOwned>() -> Self {
        let found = Cell::new(None);
        // The probe always errors out once it has seen the first hint.
        let _ = T::deserialize(Probe(&found));
        found.get().unwrap_or(Shape::Dynamic)
    }

    /// Shape of an already serialized value.
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Object(_) => Shape::Record,
            Value::Array(_) => Shape::Sequence,
            _ => Shape::Scalar,
        }
    }

    /// True if a structural codec must wrap this shape in a carrier.
    pub fn is_boxed(self) -> bool {
        matches!(self, Shape::Scalar | Shape::Sequence)
    }
}

/// Zero value of `T`: `false`, `0`, `""`, `None`, empty collections, and
/// structs whose fields are all zero. Enums have no zero value.
pub fn zero_value<T: DeserializeOwned>() -> Result<T, ValueError> {
    T::deserialize(Zero)
}

#[derive(Clone, Copy)]
struct Probe<'a>(&'a Cell<Option<Shape>>);

impl Probe<'_> {
    fn found<T>(self, shape: Shape) -> Result<T, ValueError> {
        self.0.set(Some(shape));
        Err(de::Error::custom("shape probe"))
    }
}

macro_rules! probe_hints {
    ($shape:expr => $($method:ident)*) => {
        $(
            fn $method<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
                self.found($shape)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for Probe<'_> {
    type Error = ValueError;

    probe_hints!(Shape::Dynamic => deserialize_any deserialize_ignored_any);
    probe_hints!(Shape::Scalar =>
        deserialize_bool deserialize_i8 deserialize_i16 deserialize_i32 deserialize_i64
        deserialize_i128 deserialize_u8 deserialize_u16 deserialize_u32 deserialize_u64
        deserialize_u128 deserialize_f32 deserialize_f64 deserialize_char deserialize_str
        deserialize_string deserialize_identifier deserialize_unit);
    probe_hints!(Shape::Sequence => deserialize_bytes deserialize_byte_buf deserialize_seq);
    probe_hints!(Shape::Record => deserialize_map);

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.found(Shape::Scalar)
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.found(Shape::Sequence)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.found(Shape::Sequence)
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.found(Shape::Record)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        self.found(Shape::Dynamic)
    }
}

#[derive(Clone, Copy)]
struct Zero;

macro_rules! zero_ints {
    ($($method:ident => $visit:ident),*) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
                visitor.$visit(0)
            }
        )*
    };
}

impl<'de> Deserializer<'de> for Zero {
    type Error = ValueError;

    zero_ints!(
        deserialize_i8 => visit_i8, deserialize_i16 => visit_i16,
        deserialize_i32 => visit_i32, deserialize_i64 => visit_i64,
        deserialize_i128 => visit_i128, deserialize_u8 => visit_u8,
        deserialize_u16 => visit_u16, deserialize_u32 => visit_u32,
        deserialize_u64 => visit_u64, deserialize_u128 => visit_u128
    );

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_bool(false)
    }

    fn deserialize_f32<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_f32(0.0)
    }

    fn deserialize_f64<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_f64(0.0)
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_char('\0')
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_str("")
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_string(String::new())
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_str("")
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_bytes(&[])
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_byte_buf(Vec::new())
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_none()
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_unit()
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_seq(ZeroSeq { remaining: 0 })
    }

    fn deserialize_tuple<V: Visitor<'de>>(
        self,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_seq(ZeroSeq { remaining: len })
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        len: usize,
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_seq(ZeroSeq { remaining: len })
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Self::Error> {
        visitor.visit_map(ZeroFields { fields: &[] })
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Self::Error> {
        visitor.visit_map(ZeroFields { fields })
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        _variants: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        Err(de::Error::custom(format!("enum {} has no zero value", name)))
    }
}

struct ZeroSeq {
    remaining: usize,
}

impl<'de> de::SeqAccess<'de> for ZeroSeq {
    type Error = ValueError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>, Self::Error> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        seed.deserialize(Zero).map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining)
    }
}

struct ZeroFields {
    fields: &'static [&'static str],
}

impl<'de> de::MapAccess<'de> for ZeroFields {
    type Error = ValueError;

    fn next_key_seed<K: DeserializeSeed<'de>>(
        &mut self,
        seed: K,
    ) -> Result<Option<K::Value>, Self::Error> {
        let Some((field, rest)) = self.fields.split_first() else {
            return Ok(None);
        };
        self.fields = rest;
        let key: StrDeserializer<'static, ValueError> = field.into_deserializer();
        seed.deserialize(key).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Self::Error> {
        seed.deserialize(Zero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reading {
        sensor: String,
        value: f64,
        samples: Vec<u32>,
        note: Option<String>,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Meters(f64);

    #[allow(dead_code)]
    #[derive(Debug, Deserialize, PartialEq)]
    enum Mode {
        Fast,
        Slow,
    }

    #[test]
    fn probe_scalars() {
        assert_eq!(Shape::of::<i32>(), Shape::Scalar);
        assert_eq!(Shape::of::<bool>(), Shape::Scalar);
        assert_eq!(Shape::of::<String>(), Shape::Scalar);
        assert_eq!(Shape::of::<f64>(), Shape::Scalar);
        assert_eq!(Shape::of::<()>(), Shape::Scalar);
        assert_eq!(Shape::of::<Option<u64>>(), Shape::Scalar);
        assert_eq!(Shape::of::<Meters>(), Shape::Scalar);
    }

    #[test]
    fn probe_composites() {
        assert_eq!(Shape::of::<Reading>(), Shape::Record);
        assert_eq!(Shape::of::<HashMap<String, i32>>(), Shape::Record);
        assert_eq!(Shape::of::<Vec<String>>(), Shape::Sequence);
        assert_eq!(Shape::of::<(i32, String)>(), Shape::Sequence);
        assert_eq!(Shape::of::<Option<Reading>>(), Shape::Record);
        assert_eq!(Shape::of::<Value>(), Shape::Dynamic);
        assert_eq!(Shape::of::<Mode>(), Shape::Dynamic);
    }

    #[test]
    fn value_shapes() {
        assert_eq!(Shape::of_value(&serde_json::json!(42)), Shape::Scalar);
        assert_eq!(Shape::of_value(&serde_json::json!([1, 2])), Shape::Sequence);
        assert_eq!(Shape::of_value(&serde_json::json!({"a": 1})), Shape::Record);
        assert!(Shape::Scalar.is_boxed());
        assert!(!Shape::Record.is_boxed());
    }

    #[test]
    fn zero_values() {
        assert_eq!(zero_value::<i32>().unwrap(), 0);
        assert!(!zero_value::<bool>().unwrap());
        assert_eq!(zero_value::<String>().unwrap(), "");
        assert_eq!(zero_value::<Option<String>>().unwrap(), None);
        assert!(zero_value::<Vec<u8>>().unwrap().is_empty());
        assert_eq!(zero_value::<(u8, bool)>().unwrap(), (0, false));
        assert_eq!(zero_value::<Meters>().unwrap(), Meters(0.0));
        assert_eq!(
            zero_value::<Reading>().unwrap(),
            Reading {
                sensor: String::new(),
                value: 0.0,
                samples: Vec::new(),
                note: None,
            }
        );
        assert!(zero_value::<Mode>().is_err());
    }
}
