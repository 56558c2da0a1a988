//! Serde field representation for `f32` values that may be non-finite.
//!
//! JSON has no NaN or infinity (serde_json writes them as `null`), so those
//! values are written as the strings `"NaN"`, `"inf"` and `"-inf"`. Finite
//! values stay plain numbers. Deserialization accepts either form.
//!
//! Use with `#[serde(with = "float_repr")]`.

use serde::de::{self, Visitor};
use serde::{Deserializer, Serializer};
use std::fmt;

pub fn serialize<S>(value: &f32, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    if value.is_finite() {
        serializer.serialize_f32(*value)
    } else {
        serializer.serialize_str(&value.to_string())
    }
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    deserializer.deserialize_any(FloatVisitor)
}

struct FloatVisitor;

impl<'de> Visitor<'de> for FloatVisitor {
    type Value = f32;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a number or one of \"NaN\", \"inf\", \"-inf\"")
    }

    fn visit_f32<E: de::Error>(self, v: f32) -> Result<f32, E> {
        Ok(v)
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<f32, E> {
        Ok(v as f32)
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<f32, E> {
        Ok(v as f32)
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<f32, E> {
        Ok(v as f32)
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<f32, E> {
        v.trim()
            .parse::<f32>()
            .map_err(|_| E::invalid_value(de::Unexpected::Str(v), &self))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Serialize, Deserialize)]
    struct Weight {
        #[serde(with = "super")]
        value: f32,
    }

    fn round_trip(value: f32) -> f32 {
        let json = serde_json::to_string(&Weight { value }).unwrap();
        serde_json::from_str::<Weight>(&json).unwrap().value
    }

    #[test]
    fn test_non_finite_values_survive_json() {
        assert!(round_trip(f32::NAN).is_nan());
        assert_eq!(round_trip(f32::INFINITY), f32::INFINITY);
        assert_eq!(round_trip(f32::NEG_INFINITY), f32::NEG_INFINITY);
        assert_eq!(round_trip(0.4), 0.4);
    }

    #[test]
    fn test_wire_format() {
        let json = serde_json::to_value(Weight { value: f32::NAN }).unwrap();
        assert_eq!(json["value"], "NaN");

        let json = serde_json::to_value(Weight { value: 2.0 }).unwrap();
        assert_eq!(json["value"], serde_json::json!(2.0f32));
    }

    #[test]
    fn test_accepts_integers_and_numeric_strings() {
        let w: Weight = serde_json::from_str(r#"{"value": 3}"#).unwrap();
        assert_eq!(w.value, 3.0);

        let w: Weight = serde_json::from_str(r#"{"value": "0.5"}"#).unwrap();
        assert_eq!(w.value, 0.5);

        assert!(serde_json::from_str::<Weight>(r#"{"value": "heavy"}"#).is_err());
    }
}
