//! JSON encoding for float buffers that may hold NaN or infinities.
//!
//! Finite values are plain numbers. Non-finite values are written as the
//! strings `"NaN"`, `"Infinity"` and `"-Infinity"`, which JSON numbers cannot express.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

pub trait JsonFloat: Copy {
    fn is_finite(self) -> bool;
    fn label(self) -> &'static str;
    fn from_label(label: &str) -> Option<Self>;
}

macro_rules! json_float {
    ($ty:ty) => {
        impl JsonFloat for $ty {
            fn is_finite(self) -> bool {
                <$ty>::is_finite(self)
            }

            fn label(self) -> &'static str {
                if self.is_nan() {
                    "NaN"
                } else if self.is_sign_positive() {
                    "Infinity"
                } else {
                    "-Infinity"
                }
            }

            fn from_label(label: &str) -> Option<Self> {
                match label.to_ascii_lowercase().as_str() {
                    "nan" => Some(<$ty>::NAN),
                    "inf" | "+inf" | "infinity" => Some(<$ty>::INFINITY),
                    "-inf" | "-infinity" => Some(<$ty>::NEG_INFINITY),
                    _ => None,
                }
            }
        }
    };
}

json_float!(f32);
json_float!(f64);

#[derive(Serialize)]
#[serde(untagged)]
enum Encoded<T> {
    Number(T),
    Label(&'static str),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Decoded<T> {
    Number(T),
    Label(String),
}

#[allow(clippy::ptr_arg)]
pub fn serialize<T, S>(values: &Vec<T>, serializer: S) -> Result<S::Ok, S::Error>
where
    T: JsonFloat + Serialize,
    S: Serializer,
{
    serializer.collect_seq(values.iter().map(|&value| {
        if value.is_finite() {
            Encoded::Number(value)
        } else {
            Encoded::Label(value.label())
        }
    }))
}

pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    T: JsonFloat + Deserialize<'de>,
    D: Deserializer<'de>,
{
    Vec::<Decoded<T>>::deserialize(deserializer)?
        .into_iter()
        .map(|value| match value {
            Decoded::Number(number) => Ok(number),
            Decoded::Label(label) => T::from_label(&label)
                .ok_or_else(|| D::Error::custom(format!("invalid float value '{label}'"))),
        })
        .collect()
}
