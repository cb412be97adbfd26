//! Device-layer values, and conversion to and from asyn native types.
//!
//! NDS PVs declare one of a closed set of [`DataType`]s and exchange data as a
//! [`Value`]. asyn speaks in native scalars (`i32`, `f64`) and element slices
//! (`i8`, `i16`, `i32`, `f32`, `f64`). [`Value::convert_to`] bridges the two:
//!
//! - Numeric kinds convert element-wise with checked casts, failing if any
//!   element is not representable in the target type. A scalar converts to a
//!   one-element array and back.
//! - [`Value::Int8Array`], [`Value::UInt8Array`] and [`Value::String`] are
//!   byte-reinterpreted into each other, since EPICS carries strings and
//!   unsigned bytes in `CHAR` waveforms. Strings decoded from bytes stop at
//!   the first NUL.
//!
//! [`NativeScalar`] and [`NativeElement`] tie the asyn native types to the
//! matching value kinds.

use num::{NumCast, cast::AsPrimitive};
use thiserror::Error;

/// Kind of data carried by a PV
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Int32,
    Float64,
    Int8Array,
    UInt8Array,
    Int16Array,
    Int32Array,
    Float32Array,
    Float64Array,
    String,
}

impl DataType {
    /// Is this a single value, rather than an array or string
    pub fn is_scalar(&self) -> bool {
        matches!(self, DataType::Int32 | DataType::Float64)
    }
}

/// A value exchanged with a PV
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Int32(i32),
    Float64(f64),
    Int8Array(Vec<i8>),
    UInt8Array(Vec<u8>),
    Int16Array(Vec<i16>),
    Int32Array(Vec<i32>),
    Float32Array(Vec<f32>),
    Float64Array(Vec<f64>),
    String(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("No reasonable data conversion from {from:?} to {to:?}")]
    NoConvert { from: DataType, to: DataType },
    #[error("Cannot convert {count} elements of {from:?} into the scalar {to:?}")]
    NotScalar {
        from: DataType,
        to: DataType,
        count: usize,
    },
}

impl Value {
    /// An empty (or zero) value of the given kind
    pub fn default_for(data_type: DataType) -> Value {
        match data_type {
            DataType::Int32 => Value::Int32(0),
            DataType::Float64 => Value::Float64(0.0),
            DataType::Int8Array => Value::Int8Array(Vec::new()),
            DataType::UInt8Array => Value::UInt8Array(Vec::new()),
            DataType::Int16Array => Value::Int16Array(Vec::new()),
            DataType::Int32Array => Value::Int32Array(Vec::new()),
            DataType::Float32Array => Value::Float32Array(Vec::new()),
            DataType::Float64Array => Value::Float64Array(Vec::new()),
            DataType::String => Value::String(String::new()),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int32(_) => DataType::Int32,
            Value::Float64(_) => DataType::Float64,
            Value::Int8Array(_) => DataType::Int8Array,
            Value::UInt8Array(_) => DataType::UInt8Array,
            Value::Int16Array(_) => DataType::Int16Array,
            Value::Int32Array(_) => DataType::Int32Array,
            Value::Float32Array(_) => DataType::Float32Array,
            Value::Float64Array(_) => DataType::Float64Array,
            Value::String(_) => DataType::String,
        }
    }

    /// Number of elements. Strings count bytes.
    pub fn len(&self) -> usize {
        match self {
            Value::Int32(_) | Value::Float64(_) => 1,
            Value::Int8Array(v) => v.len(),
            Value::UInt8Array(v) => v.len(),
            Value::Int16Array(v) => v.len(),
            Value::Int32Array(v) => v.len(),
            Value::Float32Array(v) => v.len(),
            Value::Float64Array(v) => v.len(),
            Value::String(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw bytes for the kinds that travel in a `CHAR` waveform
    fn as_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Value::Int8Array(v) => Some(v.iter().map(|b| *b as u8).collect()),
            Value::UInt8Array(v) => Some(v.clone()),
            Value::String(v) => Some(v.as_bytes().to_vec()),
            _ => None,
        }
    }

    /// Every element of a numeric value, checked-cast to `U`
    fn numeric_elements<U>(&self, to: DataType) -> Result<Vec<U>, ConversionError>
    where
        U: NumCast + Copy,
    {
        /// Utility function so that we don't have to repeat the map iter conversion
        fn _try_convert_vec<T, U>(from: &[T], err: ConversionError) -> Result<Vec<U>, ConversionError>
        where
            T: Copy + NumCast,
            U: NumCast,
        {
            from.iter()
                .map(|n| NumCast::from(*n).ok_or_else(|| err.clone()))
                .collect()
        }
        let err = ConversionError::NoConvert {
            from: self.data_type(),
            to,
        };
        match self {
            Value::Int32(v) => _try_convert_vec(&[*v], err),
            Value::Float64(v) => _try_convert_vec(&[*v], err),
            Value::Int8Array(v) => _try_convert_vec(v, err),
            Value::UInt8Array(v) => _try_convert_vec(v, err),
            Value::Int16Array(v) => _try_convert_vec(v, err),
            Value::Int32Array(v) => _try_convert_vec(v, err),
            Value::Float32Array(v) => _try_convert_vec(v, err),
            Value::Float64Array(v) => _try_convert_vec(v, err),
            Value::String(_) => Err(err),
        }
    }

    fn single<U: NumCast + Copy>(&self, to: DataType) -> Result<U, ConversionError> {
        match self.numeric_elements::<U>(to)?.as_slice() {
            [value] => Ok(*value),
            other => Err(ConversionError::NotScalar {
                from: self.data_type(),
                to,
                count: other.len(),
            }),
        }
    }

    pub fn convert_to(&self, data_type: DataType) -> Result<Value, ConversionError> {
        /// Reinterpret raw bytes as a byte-sized element type
        fn _from_bytes<T>(bytes: Vec<u8>) -> Vec<T>
        where
            T: Copy + 'static,
            u8: AsPrimitive<T>,
        {
            bytes.into_iter().map(|b| b.as_()).collect()
        }

        if self.data_type() == data_type {
            return Ok(self.clone());
        }
        let no_convert = ConversionError::NoConvert {
            from: self.data_type(),
            to: data_type,
        };
        Ok(match data_type {
            DataType::Int32 => Value::Int32(self.single(data_type)?),
            DataType::Float64 => Value::Float64(self.single(data_type)?),
            DataType::Int8Array => match self.as_bytes() {
                Some(bytes) => Value::Int8Array(_from_bytes(bytes)),
                None => Value::Int8Array(self.numeric_elements(data_type)?),
            },
            DataType::UInt8Array => match self.as_bytes() {
                Some(bytes) => Value::UInt8Array(bytes),
                None => Value::UInt8Array(self.numeric_elements(data_type)?),
            },
            DataType::Int16Array => Value::Int16Array(self.numeric_elements(data_type)?),
            DataType::Int32Array => Value::Int32Array(self.numeric_elements(data_type)?),
            DataType::Float32Array => Value::Float32Array(self.numeric_elements(data_type)?),
            DataType::Float64Array => Value::Float64Array(self.numeric_elements(data_type)?),
            DataType::String => {
                let mut bytes = self.as_bytes().ok_or(no_convert.clone())?;
                if let Some(end) = bytes.iter().position(|&c| c == 0) {
                    bytes.truncate(end);
                }
                Value::String(String::from_utf8(bytes).map_err(|_| no_convert)?)
            }
        })
    }
}

/// An asyn scalar type, read and written as a single value
pub trait NativeScalar: Copy + Send + Sync + 'static {
    const DATA_TYPE: DataType;
    fn into_value(self) -> Value;
    fn extract(value: &Value) -> Result<Self, ConversionError>;
}

/// An asyn array element type, read and written as a slice
pub trait NativeElement: Copy + Send + Sync + 'static {
    const ARRAY_TYPE: DataType;
    fn into_value(values: Vec<Self>) -> Value;
    fn extract(value: &Value) -> Result<Vec<Self>, ConversionError>;
}

macro_rules! impl_native_scalar {
    ($typ:ty, $variant:ident) => {
        impl NativeScalar for $typ {
            const DATA_TYPE: DataType = DataType::$variant;
            fn into_value(self) -> Value {
                Value::$variant(self)
            }
            fn extract(value: &Value) -> Result<Self, ConversionError> {
                Ok(match value.convert_to(DataType::$variant)? {
                    Value::$variant(v) => v,
                    _ => unreachable!(),
                })
            }
        }
        impl From<$typ> for Value {
            fn from(value: $typ) -> Self {
                Value::$variant(value)
            }
        }
    };
}
impl_native_scalar!(i32, Int32);
impl_native_scalar!(f64, Float64);

macro_rules! impl_native_element {
    ($typ:ty, $variant:ident) => {
        impl NativeElement for $typ {
            const ARRAY_TYPE: DataType = DataType::$variant;
            fn into_value(values: Vec<Self>) -> Value {
                Value::$variant(values)
            }
            fn extract(value: &Value) -> Result<Vec<Self>, ConversionError> {
                Ok(match value.convert_to(DataType::$variant)? {
                    Value::$variant(v) => v,
                    _ => unreachable!(),
                })
            }
        }
        impl From<Vec<$typ>> for Value {
            fn from(value: Vec<$typ>) -> Self {
                Value::$variant(value)
            }
        }
    };
}
impl_native_element!(i8, Int8Array);
impl_native_element!(i16, Int16Array);
impl_native_element!(i32, Int32Array);
impl_native_element!(f32, Float32Array);
impl_native_element!(f64, Float64Array);

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::UInt8Array(value)
    }
}
impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}
impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_conversions() {
        let v: Value = vec![500i32].into();
        assert_eq!(v.convert_to(DataType::Int16Array).unwrap(), Value::Int16Array(vec![500]));
        assert!(v.convert_to(DataType::Int8Array).is_err());
        assert_eq!(v.convert_to(DataType::Int32).unwrap(), Value::Int32(500));
        assert_eq!(v.convert_to(DataType::Float64).unwrap(), Value::Float64(500.0));

        let v = Value::Float64Array(vec![500.23, 12.7]);
        assert_eq!(
            v.convert_to(DataType::Int16Array).unwrap(),
            Value::Int16Array(vec![500, 12])
        );
        assert!(matches!(
            v.convert_to(DataType::Float64),
            Err(ConversionError::NotScalar { count: 2, .. })
        ));
        assert_eq!(
            Value::Float64(f64::NAN).convert_to(DataType::Int32),
            Err(ConversionError::NoConvert {
                from: DataType::Float64,
                to: DataType::Int32
            })
        );
    }

    #[test]
    fn bytes_are_reinterpreted() {
        let v = Value::UInt8Array(vec![0, 127, 128, 255]);
        assert_eq!(
            v.convert_to(DataType::Int8Array).unwrap(),
            Value::Int8Array(vec![0, 127, -128, -1])
        );
        assert_eq!(
            Value::Int8Array(vec![0, 127, -128, -1])
                .convert_to(DataType::UInt8Array)
                .unwrap(),
            v
        );
    }

    #[test]
    fn strings_and_char_arrays() {
        let s = Value::from("a test string");
        let as_char = s.convert_to(DataType::Int8Array).unwrap();
        assert_eq!(as_char.len(), 13);
        assert_eq!(as_char.convert_to(DataType::String).unwrap(), s);

        let padded = Value::Int8Array(vec![b'o' as i8, b'k' as i8, 0, b'x' as i8]);
        assert_eq!(padded.convert_to(DataType::String).unwrap(), Value::from("ok"));

        assert!(Value::Int8Array(vec![-1]).convert_to(DataType::String).is_err());
        assert!(Value::Int32(4).convert_to(DataType::String).is_err());
        assert!(s.convert_to(DataType::Float64Array).is_err());
    }

    #[test]
    fn native_extraction() {
        assert_eq!(<i32 as NativeScalar>::extract(&Value::Float64(3.0)).unwrap(), 3);
        assert_eq!(<f64 as NativeScalar>::extract(&Value::Int32(-7)).unwrap(), -7.0);
        assert_eq!(
            <i8 as NativeElement>::extract(&Value::from("hi")).unwrap(),
            vec![b'h' as i8, b'i' as i8]
        );
        assert_eq!(
            <f64 as NativeElement>::into_value(vec![1.0]),
            Value::Float64Array(vec![1.0])
        );
        assert_eq!(<i32 as NativeElement>::ARRAY_TYPE, DataType::Int32Array);
        assert_eq!(<i32 as NativeScalar>::DATA_TYPE, DataType::Int32);
    }
}
