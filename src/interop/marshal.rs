//! Type marshaling - boxed values <-> native scalars
//!
//! Integers accept the union of the signed and unsigned range of their
//! width and are stored two's-complement, as a C assignment would. On the
//! way back, the sign of the type code decides how the bits are read.

use core::ffi::{c_int, c_long, c_uint, c_ulong};

use smallvec::SmallVec;

use super::types::{BaseKind, NativeScalar, TypeCode};
use crate::errors::{FfiError, Phase, Result};
use crate::value::{ConversionError, PointerHandle, Value};

/// Inline capacity for per-call argument buffers
pub const INLINE_ARGS: usize = 8;

pub type NativeArgs = SmallVec<[NativeScalar; INLINE_ARGS]>;

/// Coerce `value` to an integer of `bits` width, returned as raw bits
fn integer_bits(value: &Value, bits: u32, target: &'static str) -> Result<u64> {
    let n = value.to_integer().map_err(FfiError::conversion)?;
    let min = -(1i128 << (bits - 1));
    let max = (1i128 << bits) - 1;
    if n < min || n > max {
        return Err(FfiError::conversion(ConversionError::OutOfRange {
            value: n,
            target,
        }));
    }
    Ok(n as u64)
}

/// Marshal one boxed value for a parameter of type `code`
pub fn to_native(code: TypeCode, value: &Value) -> Result<NativeScalar> {
    let signed = code.is_signed();
    let target = code.name();

    let scalar = match code.kind {
        BaseKind::Void => NativeScalar::Void,
        BaseKind::VoidP => {
            NativeScalar::Pointer(value.to_address().map_err(FfiError::conversion)?)
        }
        BaseKind::Char | BaseKind::Short | BaseKind::Int => {
            let bits = integer_bits(value, c_int::BITS, target)? as c_uint;
            if signed {
                NativeScalar::Int(bits as c_int)
            } else {
                NativeScalar::UInt(bits)
            }
        }
        BaseKind::Long => {
            let bits = integer_bits(value, c_long::BITS, target)? as c_ulong;
            if signed {
                NativeScalar::Long(bits as c_long)
            } else {
                NativeScalar::ULong(bits)
            }
        }
        #[cfg(feature = "long-long")]
        BaseKind::LongLong => {
            let bits = integer_bits(value, u64::BITS, target)?;
            if signed {
                NativeScalar::LongLong(bits as i64)
            } else {
                NativeScalar::ULongLong(bits)
            }
        }
        BaseKind::Float => {
            NativeScalar::Float(value.to_float().map_err(FfiError::conversion)? as f32)
        }
        BaseKind::Double => {
            NativeScalar::Double(value.to_float().map_err(FfiError::conversion)?)
        }
    };
    Ok(scalar)
}

/// `to_native` for a raw signed type code
pub fn to_native_raw(raw: i32, value: &Value) -> Result<NativeScalar> {
    to_native(TypeCode::decode(raw, Phase::Marshal)?, value)
}

/// Marshal a full argument list against its parameter codes
pub fn marshal_args(codes: &[TypeCode], values: &[Value]) -> Result<NativeArgs> {
    if codes.len() != values.len() {
        return Err(FfiError::ArgCountMismatch {
            expected: codes.len(),
            got: values.len(),
        });
    }

    codes
        .iter()
        .zip(values)
        .enumerate()
        .map(|(i, (&code, value))| to_native(code, value).map_err(|e| e.at_index(i)))
        .collect()
}

#[inline]
fn integer_value(signed: bool, as_signed: i128, as_unsigned: i128) -> Value {
    Value::Integer(if signed { as_signed } else { as_unsigned })
}

/// Box a native scalar read as type `code`
pub fn from_native(code: TypeCode, scalar: NativeScalar) -> Result<Value> {
    if !scalar.fits(code.kind) {
        return Err(FfiError::ScalarMismatch {
            index: None,
            expected: code,
        });
    }

    let signed = code.is_signed();
    let value = match scalar {
        NativeScalar::Void => Value::Nil,
        NativeScalar::Pointer(addr) => Value::Pointer(PointerHandle::new(addr)),
        NativeScalar::Int(v) => integer_value(signed, v as i128, v as c_uint as i128),
        NativeScalar::UInt(v) => integer_value(signed, v as c_int as i128, v as i128),
        NativeScalar::Long(v) => integer_value(signed, v as i128, v as c_ulong as i128),
        NativeScalar::ULong(v) => integer_value(signed, v as c_long as i128, v as i128),
        #[cfg(feature = "long-long")]
        NativeScalar::LongLong(v) => integer_value(signed, v as i128, v as u64 as i128),
        #[cfg(feature = "long-long")]
        NativeScalar::ULongLong(v) => integer_value(signed, v as i64 as i128, v as i128),
        NativeScalar::Float(x) => Value::Float(x as f64),
        NativeScalar::Double(x) => Value::Float(x),
    };
    Ok(value)
}

/// `from_native` for a raw signed type code
pub fn from_native_raw(raw: i32, scalar: NativeScalar) -> Result<Value> {
    from_native(TypeCode::decode(raw, Phase::Unmarshal)?, scalar)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn round_trip(code: TypeCode, value: Value) -> Value {
        from_native(code, to_native(code, &value).unwrap()).unwrap()
    }

    #[test]
    fn test_void_ignores_value() {
        assert_eq!(to_native(TypeCode::VOID, &Value::Float(f64::NAN)), Ok(NativeScalar::Void));
        assert_eq!(from_native(TypeCode::VOID, NativeScalar::Void), Ok(Value::Nil));
    }

    #[test]
    fn test_small_ints_marshal_at_int_width() {
        assert_eq!(to_native(TypeCode::CHAR, &Value::from(-5)), Ok(NativeScalar::Int(-5)));
        assert_eq!(to_native(TypeCode::SHORT, &Value::from(300)), Ok(NativeScalar::Int(300)));
        assert_eq!(
            to_native(TypeCode::CHAR.unsigned(), &Value::from(200)),
            Ok(NativeScalar::UInt(200))
        );
    }

    #[test]
    fn test_int_range_checked() {
        let err = to_native(TypeCode::INT, &Value::Integer(1 << 40)).unwrap_err();
        assert_eq!(
            err,
            FfiError::Conversion {
                index: None,
                source: ConversionError::OutOfRange { value: 1 << 40, target: "int" },
            }
        );
        // the unsigned range is accepted and wraps
        assert_eq!(
            to_native(TypeCode::INT, &Value::from(u32::MAX)),
            Ok(NativeScalar::Int(-1))
        );
    }

    #[test]
    fn test_sign_fidelity() {
        let value = round_trip(TypeCode::INT.unsigned(), Value::from(-1));
        assert_eq!(value, Value::from(u32::MAX));

        let back = from_native(TypeCode::LONG.unsigned(), NativeScalar::Long(-1)).unwrap();
        assert_eq!(back, Value::Integer(c_ulong::MAX as i128));

        let back = from_native(TypeCode::INT, NativeScalar::UInt(0x8000_0000)).unwrap();
        assert_eq!(back, Value::from(i32::MIN));
    }

    #[cfg(feature = "long-long")]
    #[test]
    fn test_long_long_follows_code_sign() {
        let code = TypeCode::LONG_LONG;
        assert_eq!(round_trip(code, Value::from(i64::MIN)), Value::from(i64::MIN));
        assert_eq!(
            round_trip(code.unsigned(), Value::from(u64::MAX)),
            Value::from(u64::MAX)
        );
        assert_eq!(
            to_native(code.unsigned(), &Value::from(u64::MAX)),
            Ok(NativeScalar::ULongLong(u64::MAX))
        );
        assert!(to_native(code, &Value::Integer(1 << 64)).is_err());
    }

    #[cfg(feature = "long-long")]
    #[test]
    fn test_range_error_names_unsigned_type() {
        let err = to_native(TypeCode::LONG_LONG.unsigned(), &Value::Integer(1 << 64)).unwrap_err();
        assert_eq!(
            err.to_string(),
            "integer 18446744073709551616 too big to convert to `unsigned long long'"
        );

        let err = marshal_args(&[TypeCode::SHORT.unsigned()], &[Value::Integer(1 << 40)]).unwrap_err();
        assert!(err.to_string().ends_with("`unsigned short'"));
    }

    #[test]
    fn test_pointer_round_trip() {
        let back = round_trip(TypeCode::VOIDP, Value::from(0x1000usize));
        assert_eq!(back.as_pointer().map(PointerHandle::address), Some(0x1000));

        let handle = PointerHandle::with_size(0x2000, 64);
        assert_eq!(
            to_native(TypeCode::VOIDP, &Value::Pointer(handle)),
            Ok(NativeScalar::Pointer(0x2000))
        );
        assert_eq!(to_native(TypeCode::VOIDP, &Value::Nil), Ok(NativeScalar::Pointer(0)));
    }

    #[test]
    fn test_floats() {
        assert_eq!(to_native(TypeCode::FLOAT, &Value::Float(1.5)), Ok(NativeScalar::Float(1.5)));
        assert_eq!(to_native(TypeCode::DOUBLE, &Value::from(3)), Ok(NativeScalar::Double(3.0)));
        assert_eq!(round_trip(TypeCode::FLOAT, Value::Float(0.1)), Value::Float(0.1f32 as f64));
        assert!(to_native(TypeCode::DOUBLE, &Value::Nil).is_err());
    }

    #[test]
    fn test_mismatched_scalar() {
        let err = from_native(TypeCode::DOUBLE, NativeScalar::Int(1)).unwrap_err();
        assert_eq!(err, FfiError::ScalarMismatch { index: None, expected: TypeCode::DOUBLE });
        assert_eq!(err.phase(), Phase::Unmarshal);
    }

    #[test]
    fn test_raw_codes() {
        assert_eq!(to_native_raw(-4, &Value::from(7)), Ok(NativeScalar::UInt(7)));
        assert_eq!(
            to_native_raw(12, &Value::Nil),
            Err(FfiError::UnknownType { code: 12, phase: Phase::Marshal })
        );
        assert_eq!(
            from_native_raw(-12, NativeScalar::Void),
            Err(FfiError::UnknownType { code: 12, phase: Phase::Unmarshal })
        );
    }

    #[test]
    fn test_marshal_args_reports_index() {
        let codes = [TypeCode::INT, TypeCode::DOUBLE];
        let err = marshal_args(&codes, &[Value::from(1), Value::Nil]).unwrap_err();
        assert!(matches!(err, FfiError::Conversion { index: Some(1), .. }));

        let err = marshal_args(&codes, &[Value::from(1)]).unwrap_err();
        assert_eq!(err, FfiError::ArgCountMismatch { expected: 2, got: 1 });

        let args = marshal_args(&codes, &[Value::from(1), Value::Float(2.0)]).unwrap();
        assert_eq!(args.as_slice(), &[NativeScalar::Int(1), NativeScalar::Double(2.0)]);
    }

    proptest! {
        #[test]
        fn prop_int_round_trip(v in any::<i32>()) {
            for code in [TypeCode::CHAR, TypeCode::SHORT, TypeCode::INT] {
                prop_assert_eq!(round_trip(code, Value::from(v)), Value::from(v));
            }
        }

        #[test]
        fn prop_unsigned_int_round_trip(v in any::<u32>()) {
            prop_assert_eq!(round_trip(TypeCode::INT.unsigned(), Value::from(v)), Value::from(v));
        }

        #[test]
        fn prop_long_round_trip(v in any::<c_long>()) {
            prop_assert_eq!(round_trip(TypeCode::LONG, Value::Integer(v as i128)), Value::Integer(v as i128));
        }

        #[test]
        fn prop_unsigned_never_negative(v in any::<c_long>()) {
            let back = round_trip(TypeCode::LONG.unsigned(), Value::Integer(v as i128));
            prop_assert!(back.as_integer().unwrap() >= 0);
        }

        #[cfg(feature = "long-long")]
        #[test]
        fn prop_long_long_round_trip(v in any::<i64>()) {
            prop_assert_eq!(round_trip(TypeCode::LONG_LONG, Value::from(v)), Value::from(v));
        }
    }
}
