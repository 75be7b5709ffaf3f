//! Invoker - perform the native call through a prepared descriptor
//!
//! Per call, each scalar is written into a `repr(C)` slot at the exact
//! width of its parameter type, libffi is handed the slot pointers, and the
//! last-error state is read the moment the routine returns.

use core::ffi::{c_int, c_long, c_uint, c_ulong, c_void};
use core::ptr;

use libffi::middle::CodePtr;
use libffi::raw::ffi_call;
use smallvec::SmallVec;

use super::catalog::NativeType;
use super::cif::CallDescriptor;
use super::errstate::{self, LastError};
use super::marshal::INLINE_ARGS;
use super::types::{BaseKind, NativeScalar, TypeCode};
use crate::errors::{FfiError, Result};
use crate::logging::{log_ffi_call, log_ffi_return};

/// Storage for one argument, read by libffi at the parameter's width
#[repr(C)]
#[derive(Clone, Copy)]
union ArgSlot {
    u8: u8,
    u16: u16,
    u32: u32,
    u64: u64,
    f32: f32,
    f64: f64,
    ptr: *mut c_void,
}

impl ArgSlot {
    /// Narrow or widen `scalar` to the size of `ty`, as C conversion would
    fn store(ty: NativeType, scalar: NativeScalar) -> Self {
        let mut slot = Self { u64: 0 };
        match scalar {
            NativeScalar::Void => {}
            NativeScalar::Float(x) => slot.f32 = x,
            NativeScalar::Double(x) => slot.f64 = x,
            NativeScalar::Pointer(addr) => slot.ptr = addr as *mut c_void,
            other => {
                let bits = other.int_bits().unwrap_or(0);
                match ty.size() {
                    1 => slot.u8 = bits as u8,
                    2 => slot.u16 = bits as u16,
                    4 => slot.u32 = bits as u32,
                    _ => slot.u64 = bits,
                }
            }
        }
        slot
    }
}

/// Return buffer. libffi widens integral results narrower than a register
/// to a full `ffi_arg`, which is pointer-sized on every supported target.
#[repr(C)]
union ReturnSlot {
    word: usize,
    u64: u64,
    f32: f32,
    f64: f64,
    ptr: *mut c_void,
    _pad: [u64; 2],
}

fn decode_return(code: TypeCode, ty: NativeType, ret: &ReturnSlot) -> NativeScalar {
    let signed = code.is_signed();
    unsafe {
        match code.kind {
            BaseKind::Void => NativeScalar::Void,
            BaseKind::VoidP => NativeScalar::Pointer(ret.ptr as usize),
            BaseKind::Char | BaseKind::Short | BaseKind::Int => {
                let word = ret.word;
                match (ty.size(), signed) {
                    (1, true) => NativeScalar::Int(word as i8 as c_int),
                    (1, false) => NativeScalar::UInt(word as u8 as c_uint),
                    (2, true) => NativeScalar::Int(word as i16 as c_int),
                    (2, false) => NativeScalar::UInt(word as u16 as c_uint),
                    (_, true) => NativeScalar::Int(word as i32 as c_int),
                    (_, false) => NativeScalar::UInt(word as u32 as c_uint),
                }
            }
            BaseKind::Long => {
                let bits = if ty.size() == 8 { ret.u64 } else { ret.word as u64 };
                if signed {
                    NativeScalar::Long(bits as c_ulong as c_long)
                } else {
                    NativeScalar::ULong(bits as c_ulong)
                }
            }
            #[cfg(feature = "long-long")]
            BaseKind::LongLong => {
                if signed {
                    NativeScalar::LongLong(ret.u64 as i64)
                } else {
                    NativeScalar::ULongLong(ret.u64)
                }
            }
            BaseKind::Float => NativeScalar::Float(ret.f32),
            BaseKind::Double => NativeScalar::Double(ret.f64),
        }
    }
}

/// Call the routine at `target` with already-marshaled arguments
///
/// Returns the native result and the error state captured immediately
/// after the routine returned. Argument buffers are local to this call and
/// released on every path.
///
/// # Safety
/// `target` must be the address of a routine whose actual signature and
/// calling convention match `descriptor`. Pointer arguments must be valid
/// for whatever the routine does with them. Nothing here can check either.
pub unsafe fn call(
    descriptor: &CallDescriptor,
    target: usize,
    args: &[NativeScalar],
) -> Result<(NativeScalar, LastError)> {
    let arity = descriptor.arity();
    if args.len() != arity {
        return Err(FfiError::ArgCountMismatch {
            expected: arity,
            got: args.len(),
        });
    }

    let mut slots: SmallVec<[ArgSlot; INLINE_ARGS]> = SmallVec::with_capacity(arity);
    let params = descriptor.arg_codes().iter().zip(descriptor.arg_types());
    for (index, ((&code, &ty), &scalar)) in params.zip(args).enumerate() {
        if !scalar.fits(code.kind) {
            return Err(FfiError::ScalarMismatch {
                index: Some(index),
                expected: code,
            });
        }
        slots.push(ArgSlot::store(ty, scalar));
    }

    // `slots` no longer grows, so these pointers stay valid through the call
    let mut values: SmallVec<[*mut c_void; INLINE_ARGS + 1]> = slots
        .iter_mut()
        .map(|slot| slot as *mut ArgSlot as *mut c_void)
        .collect();
    values.push(ptr::null_mut());

    let mut ret = ReturnSlot { _pad: [0; 2] };
    let code = CodePtr::from_ptr(target as *const c_void);

    log_ffi_call(target, arity);

    ffi_call(
        descriptor.as_raw_ptr(),
        Some(*code.as_safe_fun()),
        &mut ret as *mut ReturnSlot as *mut c_void,
        values.as_mut_ptr(),
    );
    let last_error = errstate::capture();

    log_ffi_return(target, last_error.errno);

    let result = decode_return(descriptor.ret_code(), descriptor.ret_type(), &ret);
    Ok((result, last_error))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interop::catalog::native_type;

    unsafe fn read<T: Copy>(slot: &ArgSlot) -> T {
        ptr::read(slot as *const ArgSlot as *const T)
    }

    #[test]
    fn test_slot_narrows_to_parameter_width() {
        let slot = ArgSlot::store(native_type(TypeCode::CHAR), NativeScalar::Int(-2));
        assert_eq!(unsafe { read::<i8>(&slot) }, -2);

        let slot = ArgSlot::store(native_type(TypeCode::SHORT.unsigned()), NativeScalar::UInt(0x1_0005));
        assert_eq!(unsafe { read::<u16>(&slot) }, 5);

        let slot = ArgSlot::store(native_type(TypeCode::INT), NativeScalar::Int(i32::MIN));
        assert_eq!(unsafe { read::<i32>(&slot) }, i32::MIN);
    }

    #[test]
    fn test_slot_floats_and_pointers() {
        let slot = ArgSlot::store(native_type(TypeCode::FLOAT), NativeScalar::Float(2.5));
        assert_eq!(unsafe { read::<f32>(&slot) }, 2.5);

        let slot = ArgSlot::store(native_type(TypeCode::VOIDP), NativeScalar::Pointer(0x1000));
        assert_eq!(unsafe { read::<usize>(&slot) }, 0x1000);
    }

    #[test]
    fn test_decode_small_returns() {
        let ret = ReturnSlot { word: 0xff };
        let ty = native_type(TypeCode::CHAR);
        assert_eq!(decode_return(TypeCode::CHAR, ty, &ret), NativeScalar::Int(-1));

        let uty = native_type(TypeCode::CHAR.unsigned());
        assert_eq!(
            decode_return(TypeCode::CHAR.unsigned(), uty, &ret),
            NativeScalar::UInt(255)
        );
    }
}
