//! Call interface builder
//!
//! A `CallDescriptor` is a prepared libffi `ffi_cif` plus the storage it
//! points into. Build it once per signature and share it: after
//! preparation nothing mutates it, so concurrent invocations may use the
//! same descriptor.

use core::ffi::c_uint;
use core::iter;
use core::ptr;
use std::fmt;

use libffi::raw::{ffi_abi, ffi_cif, ffi_prep_cif, ffi_status_FFI_OK, ffi_type};

use super::abi::Abi;
use super::catalog::{native_type, NativeType};
use super::types::{BaseKind, TypeCode};
use crate::errors::{FfiError, Phase, Result};
use crate::logging::{log_cif_prepared, log_cif_rejected};

pub struct CallDescriptor {
    cif: Box<ffi_cif>,
    /// Null-terminated; `cif.arg_types` points into this buffer
    arg_types: Box<[*mut ffi_type]>,
    arg_natives: Box<[NativeType]>,
    ret_native: NativeType,
    arg_codes: Box<[TypeCode]>,
    ret_code: TypeCode,
    abi: Abi,
}

// The cif and the type array are written only during `build`.
unsafe impl Send for CallDescriptor {}
unsafe impl Sync for CallDescriptor {}

impl CallDescriptor {
    /// Prepare a call interface for `(arg_codes) -> ret_code` under `abi`
    pub fn build(arg_codes: &[TypeCode], ret_code: TypeCode, abi: Abi) -> Result<Self> {
        let nargs = c_uint::try_from(arg_codes.len()).map_err(|_| FfiError::TooManyArgs {
            count: arg_codes.len(),
        })?;
        if let Some(index) = arg_codes.iter().position(|c| c.kind == BaseKind::Void) {
            return Err(FfiError::VoidArgument { index });
        }

        let arg_natives: Box<[NativeType]> = arg_codes.iter().map(|&c| native_type(c)).collect();
        let ret_native = native_type(ret_code);
        let mut arg_types: Box<[*mut ffi_type]> = arg_natives
            .iter()
            .map(|t| t.as_raw())
            .chain(iter::once(ptr::null_mut()))
            .collect();

        let mut cif: Box<ffi_cif> = Box::default();
        let status = unsafe {
            ffi_prep_cif(
                &mut *cif,
                abi.id(),
                nargs,
                ret_native.as_raw(),
                arg_types.as_mut_ptr(),
            )
        };
        if status != ffi_status_FFI_OK {
            let status = status as u32;
            log_cif_rejected(arg_codes.len(), abi.id(), status);
            return Err(FfiError::CifPreparation { status });
        }

        log_cif_prepared(arg_codes.len(), ret_code, abi.id(), cif.bytes as usize);

        Ok(Self {
            cif,
            arg_types,
            arg_natives,
            ret_native,
            arg_codes: arg_codes.into(),
            ret_code,
            abi,
        })
    }

    /// Build from raw signed type codes and a raw ABI identifier
    pub fn from_raw(arg_codes: &[i32], ret_code: i32, abi: ffi_abi) -> Result<Self> {
        let args = arg_codes
            .iter()
            .map(|&raw| TypeCode::decode(raw, Phase::Build))
            .collect::<Result<Vec<_>>>()?;
        let ret = TypeCode::decode(ret_code, Phase::Build)?;
        Self::build(&args, ret, Abi::from_id(abi))
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.arg_codes.len()
    }

    #[inline]
    pub fn arg_codes(&self) -> &[TypeCode] {
        &self.arg_codes
    }

    #[inline]
    pub fn ret_code(&self) -> TypeCode {
        self.ret_code
    }

    #[inline]
    pub fn abi(&self) -> Abi {
        self.abi
    }

    #[inline]
    pub fn arg_types(&self) -> &[NativeType] {
        &self.arg_natives
    }

    #[inline]
    pub fn ret_type(&self) -> NativeType {
        self.ret_native
    }

    /// Stack bytes libffi computed for the argument frame
    #[inline]
    pub fn frame_size(&self) -> usize {
        self.cif.bytes as usize
    }

    /// libffi takes `*mut` but does not write through it after preparation
    #[inline]
    pub(crate) fn as_raw_ptr(&self) -> *mut ffi_cif {
        &*self.cif as *const ffi_cif as *mut ffi_cif
    }
}

impl fmt::Debug for CallDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallDescriptor")
            .field("args", &self.arg_codes)
            .field("ret", &self.ret_code)
            .field("abi", &self.abi)
            .field("nargs", &self.cif.nargs)
            .field("terminated", &self.arg_types.last().map_or(false, |p| p.is_null()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_void_signature() {
        let desc = CallDescriptor::build(&[], TypeCode::VOID, Abi::DEFAULT).unwrap();
        assert_eq!(desc.arity(), 0);
        assert_eq!(desc.ret_code(), TypeCode::VOID);
        assert_eq!(desc.arg_types.len(), 1);
        assert!(desc.arg_types[0].is_null());
    }

    #[test]
    fn test_build_keeps_codes() {
        let args = [TypeCode::INT, TypeCode::DOUBLE, TypeCode::VOIDP];
        let desc = CallDescriptor::build(&args, TypeCode::LONG.unsigned(), Abi::DEFAULT).unwrap();
        assert_eq!(desc.arg_codes(), &args);
        assert_eq!(desc.arg_types().len(), 3);
        assert_eq!(desc.ret_code(), TypeCode::LONG.unsigned());
        assert_eq!(desc.cif.nargs, 3);
        assert!(desc.arg_types.last().unwrap().is_null());
    }

    #[test]
    fn test_unknown_type_rejected() {
        let err = CallDescriptor::from_raw(&[4, 77], 0, Abi::DEFAULT.id()).unwrap_err();
        assert_eq!(err, FfiError::UnknownType { code: 77, phase: Phase::Build });

        let err = CallDescriptor::from_raw(&[], -99, Abi::DEFAULT.id()).unwrap_err();
        assert_eq!(err, FfiError::UnknownType { code: 99, phase: Phase::Build });
    }

    #[test]
    fn test_void_argument_rejected() {
        let err = CallDescriptor::build(&[TypeCode::VOID], TypeCode::INT, Abi::DEFAULT).unwrap_err();
        assert_eq!(err, FfiError::VoidArgument { index: 0 });
        assert_eq!(err.phase(), Phase::Build);

        let err = CallDescriptor::from_raw(&[4, 0], 0, Abi::DEFAULT.id()).unwrap_err();
        assert_eq!(err, FfiError::VoidArgument { index: 1 });
        assert_eq!(err.to_string(), "argument 1 cannot be void");
    }

    #[test]
    fn test_bad_abi_rejected() {
        let err = CallDescriptor::build(&[TypeCode::INT], TypeCode::INT, Abi::from_id(0xffff))
            .unwrap_err();
        assert!(matches!(err, FfiError::CifPreparation { status } if status != 0));
        assert_eq!(err.phase(), Phase::Build);
    }

    #[test]
    fn test_descriptor_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CallDescriptor>();
    }
}
