//! Type catalog - type codes to libffi type records
//!
//! The mapping must agree with the platform C ABI for every width, or the
//! call interface lays out registers and stack slots wrongly. Width
//! assumptions are checked at compile time below.

use core::ffi::{c_char, c_int, c_long, c_short};
use core::mem::size_of;
use core::ptr::addr_of_mut;
use std::fmt;

use libffi::low::{ffi_type, types};

use super::types::{BaseKind, TypeCode};
use crate::errors::{Phase, Result};

const _: () = assert!(size_of::<c_char>() == 1);
const _: () = assert!(size_of::<c_short>() == 2);
const _: () = assert!(size_of::<c_int>() == 4);
const _: () = assert!(size_of::<c_long>() == 4 || size_of::<c_long>() == 8);
const _: () = assert!(size_of::<*const ()>() == size_of::<usize>());
#[cfg(feature = "long-long")]
const _: () = assert!(size_of::<core::ffi::c_longlong>() == 8);

const LONG_IS_64: bool = size_of::<c_long>() == 8;

/// libffi `FFI_TYPE_*` tags
pub mod tag {
    pub const VOID: u16 = 0;
    pub const FLOAT: u16 = 2;
    pub const DOUBLE: u16 = 3;
    pub const UINT8: u16 = 5;
    pub const SINT8: u16 = 6;
    pub const UINT16: u16 = 7;
    pub const SINT16: u16 = 8;
    pub const UINT32: u16 = 9;
    pub const SINT32: u16 = 10;
    pub const UINT64: u16 = 11;
    pub const SINT64: u16 = 12;
    pub const POINTER: u16 = 14;
}

/// Resolved native type: one of libffi's static type records
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct NativeType {
    raw: *mut ffi_type,
}

// Points at libffi's immutable builtin type records.
unsafe impl Send for NativeType {}
unsafe impl Sync for NativeType {}

impl NativeType {
    #[inline]
    pub fn size(self) -> usize {
        unsafe { (*self.raw).size }
    }

    #[inline]
    pub fn alignment(self) -> u16 {
        unsafe { (*self.raw).alignment }
    }

    /// libffi `FFI_TYPE_*` tag
    #[inline]
    pub fn tag(self) -> u16 {
        unsafe { (*self.raw).type_ }
    }

    #[inline]
    pub(crate) fn as_raw(self) -> *mut ffi_type {
        self.raw
    }
}

impl fmt::Debug for NativeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeType")
            .field("tag", &self.tag())
            .field("size", &self.size())
            .field("alignment", &self.alignment())
            .finish()
    }
}

macro_rules! by_sign {
    ($signed:expr, $s:ident, $u:ident) => {
        if $signed {
            addr_of_mut!(types::$s)
        } else {
            addr_of_mut!(types::$u)
        }
    };
}

/// Native type record for a type code
pub fn native_type(code: TypeCode) -> NativeType {
    let signed = code.is_signed();
    #[allow(unused_unsafe)]
    let raw = unsafe {
        match code.kind {
            BaseKind::Void => addr_of_mut!(types::void),
            BaseKind::VoidP => addr_of_mut!(types::pointer),
            BaseKind::Char => by_sign!(signed, sint8, uint8),
            BaseKind::Short => by_sign!(signed, sint16, uint16),
            BaseKind::Int => by_sign!(signed, sint32, uint32),
            BaseKind::Long if LONG_IS_64 => by_sign!(signed, sint64, uint64),
            BaseKind::Long => by_sign!(signed, sint32, uint32),
            #[cfg(feature = "long-long")]
            BaseKind::LongLong => by_sign!(signed, sint64, uint64),
            BaseKind::Float => addr_of_mut!(types::float),
            BaseKind::Double => addr_of_mut!(types::double),
        }
    };
    NativeType { raw }
}

/// Native type record for a raw signed code
pub fn native_descriptor(raw: i32) -> Result<NativeType> {
    TypeCode::decode(raw, Phase::Build).map(native_type)
}
