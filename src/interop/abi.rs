//! Calling convention selection
//!
//! An `Abi` is libffi's own identifier. Only the platform default is known
//! everywhere; `stdcall` exists on 32-bit x86 Windows.

use std::fmt;

use libffi::raw::{ffi_abi, ffi_abi_FFI_DEFAULT_ABI};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Abi(ffi_abi);

impl Abi {
    /// Platform default (`FFI_DEFAULT_ABI`)
    pub const DEFAULT: Self = Self(ffi_abi_FFI_DEFAULT_ABI);

    #[cfg(all(target_arch = "x86", target_os = "windows"))]
    pub const STDCALL: Self = Self(libffi::raw::ffi_abi_FFI_STDCALL);

    /// Wrap a raw identifier. Not validated here: `ffi_prep_cif` rejects
    /// identifiers this platform does not know.
    #[inline]
    pub const fn from_id(id: ffi_abi) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn id(self) -> ffi_abi {
        self.0
    }

    #[inline]
    pub const fn is_default(self) -> bool {
        self.0 == ffi_abi_FFI_DEFAULT_ABI
    }

    /// Whether this platform offers a distinct stdcall convention
    pub const fn has_stdcall() -> bool {
        cfg!(all(target_arch = "x86", target_os = "windows"))
    }
}

impl Default for Abi {
    #[inline]
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Debug for Abi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_default() {
            write!(f, "Abi::DEFAULT({})", self.0)
        } else {
            write!(f, "Abi({})", self.0)
        }
    }
}

/// Configuration-facing ABI name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AbiName {
    #[default]
    Default,
    Stdcall,
}

impl AbiName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Stdcall => "stdcall",
        }
    }

    /// Resolve to a platform ABI; `None` when this platform lacks it
    pub fn resolve(self) -> Option<Abi> {
        match self {
            Self::Default => Some(Abi::DEFAULT),
            #[cfg(all(target_arch = "x86", target_os = "windows"))]
            Self::Stdcall => Some(Abi::STDCALL),
            #[cfg(not(all(target_arch = "x86", target_os = "windows")))]
            Self::Stdcall => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_abi() {
        assert!(Abi::default().is_default());
        assert_eq!(Abi::from_id(Abi::DEFAULT.id()), Abi::DEFAULT);
        assert_eq!(AbiName::Default.resolve(), Some(Abi::DEFAULT));
    }

    #[test]
    fn test_stdcall_availability() {
        assert_eq!(AbiName::Stdcall.resolve().is_some(), Abi::has_stdcall());
    }
}
