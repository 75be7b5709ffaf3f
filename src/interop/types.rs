//! Type codes and native scalars
//!
//! A `TypeCode` names a native scalar kind together with its signedness.
//! At the boundary it travels as a signed integer: the base kind's raw code,
//! negated for the unsigned counterpart.

use core::ffi::{c_int, c_long, c_uint, c_ulong};
use std::fmt;

use crate::errors::{FfiError, Phase, Result};

/// Native scalar kind, signedness aside
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum BaseKind {
    Void = 0,
    VoidP = 1,
    Char = 2,
    Short = 3,
    Int = 4,
    Long = 5,
    #[cfg(feature = "long-long")]
    LongLong = 6,
    Float = 7,
    Double = 8,
}

impl BaseKind {
    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Void),
            1 => Some(Self::VoidP),
            2 => Some(Self::Char),
            3 => Some(Self::Short),
            4 => Some(Self::Int),
            5 => Some(Self::Long),
            #[cfg(feature = "long-long")]
            6 => Some(Self::LongLong),
            7 => Some(Self::Float),
            8 => Some(Self::Double),
            _ => None,
        }
    }

    #[inline]
    pub const fn raw(self) -> i32 {
        self as i32
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Void => "void",
            Self::VoidP => "void*",
            Self::Char => "char",
            Self::Short => "short",
            Self::Int => "int",
            Self::Long => "long",
            #[cfg(feature = "long-long")]
            Self::LongLong => "long long",
            Self::Float => "float",
            Self::Double => "double",
        }
    }

    /// Integer kinds are the ones where signedness matters
    pub const fn is_integer(self) -> bool {
        match self {
            Self::Char | Self::Short | Self::Int | Self::Long => true,
            #[cfg(feature = "long-long")]
            Self::LongLong => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signedness {
    Signed,
    Unsigned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeCode {
    pub kind: BaseKind,
    pub signedness: Signedness,
}

impl TypeCode {
    pub const VOID: Self = Self::signed(BaseKind::Void);
    pub const VOIDP: Self = Self::signed(BaseKind::VoidP);
    pub const CHAR: Self = Self::signed(BaseKind::Char);
    pub const SHORT: Self = Self::signed(BaseKind::Short);
    pub const INT: Self = Self::signed(BaseKind::Int);
    pub const LONG: Self = Self::signed(BaseKind::Long);
    #[cfg(feature = "long-long")]
    pub const LONG_LONG: Self = Self::signed(BaseKind::LongLong);
    pub const FLOAT: Self = Self::signed(BaseKind::Float);
    pub const DOUBLE: Self = Self::signed(BaseKind::Double);

    #[inline]
    pub const fn new(kind: BaseKind, signedness: Signedness) -> Self {
        Self { kind, signedness }
    }

    #[inline]
    pub const fn signed(kind: BaseKind) -> Self {
        Self::new(kind, Signedness::Signed)
    }

    /// Unsigned counterpart of this code's base kind
    #[inline]
    pub const fn unsigned(self) -> Self {
        Self::new(self.kind, Signedness::Unsigned)
    }

    #[inline]
    pub const fn is_signed(self) -> bool {
        matches!(self.signedness, Signedness::Signed)
    }

    /// Decode a signed raw code; `None` outside the known set
    pub fn from_raw(raw: i32) -> Option<Self> {
        let signedness = if raw < 0 {
            Signedness::Unsigned
        } else {
            Signedness::Signed
        };
        let base = i32::try_from(raw.unsigned_abs()).ok()?;
        BaseKind::from_raw(base).map(|kind| Self::new(kind, signedness))
    }

    /// Decode a raw code, reporting `UnknownType` for the given phase
    pub fn decode(raw: i32, phase: Phase) -> Result<Self> {
        Self::from_raw(raw).ok_or(FfiError::UnknownType {
            code: raw.saturating_abs(),
            phase,
        })
    }

    pub const fn to_raw(self) -> i32 {
        match self.signedness {
            Signedness::Signed => self.kind.raw(),
            Signedness::Unsigned => -self.kind.raw(),
        }
    }
}

impl From<BaseKind> for TypeCode {
    fn from(kind: BaseKind) -> Self {
        Self::signed(kind)
    }
}

impl TypeCode {
    /// C spelling, with `unsigned` for unsigned integer kinds
    pub const fn name(self) -> &'static str {
        match (self.kind, self.signedness) {
            (BaseKind::Char, Signedness::Unsigned) => "unsigned char",
            (BaseKind::Short, Signedness::Unsigned) => "unsigned short",
            (BaseKind::Int, Signedness::Unsigned) => "unsigned int",
            (BaseKind::Long, Signedness::Unsigned) => "unsigned long",
            #[cfg(feature = "long-long")]
            (BaseKind::LongLong, Signedness::Unsigned) => "unsigned long long",
            (kind, _) => kind.name(),
        }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A native value at its marshaled width
///
/// `Char`, `Short` and `Int` all marshal at `c_int` width; narrowing to the
/// declared width happens when the argument slot is filled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum NativeScalar {
    Void,
    Int(c_int),
    UInt(c_uint),
    Long(c_long),
    ULong(c_ulong),
    #[cfg(feature = "long-long")]
    LongLong(i64),
    #[cfg(feature = "long-long")]
    ULongLong(u64),
    Float(f32),
    Double(f64),
    Pointer(usize),
}

impl NativeScalar {
    /// Whether this scalar can stand for a value of `kind`
    pub const fn fits(&self, kind: BaseKind) -> bool {
        match self {
            Self::Void => matches!(kind, BaseKind::Void),
            Self::Int(_) | Self::UInt(_) => {
                matches!(kind, BaseKind::Char | BaseKind::Short | BaseKind::Int)
            }
            Self::Long(_) | Self::ULong(_) => matches!(kind, BaseKind::Long),
            #[cfg(feature = "long-long")]
            Self::LongLong(_) | Self::ULongLong(_) => matches!(kind, BaseKind::LongLong),
            Self::Float(_) => matches!(kind, BaseKind::Float),
            Self::Double(_) => matches!(kind, BaseKind::Double),
            Self::Pointer(_) => matches!(kind, BaseKind::VoidP),
        }
    }

    /// Base kind this scalar was marshaled as; `Int` covers `Char` and `Short`
    pub const fn family(&self) -> BaseKind {
        match self {
            Self::Void => BaseKind::Void,
            Self::Int(_) | Self::UInt(_) => BaseKind::Int,
            Self::Long(_) | Self::ULong(_) => BaseKind::Long,
            #[cfg(feature = "long-long")]
            Self::LongLong(_) | Self::ULongLong(_) => BaseKind::LongLong,
            Self::Float(_) => BaseKind::Float,
            Self::Double(_) => BaseKind::Double,
            Self::Pointer(_) => BaseKind::VoidP,
        }
    }

    /// Raw bits zero-extended to 64, for integer and pointer scalars
    pub(crate) const fn int_bits(&self) -> Option<u64> {
        match *self {
            Self::Int(v) => Some(v as c_uint as u64),
            Self::UInt(v) => Some(v as u64),
            Self::Long(v) => Some(v as c_ulong as u64),
            Self::ULong(v) => Some(v as u64),
            #[cfg(feature = "long-long")]
            Self::LongLong(v) => Some(v as u64),
            #[cfg(feature = "long-long")]
            Self::ULongLong(v) => Some(v),
            Self::Pointer(v) => Some(v as u64),
            Self::Void | Self::Float(_) | Self::Double(_) => None,
        }
    }
}
