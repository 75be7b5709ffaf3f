//! Boxed values - the dynamic side of a foreign call
//!
//! A `Value` is what callers hand to a `Function` and what they get back.
//! The conversion policy here (`to_integer`, `to_float`, `to_address`)
//! decides which boxed values are acceptable where a number or an address is
//! required; the marshaler only propagates its errors.

use std::fmt;

/// Opaque handle to native memory of unknown extent
///
/// Carries no ownership: nothing is freed when a handle is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointerHandle {
    address: usize,
    size: usize,
}

impl PointerHandle {
    #[inline]
    pub const fn new(address: usize) -> Self {
        Self { address, size: 0 }
    }

    #[inline]
    pub const fn null() -> Self {
        Self::new(0)
    }

    /// Handle whose extent the caller knows
    #[inline]
    pub const fn with_size(address: usize, size: usize) -> Self {
        Self { address, size }
    }

    #[inline]
    pub const fn address(self) -> usize {
        self.address
    }

    /// Known extent in bytes, 0 when unknown
    #[inline]
    pub const fn size(self) -> usize {
        self.size
    }

    #[inline]
    pub const fn is_null(self) -> bool {
        self.address == 0
    }

    #[inline]
    pub fn as_ptr<T>(self) -> *mut T {
        self.address as *mut T
    }

    #[inline]
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Self::new(ptr as usize)
    }
}

impl fmt::Display for PointerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#<pointer {:#x} size={}>", self.address, self.size)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    Nil,
    Integer(i128),
    Float(f64),
    Pointer(PointerHandle),
}

impl Value {
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Nil => "nil",
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Pointer(_) => "pointer",
        }
    }

    #[inline]
    pub const fn is_nil(&self) -> bool {
        matches!(self, Self::Nil)
    }

    pub const fn as_integer(&self) -> Option<i128> {
        match self {
            Self::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    pub const fn as_pointer(&self) -> Option<PointerHandle> {
        match self {
            Self::Pointer(p) => Some(*p),
            _ => None,
        }
    }

    /// Coerce to an integer. Floats truncate toward zero, pointers yield
    /// their address.
    pub fn to_integer(&self) -> Result<i128, ConversionError> {
        match *self {
            Self::Integer(n) => Ok(n),
            Self::Float(x) if !x.is_finite() => Err(ConversionError::NotFinite),
            // saturating cast; out-of-range values are rejected by the caller
            Self::Float(x) => Ok(x.trunc() as i128),
            Self::Pointer(p) => Ok(p.address as i128),
            Self::Nil => Err(ConversionError::NotNumeric { found: self.type_name() }),
        }
    }

    pub fn to_float(&self) -> Result<f64, ConversionError> {
        match *self {
            Self::Float(x) => Ok(x),
            Self::Integer(n) => Ok(n as f64),
            Self::Nil | Self::Pointer(_) => {
                Err(ConversionError::NotNumeric { found: self.type_name() })
            }
        }
    }

    /// Coerce to a machine address. `Nil` is the null pointer.
    pub fn to_address(&self) -> Result<usize, ConversionError> {
        match *self {
            Self::Nil => Ok(0),
            Self::Pointer(p) => Ok(p.address),
            _ => {
                let n = self.to_integer()?;
                usize::try_from(n).map_err(|_| ConversionError::OutOfRange {
                    value: n,
                    target: "pointer",
                })
            }
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Nil
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nil => f.write_str("nil"),
            Self::Integer(n) => write!(f, "{}", n),
            Self::Float(x) => write!(f, "{}", x),
            Self::Pointer(p) => write!(f, "{}", p),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                #[inline]
                fn from(n: $t) -> Self {
                    Self::Integer(n as i128)
                }
            }
        )*
    };
}

impl_from_int!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<f32> for Value {
    fn from(x: f32) -> Self {
        Self::Float(x as f64)
    }
}

impl From<PointerHandle> for Value {
    fn from(p: PointerHandle) -> Self {
        Self::Pointer(p)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Self::Nil
    }
}

/// Value-policy failures, raised while coercing a boxed argument
#[derive(Debug, Clone, PartialEq)]
pub enum ConversionError {
    NotNumeric { found: &'static str },
    OutOfRange { value: i128, target: &'static str },
    NotFinite,
}

impl fmt::Display for ConversionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotNumeric { found } => {
                write!(f, "can't convert {} into a number", found)
            }
            Self::OutOfRange { value, target } => {
                write!(f, "integer {} too big to convert to `{}'", value, target)
            }
            Self::NotFinite => write!(f, "float value is not finite"),
        }
    }
}

impl std::error::Error for ConversionError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_coercion() {
        assert_eq!(Value::from(42i32).to_integer(), Ok(42));
        assert_eq!(Value::Float(-3.9).to_integer(), Ok(-3));
        assert_eq!(Value::from(PointerHandle::new(0x1000)).to_integer(), Ok(0x1000));
        assert_eq!(
            Value::Nil.to_integer(),
            Err(ConversionError::NotNumeric { found: "nil" })
        );
        assert_eq!(Value::Float(f64::NAN).to_integer(), Err(ConversionError::NotFinite));
    }

    #[test]
    fn test_float_coercion() {
        assert_eq!(Value::from(2u8).to_float(), Ok(2.0));
        assert!(Value::from(PointerHandle::null()).to_float().is_err());
    }

    #[test]
    fn test_address_coercion() {
        assert_eq!(Value::Nil.to_address(), Ok(0));
        assert_eq!(Value::from(0x1000usize).to_address(), Ok(0x1000));
        assert_eq!(
            Value::Integer(-1).to_address(),
            Err(ConversionError::OutOfRange { value: -1, target: "pointer" })
        );
    }

    #[test]
    fn test_pointer_handle() {
        let p = PointerHandle::with_size(0x20, 16);
        assert_eq!(p.address(), 0x20);
        assert_eq!(p.size(), 16);
        assert!(!p.is_null());
        assert!(PointerHandle::null().is_null());
        assert_eq!(p.to_string(), "#<pointer 0x20 size=16>");
    }
}
