//! Error taxonomy for descriptor building and invocation

use std::fmt;

use crate::interop::TypeCode;
use crate::value::ConversionError;

/// Phase of a foreign call in which an error was detected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Build,
    Marshal,
    Call,
    Unmarshal,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Build => "build",
            Self::Marshal => "marshal",
            Self::Call => "call",
            Self::Unmarshal => "unmarshal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FfiError {
    /// Raw type code outside the known set (sign already stripped)
    UnknownType { code: i32, phase: Phase },
    /// `ffi_prep_cif` refused the signature; `status` is libffi's code
    CifPreparation { status: u32 },
    /// A boxed argument could not be coerced to its declared type
    Conversion { index: Option<usize>, source: ConversionError },
    ArgCountMismatch { expected: usize, got: usize },
    /// A native scalar does not belong to the type it is paired with.
    /// `index` is `None` for the return value.
    ScalarMismatch { index: Option<usize>, expected: TypeCode },
    TooManyArgs { count: usize },
    /// `void` only makes sense as a return type
    VoidArgument { index: usize },
    /// Configured calling convention does not exist on this platform
    UnsupportedAbi { name: &'static str },
}

impl FfiError {
    pub fn phase(&self) -> Phase {
        match self {
            Self::UnknownType { phase, .. } => *phase,
            Self::CifPreparation { .. }
            | Self::TooManyArgs { .. }
            | Self::VoidArgument { .. }
            | Self::UnsupportedAbi { .. } => Phase::Build,
            Self::Conversion { .. } => Phase::Marshal,
            Self::ArgCountMismatch { .. } => Phase::Call,
            Self::ScalarMismatch { index: Some(_), .. } => Phase::Call,
            Self::ScalarMismatch { index: None, .. } => Phase::Unmarshal,
        }
    }

    pub(crate) fn conversion(source: ConversionError) -> Self {
        Self::Conversion { index: None, source }
    }

    /// Attach the argument position to a conversion error
    pub(crate) fn at_index(self, index: usize) -> Self {
        match self {
            Self::Conversion { index: None, source } => Self::Conversion {
                index: Some(index),
                source,
            },
            other => other,
        }
    }
}

impl fmt::Display for FfiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownType { code, phase } => {
                write!(f, "unknown type {} ({})", code, phase)
            }
            Self::CifPreparation { status } => {
                write!(f, "error creating CIF {}", status)
            }
            Self::Conversion { index: Some(i), source } => {
                write!(f, "argument {}: {}", i, source)
            }
            Self::Conversion { index: None, source } => write!(f, "{}", source),
            Self::ArgCountMismatch { expected, got } => {
                write!(f, "Expected {} arguments, got {}", expected, got)
            }
            Self::ScalarMismatch { index: Some(i), expected } => {
                write!(f, "argument {} is not a native {}", i, expected)
            }
            Self::ScalarMismatch { index: None, expected } => {
                write!(f, "return value is not a native {}", expected)
            }
            Self::TooManyArgs { count } => {
                write!(f, "{} arguments exceed the native argument limit", count)
            }
            Self::VoidArgument { index } => write!(f, "argument {} cannot be void", index),
            Self::UnsupportedAbi { name } => {
                write!(f, "calling convention {} is not available here", name)
            }
        }
    }
}

impl std::error::Error for FfiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Conversion { source, .. } => Some(source),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, FfiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_reporting() {
        let err = FfiError::UnknownType { code: 42, phase: Phase::Unmarshal };
        assert_eq!(err.phase(), Phase::Unmarshal);
        assert_eq!(FfiError::CifPreparation { status: 2 }.phase(), Phase::Build);
        assert_eq!(
            FfiError::ArgCountMismatch { expected: 1, got: 0 }.phase(),
            Phase::Call
        );
        assert_eq!(
            FfiError::conversion(ConversionError::NotNumeric { found: "nil" }).phase(),
            Phase::Marshal
        );
    }

    #[test]
    fn test_index_attaches_once() {
        let err = FfiError::conversion(ConversionError::NotFinite).at_index(3);
        assert_eq!(err.to_string(), "argument 3: float value is not finite");
        assert_eq!(err.clone().at_index(5), err);
    }

    #[test]
    fn test_display_messages() {
        assert_eq!(
            FfiError::CifPreparation { status: 2 }.to_string(),
            "error creating CIF 2"
        );
        assert_eq!(
            FfiError::UnknownType { code: 9, phase: Phase::Build }.to_string(),
            "unknown type 9 (build)"
        );
    }
}
