//! dlcall - dynamic foreign-function invocation
//!
//! Given the address of a native routine and a description of its argument
//! and return types, build a reusable call descriptor, marshal boxed values
//! into native arguments, call through the address and box the result. The
//! process error state (`errno`, `GetLastError`) is captured right after the
//! routine returns.
//!
//! ```no_run
//! use dlcall::{Abi, Function, Library, TypeCode, Value};
//!
//! let libc = Library::this()?;
//! let labs = libc.symbol("labs")?;
//! let labs = unsafe { Function::new(labs, &[TypeCode::LONG], TypeCode::LONG, Abi::DEFAULT)? };
//! assert_eq!(labs.call(&[Value::from(-7)])?, Value::from(7));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod errors;
pub mod interop;
pub mod logging;
pub mod value;

// Re-export commonly used items
pub use config::{CallConfig, Config, ConfigError};
pub use errors::{FfiError, Phase, Result};
pub use interop::{
    thread_last_error, Abi, AbiName, BaseKind, CallDescriptor, ErrorSink, ErrorState, Function,
    LastError, Library, LoadError, NativeScalar, OpenFlags, SymbolError, TypeCode,
};
pub use value::{ConversionError, PointerHandle, Value};

/// Initialize logging from the environment
pub fn init() {
    logging::init();
}
