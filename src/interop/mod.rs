//! Interoperability - call native routines through their address
//!
//! Architecture:
//! - `types.rs` - type codes and native scalars
//! - `catalog.rs` - type code to libffi type descriptor
//! - `abi.rs` - calling convention selection
//! - `cif.rs` - prepared call descriptors (`ffi_prep_cif`)
//! - `marshal.rs` - boxed value <-> native scalar conversion
//! - `call.rs` - invocation through `ffi_call` with error capture
//! - `errstate.rs` - errno / last-error sinks
//! - `cache.rs` - one descriptor per distinct signature
//! - `function.rs` - target address bound to a descriptor
//! - `library.rs` - dynamic library loading (dlopen/LoadLibrary)

mod abi;
mod cache;
mod call;
mod catalog;
mod cif;
mod errstate;
mod function;
mod library;
mod marshal;
mod types;

pub use abi::{Abi, AbiName};
pub use cache::{global_cache, DescriptorCache, Signature};
pub use call::call;
pub use catalog::{native_descriptor, native_type, tag, NativeType};
pub use cif::CallDescriptor;
pub use errstate::{
    record_thread_last_error, thread_last_error, ErrorSink, ErrorState, LastError, ThreadSink,
};
pub use function::{invoke, Function};
pub use library::{Library, LoadError, OpenFlags, SymbolError};
pub use marshal::{
    from_native, from_native_raw, marshal_args, to_native, to_native_raw, NativeArgs, INLINE_ARGS,
};
pub use types::{BaseKind, NativeScalar, Signedness, TypeCode};
