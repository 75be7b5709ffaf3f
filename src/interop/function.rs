//! Function values - a target address bound to a prepared signature
//!
//! This is the glue around the core: marshal the boxed arguments, invoke,
//! hand the captured error state to the sinks, unmarshal the result.

use std::fmt;
use std::sync::Arc;

use super::abi::Abi;
use super::cache::global_cache;
use super::call;
use super::cif::CallDescriptor;
use super::errstate::{record_thread_last_error, ErrorSink, ErrorState, LastError};
use super::marshal::{from_native, marshal_args};
use super::types::TypeCode;
use crate::config::CallConfig;
use crate::errors::{FfiError, Phase, Result};
use crate::logging::log_ffi_error;
use crate::value::Value;

/// One full invocation: marshal, call, record error state, unmarshal
///
/// # Safety
/// Same contract as [`call::call`]: `target` must be callable with the
/// signature `descriptor` describes.
pub unsafe fn invoke(
    descriptor: &CallDescriptor,
    target: usize,
    args: &[Value],
    sink: &dyn ErrorSink,
) -> Result<Value> {
    let natives = marshal_args(descriptor.arg_codes(), args)?;
    let (ret, last_error) = call::call(descriptor, target, &natives)?;
    sink.record(last_error);
    from_native(descriptor.ret_code(), ret)
}

pub struct Function {
    descriptor: Arc<CallDescriptor>,
    target: usize,
    name: Option<String>,
    last_error: ErrorState,
}

impl Function {
    /// Bind `target` to a signature; descriptors come from the global cache
    ///
    /// # Safety
    /// `target` must stay valid for the life of this value and must be a
    /// routine with exactly this signature and calling convention. Every
    /// later [`Function::call`] relies on it.
    pub unsafe fn new(target: usize, args: &[TypeCode], ret: TypeCode, abi: Abi) -> Result<Self> {
        let descriptor = global_cache().get_or_build(args, ret, abi)?;
        Ok(Self::from_descriptor(target, descriptor))
    }

    /// Bind `target` using the ABI and caching policy from `config`
    ///
    /// # Safety
    /// See [`Function::new`].
    pub unsafe fn with_config(
        target: usize,
        args: &[TypeCode],
        ret: TypeCode,
        config: &CallConfig,
    ) -> Result<Self> {
        let abi = config
            .default_abi
            .resolve()
            .ok_or(FfiError::UnsupportedAbi { name: config.default_abi.as_str() })?;
        let descriptor = if config.cache_descriptors {
            global_cache().get_or_build(args, ret, abi)?
        } else {
            Arc::new(CallDescriptor::build(args, ret, abi)?)
        };
        Ok(Self::from_descriptor(target, descriptor))
    }

    /// Raw-code form, as handed over by a dynamic caller
    ///
    /// # Safety
    /// See [`Function::new`].
    pub unsafe fn from_raw(target: usize, args: &[i32], ret: i32, abi: u32) -> Result<Self> {
        let args = args
            .iter()
            .map(|&raw| TypeCode::decode(raw, Phase::Build))
            .collect::<Result<Vec<_>>>()?;
        let ret = TypeCode::decode(ret, Phase::Build)?;
        Self::new(target, &args, ret, Abi::from_id(abi as _))
    }

    /// # Safety
    /// See [`Function::new`].
    pub unsafe fn from_descriptor(target: usize, descriptor: Arc<CallDescriptor>) -> Self {
        Self {
            descriptor,
            target,
            name: None,
            last_error: ErrorState::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        // the constructor's contract covers the target and signature
        let result = unsafe { invoke(&self.descriptor, self.target, args, self) };
        if let Err(err) = &result {
            log_ffi_error(self.name(), err);
        }
        result
    }

    #[inline]
    pub fn descriptor(&self) -> &Arc<CallDescriptor> {
        &self.descriptor
    }

    #[inline]
    pub fn target(&self) -> usize {
        self.target
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("<anonymous>")
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.descriptor.arity()
    }

    /// Error state left by the most recent call through this value
    pub fn last_error(&self) -> LastError {
        self.last_error.get()
    }
}

impl ErrorSink for Function {
    fn record(&self, error: LastError) {
        self.last_error.record(error);
        record_thread_last_error(error);
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function")
            .field("name", &self.name())
            .field("target", &format_args!("{:#x}", self.target))
            .field("descriptor", &self.descriptor)
            .finish()
    }
}
