//! Signature cache - one prepared descriptor per distinct signature

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use super::abi::Abi;
use super::cif::CallDescriptor;
use super::types::TypeCode;
use crate::errors::Result;
use crate::logging::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    pub args: Box<[TypeCode]>,
    pub ret: TypeCode,
    pub abi: Abi,
}

impl Signature {
    pub fn new(args: &[TypeCode], ret: TypeCode, abi: Abi) -> Self {
        Self {
            args: args.into(),
            ret,
            abi,
        }
    }
}

/// Concurrent map from signature to shared descriptor
///
/// Two threads racing on a new signature may both build; the first insert
/// wins and the other descriptor is dropped.
#[derive(Debug, Default)]
pub struct DescriptorCache {
    entries: DashMap<Signature, Arc<CallDescriptor>>,
}

impl DescriptorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_build(
        &self,
        args: &[TypeCode],
        ret: TypeCode,
        abi: Abi,
    ) -> Result<Arc<CallDescriptor>> {
        let key = Signature::new(args, ret, abi);
        if let Some(hit) = self.entries.get(&key) {
            return Ok(Arc::clone(hit.value()));
        }

        // build outside the shard lock; preparation errors are not cached
        let built = Arc::new(CallDescriptor::build(args, ret, abi)?);
        let shared = Arc::clone(self.entries.entry(key).or_insert(built).value());
        debug!(cached = self.entries.len(), "descriptor cache miss");
        Ok(shared)
    }

    pub fn get(&self, args: &[TypeCode], ret: TypeCode, abi: Abi) -> Option<Arc<CallDescriptor>> {
        self.entries
            .get(&Signature::new(args, ret, abi))
            .map(|hit| Arc::clone(hit.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

static GLOBAL_CACHE: Lazy<DescriptorCache> = Lazy::new(DescriptorCache::new);

/// Process-wide cache used by `Function` when caching is enabled
pub fn global_cache() -> &'static DescriptorCache {
    &GLOBAL_CACHE
}
