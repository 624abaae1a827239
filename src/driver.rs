//! Storage driver capability.
//!
//! A driver physically materializes layers and assembles the runtime bundle.
//! The orchestrator only ever calls the two operations below; concrete
//! strategies live in [`crate::drivers`].

use crate::bundle::BundleSpec;
use crate::error::Result;
use std::io::Read;
use std::sync::Arc;

/// Storage backend for unpacked layers.
///
/// ## Contract
///
/// - `unpack` is called once per identity per pull, strictly in chain order,
///   with `parent_id` equal to the previous identity (`""` for the base
///   layer). It must fully drain `blob` or reject it with an error, and
///   returns the layer size.
/// - `bundle` receives the complete ordered chain. It depends only on its
///   arguments and on state materialized by earlier `unpack` calls.
pub trait Driver {
    /// Materializes layer `id` on top of `parent_id` from `blob`.
    fn unpack(&self, id: &str, parent_id: &str, blob: &mut dyn Read) -> Result<u64>;

    /// Produces the runtime bundle spec for image `id` from its layer chain.
    fn bundle(&self, id: &str, parent_ids: &[String]) -> Result<BundleSpec>;
}

impl<D: Driver + ?Sized> Driver for &D {
    fn unpack(&self, id: &str, parent_id: &str, blob: &mut dyn Read) -> Result<u64> {
        (**self).unpack(id, parent_id, blob)
    }

    fn bundle(&self, id: &str, parent_ids: &[String]) -> Result<BundleSpec> {
        (**self).bundle(id, parent_ids)
    }
}

impl<D: Driver + ?Sized> Driver for Box<D> {
    fn unpack(&self, id: &str, parent_id: &str, blob: &mut dyn Read) -> Result<u64> {
        (**self).unpack(id, parent_id, blob)
    }

    fn bundle(&self, id: &str, parent_ids: &[String]) -> Result<BundleSpec> {
        (**self).bundle(id, parent_ids)
    }
}

impl<D: Driver + ?Sized> Driver for Arc<D> {
    fn unpack(&self, id: &str, parent_id: &str, blob: &mut dyn Read) -> Result<u64> {
        (**self).unpack(id, parent_id, blob)
    }

    fn bundle(&self, id: &str, parent_ids: &[String]) -> Result<BundleSpec> {
        (**self).bundle(id, parent_ids)
    }
}
