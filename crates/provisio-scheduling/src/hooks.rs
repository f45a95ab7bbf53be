//! Extension points that let a cloud-provider integration shape constraints.

use std::sync::Arc;

use provisio_core::{Constraints, FieldError, Pod};

/// Provider-specific customisation of launch constraints.
///
/// Every method has a pass-through default, so an implementation only
/// overrides what it needs.
pub trait ConstraintHooks: Send + Sync {
    /// Fill in provider defaults on a freshly derived constraint set.
    fn apply_defaults(&self, _constraints: &mut Constraints) {}

    /// Provider-specific validation, reported as a field error tree.
    fn validate(&self, _constraints: &Constraints) -> Result<(), FieldError> {
        Ok(())
    }

    /// Restrict the provisioner's constraints for this batch of pods.
    /// An error aborts the solve.
    fn constrain(&self, _constraints: &mut Constraints, _pods: &[Pod]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Shared handle to a hooks implementation.
pub type HooksHandle = Arc<dyn ConstraintHooks>;

/// Hooks that leave constraints untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl ConstraintHooks for NoopHooks {}
