//! Model representation, the flatten/restore codec and fixed-point scaling.
//!
//! A training project fixes a canonical [`ShapeDescriptor`] when it is
//! created. Every participant submission must flatten to a weight vector
//! whose shape structurally equals the canonical one; a mismatch is a hard
//! rejection. The flat vector is what gets scaled and encrypted, the shape
//! travels alongside it so that the nested structure can be rebuilt by
//! whoever eventually decrypts an aggregate.

pub(crate) mod node;
pub(crate) mod scaling;
pub(crate) mod shape;

pub use self::{
    node::{FlattenedModel, ModelNode, RestoreError},
    scaling::{
        scale_model,
        scale_weight,
        unscale_sum,
        unscale_weight,
        ScalingError,
        BASIS_POINT,
        OFFSET,
    },
    shape::ShapeDescriptor,
};
