//! Shape descriptors for flattened models.

use std::collections::BTreeMap;

use derive_more::{From, Into};
use serde::{Deserialize, Serialize};

/// Structural metadata of a flattened model.
///
/// Maps the dotted path of each numeric leaf or array in the original nested
/// model to its dimension list: `[1]` for a bare scalar, `[outer]` for a
/// vector and `[outer, inner]` for a matrix. Only two levels of array depth
/// are distinguished; anything deeper collapses into the two-dimension
/// record.
///
/// Two descriptors are equal iff they record the same paths with the same
/// dimensions, which is exactly the submission-acceptance check: a
/// participant whose shape does not equal the project's canonical shape is
/// rejected.
#[derive(Debug, Clone, PartialEq, Eq, Default, From, Into, Serialize, Deserialize)]
pub struct ShapeDescriptor(BTreeMap<String, Vec<usize>>);

impl ShapeDescriptor {
    /// Creates an empty descriptor.
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Records the dimensions for a path, replacing any previous entry.
    pub fn insert(&mut self, path: String, dims: Vec<usize>) {
        self.0.insert(path, dims);
    }

    /// Returns the dimensions recorded for a path.
    pub fn dims(&self, path: &str) -> Option<&[usize]> {
        self.0.get(path).map(Vec::as_slice)
    }

    /// Iterates over `(path, dimensions)` entries in sorted path order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[usize])> {
        self.0.iter().map(|(p, d)| (p.as_str(), d.as_slice()))
    }

    /// The number of recorded paths.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The total number of scalar parameters described by this shape.
    ///
    /// This is the length every flat weight vector and every ciphertext
    /// vector of the project must have.
    pub fn parameter_count(&self) -> usize {
        self.0.values().map(|dims| dims.iter().product::<usize>()).sum()
    }
}
