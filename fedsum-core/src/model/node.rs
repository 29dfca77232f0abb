//! The typed model tree and the flatten/restore codec.

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;

use crate::model::shape::ShapeDescriptor;

/// A node of a nested model-parameter structure.
///
/// Models are trees: named groups of parameters whose leaves are scalars,
/// weight vectors or weight matrices. Deeper tensor ranks are not
/// represented; they collapse into a matrix when a model is imported from
/// its dynamic form (see [`ModelNode::from_json`]).
#[derive(Debug, Clone, PartialEq)]
pub enum ModelNode {
    /// A single scalar parameter.
    Scalar(f64),
    /// A one-dimensional weight array.
    Vector(Vec<f64>),
    /// A two-dimensional weight array.
    Matrix(Vec<Vec<f64>>),
    /// A group of named sub-structures, traversed in sorted key order.
    Composite(BTreeMap<String, ModelNode>),
}

/// A model flattened into a weight vector plus its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct FlattenedModel {
    /// All numeric leaves in depth-first traversal order.
    pub weights: Vec<f64>,
    /// The structural metadata needed to re-nest the weights.
    pub shape: ShapeDescriptor,
}

/// Errors related to rebuilding a nested model from a flat weight vector.
#[derive(Debug, Error, PartialEq)]
pub enum RestoreError {
    #[error("weight vector length mismatch: shape describes {expected} parameters, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("shape path {0:?} is used both as a leaf and as a group")]
    ConflictingPath(String),

    #[error("shape path {path:?} has unsupported dimensions {dims:?}")]
    InvalidDims { path: String, dims: Vec<usize> },
}

impl ModelNode {
    /// Imports a model from its dynamic JSON form.
    ///
    /// Numbers become scalars, arrays become vectors or matrices, objects
    /// become composites. Non-numeric leaves (strings, booleans, nulls) are
    /// skipped without error: they contribute neither weights nor shape
    /// entries. Arrays nested deeper than two levels collapse into matrix
    /// rows, keeping the leaf values in traversal order. Returns `None` if
    /// the value contains no numeric content at all.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => number.as_f64().map(ModelNode::Scalar),
            Value::Array(items) => {
                if items.iter().any(Value::is_array) {
                    let rows = items
                        .iter()
                        .map(|item| {
                            let mut row = Vec::new();
                            collect_numeric_leaves(item, &mut row);
                            row
                        })
                        .collect();
                    Some(ModelNode::Matrix(rows))
                } else {
                    let weights = items.iter().filter_map(Value::as_f64).collect();
                    Some(ModelNode::Vector(weights))
                }
            }
            Value::Object(fields) => {
                let children: BTreeMap<String, ModelNode> = fields
                    .iter()
                    .filter_map(|(key, child)| {
                        ModelNode::from_json(child).map(|node| (key.clone(), node))
                    })
                    .collect();
                if children.is_empty() {
                    None
                } else {
                    Some(ModelNode::Composite(children))
                }
            }
            _ => None,
        }
    }

    /// Flattens this model into a weight vector and a shape descriptor.
    ///
    /// The traversal is depth-first with composite keys visited in sorted
    /// order. Scalars record dimensions `[1]`, vectors `[len]` and matrices
    /// `[rows, cols]` where `cols` is the length of the first row.
    pub fn flatten(&self) -> FlattenedModel {
        let mut weights = Vec::new();
        let mut shape = ShapeDescriptor::new();
        self.flatten_into("", &mut weights, &mut shape);
        FlattenedModel { weights, shape }
    }

    fn flatten_into(&self, path: &str, weights: &mut Vec<f64>, shape: &mut ShapeDescriptor) {
        match self {
            ModelNode::Scalar(value) => {
                shape.insert(path.to_string(), vec![1]);
                weights.push(*value);
            }
            ModelNode::Vector(values) => {
                shape.insert(path.to_string(), vec![values.len()]);
                weights.extend_from_slice(values);
            }
            ModelNode::Matrix(rows) => {
                let cols = rows.first().map(Vec::len).unwrap_or(0);
                shape.insert(path.to_string(), vec![rows.len(), cols]);
                for row in rows {
                    weights.extend_from_slice(row);
                }
            }
            ModelNode::Composite(children) => {
                for (key, child) in children {
                    let child_path = join_path(path, key);
                    child.flatten_into(&child_path, weights, shape);
                }
            }
        }
    }

    /// Rebuilds a nested model from a flat weight vector and its shape.
    ///
    /// Inverse of [`flatten`] for the shapes `flatten` emits. The weight
    /// vector length must match [`ShapeDescriptor::parameter_count`]
    /// exactly.
    ///
    /// [`flatten`]: ModelNode::flatten
    pub fn restore(weights: &[f64], shape: &ShapeDescriptor) -> Result<Self, RestoreError> {
        let expected = shape.parameter_count();
        if weights.len() != expected {
            return Err(RestoreError::LengthMismatch {
                expected,
                actual: weights.len(),
            });
        }

        let tree = PathTree::build(shape)?;
        let mut cursor = weights.iter().copied();
        let node = tree.restore("", &mut cursor)?;
        Ok(node)
    }
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", parent, key)
    }
}

// Deep numeric flatten of a dynamic value, skipping non-numeric leaves.
fn collect_numeric_leaves(value: &Value, out: &mut Vec<f64>) {
    match value {
        Value::Number(number) => {
            if let Some(weight) = number.as_f64() {
                out.push(weight);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_numeric_leaves(item, out);
            }
        }
        _ => {}
    }
}

// Intermediate tree of shape paths split at dots. Restoring through this
// tree consumes the flat vector in the same order `flatten` produced it,
// independent of how dotted paths sort as plain strings.
enum PathTree {
    Leaf(Vec<usize>),
    Branch(BTreeMap<String, PathTree>),
}

impl PathTree {
    fn build(shape: &ShapeDescriptor) -> Result<Self, RestoreError> {
        let mut root = PathTree::Branch(BTreeMap::new());
        for (path, dims) in shape.iter() {
            if path.is_empty() {
                // a non-composite root flattens to the single empty path
                if shape.len() != 1 {
                    return Err(RestoreError::ConflictingPath(String::new()));
                }
                return Ok(PathTree::Leaf(dims.to_vec()));
            }
            let components: Vec<&str> = path.split('.').collect();
            root.insert(path, &components, dims)?;
        }
        Ok(root)
    }

    fn insert(
        &mut self,
        full_path: &str,
        components: &[&str],
        dims: &[usize],
    ) -> Result<(), RestoreError> {
        let children = match self {
            PathTree::Branch(children) => children,
            PathTree::Leaf(_) => {
                return Err(RestoreError::ConflictingPath(full_path.to_string()))
            }
        };
        // safe unwrap: `split` always yields at least one component
        let (head, rest) = components.split_first().unwrap();
        if rest.is_empty() {
            if children.contains_key(*head) {
                return Err(RestoreError::ConflictingPath(full_path.to_string()));
            }
            children.insert((*head).to_string(), PathTree::Leaf(dims.to_vec()));
            Ok(())
        } else {
            children
                .entry((*head).to_string())
                .or_insert_with(|| PathTree::Branch(BTreeMap::new()))
                .insert(full_path, rest, dims)
        }
    }

    fn restore(
        &self,
        path: &str,
        cursor: &mut impl Iterator<Item = f64>,
    ) -> Result<ModelNode, RestoreError> {
        match self {
            PathTree::Leaf(dims) => restore_leaf(path, dims, cursor),
            PathTree::Branch(children) => {
                let mut restored = BTreeMap::new();
                for (key, child) in children {
                    let child_path = join_path(path, key);
                    restored.insert(key.clone(), child.restore(&child_path, cursor)?);
                }
                Ok(ModelNode::Composite(restored))
            }
        }
    }
}

fn restore_leaf(
    path: &str,
    dims: &[usize],
    cursor: &mut impl Iterator<Item = f64>,
) -> Result<ModelNode, RestoreError> {
    match dims {
        [1] => Ok(ModelNode::Scalar(cursor.next().unwrap_or(0.0))),
        [len] => Ok(ModelNode::Vector(cursor.take(*len).collect())),
        [rows, cols] => {
            let matrix = (0..*rows)
                .map(|_| cursor.take(*cols).collect())
                .collect();
            Ok(ModelNode::Matrix(matrix))
        }
        _ => Err(RestoreError::InvalidDims {
            path: path.to_string(),
            dims: dims.to_vec(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_flatten_mixed_composite() {
        let model = ModelNode::from_json(&json!({
            "a": [1.5, 2.5],
            "b": 3.0,
        }))
        .unwrap();

        let flat = model.flatten();
        assert_eq!(flat.weights, vec![1.5, 2.5, 3.0]);
        assert_eq!(flat.shape.dims("a"), Some(&[2_usize][..]));
        assert_eq!(flat.shape.dims("b"), Some(&[1_usize][..]));
        assert_eq!(flat.shape.parameter_count(), 3);
    }

    #[test]
    fn test_flatten_nested_groups_and_matrix() {
        let model = ModelNode::from_json(&json!({
            "layers": {
                "dense": {
                    "weight": [[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]],
                    "bias": [0.7, 0.8],
                },
            },
            "scale": 1.0,
        }))
        .unwrap();

        let flat = model.flatten();
        assert_eq!(flat.shape.dims("layers.dense.weight"), Some(&[3, 2][..]));
        assert_eq!(flat.shape.dims("layers.dense.bias"), Some(&[2][..]));
        assert_eq!(flat.shape.dims("scale"), Some(&[1][..]));
        // sorted traversal: bias before weight, layers before scale
        assert_eq!(
            flat.weights,
            vec![0.7, 0.8, 0.1, 0.2, 0.3, 0.4, 0.5, 0.6, 1.0]
        );
    }

    #[test]
    fn test_from_json_skips_non_numeric_leaves() {
        let model = ModelNode::from_json(&json!({
            "name": "resnet",
            "frozen": false,
            "weights": [1.0, 2.0],
            "meta": { "note": "n/a" },
        }))
        .unwrap();

        let flat = model.flatten();
        assert_eq!(flat.weights, vec![1.0, 2.0]);
        assert_eq!(flat.shape.len(), 1);
        assert_eq!(flat.shape.dims("weights"), Some(&[2_usize][..]));
    }

    #[test]
    fn test_from_json_collapses_deep_arrays() {
        let model = ModelNode::from_json(&json!([[[1.0, 2.0], [3.0, 4.0]], [[5.0, 6.0]]])).unwrap();

        match &model {
            ModelNode::Matrix(rows) => {
                assert_eq!(rows[0], vec![1.0, 2.0, 3.0, 4.0]);
                assert_eq!(rows[1], vec![5.0, 6.0]);
            }
            other => panic!("expected a matrix, got {:?}", other),
        }
    }

    #[test]
    fn test_from_json_without_numeric_content() {
        assert_eq!(ModelNode::from_json(&json!("weights")), None);
        assert_eq!(ModelNode::from_json(&json!({ "a": "b" })), None);
        assert_eq!(ModelNode::from_json(&json!(null)), None);
    }

    #[test]
    fn test_restore_inverts_flatten() {
        let model = ModelNode::from_json(&json!({
            "conv": { "kernel": [[1.0, 2.0], [3.0, 4.0]] },
            "bias": [0.5, 0.25],
            "gain": 2.0,
        }))
        .unwrap();

        let flat = model.flatten();
        let restored = ModelNode::restore(&flat.weights, &flat.shape).unwrap();
        assert_eq!(restored, model);
    }

    #[test]
    fn test_restore_non_composite_root() {
        let model = ModelNode::Vector(vec![1.0, 2.0, 3.0]);
        let flat = model.flatten();
        assert_eq!(flat.shape.dims(""), Some(&[3_usize][..]));

        let restored = ModelNode::restore(&flat.weights, &flat.shape).unwrap();
        assert_eq!(restored, model);
    }

    #[test]
    fn test_restore_length_mismatch() {
        let flat = ModelNode::Vector(vec![1.0, 2.0, 3.0]).flatten();
        assert_eq!(
            ModelNode::restore(&[1.0, 2.0], &flat.shape),
            Err(RestoreError::LengthMismatch {
                expected: 3,
                actual: 2,
            })
        );
    }
}
