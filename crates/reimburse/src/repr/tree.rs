//! Regression tree storage.
//!
//! - [`Tree`]: immutable Structure-of-Arrays storage used for prediction
//! - [`MutableTree`]: builder used while growing a tree
//!
//! Split semantics: a sample goes left when `value < threshold`, right otherwise.

/// Node index within a single tree (0 = root).
pub type NodeId = u32;

// ============================================================================
// TreeValidationError
// ============================================================================

/// Structural validation errors for [`Tree`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeValidationError {
    /// Tree has no nodes.
    EmptyTree,
    /// Parallel arrays disagree on the node count.
    LengthMismatch {
        field: &'static str,
        len: usize,
        n_nodes: usize,
    },
    /// A child pointer references an out-of-bounds node.
    ChildOutOfBounds {
        node: NodeId,
        side: &'static str,
        child: NodeId,
        n_nodes: usize,
    },
    /// A node references itself as a child.
    SelfLoop { node: NodeId },
    /// A node was reached by more than one path.
    DuplicateVisit { node: NodeId },
    /// A cycle was detected during traversal.
    CycleDetected { node: NodeId },
    /// A node exists in storage but is unreachable from the root.
    UnreachableNode { node: NodeId },
    /// A split references a feature column outside the schema.
    FeatureOutOfBounds {
        node: NodeId,
        feature: u32,
        n_features: usize,
    },
    /// A threshold or leaf value is NaN or infinite.
    NonFiniteValue { node: NodeId },
}

impl std::fmt::Display for TreeValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyTree => write!(f, "tree has no nodes"),
            Self::LengthMismatch {
                field,
                len,
                n_nodes,
            } => write!(f, "{field} has {len} entries for {n_nodes} nodes"),
            Self::ChildOutOfBounds {
                node,
                side,
                child,
                n_nodes,
            } => write!(
                f,
                "node {node} {side} child {child} out of bounds ({n_nodes} nodes)"
            ),
            Self::SelfLoop { node } => write!(f, "node {node} is its own child"),
            Self::DuplicateVisit { node } => write!(f, "node {node} reached twice"),
            Self::CycleDetected { node } => write!(f, "cycle through node {node}"),
            Self::UnreachableNode { node } => write!(f, "node {node} unreachable from root"),
            Self::FeatureOutOfBounds {
                node,
                feature,
                n_features,
            } => write!(
                f,
                "node {node} splits on feature {feature}, schema has {n_features}"
            ),
            Self::NonFiniteValue { node } => write!(f, "node {node} holds a non-finite value"),
        }
    }
}

impl std::error::Error for TreeValidationError {}

// ============================================================================
// Tree
// ============================================================================

/// Structure-of-Arrays regression tree with scalar leaves.
///
/// Internal nodes use `split_indices`, `thresholds` and the child arrays;
/// leaves use `leaf_values`. Unused slots hold zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    split_indices: Box<[u32]>,
    thresholds: Box<[f64]>,
    left_children: Box<[NodeId]>,
    right_children: Box<[NodeId]>,
    is_leaf: Box<[bool]>,
    leaf_values: Box<[f64]>,
}

impl Tree {
    /// Create a tree from parallel arrays.
    ///
    /// Arrays are expected to share one length; call [`Tree::validate`]
    /// on trees from untrusted sources.
    pub fn new(
        split_indices: Vec<u32>,
        thresholds: Vec<f64>,
        left_children: Vec<NodeId>,
        right_children: Vec<NodeId>,
        is_leaf: Vec<bool>,
        leaf_values: Vec<f64>,
    ) -> Self {
        Self {
            split_indices: split_indices.into_boxed_slice(),
            thresholds: thresholds.into_boxed_slice(),
            left_children: left_children.into_boxed_slice(),
            right_children: right_children.into_boxed_slice(),
            is_leaf: is_leaf.into_boxed_slice(),
            leaf_values: leaf_values.into_boxed_slice(),
        }
    }

    /// A single-leaf tree.
    pub fn constant(value: f64) -> Self {
        Self::new(vec![0], vec![0.0], vec![0], vec![0], vec![true], vec![value])
    }

    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.split_indices.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.is_leaf.iter().filter(|&&l| l).count()
    }

    #[inline]
    pub fn is_leaf(&self, node: NodeId) -> bool {
        self.is_leaf[node as usize]
    }

    #[inline]
    pub fn split_index(&self, node: NodeId) -> u32 {
        self.split_indices[node as usize]
    }

    #[inline]
    pub fn threshold(&self, node: NodeId) -> f64 {
        self.thresholds[node as usize]
    }

    #[inline]
    pub fn left_child(&self, node: NodeId) -> NodeId {
        self.left_children[node as usize]
    }

    #[inline]
    pub fn right_child(&self, node: NodeId) -> NodeId {
        self.right_children[node as usize]
    }

    #[inline]
    pub fn leaf_value(&self, node: NodeId) -> f64 {
        self.leaf_values[node as usize]
    }

    /// Depth of the deepest leaf (a single leaf has depth 0).
    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0 as NodeId, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            if self.is_leaf(node) {
                max_depth = max_depth.max(depth);
            } else {
                stack.push((self.left_child(node), depth + 1));
                stack.push((self.right_child(node), depth + 1));
            }
        }
        max_depth
    }

    // =========================================================================
    // Raw access (persistence)
    // =========================================================================

    pub fn split_indices(&self) -> &[u32] {
        &self.split_indices
    }

    pub fn thresholds(&self) -> &[f64] {
        &self.thresholds
    }

    pub fn left_children(&self) -> &[NodeId] {
        &self.left_children
    }

    pub fn right_children(&self) -> &[NodeId] {
        &self.right_children
    }

    pub fn leaf_flags(&self) -> &[bool] {
        &self.is_leaf
    }

    pub fn leaf_values(&self) -> &[f64] {
        &self.leaf_values
    }

    // =========================================================================
    // Validation
    // =========================================================================

    /// Validate structural invariants for a tree addressing `n_features` columns.
    pub fn validate(&self, n_features: usize) -> Result<(), TreeValidationError> {
        let n_nodes = self.n_nodes();
        if n_nodes == 0 {
            return Err(TreeValidationError::EmptyTree);
        }
        for (field, len) in [
            ("thresholds", self.thresholds.len()),
            ("left_children", self.left_children.len()),
            ("right_children", self.right_children.len()),
            ("is_leaf", self.is_leaf.len()),
            ("leaf_values", self.leaf_values.len()),
        ] {
            if len != n_nodes {
                return Err(TreeValidationError::LengthMismatch {
                    field,
                    len,
                    n_nodes,
                });
            }
        }

        // Iterative DFS with color marking.
        // 0 = unvisited, 1 = visiting, 2 = done
        let mut color = vec![0u8; n_nodes];
        let mut stack: Vec<(NodeId, u8)> = vec![(0, 0)];

        while let Some((node, phase)) = stack.pop() {
            let idx = node as usize;
            match phase {
                0 => {
                    match color[idx] {
                        0 => {}
                        1 => return Err(TreeValidationError::CycleDetected { node }),
                        _ => return Err(TreeValidationError::DuplicateVisit { node }),
                    }
                    color[idx] = 1;
                    stack.push((node, 1));

                    if self.is_leaf(node) {
                        if !self.leaf_value(node).is_finite() {
                            return Err(TreeValidationError::NonFiniteValue { node });
                        }
                        continue;
                    }

                    let feature = self.split_index(node);
                    if feature as usize >= n_features {
                        return Err(TreeValidationError::FeatureOutOfBounds {
                            node,
                            feature,
                            n_features,
                        });
                    }
                    if !self.threshold(node).is_finite() {
                        return Err(TreeValidationError::NonFiniteValue { node });
                    }

                    let left = self.left_child(node);
                    let right = self.right_child(node);
                    if left == node || right == node {
                        return Err(TreeValidationError::SelfLoop { node });
                    }
                    for (side, child) in [("left", left), ("right", right)] {
                        if child as usize >= n_nodes {
                            return Err(TreeValidationError::ChildOutOfBounds {
                                node,
                                side,
                                child,
                                n_nodes,
                            });
                        }
                    }

                    stack.push((right, 0));
                    stack.push((left, 0));
                }
                _ => color[idx] = 2,
            }
        }

        if let Some(i) = color.iter().position(|&c| c == 0) {
            return Err(TreeValidationError::UnreachableNode { node: i as NodeId });
        }
        Ok(())
    }

    // =========================================================================
    // Prediction
    // =========================================================================

    /// Traverse from the root to the leaf selected by `features`.
    #[inline]
    pub fn traverse_to_leaf(&self, features: &[f64]) -> NodeId {
        let mut node: NodeId = 0;
        while !self.is_leaf(node) {
            let value = features[self.split_index(node) as usize];
            node = if value < self.threshold(node) {
                self.left_child(node)
            } else {
                self.right_child(node)
            };
        }
        node
    }

    /// Predict a single row.
    #[inline]
    pub fn predict_row(&self, features: &[f64]) -> f64 {
        self.leaf_value(self.traverse_to_leaf(features))
    }
}

// =============================================================================
// MutableTree (training-time construction)
// =============================================================================

/// Mutable tree for use during training.
///
/// Nodes are allocated as placeholders and filled in once the grower decides
/// between a split and a leaf.
#[derive(Debug, Clone, Default)]
pub struct MutableTree {
    split_indices: Vec<u32>,
    thresholds: Vec<f64>,
    left_children: Vec<NodeId>,
    right_children: Vec<NodeId>,
    is_leaf: Vec<bool>,
    leaf_values: Vec<f64>,
}

impl MutableTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a tree with capacity hint.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            split_indices: Vec::with_capacity(capacity),
            thresholds: Vec::with_capacity(capacity),
            left_children: Vec::with_capacity(capacity),
            right_children: Vec::with_capacity(capacity),
            is_leaf: Vec::with_capacity(capacity),
            leaf_values: Vec::with_capacity(capacity),
        }
    }

    /// Initialize the root node as a placeholder. Returns the root ID (always 0).
    pub fn init_root(&mut self) -> NodeId {
        self.reset();
        self.allocate_node()
    }

    /// Apply a numeric split to a node, allocating child nodes.
    ///
    /// Returns `(left_id, right_id)`.
    pub fn apply_numeric_split(
        &mut self,
        node: NodeId,
        feature: u32,
        threshold: f64,
    ) -> (NodeId, NodeId) {
        let left_id = self.allocate_node();
        let right_id = self.allocate_node();

        let idx = node as usize;
        self.split_indices[idx] = feature;
        self.thresholds[idx] = threshold;
        self.left_children[idx] = left_id;
        self.right_children[idx] = right_id;
        self.is_leaf[idx] = false;

        (left_id, right_id)
    }

    /// Set a node as a leaf with the given value.
    pub fn make_leaf(&mut self, node: NodeId, value: f64) {
        let idx = node as usize;
        self.is_leaf[idx] = true;
        self.leaf_values[idx] = value;
    }

    /// Current number of allocated nodes.
    #[inline]
    pub fn n_nodes(&self) -> usize {
        self.split_indices.len()
    }

    /// Reset the tree for reuse.
    pub fn reset(&mut self) {
        self.split_indices.clear();
        self.thresholds.clear();
        self.left_children.clear();
        self.right_children.clear();
        self.is_leaf.clear();
        self.leaf_values.clear();
    }

    /// Finalize the tree and return immutable storage.
    pub fn freeze(self) -> Tree {
        Tree::new(
            self.split_indices,
            self.thresholds,
            self.left_children,
            self.right_children,
            self.is_leaf,
            self.leaf_values,
        )
    }

    fn allocate_node(&mut self) -> NodeId {
        let id = self.split_indices.len() as NodeId;
        self.split_indices.push(0);
        self.thresholds.push(0.0);
        self.left_children.push(0);
        self.right_children.push(0);
        self.is_leaf.push(true);
        self.leaf_values.push(0.0);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// root: f0 < 0.5 -> leaf 1.0, else (f1 < 0.3 -> 2.0, else 3.0)
    fn sample_tree() -> Tree {
        let mut tree = MutableTree::with_capacity(5);
        let root = tree.init_root();
        let (left, right) = tree.apply_numeric_split(root, 0, 0.5);
        tree.make_leaf(left, 1.0);
        let (rl, rr) = tree.apply_numeric_split(right, 1, 0.3);
        tree.make_leaf(rl, 2.0);
        tree.make_leaf(rr, 3.0);
        tree.freeze()
    }

    #[test]
    fn predict_follows_less_than_left() {
        let tree = sample_tree();
        assert_eq!(tree.predict_row(&[0.3, 0.0]), 1.0);
        assert_eq!(tree.predict_row(&[0.5, 0.0]), 2.0);
        assert_eq!(tree.predict_row(&[0.7, 0.3]), 3.0);
    }

    #[test]
    fn shape_accessors() {
        let tree = sample_tree();
        assert_eq!(tree.n_nodes(), 5);
        assert_eq!(tree.n_leaves(), 3);
        assert_eq!(tree.depth(), 2);
        assert!(tree.validate(2).is_ok());
    }

    #[test]
    fn constant_tree() {
        let tree = Tree::constant(7.5);
        assert_eq!(tree.predict_row(&[]), 7.5);
        assert_eq!(tree.depth(), 0);
        assert!(tree.validate(0).is_ok());
    }

    #[test]
    fn validate_rejects_feature_out_of_schema() {
        let err = sample_tree().validate(1).unwrap_err();
        assert!(matches!(err, TreeValidationError::FeatureOutOfBounds { feature: 1, .. }));
    }

    #[test]
    fn validate_rejects_bad_child() {
        let tree = Tree::new(
            vec![0, 0, 0],
            vec![0.5, 0.0, 0.0],
            vec![1, 0, 0],
            vec![9, 0, 0],
            vec![false, true, true],
            vec![0.0, 1.0, 2.0],
        );
        assert!(matches!(
            tree.validate(1),
            Err(TreeValidationError::ChildOutOfBounds { side: "right", child: 9, .. })
        ));
    }

    #[test]
    fn validate_rejects_unreachable_and_duplicate() {
        let unreachable = Tree::new(
            vec![0, 0, 0, 0],
            vec![0.5, 0.0, 0.0, 0.0],
            vec![1, 0, 0, 0],
            vec![2, 0, 0, 0],
            vec![false, true, true, true],
            vec![0.0, 1.0, 2.0, 3.0],
        );
        assert_eq!(
            unreachable.validate(1),
            Err(TreeValidationError::UnreachableNode { node: 3 })
        );

        let shared = Tree::new(
            vec![0, 0],
            vec![0.5, 0.0],
            vec![1, 0],
            vec![1, 0],
            vec![false, true],
            vec![0.0, 1.0],
        );
        assert_eq!(
            shared.validate(1),
            Err(TreeValidationError::DuplicateVisit { node: 1 })
        );
    }

    #[test]
    fn validate_rejects_length_mismatch_and_nan() {
        let short = Tree::new(vec![0], vec![0.0], vec![0], vec![0], vec![true], vec![]);
        assert!(matches!(
            short.validate(1),
            Err(TreeValidationError::LengthMismatch { field: "leaf_values", .. })
        ));

        let nan = Tree::constant(f64::NAN);
        assert_eq!(nan.validate(1), Err(TreeValidationError::NonFiniteValue { node: 0 }));
    }
}
