//! In-memory scene model and transform helpers.

pub mod types;

pub use types::*;

use glam::{Mat4, Quat, Vec3};

/// Local transform matrix of a node.
pub fn local_matrix(node: &Node) -> Mat4 {
    if let Some(m) = &node.matrix {
        return Mat4::from_cols_array(m);
    }
    match &node.transform {
        Some(t) => Mat4::from_scale_rotation_translation(
            Vec3::from_array(t.scale),
            Quat::from_array(t.rotation),
            Vec3::from_array(t.translation),
        ),
        None => Mat4::IDENTITY,
    }
}

/// World transform matrix of a node, composed root-down.
pub fn world_matrix(nodes: &[Node], index: usize) -> Mat4 {
    let mut chain = Vec::new();
    let mut current = Some(index);
    while let Some(i) = current {
        chain.push(i);
        current = nodes[i].parent;
    }

    let mut world = Mat4::IDENTITY;
    for &i in chain.iter().rev() {
        world *= local_matrix(&nodes[i]);
    }
    world
}

/// Decomposed TRS of a node, resolving matrix-form transforms.
///
/// Used as the rest pose when deciding whether a constant animation
/// track is redundant.
pub fn rest_pose(node: &Node) -> NodeTransform {
    if let Some(t) = &node.transform {
        return *t;
    }
    if let Some(m) = &node.matrix {
        let (scale, rotation, translation) =
            Mat4::from_cols_array(m).to_scale_rotation_translation();
        return NodeTransform {
            translation: translation.to_array(),
            rotation: rotation.to_array(),
            scale: scale.to_array(),
        };
    }
    NodeTransform::IDENTITY
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_at(translation: [f32; 3]) -> Node {
        Node {
            transform: Some(NodeTransform {
                translation,
                ..NodeTransform::IDENTITY
            }),
            ..Node::default()
        }
    }

    #[test]
    fn world_matrix_composes_parent_chain() {
        let mut root = node_at([1.0, 0.0, 0.0]);
        root.children = vec![1];
        let mut child = node_at([0.0, 2.0, 0.0]);
        child.parent = Some(0);

        let nodes = vec![root, child];
        let world = world_matrix(&nodes, 1);
        let p = world.transform_point3(Vec3::ZERO);
        assert!((p - Vec3::new(1.0, 2.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn rest_pose_decomposes_matrix_nodes() {
        let m = Mat4::from_translation(Vec3::new(3.0, 0.0, 0.0));
        let node = Node {
            matrix: Some(m.to_cols_array()),
            ..Node::default()
        };
        let pose = rest_pose(&node);
        assert!((pose.translation[0] - 3.0).abs() < 1e-6);
        assert!((pose.scale[0] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rest_pose_defaults_to_identity() {
        let pose = rest_pose(&Node::default());
        assert_eq!(pose, NodeTransform::IDENTITY);
    }
}
