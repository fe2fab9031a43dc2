use std::collections::BTreeSet;

/// Handle of a drawable registered in the scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SceneNodeId(pub u64);

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SceneError {
    #[error("scene node {0:?} is not attached")]
    NotAttached(SceneNodeId),
}

/// Minimal scene graph: the set of nodes the renderer is allowed to draw.
#[derive(Debug, Default)]
pub struct Scene {
    nodes: BTreeSet<SceneNodeId>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&mut self, node: SceneNodeId) {
        self.nodes.insert(node);
    }

    pub fn detach(&mut self, node: SceneNodeId) -> Result<(), SceneError> {
        if self.nodes.remove(&node) {
            Ok(())
        } else {
            Err(SceneError::NotAttached(node))
        }
    }

    pub fn contains(&self, node: SceneNodeId) -> bool {
        self.nodes.contains(&node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detaching_twice_reports_not_attached() {
        let mut scene = Scene::new();
        scene.attach(SceneNodeId(7));
        assert!(scene.contains(SceneNodeId(7)));
        assert_eq!(scene.detach(SceneNodeId(7)), Ok(()));
        assert_eq!(scene.detach(SceneNodeId(7)), Err(SceneError::NotAttached(SceneNodeId(7))));
        assert!(scene.is_empty());
    }
}
