use tessera_common::ObjectId;

/// Errors from scene graph operations. Every failing operation leaves the
/// graph exactly as it was before the call.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    #[error("unknown component type `{0}`")]
    UnknownType(String),
    #[error("node {0} not found")]
    NodeNotFound(ObjectId),
    #[error("component {0} not found")]
    ComponentNotFound(ObjectId),
    #[error("cannot parent {node} under its own descendant {parent}")]
    CyclicParent { node: ObjectId, parent: ObjectId },
    #[error("the graph root cannot be removed or reparented")]
    RootImmutable,
}
