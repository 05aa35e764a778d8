use k8s_openapi::api::{
    apps::v1::{DaemonSet, Deployment, StatefulSet},
    core::v1::{ConfigMap, PodSpec, PodTemplateSpec, Service},
};
use strum::{Display, EnumIter};

/// The structural role a node plays in a [`ResourceGraph`](crate::graph::ResourceGraph).
///
/// Adding a kind means adding a variant here and in [`NodeMut`], and teaching
/// [`ResourceNode`](crate::graph::ResourceNode) where it lives in the tree.
#[derive(Clone, Copy, Debug, Display, EnumIter, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum NodeKind {
    Deployment,
    StatefulSet,
    DaemonSet,
    Service,
    ConfigMap,
    Unstructured,

    /// The pod template of a workload, owner of the pod metadata.
    PodTemplateSpec,

    /// The pod spec inside a pod template, owner of the container and volume lists.
    PodSpec,
}

/// A mutable borrow of a single node, handed to visitors during a walk.
#[derive(Debug)]
pub enum NodeMut<'a> {
    Deployment(&'a mut Deployment),
    StatefulSet(&'a mut StatefulSet),
    DaemonSet(&'a mut DaemonSet),
    Service(&'a mut Service),
    ConfigMap(&'a mut ConfigMap),
    Unstructured(&'a mut serde_json::Value),
    PodTemplateSpec(&'a mut PodTemplateSpec),
    PodSpec(&'a mut PodSpec),
}

impl NodeMut<'_> {
    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Deployment(_) => NodeKind::Deployment,
            Self::StatefulSet(_) => NodeKind::StatefulSet,
            Self::DaemonSet(_) => NodeKind::DaemonSet,
            Self::Service(_) => NodeKind::Service,
            Self::ConfigMap(_) => NodeKind::ConfigMap,
            Self::Unstructured(_) => NodeKind::Unstructured,
            Self::PodTemplateSpec(_) => NodeKind::PodTemplateSpec,
            Self::PodSpec(_) => NodeKind::PodSpec,
        }
    }

    /// Borrows the node again for a shorter lifetime, so it can be handed to several visitors.
    pub fn reborrow(&mut self) -> NodeMut<'_> {
        match self {
            Self::Deployment(node) => NodeMut::Deployment(node),
            Self::StatefulSet(node) => NodeMut::StatefulSet(node),
            Self::DaemonSet(node) => NodeMut::DaemonSet(node),
            Self::Service(node) => NodeMut::Service(node),
            Self::ConfigMap(node) => NodeMut::ConfigMap(node),
            Self::Unstructured(node) => NodeMut::Unstructured(node),
            Self::PodTemplateSpec(node) => NodeMut::PodTemplateSpec(node),
            Self::PodSpec(node) => NodeMut::PodSpec(node),
        }
    }
}

/// Types which are addressable as a node of a fixed [`NodeKind`].
pub trait TypedNode {
    const KIND: NodeKind;

    /// Returns the typed node if `node` is of [`Self::KIND`].
    fn from_node(node: NodeMut<'_>) -> Option<&mut Self>;
}

macro_rules! typed_node {
    ($($type:ident),* $(,)?) => {
        $(
            impl TypedNode for $type {
                const KIND: NodeKind = NodeKind::$type;

                fn from_node(node: NodeMut<'_>) -> Option<&mut Self> {
                    match node {
                        NodeMut::$type(node) => Some(node),
                        _ => None,
                    }
                }
            }
        )*
    };
}

typed_node!(
    Deployment,
    StatefulSet,
    DaemonSet,
    Service,
    ConfigMap,
    PodTemplateSpec,
    PodSpec,
);
