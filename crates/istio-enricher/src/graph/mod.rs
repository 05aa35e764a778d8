//! The in-memory workload description the enricher operates on.
//!
//! A [`ResourceGraph`] is an ordered list of top-level [`ResourceNode`]s. Workload nodes own a pod
//! template, which in turn owns a pod spec. Those nested objects are reachable as nodes of their
//! own kind ([`NodeKind::PodTemplateSpec`], [`NodeKind::PodSpec`]) during a walk, but they are
//! never shared: every nested node has exactly one owner and is edited in place.
use k8s_openapi::{
    Resource,
    api::{
        apps::v1::{DaemonSet, Deployment, StatefulSet},
        core::v1::{ConfigMap, PodSpec, PodTemplateSpec, Service},
    },
};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};
use serde_json::Value;
use tracing::{debug, warn};

mod node;

pub use node::*;

/// A top-level object of a workload description.
///
/// The variant is chosen by the exact `apiVersion`/`kind` pair of a document, see
/// [`Self::from_value`]. Documents that aren't modelled by one of the typed variants are kept as
/// [`Self::Unstructured`] and are never touched by visitors of any other kind.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ResourceNode {
    Deployment(Deployment),
    StatefulSet(StatefulSet),
    DaemonSet(DaemonSet),
    Service(Service),
    ConfigMap(ConfigMap),
    Unstructured(Value),
}

/// Workload kinds which only get a sidecar if their `apiVersion` is the one of the typed variant.
const WORKLOAD_KINDS: [&str; 3] = [
    <Deployment as Resource>::KIND,
    <StatefulSet as Resource>::KIND,
    <DaemonSet as Resource>::KIND,
];

impl ResourceNode {
    /// Converts a raw document into a node.
    ///
    /// A typed variant is only used if both `apiVersion` and `kind` match it exactly, everything
    /// else (including documents without type information) stays [`Self::Unstructured`] and is
    /// written back unchanged.
    pub fn from_value(value: Value) -> Self {
        let api_version = value.get("apiVersion").and_then(Value::as_str);
        let kind = value.get("kind").and_then(Value::as_str);

        match (api_version, kind) {
            (Some(api_version), Some(kind)) => {
                if is_type::<Deployment>(api_version, kind) {
                    Self::typed(value, Self::Deployment)
                } else if is_type::<StatefulSet>(api_version, kind) {
                    Self::typed(value, Self::StatefulSet)
                } else if is_type::<DaemonSet>(api_version, kind) {
                    Self::typed(value, Self::DaemonSet)
                } else if is_type::<Service>(api_version, kind) {
                    Self::typed(value, Self::Service)
                } else if is_type::<ConfigMap>(api_version, kind) {
                    Self::typed(value, Self::ConfigMap)
                } else {
                    if WORKLOAD_KINDS.contains(&kind) {
                        warn!(
                            api_version,
                            kind,
                            "unsupported workload API version, document is left untouched"
                        );
                    }
                    Self::Unstructured(value)
                }
            }
            _ => {
                debug!("document without apiVersion or kind, keeping it as is");
                Self::Unstructured(value)
            }
        }
    }

    fn typed<T>(value: Value, variant: fn(T) -> Self) -> Self
    where
        T: Resource + DeserializeOwned,
    {
        match T::deserialize(&value) {
            Ok(resource) => variant(resource),
            Err(error) => {
                warn!(
                    %error,
                    kind = T::KIND,
                    "failed to deserialize document, it is left untouched"
                );
                Self::Unstructured(value)
            }
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self {
            Self::Deployment(_) => NodeKind::Deployment,
            Self::StatefulSet(_) => NodeKind::StatefulSet,
            Self::DaemonSet(_) => NodeKind::DaemonSet,
            Self::Service(_) => NodeKind::Service,
            Self::ConfigMap(_) => NodeKind::ConfigMap,
            Self::Unstructured(_) => NodeKind::Unstructured,
        }
    }

    /// The pod template of workload nodes, `None` for everything else or if the workload has no
    /// spec yet.
    pub fn pod_template(&self) -> Option<&PodTemplateSpec> {
        match self {
            Self::Deployment(deployment) => deployment.spec.as_ref().map(|spec| &spec.template),
            Self::StatefulSet(stateful_set) => {
                stateful_set.spec.as_ref().map(|spec| &spec.template)
            }
            Self::DaemonSet(daemon_set) => daemon_set.spec.as_ref().map(|spec| &spec.template),
            Self::Service(_) | Self::ConfigMap(_) | Self::Unstructured(_) => None,
        }
    }

    pub fn pod_template_mut(&mut self) -> Option<&mut PodTemplateSpec> {
        match self {
            Self::Deployment(deployment) => deployment.spec.as_mut().map(|spec| &mut spec.template),
            Self::StatefulSet(stateful_set) => {
                stateful_set.spec.as_mut().map(|spec| &mut spec.template)
            }
            Self::DaemonSet(daemon_set) => daemon_set.spec.as_mut().map(|spec| &mut spec.template),
            Self::Service(_) | Self::ConfigMap(_) | Self::Unstructured(_) => None,
        }
    }

    pub fn pod_spec(&self) -> Option<&PodSpec> {
        self.pod_template()
            .and_then(|template| template.spec.as_ref())
    }

    /// Visits this node and everything it owns, parents before children.
    ///
    /// The top-level node is visited first. Afterwards its pod template and the template's pod spec
    /// are looked up again, so a visitor of the parent may populate them.
    fn walk<F>(&mut self, visit: &mut F)
    where
        F: FnMut(NodeMut<'_>),
    {
        match self {
            Self::Deployment(deployment) => visit(NodeMut::Deployment(deployment)),
            Self::StatefulSet(stateful_set) => visit(NodeMut::StatefulSet(stateful_set)),
            Self::DaemonSet(daemon_set) => visit(NodeMut::DaemonSet(daemon_set)),
            Self::Service(service) => visit(NodeMut::Service(service)),
            Self::ConfigMap(config_map) => visit(NodeMut::ConfigMap(config_map)),
            Self::Unstructured(value) => visit(NodeMut::Unstructured(value)),
        }

        if let Some(template) = self.pod_template_mut() {
            visit(NodeMut::PodTemplateSpec(&mut *template));

            if let Some(pod_spec) = template.spec.as_mut() {
                visit(NodeMut::PodSpec(pod_spec));
            }
        }
    }
}

impl From<Deployment> for ResourceNode {
    fn from(value: Deployment) -> Self {
        Self::Deployment(value)
    }
}

impl From<StatefulSet> for ResourceNode {
    fn from(value: StatefulSet) -> Self {
        Self::StatefulSet(value)
    }
}

impl From<DaemonSet> for ResourceNode {
    fn from(value: DaemonSet) -> Self {
        Self::DaemonSet(value)
    }
}

impl From<Service> for ResourceNode {
    fn from(value: Service) -> Self {
        Self::Service(value)
    }
}

impl From<ConfigMap> for ResourceNode {
    fn from(value: ConfigMap) -> Self {
        Self::ConfigMap(value)
    }
}

impl<'de> Deserialize<'de> for ResourceNode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

fn is_type<T: Resource>(api_version: &str, kind: &str) -> bool {
    api_version == T::API_VERSION && kind == T::KIND
}

/// An ordered list of top-level nodes, owned by the caller.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ResourceGraph {
    nodes: Vec<ResourceNode>,
}

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, node: impl Into<ResourceNode>) -> &mut Self {
        self.nodes.push(node.into());
        self
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn nodes(&self) -> &[ResourceNode] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<ResourceNode> {
        self.nodes
    }

    /// Walks every node in graph order, see [`ResourceNode`] for the order within one top-level
    /// node.
    ///
    /// The graph stays mutably borrowed for the whole walk and visitors only ever see the contents
    /// of a node, so top-level nodes can't be added or removed while walking.
    pub fn walk<F>(&mut self, mut visit: F)
    where
        F: FnMut(NodeMut<'_>),
    {
        for node in &mut self.nodes {
            node.walk(&mut visit);
        }
    }

    /// Calls `visit` exactly once for every node of `kind`, in graph order.
    pub fn for_each_node<F>(&mut self, kind: NodeKind, mut visit: F)
    where
        F: FnMut(NodeMut<'_>),
    {
        self.walk(|node| {
            if node.kind() == kind {
                visit(node);
            }
        });
    }

    /// Typed variant of [`Self::for_each_node`].
    pub fn for_each<T, F>(&mut self, mut visit: F)
    where
        T: TypedNode,
        F: FnMut(&mut T),
    {
        self.for_each_node(T::KIND, |node| {
            if let Some(node) = T::from_node(node) {
                visit(node);
            }
        });
    }
}

impl From<Vec<ResourceNode>> for ResourceGraph {
    fn from(nodes: Vec<ResourceNode>) -> Self {
        Self { nodes }
    }
}

impl FromIterator<ResourceNode> for ResourceGraph {
    fn from_iter<T: IntoIterator<Item = ResourceNode>>(iter: T) -> Self {
        Self {
            nodes: iter.into_iter().collect(),
        }
    }
}
