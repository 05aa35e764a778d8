//! Dispatches callbacks to the nodes of a [`ResourceGraph`] by node kind.
use std::collections::BTreeMap;

use tracing::trace;

use crate::graph::{NodeKind, NodeMut, ResourceGraph, TypedNode};

type Callback<'a> = Box<dyn FnMut(NodeMut<'_>) + 'a>;

/// A registration table mapping each [`NodeKind`] to the callbacks interested in it.
///
/// Callbacks registered for the same kind run in registration order. The dispatcher knows nothing
/// about the shape of the tree, it relies on [`ResourceGraph::walk`] to reach every node.
#[derive(Default)]
pub struct Dispatcher<'a> {
    callbacks: BTreeMap<NodeKind, Vec<Callback<'a>>>,
}

impl<'a> Dispatcher<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for every node of type `T`.
    pub fn register<T, F>(&mut self, mut callback: F) -> &mut Self
    where
        T: TypedNode,
        F: FnMut(&mut T) + 'a,
    {
        self.register_kind(T::KIND, move |node| {
            if let Some(node) = T::from_node(node) {
                callback(node);
            }
        })
    }

    pub fn register_kind<F>(&mut self, kind: NodeKind, callback: F) -> &mut Self
    where
        F: FnMut(NodeMut<'_>) + 'a,
    {
        self.callbacks
            .entry(kind)
            .or_default()
            .push(Box::new(callback));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.is_empty()
    }

    /// Performs a single pass over `graph` and returns how many callbacks were invoked.
    pub fn run(&mut self, graph: &mut ResourceGraph) -> usize {
        let mut invocations = 0;

        graph.walk(|mut node| {
            let kind = node.kind();
            if let Some(callbacks) = self.callbacks.get_mut(&kind) {
                for callback in callbacks {
                    trace!(%kind, "invoking visitor");
                    callback(node.reborrow());
                    invocations += 1;
                }
            }
        });

        invocations
    }
}

impl std::fmt::Debug for Dispatcher<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_map()
            .entries(
                self.callbacks
                    .iter()
                    .map(|(kind, callbacks)| (kind, callbacks.len())),
            )
            .finish()
    }
}
