//! Injects the Istio sidecar proxy into the pods of Kubernetes workload descriptions.
//!
//! The [`enricher::IstioEnricher`] resolves its [settings](config), assembles the
//! [sidecar](sidecar) once and then merges it into every pod template and pod spec of a
//! [`graph::ResourceGraph`] with a single [`visitor::Dispatcher`] pass.

pub mod builder;
pub mod config;
pub mod enricher;
pub mod graph;
pub mod logging;
pub mod sidecar;
pub mod validation;
pub mod visitor;
pub mod yaml;

// External re-exports
pub use k8s_openapi;
