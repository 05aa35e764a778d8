//! This module provides builders for the Kubernetes objects the sidecar is made of.
//!
//! The builders only construct values, they never touch a [`ResourceGraph`].
//!
//! [`ResourceGraph`]: crate::graph::ResourceGraph
pub mod pod;
