//! The entry point tying settings, assembly and graph traversal together.
use k8s_openapi::api::core::v1::{PodSpec, PodTemplateSpec};
use snafu::{ResultExt, Snafu};
use tracing::{debug, info, instrument};

use crate::{
    config::{self, ConfigOverrides, ConfigResolver, Key},
    graph::ResourceGraph,
    sidecar::{self, InjectionPolicy, SidecarAssembler},
    visitor::Dispatcher,
};

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to resolve enricher configuration"))]
    ResolveConfig { source: config::Error },

    #[snafu(display("failed to assemble the sidecar for workload {workload_name:?}"))]
    AssembleSidecar {
        source: sidecar::Error,
        workload_name: String,
    },
}

/// Injects the Istio sidecar into every pod of a [`ResourceGraph`].
///
/// ```
/// # use istio_enricher::{config::ConfigOverrides, enricher::IstioEnricher, graph::ResourceGraph};
/// let mut graph = ResourceGraph::new();
/// IstioEnricher::default()
///     .enrich(&mut graph, &ConfigOverrides::new(), "orders-svc")
///     .unwrap();
///
/// assert!(graph.is_empty());
/// ```
#[derive(Clone, Debug, Default)]
pub struct IstioEnricher {
    policy: InjectionPolicy,
}

impl IstioEnricher {
    pub fn new(policy: InjectionPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> InjectionPolicy {
        self.policy
    }

    /// Enriches `graph` in place.
    ///
    /// The `name` setting takes precedence over `workload_name`. The sidecar is assembled before
    /// the graph is touched, so on error `graph` is left unchanged. Graphs without pods are not an
    /// error.
    #[instrument(skip(self, graph, overrides), fields(nodes = graph.len()))]
    pub fn enrich(
        &self,
        graph: &mut ResourceGraph,
        overrides: &ConfigOverrides,
        workload_name: &str,
    ) -> Result<()> {
        let config = ConfigResolver::new(overrides);
        if !config.enabled().context(ResolveConfigSnafu)? {
            debug!("enricher is disabled, leaving resources untouched");
            return Ok(());
        }

        let workload_name = config.resolve_or(Key::Name, workload_name);
        let replicas = config
            .resolve_int(Key::ReplicaCount)
            .context(ResolveConfigSnafu)?;
        debug!(workload_name, replicas, policy = ?self.policy, "resolved settings");

        let artifacts = SidecarAssembler::new(config, self.policy)
            .assemble(workload_name)
            .context(AssembleSidecarSnafu { workload_name })?;

        let mut dispatcher = Dispatcher::new();
        dispatcher
            .register(|template: &mut PodTemplateSpec| artifacts.annotate(template))
            .register(|pod_spec: &mut PodSpec| artifacts.inject(pod_spec));
        let invocations = dispatcher.run(graph);

        info!(
            workload_name,
            sidecar = %artifacts.sidecar.name,
            invocations,
            "enriched resources"
        );
        Ok(())
    }
}
