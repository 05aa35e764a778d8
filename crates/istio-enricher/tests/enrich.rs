use indoc::indoc;
use istio_enricher::{
    config::ConfigOverrides,
    enricher::IstioEnricher,
    graph::{ResourceGraph, ResourceNode},
    k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec},
    sidecar::{INIT_CONTAINERS_ANNOTATION, InjectionPolicy, STATUS_ANNOTATION},
    yaml,
};
use rstest::{fixture, rstest};

const WORKLOAD_NAME: &str = "orders-svc";

const RESOURCES: &str = indoc! {"
    apiVersion: v1
    kind: Service
    metadata:
      name: orders-svc
    spec:
      ports:
      - port: 8080
    ---
    apiVersion: apps/v1
    kind: Deployment
    metadata:
      name: orders-svc
    spec:
      replicas: 2
      selector:
        matchLabels:
          app: orders-svc
      template:
        metadata:
          annotations:
            prometheus.io/scrape: 'true'
          labels:
            app: orders-svc
        spec:
          containers:
          - name: orders
            image: example/orders:1.4.2
            ports:
            - containerPort: 8080
    ---
    apiVersion: v1
    kind: ConfigMap
    metadata:
      name: orders-config
    data:
      LOG_LEVEL: info
"};

const DAEMON_SET: &str = indoc! {"
    apiVersion: apps/v1
    kind: DaemonSet
    metadata:
      name: node-agent
    spec:
      selector:
        matchLabels:
          app: node-agent
      template:
        spec:
          containers:
          - name: agent
            image: example/agent:0.3.0
"};

#[fixture]
fn resources() -> ResourceGraph {
    yaml::read_graph(RESOURCES.as_bytes()).unwrap()
}

fn to_yaml(graph: &ResourceGraph) -> String {
    let mut buffer = Vec::new();
    yaml::write_graph(graph, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

fn pod_template(graph: &ResourceGraph, index: usize) -> &PodTemplateSpec {
    graph.nodes()[index].pod_template().unwrap()
}

fn pod_spec(graph: &ResourceGraph, index: usize) -> &PodSpec {
    graph.nodes()[index].pod_spec().unwrap()
}

fn sidecar(graph: &ResourceGraph, index: usize) -> &Container {
    pod_spec(graph, index).containers.last().unwrap()
}

fn enrich(graph: &mut ResourceGraph, overrides: &ConfigOverrides) {
    IstioEnricher::default()
        .enrich(graph, overrides, WORKLOAD_NAME)
        .unwrap();
}

#[rstest]
fn default_enrichment(mut resources: ResourceGraph) {
    enrich(&mut resources, &ConfigOverrides::new());

    let pod_spec = pod_spec(&resources, 1);
    assert_eq!(pod_spec.containers.len(), 2);
    assert_eq!(pod_spec.containers[0].name, "orders");

    let sidecar = sidecar(&resources, 1);
    assert_eq!(sidecar.name, "istio-proxy");

    let env: Vec<_> = sidecar
        .env
        .iter()
        .flatten()
        .map(|env_var| {
            let field_path = env_var
                .value_from
                .as_ref()
                .and_then(|source| source.field_ref.as_ref())
                .map(|field_ref| field_ref.field_path.as_str());
            (env_var.name.as_str(), field_path)
        })
        .collect();
    assert_eq!(
        env,
        vec![
            ("POD_NAME", Some("metadata.name")),
            ("POD_NAMESPACE", Some("metadata.namespace")),
            ("POD_IP", Some("status.podIP")),
        ]
    );

    let mount_names: Vec<_> = sidecar
        .volume_mounts
        .iter()
        .flatten()
        .map(|mount| mount.name.as_str())
        .collect();
    let volume_names: Vec<_> = pod_spec
        .volumes
        .iter()
        .flatten()
        .map(|volume| volume.name.as_str())
        .collect();
    assert_eq!(mount_names, vec!["istio-envoy", "istio-certs"]);
    assert_eq!(mount_names, volume_names);

    let init_names: Vec<_> = pod_spec
        .init_containers
        .iter()
        .flatten()
        .map(|container| container.name.as_str())
        .collect();
    assert_eq!(init_names, vec!["istio-init", "enable-core-dump"]);

    let annotations = pod_template(&resources, 1)
        .metadata
        .as_ref()
        .and_then(|metadata| metadata.annotations.as_ref())
        .unwrap();
    assert_eq!(
        annotations.get("prometheus.io/scrape").map(String::as_str),
        Some("true")
    );
    assert!(
        annotations[STATUS_ANNOTATION].starts_with("injected-version-"),
        "{annotations:?}"
    );
    assert!(!annotations.contains_key(INIT_CONTAINERS_ANNOTATION));
}

#[rstest]
fn only_pods_are_touched(mut resources: ResourceGraph) {
    let original = resources.clone();
    enrich(&mut resources, &ConfigOverrides::new());

    assert_eq!(resources.nodes()[0], original.nodes()[0]);
    assert_eq!(resources.nodes()[2], original.nodes()[2]);
    assert_ne!(resources.nodes()[1], original.nodes()[1]);
}

#[rstest]
fn proxy_args_carry_the_workload_name(mut resources: ResourceGraph) {
    let overrides = ConfigOverrides::from_iter([(
        "proxyArgs",
        "proxy,sidecar,--serviceCluster,APP-CLUSTER-NAME",
    )]);
    enrich(&mut resources, &overrides);

    assert_eq!(
        sidecar(&resources, 1).args.as_deref().unwrap(),
        [
            "proxy",
            "sidecar",
            "--serviceCluster",
            "orders-svc",
            "--passthrough",
            "8080"
        ]
    );
}

#[rstest]
#[case("proxyName", "envoy")]
#[case("proxyImage", "registry.example.com/istio/proxy:1.0.0")]
#[case("imagePullPolicy", "Always")]
fn overrides_reach_the_sidecar(
    mut resources: ResourceGraph,
    #[case] name: &str,
    #[case] value: &str,
) {
    enrich(&mut resources, &ConfigOverrides::from_iter([(name, value)]));

    let sidecar = sidecar(&resources, 1);
    let actual = match name {
        "proxyName" => Some(sidecar.name.as_str()),
        "proxyImage" => sidecar.image.as_deref(),
        _ => sidecar.image_pull_policy.as_deref(),
    };
    assert_eq!(actual, Some(value));
}

#[test]
fn empty_graph_is_a_no_op() {
    let mut graph = ResourceGraph::new();
    enrich(&mut graph, &ConfigOverrides::new());

    assert!(graph.is_empty());
}

#[rstest]
fn graph_without_pods_is_a_no_op(resources: ResourceGraph) {
    let mut graph: ResourceGraph = resources
        .into_nodes()
        .into_iter()
        .filter(|node| node.pod_template().is_none())
        .collect();
    let before = to_yaml(&graph);

    enrich(&mut graph, &ConfigOverrides::new());

    assert_eq!(to_yaml(&graph), before);
}

#[rstest]
#[case("no")]
#[case("No")]
#[case("off")]
fn disabled_enricher_is_a_no_op(mut resources: ResourceGraph, #[case] enabled: &str) {
    let before = to_yaml(&resources);
    enrich(&mut resources, &ConfigOverrides::from_iter([("enabled", enabled)]));

    assert_eq!(to_yaml(&resources), before);
}

#[rstest]
fn invalid_configuration_leaves_graph_untouched(mut resources: ResourceGraph) {
    let before = to_yaml(&resources);
    let overrides = ConfigOverrides::from_iter([("proxyName", "Istio_Proxy")]);

    let result = IstioEnricher::default().enrich(&mut resources, &overrides, WORKLOAD_NAME);

    assert!(result.is_err());
    assert_eq!(to_yaml(&resources), before);
}

#[rstest]
fn enriching_twice_duplicates_the_sidecar(mut resources: ResourceGraph) {
    enrich(&mut resources, &ConfigOverrides::new());
    enrich(&mut resources, &ConfigOverrides::new());

    let pod_spec = pod_spec(&resources, 1);
    let names: Vec<_> = pod_spec
        .containers
        .iter()
        .map(|container| container.name.as_str())
        .collect();
    assert_eq!(names, vec!["orders", "istio-proxy", "istio-proxy"]);
    assert_eq!(pod_spec.volumes.as_ref().map(Vec::len), Some(4));
    assert_eq!(pod_spec.init_containers.as_ref().map(Vec::len), Some(4));
}

#[rstest]
fn legacy_policy_annotates_init_containers(mut resources: ResourceGraph) {
    IstioEnricher::new(InjectionPolicy::LEGACY)
        .enrich(&mut resources, &ConfigOverrides::new(), WORKLOAD_NAME)
        .unwrap();

    let annotations = pod_template(&resources, 1)
        .metadata
        .as_ref()
        .and_then(|metadata| metadata.annotations.as_ref())
        .unwrap();
    assert_eq!(
        annotations[INIT_CONTAINERS_ANNOTATION],
        concat!(
            r#"[{"name":"istio-init","image":"docker.io/istio/proxy_init:0.2.12","#,
            r#""imagePullPolicy":"IfNotPresent","resources":{},"#,
            r#""terminationMessagePath":"/dev/termination-log","terminationMessagePolicy":"File","#,
            r#""args":["-p","15001","-u","1337"],"#,
            r#""securityContext":{"capabilities":{"add":["NET_ADMIN"]},"privileged":true}},"#,
            r#"{"name":"enable-core-dump","image":"alpine","imagePullPolicy":"IfNotPresent","#,
            r#""command":["/bin/sh"],"resources":{},"#,
            r#""terminationMessagePath":"/dev/termination-log","terminationMessagePolicy":"File","#,
            r#""args":["-c","sysctl -w kernel.core_pattern=/etc/istio/proxy/core.%e.%p.%t && ulimit -c unlimited"],"#,
            r#""securityContext":{"privileged":true}}]"#,
        )
    );
    assert_eq!(pod_spec(&resources, 1).init_containers, None);
    assert_eq!(sidecar(&resources, 1).name, "istio-proxy");
}

#[test]
fn daemon_sets_without_pod_metadata_are_enriched() {
    let mut graph = yaml::read_graph(DAEMON_SET.as_bytes()).unwrap();
    enrich(&mut graph, &ConfigOverrides::new());

    assert!(matches!(graph.nodes()[0], ResourceNode::DaemonSet(_)));
    assert_eq!(sidecar(&graph, 0).name, "istio-proxy");
    assert!(
        pod_template(&graph, 0)
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.annotations.as_ref())
            .is_some_and(|annotations| annotations.contains_key(STATUS_ANNOTATION))
    );
}

#[rstest]
fn enriched_yaml_round_trips(mut resources: ResourceGraph) {
    enrich(&mut resources, &ConfigOverrides::new());

    let written = to_yaml(&resources);
    assert!(written.contains("sidecar.istio.io/status:"));
    assert_eq!(yaml::read_graph(written.as_bytes()).unwrap(), resources);
}

#[rstest]
#[case("yes")]
#[case("no")]
fn documents_without_typed_kind_pass_through(#[case] enabled: &str) {
    let fragment = indoc! {"
        data:
          LOG_LEVEL: info
    "};
    let mut graph = yaml::read_graph(format!("{fragment}---\n{DAEMON_SET}").as_bytes()).unwrap();

    enrich(&mut graph, &ConfigOverrides::from_iter([("enabled", enabled)]));

    assert!(matches!(graph.nodes()[0], ResourceNode::Unstructured(_)));
    assert!(to_yaml(&graph).starts_with(&format!("---\n{fragment}---\n")));
}
