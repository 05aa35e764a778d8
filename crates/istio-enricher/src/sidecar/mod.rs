//! Assembles the Istio sidecar: the proxy container, its init containers, volumes and pod
//! annotations.
//!
//! Assembly only reads configuration. The result is a [`SidecarArtifacts`] value, which is merged
//! into pod templates and pod specs in a separate step (see [`SidecarArtifacts::annotate`] and
//! [`SidecarArtifacts::inject`]). A failed assembly therefore never leaves a half-enriched graph
//! behind.
use std::collections::BTreeMap;

use const_format::concatcp;
use k8s_openapi::{
    api::core::v1::{
        Container, EnvVar, PodSpec, PodTemplateSpec, ResourceRequirements, SecretVolumeSource,
        Volume, VolumeMount,
    },
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use snafu::{ResultExt, Snafu};
use strum::Display;
use tracing::{debug, warn};

use crate::{
    builder::pod::{
        container::{self, ContainerBuilder, FieldPathEnvVar},
        security::SecurityContextBuilder,
        volume::{VolumeBuilder, VolumeMountBuilder},
    },
    config::{self, ConfigResolver, Key},
};

pub mod legacy;

pub const STATUS_ANNOTATION: &str = "sidecar.istio.io/status";
pub const STATUS_ANNOTATION_VALUE: &str =
    "injected-version-releng@0d29a2c0d15f-0.2.12-998e0e00d375688bcb2af042fc81a60ce5264009";
pub const INIT_CONTAINERS_ANNOTATION: &str = "pod.beta.kubernetes.io/init-containers";

/// The user id both the proxy and the traffic redirection run as.
pub const PROXY_USER_ID: i64 = 1337;

// FIXME: This should be the primary port of the workload instead of a fixed value.
pub const PASSTHROUGH_PORT: &str = "8080";
pub const REDIRECT_PORT: &str = "15001";

pub const ENVOY_VOLUME_NAME: &str = "istio-envoy";
pub const ENVOY_MOUNT_PATH: &str = "/etc/istio/proxy";
pub const CERTS_VOLUME_NAME: &str = "istio-certs";
pub const CERTS_MOUNT_PATH: &str = "/etc/certs";
pub const CERTS_SECRET_NAME: &str = "istio.default";
const CERTS_DEFAULT_MODE: i32 = 0o644;

pub const REDIRECT_INIT_CONTAINER_NAME: &str = "istio-init";
pub const CORE_DUMP_INIT_CONTAINER_NAME: &str = "enable-core-dump";
const INIT_IMAGE_PULL_POLICY: &str = "IfNotPresent";
const CORE_DUMP_SCRIPT: &str = concatcp!(
    "sysctl -w kernel.core_pattern=",
    ENVOY_MOUNT_PATH,
    "/core.%e.%p.%t && ulimit -c unlimited"
);

const TERMINATION_MESSAGE_PATH: &str = "/dev/termination-log";
const TERMINATION_MESSAGE_POLICY: &str = "File";

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("failed to resolve sidecar configuration"))]
    ResolveConfig { source: config::Error },

    #[snafu(display("failed to build the {role} container"))]
    BuildContainer {
        source: container::Error,
        role: &'static str,
    },

    #[snafu(display("failed to encode init containers for the {INIT_CONTAINERS_ANNOTATION:?} annotation"))]
    EncodeInitContainers { source: legacy::EncodeError },
}

/// How init containers reach the pod.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
pub enum InitContainerEncoding {
    /// Appended to `spec.initContainers` of the pod.
    #[default]
    Structural,

    /// Encoded as JSON into the [`INIT_CONTAINERS_ANNOTATION`] annotation of the pod template, for
    /// tooling which predates the `initContainers` field.
    Annotation,

    /// No init containers at all.
    Disabled,
}

/// Where the privilege to redirect traffic lives in the `istio-init` container.
#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
pub enum RedirectPrivilege {
    /// The container gets `NET_ADMIN`, but is not privileged.
    #[default]
    CapabilityOnly,

    /// The container gets `NET_ADMIN` and is privileged on top.
    Privileged,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct InjectionPolicy {
    pub init_containers: InitContainerEncoding,
    pub redirect_privilege: RedirectPrivilege,
}

impl InjectionPolicy {
    pub const LEGACY: Self = Self {
        init_containers: InitContainerEncoding::Annotation,
        redirect_privilege: RedirectPrivilege::Privileged,
    };
    pub const MODERN: Self = Self {
        init_containers: InitContainerEncoding::Structural,
        redirect_privilege: RedirectPrivilege::CapabilityOnly,
    };
}

/// Everything the sidecar consists of, ready to be merged into pods.
#[derive(Clone, Debug, PartialEq)]
pub struct SidecarArtifacts {
    pub sidecar: Container,

    /// In [`InitContainerEncoding::Annotation`] mode these are only carried by
    /// [`Self::annotations`], they are not added to pod specs.
    pub init_containers: Vec<Container>,
    pub volumes: Vec<Volume>,
    pub annotations: BTreeMap<String, String>,
    pub encoding: InitContainerEncoding,
}

impl SidecarArtifacts {
    /// The environment of the sidecar container.
    pub fn env(&self) -> &[EnvVar] {
        self.sidecar.env.as_deref().unwrap_or_default()
    }

    /// Sets the sidecar annotations on the template metadata. Other annotations are kept.
    pub fn annotate(&self, template: &mut PodTemplateSpec) {
        template
            .metadata
            .get_or_insert_with(ObjectMeta::default)
            .annotations
            .get_or_insert_with(BTreeMap::new)
            .extend(self.annotations.clone());
    }

    /// Appends the sidecar, its volumes and (if encoded structurally) its init containers.
    ///
    /// Nothing is checked for existing entries, so injecting twice yields two sidecars.
    pub fn inject(&self, pod_spec: &mut PodSpec) {
        if pod_spec
            .containers
            .iter()
            .any(|container| container.name == self.sidecar.name)
        {
            warn!(
                container.name = %self.sidecar.name,
                "pod already contains a container named like the sidecar, adding it anyway"
            );
        }

        pod_spec.containers.push(self.sidecar.clone());
        pod_spec
            .volumes
            .get_or_insert_with(Vec::new)
            .extend(self.volumes.iter().cloned());

        if self.encoding == InitContainerEncoding::Structural && !self.init_containers.is_empty() {
            pod_spec
                .init_containers
                .get_or_insert_with(Vec::new)
                .extend(self.init_containers.iter().cloned());
        }
    }
}

/// Builds [`SidecarArtifacts`] from the resolved configuration.
#[derive(Clone, Debug)]
pub struct SidecarAssembler<'a> {
    config: ConfigResolver<'a>,
    policy: InjectionPolicy,
}

impl<'a> SidecarAssembler<'a> {
    pub fn new(config: ConfigResolver<'a>, policy: InjectionPolicy) -> Self {
        Self { config, policy }
    }

    /// `workload_name` is substituted into the proxy arguments.
    pub fn assemble(&self, workload_name: &str) -> Result<SidecarArtifacts> {
        let sidecar = self.sidecar_container(workload_name)?;
        let init_containers = match self.policy.init_containers {
            InitContainerEncoding::Structural | InitContainerEncoding::Annotation => {
                vec![
                    self.redirect_init_container()?,
                    self.core_dump_init_container()?,
                ]
            }
            InitContainerEncoding::Disabled => Vec::new(),
        };

        let mut annotations = BTreeMap::from([(
            STATUS_ANNOTATION.to_string(),
            STATUS_ANNOTATION_VALUE.to_string(),
        )]);
        if self.policy.init_containers == InitContainerEncoding::Annotation {
            let json = legacy::encode_init_containers(&init_containers)
                .context(EncodeInitContainersSnafu)?;
            debug!(%json, "encoded init containers");
            annotations.insert(INIT_CONTAINERS_ANNOTATION.to_string(), json);
        }

        Ok(SidecarArtifacts {
            sidecar,
            init_containers,
            volumes: Self::volumes(),
            annotations,
            encoding: self.policy.init_containers,
        })
    }

    /// The resolved `proxyArgs`, followed by the passthrough port.
    pub fn sidecar_args(&self, workload_name: &str) -> Result<Vec<String>> {
        let mut args = self
            .config
            .resolve_list(Key::ProxyArgs, ',', workload_name)
            .context(ResolveConfigSnafu)?;
        args.extend(["--passthrough".to_string(), PASSTHROUGH_PORT.to_string()]);
        Ok(args)
    }

    pub fn sidecar_container(&self, workload_name: &str) -> Result<Container> {
        let name = self.resolve(Key::ProxyName)?;

        Ok(ContainerBuilder::new(name)
            .context(BuildContainerSnafu { role: "sidecar" })?
            .image(self.resolve(Key::ProxyImage)?)
            .image_pull_policy(self.resolve(Key::ImagePullPolicy)?)
            .args(self.sidecar_args(workload_name)?)
            .add_env_var_from_field_path("POD_NAME", &FieldPathEnvVar::Name)
            .add_env_var_from_field_path("POD_NAMESPACE", &FieldPathEnvVar::Namespace)
            .add_env_var_from_field_path("POD_IP", &FieldPathEnvVar::PodIp)
            .add_volume_mounts(Self::volume_mounts())
            .resources(ResourceRequirements::default())
            .security_context(
                SecurityContextBuilder::new()
                    .run_as_user(PROXY_USER_ID)
                    .privileged(true)
                    .read_only_root_filesystem(false)
                    .build(),
            )
            .termination_message(TERMINATION_MESSAGE_PATH, TERMINATION_MESSAGE_POLICY)
            .build())
    }

    /// Redirects all pod traffic to the proxy.
    pub fn redirect_init_container(&self) -> Result<Container> {
        let mut security_context = SecurityContextBuilder::new();
        security_context.add_capability("NET_ADMIN");
        match self.policy.redirect_privilege {
            RedirectPrivilege::CapabilityOnly => security_context.privileged(false),
            RedirectPrivilege::Privileged => security_context.privileged(true),
        };

        Ok(ContainerBuilder::new(REDIRECT_INIT_CONTAINER_NAME)
            .context(BuildContainerSnafu {
                role: "traffic redirect init",
            })?
            .image(self.resolve(Key::InitImage)?)
            .image_pull_policy(INIT_IMAGE_PULL_POLICY)
            .args(
                ["-p", REDIRECT_PORT, "-u", &PROXY_USER_ID.to_string()]
                    .map(ToOwned::to_owned)
                    .to_vec(),
            )
            .resources(ResourceRequirements::default())
            .security_context(security_context.build())
            .termination_message(TERMINATION_MESSAGE_PATH, TERMINATION_MESSAGE_POLICY)
            .build())
    }

    /// Lets the proxy write core dumps into its scratch volume.
    pub fn core_dump_init_container(&self) -> Result<Container> {
        Ok(ContainerBuilder::new(CORE_DUMP_INIT_CONTAINER_NAME)
            .context(BuildContainerSnafu {
                role: "enable core dump init",
            })?
            .image(self.resolve(Key::CoreDumpImage)?)
            .image_pull_policy(INIT_IMAGE_PULL_POLICY)
            .command(vec!["/bin/sh".to_string()])
            .args(vec!["-c".to_string(), CORE_DUMP_SCRIPT.to_string()])
            .resources(ResourceRequirements::default())
            .security_context(SecurityContextBuilder::new().privileged(true).build())
            .termination_message(TERMINATION_MESSAGE_PATH, TERMINATION_MESSAGE_POLICY)
            .build())
    }

    pub fn volumes() -> Vec<Volume> {
        vec![
            VolumeBuilder::new(ENVOY_VOLUME_NAME)
                .with_empty_dir(Some("Memory"), None)
                .build(),
            VolumeBuilder::new(CERTS_VOLUME_NAME)
                .secret(SecretVolumeSource {
                    secret_name: Some(CERTS_SECRET_NAME.to_string()),
                    default_mode: Some(CERTS_DEFAULT_MODE),
                    optional: Some(true),
                    ..SecretVolumeSource::default()
                })
                .build(),
        ]
    }

    pub fn volume_mounts() -> Vec<VolumeMount> {
        vec![
            VolumeMountBuilder::new(ENVOY_VOLUME_NAME, ENVOY_MOUNT_PATH).build(),
            VolumeMountBuilder::new(CERTS_VOLUME_NAME, CERTS_MOUNT_PATH)
                .read_only(true)
                .build(),
        ]
    }

    fn resolve(&self, key: Key) -> Result<&'a str> {
        self.config.resolve(key).context(ResolveConfigSnafu)
    }
}
