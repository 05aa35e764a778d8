//! JSON encoding of init containers for the `pod.beta.kubernetes.io/init-containers` annotation.
//!
//! Consumers of the annotation compare it textually, so the field order differs from the one
//! [`Container`] serializes with and is pinned down by the structs below.
use k8s_openapi::api::core::v1::{Container, ResourceRequirements, SecurityContext};
use serde::Serialize;
use snafu::{ResultExt, Snafu};

#[derive(Debug, Snafu)]
#[snafu(display("failed to serialize init containers to JSON"))]
pub struct EncodeError {
    source: serde_json::Error,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LegacyContainer<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_pull_policy: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    command: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    resources: Option<&'a ResourceRequirements>,
    #[serde(skip_serializing_if = "Option::is_none")]
    termination_message_path: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    termination_message_policy: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    args: Option<&'a [String]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    security_context: Option<LegacySecurityContext<'a>>,
}

#[derive(Serialize)]
struct LegacySecurityContext<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    capabilities: Option<LegacyCapabilities<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    privileged: Option<bool>,
}

#[derive(Serialize)]
struct LegacyCapabilities<'a> {
    add: &'a [String],
}

impl<'a> From<&'a Container> for LegacyContainer<'a> {
    fn from(container: &'a Container) -> Self {
        Self {
            name: &container.name,
            image: container.image.as_deref(),
            image_pull_policy: container.image_pull_policy.as_deref(),
            command: container.command.as_deref(),
            resources: container.resources.as_ref(),
            termination_message_path: container.termination_message_path.as_deref(),
            termination_message_policy: container.termination_message_policy.as_deref(),
            args: container.args.as_deref(),
            security_context: container
                .security_context
                .as_ref()
                .map(LegacySecurityContext::from),
        }
    }
}

impl<'a> From<&'a SecurityContext> for LegacySecurityContext<'a> {
    fn from(security_context: &'a SecurityContext) -> Self {
        Self {
            capabilities: security_context
                .capabilities
                .as_ref()
                .and_then(|capabilities| capabilities.add.as_deref())
                .map(|add| LegacyCapabilities { add }),
            privileged: security_context.privileged,
        }
    }
}

/// Encodes `containers` as a compact JSON array.
pub fn encode_init_containers(containers: &[Container]) -> Result<String, EncodeError> {
    let containers: Vec<_> = containers.iter().map(LegacyContainer::from).collect();
    serde_json::to_string(&containers).context(EncodeSnafu)
}
