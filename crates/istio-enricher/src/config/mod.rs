//! Settings understood by the enricher.
//!
//! The full set of settings is fixed at compile time and lives in [`SETTINGS`], a plain table
//! mapping each [`Key`] to its built-in default and an optional [`Derivation`]. Values are looked
//! up through a [`ConfigResolver`], which layers caller-supplied [`ConfigOverrides`] on top of the
//! table.
//!
//! ```
//! # use istio_enricher::config::{ConfigOverrides, ConfigResolver, Key};
//! let overrides = ConfigOverrides::from_iter([("proxyName", "envoy")]);
//! let config = ConfigResolver::new(&overrides);
//!
//! assert_eq!(config.resolve(Key::ProxyName).unwrap(), "envoy");
//! assert_eq!(config.resolve(Key::ImagePullPolicy).unwrap(), "IfNotPresent");
//! ```
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

mod resolver;

pub use resolver::*;

/// List element in `proxyArgs` which is replaced by the resolved workload name.
pub const WORKLOAD_NAME_PLACEHOLDER: &str = "app-cluster-name";

const DEFAULT_PROXY_ARGS: &str = concat!(
    "proxy,sidecar,-v,2,--configPath,/etc/istio/proxy,--binaryPath,/usr/local/bin/envoy,",
    "--serviceCluster,app-cluster-name,--drainDuration,45s,--parentShutdownDuration,1m0s,",
    "--discoveryAddress,istio-pilot.istio-system:8080,--discoveryRefreshDelay,1s,",
    "--zipkinAddress,zipkin.istio-system:9411,--connectTimeout,10s,",
    "--statsdUdpAddress,istio-mixer.istio-system:9125,--proxyAdminPort,15000"
);

/// The name of a setting. The string form (see [`Key::name`]) is the name used in
/// [`ConfigOverrides`].
///
/// The discriminant doubles as the index into [`SETTINGS`].
#[derive(
    Clone,
    Copy,
    Debug,
    Display,
    EnumIter,
    EnumString,
    Eq,
    Hash,
    IntoStaticStr,
    Ord,
    PartialEq,
    PartialOrd,
)]
#[strum(serialize_all = "camelCase")]
pub enum Key {
    /// Overrides the workload name used for `proxyArgs` substitution.
    Name,
    Enabled,
    ProxyName,
    ProxyImage,
    InitImage,
    CoreDumpImage,
    ProxyArgs,
    ImagePullPolicy,
    ReplicaCount,
}

impl Key {
    pub fn name(self) -> &'static str {
        self.into()
    }

    pub fn setting(self) -> &'static Setting {
        &SETTINGS[self as usize]
    }
}

/// A declared setting: its key, built-in default, and how list elements are derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Setting {
    pub key: Key,

    /// `None` means the caller has to supply a fallback, see [`ConfigResolver::resolve_or`].
    pub default: Option<&'static str>,
    pub derivation: Option<Derivation>,
}

/// A rule applied per element when a setting is resolved as a list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Derivation {
    /// Elements equal to `placeholder` (ignoring ASCII case) are replaced by the contextual value,
    /// usually the workload name.
    SubstituteContext { placeholder: &'static str },
}

impl Derivation {
    pub fn apply<'a>(&self, element: &'a str, context: &'a str) -> &'a str {
        match self {
            Self::SubstituteContext { placeholder } if element.eq_ignore_ascii_case(placeholder) => {
                context
            }
            Self::SubstituteContext { .. } => element,
        }
    }
}

/// Every setting, in [`Key`] declaration order.
pub const SETTINGS: [Setting; 9] = [
    Setting {
        key: Key::Name,
        default: None,
        derivation: None,
    },
    Setting {
        key: Key::Enabled,
        default: Some("yes"),
        derivation: None,
    },
    Setting {
        key: Key::ProxyName,
        default: Some("istio-proxy"),
        derivation: None,
    },
    Setting {
        key: Key::ProxyImage,
        default: Some("docker.io/istio/proxy_debug:0.2.12"),
        derivation: None,
    },
    Setting {
        key: Key::InitImage,
        default: Some("docker.io/istio/proxy_init:0.2.12"),
        derivation: None,
    },
    Setting {
        key: Key::CoreDumpImage,
        default: Some("alpine"),
        derivation: None,
    },
    Setting {
        key: Key::ProxyArgs,
        default: Some(DEFAULT_PROXY_ARGS),
        derivation: Some(Derivation::SubstituteContext {
            placeholder: WORKLOAD_NAME_PLACEHOLDER,
        }),
    },
    Setting {
        key: Key::ImagePullPolicy,
        default: Some("IfNotPresent"),
        derivation: None,
    },
    Setting {
        key: Key::ReplicaCount,
        default: Some("1"),
        derivation: None,
    },
];
