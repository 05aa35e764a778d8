use std::{
    fs::File,
    io::{BufReader, Read},
    path::PathBuf,
};

use clap::{Parser, ValueEnum};
use istio_enricher::{
    config::ConfigOverrides,
    enricher::{self, IstioEnricher},
    logging,
    sidecar::InjectionPolicy,
    yaml,
};
use snafu::{ResultExt, Snafu};

const APP_NAME: &str = "istio-enricher";

#[derive(Debug, Snafu)]
enum Error {
    #[snafu(display("failed to initialize logging"))]
    InitializeLogging { source: logging::Error },

    #[snafu(display("failed to open input file {path:?}"))]
    OpenInput {
        source: std::io::Error,
        path: PathBuf,
    },

    #[snafu(display("failed to read resources"))]
    ReadResources { source: yaml::Error },

    #[snafu(display("failed to enrich resources"))]
    Enrich { source: enricher::Error },

    #[snafu(display("failed to write enriched resources"))]
    WriteResources { source: yaml::Error },
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum Policy {
    /// Init containers in the pod spec, traffic redirection with `NET_ADMIN` only.
    #[default]
    Modern,

    /// Init containers in the `pod.beta.kubernetes.io/init-containers` annotation, privileged
    /// traffic redirection.
    Legacy,
}

impl From<Policy> for InjectionPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Modern => Self::MODERN,
            Policy::Legacy => Self::LEGACY,
        }
    }
}

/// Injects the Istio sidecar into the workloads of a multi-document YAML stream.
///
/// The enriched resources are written to stdout, logs go to stderr.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Opts {
    /// File to read resources from, stdin if absent.
    #[arg(long, short)]
    file: Option<PathBuf>,

    /// Name of the workload, substituted into the proxy arguments unless `name` is set.
    #[arg(long, env = "ISTIO_ENRICHER_WORKLOAD_NAME")]
    workload_name: String,

    /// Overrides a setting, e.g. `--set proxyName=envoy`. May be repeated.
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    overrides: Vec<(String, String)>,

    #[arg(long, value_enum, default_value_t, env = "ISTIO_ENRICHER_POLICY")]
    policy: Policy,
}

fn parse_key_val(input: &str) -> Result<(String, String), String> {
    let (key, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {input:?}"))?;

    if key.trim().is_empty() {
        return Err(format!("missing setting name in {input:?}"));
    }

    Ok((key.trim().to_owned(), value.to_owned()))
}

#[snafu::report]
fn main() -> Result<(), Error> {
    let opts = Opts::parse();
    logging::initialize_logging("ISTIO_ENRICHER_LOG", APP_NAME).context(InitializeLoggingSnafu)?;

    let input: Box<dyn Read> = match &opts.file {
        Some(path) => Box::new(BufReader::new(
            File::open(path).context(OpenInputSnafu { path })?,
        )),
        None => Box::new(std::io::stdin().lock()),
    };
    let mut graph = yaml::read_graph(input).context(ReadResourcesSnafu)?;

    let overrides = ConfigOverrides::from_iter(opts.overrides);
    IstioEnricher::new(opts.policy.into())
        .enrich(&mut graph, &overrides, &opts.workload_name)
        .context(EnrichSnafu)?;

    yaml::write_graph(&graph, std::io::stdout().lock()).context(WriteResourcesSnafu)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("proxyName=envoy", ("proxyName", "envoy"))]
    #[case("proxyArgs=a,b=c", ("proxyArgs", "a,b=c"))]
    #[case(" enabled =no", ("enabled", "no"))]
    #[case("proxyImage=", ("proxyImage", ""))]
    fn parse_valid_overrides(#[case] input: &str, #[case] expected: (&str, &str)) {
        let (key, value) = parse_key_val(input).unwrap();
        assert_eq!((key.as_str(), value.as_str()), expected);
    }

    #[rstest]
    #[case("proxyName")]
    #[case("=envoy")]
    fn parse_invalid_overrides(#[case] input: &str) {
        assert!(parse_key_val(input).is_err());
    }

    #[test]
    fn opts_parse() {
        let opts = Opts::try_parse_from([
            "istio-enricher",
            "--workload-name",
            "orders-svc",
            "--set",
            "proxyName=envoy",
            "--set",
            "enabled=no",
            "--policy",
            "legacy",
        ])
        .unwrap();

        assert_eq!(opts.workload_name, "orders-svc");
        assert_eq!(opts.policy, Policy::Legacy);
        assert_eq!(
            opts.overrides,
            vec![
                ("proxyName".to_owned(), "envoy".to_owned()),
                ("enabled".to_owned(), "no".to_owned())
            ]
        );
        assert_eq!(opts.file, None);
    }

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Opts::command().debug_assert();
    }
}
