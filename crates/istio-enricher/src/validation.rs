// This is adapted from Kubernetes.
// See apimachinery/pkg/util/validation/validation.go in the Kubernetes source

use std::sync::LazyLock;

use regex::Regex;
use snafu::{Snafu, ensure};

/// This is a label's max length in DNS (RFC 1123)
const RFC_1123_LABEL_MAX_LENGTH: usize = 63;
const RFC_1123_LABEL_FMT: &str = "[a-z0-9]([-a-z0-9]*[a-z0-9])?";
const RFC_1123_LABEL_ERROR_MSG: &str = "a lowercase RFC 1123 label must consist of lower case alphanumeric characters or '-', and must start and end with an alphanumeric character";

static RFC_1123_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{RFC_1123_LABEL_FMT}$")).expect("failed to compile RFC 1123 label regex")
});

type Result<T = (), E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("input is {length} bytes long but must be no more than {max_length}"))]
    TooLong { length: usize, max_length: usize },

    #[snafu(display("{msg} (regex used for validation is {regex:?})"))]
    InvalidFormat {
        msg: &'static str,
        regex: &'static str,
    },
}

/// Tests for a string that conforms to the definition of a lowercase label in DNS (RFC 1123),
/// which Kubernetes requires for container and volume names.
pub fn is_rfc_1123_label(value: &str) -> Result {
    ensure!(
        value.len() <= RFC_1123_LABEL_MAX_LENGTH,
        TooLongSnafu {
            length: value.len(),
            max_length: RFC_1123_LABEL_MAX_LENGTH,
        }
    );
    ensure!(
        RFC_1123_LABEL_REGEX.is_match(value),
        InvalidFormatSnafu {
            msg: RFC_1123_LABEL_ERROR_MSG,
            regex: RFC_1123_LABEL_FMT,
        }
    );
    Ok(())
}
