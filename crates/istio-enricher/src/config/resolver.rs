use std::{collections::BTreeMap, num::ParseIntError, str::FromStr};

use snafu::{OptionExt, ResultExt, Snafu};
use tracing::debug;

use crate::config::Key;

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, PartialEq, Eq, Snafu)]
pub enum Error {
    #[snafu(display("unknown setting {name:?}"))]
    UnknownSetting { name: String },

    #[snafu(display("setting {key:?} has neither an override nor a default value"))]
    MissingValue { key: Key },

    #[snafu(display("failed to parse value {value:?} of setting {key:?} as integer"))]
    ParseInteger {
        source: ParseIntError,
        key: Key,
        value: String,
    },
}

/// Caller-supplied setting values, keyed by setting name.
///
/// Names which don't correspond to a [`Key`] are kept, but ignored during resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfigOverrides(BTreeMap<String, String>);

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, key: Key) -> Option<&str> {
        self.0.get(key.name()).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Names of overrides which no setting will ever pick up.
    pub fn unknown_names(&self) -> impl Iterator<Item = &str> {
        self.0
            .keys()
            .map(String::as_str)
            .filter(|name| Key::from_str(name).is_err())
    }
}

impl From<BTreeMap<String, String>> for ConfigOverrides {
    fn from(value: BTreeMap<String, String>) -> Self {
        Self(value)
    }
}

impl<K, V> FromIterator<(K, V)> for ConfigOverrides
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(name, value)| (name.into(), value.into()))
                .collect(),
        )
    }
}

/// Resolves settings: an override wins, otherwise the built-in default of the [`Setting`]
/// applies.
///
/// [`Setting`]: crate::config::Setting
#[derive(Clone, Debug)]
pub struct ConfigResolver<'a> {
    overrides: &'a ConfigOverrides,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(overrides: &'a ConfigOverrides) -> Self {
        for name in overrides.unknown_names() {
            debug!(name, "ignoring override for unknown setting");
        }

        Self { overrides }
    }

    fn lookup(&self, key: Key) -> Option<&'a str> {
        self.overrides.get(key).or(key.setting().default)
    }

    pub fn resolve(&self, key: Key) -> Result<&'a str> {
        self.lookup(key).context(MissingValueSnafu { key })
    }

    /// Like [`Self::resolve`], but uses `fallback` for settings without an override and without a
    /// built-in default.
    pub fn resolve_or<'b>(&self, key: Key, fallback: &'b str) -> &'b str
    where
        'a: 'b,
    {
        self.lookup(key).unwrap_or(fallback)
    }

    /// Looks up a setting by its name. Unknown names are an error, they never fall back to
    /// anything.
    pub fn resolve_named(&self, name: &str) -> Result<&'a str> {
        let key = Key::from_str(name)
            .ok()
            .context(UnknownSettingSnafu { name })?;
        self.resolve(key)
    }

    /// Resolves `key` and splits it at `separator`.
    ///
    /// Elements are trimmed and empty elements are dropped. If the setting declares a
    /// [`Derivation`](crate::config::Derivation), it is applied to every element with `context`.
    pub fn resolve_list(&self, key: Key, separator: char, context: &str) -> Result<Vec<String>> {
        let value = self.resolve(key)?;
        let derivation = key.setting().derivation;

        Ok(value
            .split(separator)
            .map(str::trim)
            .filter(|element| !element.is_empty())
            .map(|element| match &derivation {
                Some(derivation) => derivation.apply(element, context),
                None => element,
            })
            .map(ToOwned::to_owned)
            .collect())
    }

    pub fn resolve_int(&self, key: Key) -> Result<i32> {
        let value = self.resolve(key)?;
        value
            .trim()
            .parse()
            .context(ParseIntegerSnafu { key, value })
    }

    /// Only `yes` (in any case) turns the enricher on.
    pub fn enabled(&self) -> Result<bool> {
        Ok(self.resolve(Key::Enabled)?.eq_ignore_ascii_case("yes"))
    }
}
