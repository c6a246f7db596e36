//! Environment-sourced settings resolution.
//!
//! Every adapter in this crate is configured from environment variables. This
//! module holds the pieces shared by the cache and broker settings:
//!
//! - [`EnvSource`]: an immutable snapshot of variables, fed to the `config`
//!   crate as an [`Environment`] layer under a prefix
//! - [`FieldReader`]: typed lookup over the built [`Config`] that *collects*
//!   every missing or malformed field instead of stopping at the first, then
//!   merges the `validator` rules of the finished settings struct
//! - [`FieldReport`]: the violated field names of a [`ValidationErrors`]
//!
//! # Example
//!
//! ```
//! use connector_kit::settings::{EnvSource, FieldReader, FieldReport};
//! use config::Config;
//! use validator::Validate;
//!
//! #[derive(Debug, Validate)]
//! struct App {
//!     host: String,
//!     #[validate(range(min = 1))]
//!     port: u16,
//! }
//!
//! let source = EnvSource::from_pairs([("APP_PORT", "0")]);
//! let config = Config::builder()
//!     .add_source(source.environment("APP"))
//!     .build()
//!     .unwrap();
//!
//! let mut reader = FieldReader::new(config, "APP");
//! let app = App {
//!     host: reader.required("host"),
//!     port: reader.required("port"),
//! };
//!
//! let errors = reader.finish(app).unwrap_err();
//! assert_eq!(errors.fields(), vec!["host", "port"]);
//! ```
//!
//! Values that are empty or whitespace-only count as absent.

use config::{Config, ConfigError, Environment};
use serde::de::DeserializeOwned;
use std::collections::hash_map::Entry;
use std::collections::BTreeMap;
use validator::{Validate, ValidationError, ValidationErrorsKind};

pub use validator::ValidationErrors;

/// Key under which struct-level rules are stored in [`ValidationErrors`].
const SCHEMA_KEY: &str = "__all__";

/// Parameter naming the field a struct-level rule is reported against.
pub const FIELD_PARAM: &str = "field";

/// Immutable snapshot of environment variables.
#[derive(Clone, Debug, Default)]
pub struct EnvSource {
    vars: BTreeMap<String, String>,
}

impl EnvSource {
    /// Snapshot the current process environment.
    ///
    /// Variables whose name or value is not valid unicode are skipped.
    pub fn from_env() -> Self {
        EnvSource {
            vars: std::env::vars_os()
                .filter_map(|(name, value)| {
                    Some((name.into_string().ok()?, value.into_string().ok()?))
                })
                .collect(),
        }
    }

    /// Build a source from literal name/value pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        EnvSource {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Return a copy with one variable added or replaced.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(name.into(), value.into());
        self
    }

    /// Look up a variable. Blank values are reported as absent.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    /// `config` layer reading `{PREFIX}_{FIELD}` variables from this snapshot.
    ///
    /// Values are trimmed and blank ones dropped, so an unset and an empty
    /// variable resolve the same way.
    pub fn environment(&self, prefix: &str) -> Environment {
        let vars = self
            .vars
            .keys()
            .filter_map(|name| Some((name.clone(), self.get(name)?.to_string())))
            .collect::<config::Map<String, String>>();

        Environment::with_prefix(prefix).source(Some(vars))
    }
}

/// Build a struct-level rule violation reported against `field`.
///
/// Used by `#[validate(schema(...))]` functions so the violation still
/// names the field it belongs to.
pub fn field_violation(code: &'static str, field: &'static str, message: String) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(message.into());
    error.add_param(FIELD_PARAM.into(), &field);
    error
}

/// Field names carried by a [`ValidationErrors`].
pub trait FieldReport {
    /// Every violated field, sorted and without duplicates.
    ///
    /// Struct-level rule violations are listed under the field named by
    /// their [`FIELD_PARAM`].
    fn fields(&self) -> Vec<String>;

    /// Whether a given field is among the failures.
    fn contains_field(&self, field: &str) -> bool {
        self.fields().iter().any(|f| f == field)
    }
}

impl FieldReport for ValidationErrors {
    fn fields(&self) -> Vec<String> {
        let mut fields = Vec::new();
        for (field, errors) in self.field_errors() {
            if field == SCHEMA_KEY {
                fields.extend(errors.iter().filter_map(reported_field));
            } else {
                fields.push(field.to_string());
            }
        }
        fields.sort();
        fields.dedup();
        fields
    }
}

fn reported_field(error: &ValidationError) -> Option<String> {
    error
        .params
        .get(FIELD_PARAM)
        .and_then(|value| value.as_str())
        .map(str::to_string)
}

/// Typed field lookup that accumulates failures.
///
/// Each accessor records an error and returns a placeholder when the field
/// is missing or malformed; [`FieldReader::finish`] then validates the
/// assembled settings and reports every failure at once.
pub struct FieldReader {
    config: Config,
    prefix: &'static str,
    rejected: Vec<(&'static str, ValidationError)>,
}

impl FieldReader {
    pub fn new(config: Config, prefix: &'static str) -> Self {
        FieldReader {
            config,
            prefix,
            rejected: Vec::new(),
        }
    }

    /// Environment variable a field is read from, e.g. `CACHE_PORT`.
    pub fn variable(&self, field: &str) -> String {
        format!("{}_{}", self.prefix, field.to_ascii_uppercase())
    }

    /// Resolve a field that must be present, either in the environment or as
    /// a builder default.
    pub fn required<T>(&mut self, field: &'static str) -> T
    where
        T: DeserializeOwned + Default,
    {
        match self.optional(field) {
            Some(value) => value,
            None => {
                self.missing(field);
                T::default()
            }
        }
    }

    /// Resolve a field that may legitimately be absent.
    pub fn optional<T>(&mut self, field: &'static str) -> Option<T>
    where
        T: DeserializeOwned,
    {
        match self.config.get::<T>(field) {
            Ok(value) => Some(value),
            Err(ConfigError::NotFound(_)) => None,
            Err(e) => {
                let message = format!("{} is invalid: {}", self.variable(field), e);
                self.reject(field, "invalid", message);
                None
            }
        }
    }

    /// Resolve a required field through a string parser, for values the
    /// `config` coercions do not cover (enums, delimited lists).
    pub fn required_with<T, P>(&mut self, field: &'static str, parse: P) -> T
    where
        T: Default,
        P: FnOnce(&str) -> std::result::Result<T, String>,
    {
        match self.optional_with(field, parse) {
            Some(value) => value,
            None => {
                self.missing(field);
                T::default()
            }
        }
    }

    /// Optional counterpart of [`required_with`](Self::required_with).
    pub fn optional_with<T, P>(&mut self, field: &'static str, parse: P) -> Option<T>
    where
        P: FnOnce(&str) -> std::result::Result<T, String>,
    {
        let raw: String = self.optional(field)?;
        match parse(&raw) {
            Ok(value) => Some(value),
            Err(reason) => {
                let message = format!("{} is invalid: {}", self.variable(field), reason);
                self.reject(field, "invalid", message);
                None
            }
        }
    }

    /// Record a failure for `field`. Only the first failure per field is kept.
    pub fn reject(&mut self, field: &'static str, code: &'static str, message: String) {
        if self.has_error(field) {
            return;
        }
        let mut error = ValidationError::new(code);
        error.message = Some(message.into());
        self.rejected.push((field, error));
    }

    /// Whether `field` was missing or malformed.
    pub fn has_error(&self, field: &str) -> bool {
        self.rejected.iter().any(|(rejected, _)| *rejected == field)
    }

    fn missing(&mut self, field: &'static str) {
        let message = format!("{} is required", self.variable(field));
        self.reject(field, "required", message);
    }

    /// Validate the assembled settings and report every failure.
    ///
    /// Fields that were missing or malformed hold placeholders, so rule
    /// violations against those fields are dropped in favour of the lookup
    /// failure.
    ///
    /// # Errors
    /// Returns the lookup failures merged with the `validator` rule
    /// violations when at least one is present.
    pub fn finish<S: Validate>(self, settings: S) -> std::result::Result<S, ValidationErrors> {
        let mut report = ValidationErrors::new();
        if let Err(found) = settings.validate() {
            flatten_into(&mut report, &found);
        }

        let rejected = self.rejected;
        let is_rejected = |field: &str| rejected.iter().any(|(name, _)| *name == field);

        let errors = report.errors_mut();
        errors.retain(|field, _| !is_rejected(field.as_ref()));
        let schema_emptied = match errors.get_mut(SCHEMA_KEY) {
            Some(ValidationErrorsKind::Field(schema)) => {
                schema.retain(|error| {
                    reported_field(error).map_or(true, |field| !is_rejected(&field))
                });
                schema.is_empty()
            }
            _ => false,
        };
        if schema_emptied {
            errors.remove(SCHEMA_KEY);
        }

        for (field, error) in rejected {
            report.add(field, error);
        }

        if report.is_empty() {
            Ok(settings)
        } else {
            Err(report)
        }
    }
}

/// Lift nested struct errors to the top level.
///
/// Shared field groups are `#[serde(flatten)]`ed into the settings that
/// hold them, so their fields are reported under their own names.
fn flatten_into(report: &mut ValidationErrors, found: &ValidationErrors) {
    for (field, kind) in found.errors() {
        match kind {
            ValidationErrorsKind::Struct(nested) => flatten_into(report, nested),
            ValidationErrorsKind::Field(list) => match report.errors_mut().entry(field.clone()) {
                Entry::Occupied(mut entry) => {
                    if let ValidationErrorsKind::Field(existing) = entry.get_mut() {
                        existing.extend(list.iter().cloned());
                    }
                }
                Entry::Vacant(entry) => {
                    entry.insert(ValidationErrorsKind::Field(list.clone()));
                }
            },
            other => {
                report.errors_mut().insert(field.clone(), other.clone());
            }
        }
    }
}
