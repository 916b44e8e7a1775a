//! Mapping options shared by the converter and the mappers.

use std::sync::OnceLock;

use regex_lite::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::mapping::IdKind;

/// The default document key the type alias is written under.
pub const DEFAULT_TYPE_KEY: &str = "_class";

/// Options controlling how documents are mapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MappingOptions {
    /// Key the entity type alias is written under; `None` disables type hints.
    pub type_key: Option<String>,

    /// Treat every `$`-prefixed key ending in `or` as a combinator.
    ///
    /// Off by default: only `$and`, `$or` and `$nor` combine filters.
    pub legacy_combinator_matching: bool,

    /// The id kind values are coerced to when no entity is known.
    pub default_id_kind: IdKind,
}

impl Default for MappingOptions {
    fn default() -> Self {
        Self {
            type_key: Some(DEFAULT_TYPE_KEY.to_string()),
            legacy_combinator_matching: false,
            default_id_kind: IdKind::ObjectId,
        }
    }
}

impl MappingOptions {
    /// Disable writing type aliases.
    pub fn without_type_key(mut self) -> Self {
        self.type_key = None;
        self
    }

    /// Write type aliases under a different key.
    pub fn type_key(mut self, key: impl Into<String>) -> Self {
        self.type_key = Some(key.into());
        self
    }

    /// Enable the legacy `$…or` combinator heuristic.
    pub fn legacy_combinator_matching(mut self, enabled: bool) -> Self {
        self.legacy_combinator_matching = enabled;
        self
    }

    /// Set the id kind used when no entity is known.
    pub fn default_id_kind(mut self, kind: IdKind) -> Self {
        self.default_id_kind = kind;
        self
    }
}

/// Replace `${VAR}` references with environment values.
///
/// Unset variables are left as written.
pub fn expand_env_vars(content: &str) -> String {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").ok()) else {
        return content.to_string();
    };

    re.replace_all(content, |caps: &Captures<'_>| {
        std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
    })
    .into_owned()
}
