use regex::Regex;

/// A predicate applied to every domain during a streaming pass.
///
/// Built once per command. The regex variant is compiled up front so that
/// a bad pattern is reported before any domains are read.
#[derive(Debug, Clone)]
pub enum Filter {
    /// Keep domains containing this substring.
    Contains(String),
    /// Keep domains for which a regex search succeeds.
    Regex(Regex),
}

impl Filter {
    /// A substring filter.
    #[must_use]
    pub fn contains(needle: impl Into<String>) -> Self {
        Self::Contains(needle.into())
    }

    /// Compiles `pattern` into a regex filter.
    ///
    /// # Errors
    ///
    /// Returns [`FilterError::Regex`] if the pattern does not compile.
    pub fn regex(pattern: &str) -> Result<Self, FilterError> {
        Regex::new(pattern)
            .map(Self::Regex)
            .map_err(|source| FilterError::Regex {
                pattern: pattern.to_string(),
                source,
            })
    }

    /// Builds the filter for a command from its `--match` / `--regex` flags.
    ///
    /// Returns `None` when neither is set.
    ///
    /// # Errors
    ///
    /// Fails if both are set, or if the regex does not compile.
    pub fn from_flags(
        contains: Option<&str>,
        regex: Option<&str>,
    ) -> Result<Option<Self>, FilterError> {
        match (contains, regex) {
            (Some(_), Some(_)) => Err(FilterError::Conflicting),
            (Some(needle), None) => Ok(Some(Self::contains(needle))),
            (None, Some(pattern)) => Self::regex(pattern).map(Some),
            (None, None) => Ok(None),
        }
    }

    /// Returns `true` if `domain` passes the filter.
    #[must_use]
    pub fn matches(&self, domain: &str) -> bool {
        match self {
            Self::Contains(needle) => domain.contains(needle.as_str()),
            Self::Regex(regex) => regex.is_match(domain),
        }
    }
}

/// Errors building a [`Filter`].
#[derive(Debug, thiserror::Error)]
pub enum FilterError {
    /// The regex pattern failed to compile.
    #[error("invalid regex '{pattern}'")]
    Regex {
        /// The pattern as given.
        pattern: String,
        /// The compilation error.
        #[source]
        source: regex::Error,
    },

    /// A substring and a regex were both given.
    #[error("a substring filter and a regex filter cannot be combined")]
    Conflicting,
}
