use std::{fmt, ops::Deref, str::FromStr};

/// The longest domain pattern accepted, in characters.
pub const MAX_DOMAIN_LEN: usize = 253;

/// The longest single label accepted, in characters.
pub const MAX_LABEL_LEN: usize = 63;

/// Returns `true` if `candidate` is a syntactically acceptable domain pattern.
///
/// Accepted forms are plain domains (`example.com`), leading wildcards
/// (`*.example.com`), internal wildcards (`svc-*.domain.com`) and
/// underscore-prefixed service records (`_service.domain.com`).
///
/// The candidate is classified as given; callers trim input lines first.
///
/// ```
/// use bountycatch::domain::is_valid;
///
/// assert!(is_valid("*.example.com"));
/// assert!(is_valid("_collab-edge.5g.dell.com"));
/// assert!(!is_valid("*abc.com"));
/// assert!(!is_valid("svc-*"));
/// ```
#[must_use]
pub fn is_valid(candidate: &str) -> bool {
    check(candidate).is_ok()
}

/// Classifies `candidate`, returning the first rule it breaks.
///
/// # Errors
///
/// Returns the [`Reason`] the candidate was rejected for.
pub fn check(candidate: &str) -> Result<(), Reason> {
    if candidate.is_empty() {
        return Err(Reason::Empty);
    }
    if candidate.len() > MAX_DOMAIN_LEN {
        return Err(Reason::TooLong(candidate.len()));
    }
    if candidate.starts_with('*') && !candidate.starts_with("*.") {
        return Err(Reason::BareWildcard);
    }
    if candidate.ends_with('*') {
        return Err(Reason::TrailingWildcard);
    }
    if candidate.contains(".-") || candidate.contains("-.") {
        return Err(Reason::HyphenNextToDot);
    }
    if candidate.starts_with('.') || candidate.ends_with('.') {
        return Err(Reason::OuterDot);
    }

    // A leading `*.` is an ordinary `*` label as far as the grammar goes.
    let mut labels: Vec<&str> = candidate.split('.').collect();
    let Some(tld) = labels.pop() else {
        return Err(Reason::Empty);
    };
    if labels.is_empty() {
        return Err(Reason::SingleLabel);
    }

    for label in labels {
        if !is_valid_label(label) {
            return Err(Reason::Label(label.to_string()));
        }
    }
    if !is_valid_tld(tld) {
        return Err(Reason::Tld(tld.to_string()));
    }

    Ok(())
}

/// Non-final labels: `[A-Za-z0-9_*]`, internal hyphens, 1-63 characters.
fn is_valid_label(label: &str) -> bool {
    let anchor = |c: char| c.is_ascii_alphanumeric() || c == '_' || c == '*';
    is_bounded(label) && label.chars().all(|c| anchor(c) || c == '-') && anchored(label, anchor)
}

/// The final label: `[A-Za-z0-9]` with internal hyphens, 1-63 characters.
fn is_valid_tld(label: &str) -> bool {
    let anchor = |c: char| c.is_ascii_alphanumeric();
    is_bounded(label) && label.chars().all(|c| anchor(c) || c == '-') && anchored(label, anchor)
}

const fn is_bounded(label: &str) -> bool {
    !label.is_empty() && label.len() <= MAX_LABEL_LEN
}

fn anchored(label: &str, anchor: impl Fn(char) -> bool) -> bool {
    label.chars().next().is_some_and(&anchor) && label.chars().last().is_some_and(&anchor)
}

/// Why a candidate was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Reason {
    /// Nothing left after trimming.
    #[error("empty")]
    Empty,

    /// Longer than [`MAX_DOMAIN_LEN`].
    #[error("{0} characters long, the limit is {max}", max = MAX_DOMAIN_LEN)]
    TooLong(usize),

    /// A leading `*` not followed by `.`.
    #[error("a leading wildcard must be followed by '.'")]
    BareWildcard,

    /// Ends with `*`.
    #[error("ends with a wildcard")]
    TrailingWildcard,

    /// Contains `.-` or `-.`.
    #[error("hyphen next to a dot")]
    HyphenNextToDot,

    /// Starts or ends with `.`.
    #[error("starts or ends with a dot")]
    OuterDot,

    /// Has no label before the top-level label.
    #[error("needs at least one label before the top-level label")]
    SingleLabel,

    /// A non-final label breaks the label grammar.
    #[error("invalid label '{0}'")]
    Label(String),

    /// The final label breaks the top-level label grammar.
    #[error("invalid top-level label '{0}'")]
    Tld(String),
}

/// A domain pattern that passed validation.
///
/// Construct one with [`Domain::parse`], which trims surrounding whitespace
/// first.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Domain(String);

impl Domain {
    /// Trims and validates `input`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidDomain`] if the trimmed input is not an acceptable
    /// domain pattern.
    pub fn parse(input: &str) -> Result<Self, InvalidDomain> {
        let trimmed = input.trim();
        check(trimmed).map_err(|reason| InvalidDomain {
            domain: trimmed.to_string(),
            reason,
        })?;
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the domain, returning the owned string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for Domain {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Domain {
    type Err = InvalidDomain;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for Domain {
    type Error = InvalidDomain;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

/// Error returned when a line is not an acceptable domain pattern.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid domain '{domain}': {reason}")]
pub struct InvalidDomain {
    domain: String,
    reason: Reason,
}

impl InvalidDomain {
    /// The rejected (trimmed) input.
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// The rule the input broke.
    #[must_use]
    pub const fn reason(&self) -> &Reason {
        &self.reason
    }
}
