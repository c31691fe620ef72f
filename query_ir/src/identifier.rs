//! SQL identifiers with quote-aware equality.

const QUOTE_CHAR: char = '`';

/// How an [`Identifier`] should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuoteMode {
    /// Render exactly as it appeared in the original statement.
    Unmodified,
    /// Render without enclosing quotes.
    NoQuotes,
    /// Render with enclosing quotes.
    WithQuotes,
}

/// A normalized SQL name.
///
/// Enclosing quotes are stripped at construction and remembered, so equality
/// and ordering ignore quoting while [`QuoteMode::Unmodified`] round-trips
/// the original spelling exactly.
#[derive(Debug, Clone, Default, Eq)]
pub struct Identifier {
    value: String,
    was_quoted: bool,
}

impl Identifier {
    /// Construct from a raw string, stripping one level of enclosing quotes
    /// if present.
    pub fn new(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        if raw.len() >= 2 && raw.starts_with(QUOTE_CHAR) && raw.ends_with(QUOTE_CHAR) {
            Self {
                value: raw[1..raw.len() - 1].to_string(),
                was_quoted: true,
            }
        } else {
            Self {
                value: raw,
                was_quoted: false,
            }
        }
    }

    /// The identifier in the requested rendering.
    pub fn get(&self, mode: QuoteMode) -> String {
        match mode {
            QuoteMode::NoQuotes => self.value.clone(),
            QuoteMode::Unmodified if !self.was_quoted => self.value.clone(),
            _ => format!("{}{}{}", QUOTE_CHAR, self.value, QUOTE_CHAR),
        }
    }

    /// The unquoted value.
    pub fn value(&self) -> &str {
        &self.value
    }

    /// True if the identifier holds no text.
    pub fn is_empty(&self) -> bool {
        self.value.is_empty()
    }

    /// True if the original spelling carried quotes.
    pub fn was_quoted(&self) -> bool {
        self.was_quoted
    }
}

impl From<&str> for Identifier {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Identifier {
    fn from(raw: String) -> Self {
        Self::new(raw)
    }
}

impl PartialEq for Identifier {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl PartialEq<str> for Identifier {
    fn eq(&self, other: &str) -> bool {
        self.value == other
    }
}

impl PartialOrd for Identifier {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identifier {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl std::hash::Hash for Identifier {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.value.hash(state)
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.get(QuoteMode::Unmodified))
    }
}

/// True if `name` can be rendered without quoting.
pub(crate) fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .next()
            .map(|c| c.is_ascii_alphabetic() || c == '_')
            .unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Render `name` quoted only when necessary.
pub(crate) fn quote_if_needed(name: &str) -> String {
    if is_plain_identifier(name) {
        name.to_string()
    } else {
        format!("{}{}{}", QUOTE_CHAR, name, QUOTE_CHAR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unquoted_round_trip() {
        let id = Identifier::new("objectId");
        assert_eq!(id.get(QuoteMode::Unmodified), "objectId");
        assert_eq!(id.get(QuoteMode::NoQuotes), "objectId");
        assert_eq!(id.get(QuoteMode::WithQuotes), "`objectId`");
    }

    #[test]
    fn quoted_round_trip() {
        let id = Identifier::new("`objectId`");
        assert_eq!(id.get(QuoteMode::Unmodified), "`objectId`");
        assert_eq!(id.get(QuoteMode::NoQuotes), "objectId");
        assert_eq!(id.get(QuoteMode::WithQuotes), "`objectId`");
    }

    #[test]
    fn equality_ignores_quotes() {
        assert_eq!(Identifier::new("`a`"), Identifier::new("a"));
        assert_ne!(Identifier::new("a"), Identifier::new("b"));
    }

    #[test]
    fn ordering_ignores_quotes() {
        let mut ids = vec![Identifier::new("b"), Identifier::new("`a`")];
        ids.sort();
        assert_eq!(ids[0].value(), "a");
    }

    #[test]
    fn plain_identifier_detection() {
        assert!(is_plain_identifier("chunkId"));
        assert!(is_plain_identifier("_private"));
        assert!(!is_plain_identifier("LSST.Object"));
        assert!(!is_plain_identifier("1abc"));
        assert!(!is_plain_identifier(""));
        assert_eq!(quote_if_needed("LSST.Object"), "`LSST.Object`");
        assert_eq!(quote_if_needed("N"), "N");
    }
}
