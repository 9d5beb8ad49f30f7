use crate::name::is_inner_char;
use rand::random;
use std::fmt;

/// A blank node, identified by a label that is valid in N-Triples, Turtle and SPARQL.
///
/// [`BlankNode::default()`] draws a fresh random label.
///
/// ```
/// use rdfterm::BlankNode;
///
/// assert_eq!(BlankNode::new("a122")?.to_string(), "_:a122");
/// BlankNode::new("a.").unwrap_err();
/// # Result::<_,rdfterm::BlankNodeIdParseError>::Ok(())
/// ```
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
pub struct BlankNode {
    label: String,
}

impl BlankNode {
    pub fn new(label: impl Into<String>) -> Result<Self, BlankNodeIdParseError> {
        let label = label.into();
        if is_valid_label(&label) {
            Ok(Self { label })
        } else {
            Err(BlankNodeIdParseError)
        }
    }

    /// Skips the label validation done by [`BlankNode::new`].
    #[inline]
    pub fn new_unchecked(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
        }
    }

    /// The label is the lowercase hexadecimal form of `id`.
    #[inline]
    pub fn new_from_unique_id(id: u128) -> Self {
        Self::new_unchecked(format!("{id:x}"))
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for BlankNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "_:{}", self.label)
    }
}

impl Default for BlankNode {
    fn default() -> Self {
        // hexadecimal labels starting with a digit are not valid in every syntax
        loop {
            let node = Self::new_from_unique_id(random());
            if node.label.starts_with(|c: char| c.is_ascii_lowercase()) {
                return node;
            }
        }
    }
}

fn is_valid_label(label: &str) -> bool {
    let mut chars = label.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (is_inner_char(first) || first == ':')
        && chars.all(|c| is_inner_char(c) || matches!(c, '.' | '-' | ':'))
        && !label.ends_with('.')
}

#[derive(Debug, thiserror::Error)]
#[error("The blank node identifier is invalid")]
pub struct BlankNodeIdParseError;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::is_base_char;

    #[test]
    fn test_label_from_unique_id() {
        assert_eq!(BlankNode::new_from_unique_id(0x42).as_str(), "42");
    }

    #[test]
    fn test_label_validation() {
        BlankNode::new("").unwrap_err();
        BlankNode::new("a").unwrap();
        BlankNode::new("-").unwrap_err();
        BlankNode::new("a-").unwrap();
        BlankNode::new(".").unwrap_err();
        BlankNode::new("a.").unwrap_err();
        BlankNode::new("a.a").unwrap();
    }

    #[test]
    fn test_default_is_valid_and_fresh() {
        let a = BlankNode::default();
        let b = BlankNode::default();
        assert_ne!(a, b);
        BlankNode::new(a.as_str()).unwrap();
        assert!(is_base_char(a.as_str().chars().next().unwrap()));
    }
}
