use crate::name::{is_base_char, is_inner_char};
use std::fmt;

/// A query variable, displayed with its `?` sigil.
///
/// ```
/// use rdfterm::{Variable, VariableNameParseError};
///
/// assert_eq!(Variable::new("foo")?.to_string(), "?foo");
/// # Result::<_,VariableNameParseError>::Ok(())
/// ```
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
pub struct Variable {
    name: String,
}

impl Variable {
    /// Checks that `name` follows the `VARNAME` production, without the sigil.
    pub fn new(name: impl Into<String>) -> Result<Self, VariableNameParseError> {
        let name = name.into();
        let mut chars = name.chars();
        let valid = chars
            .next()
            .is_some_and(|c| is_base_char(c) || matches!(c, '_' | '0'..='9'))
            && chars.all(is_inner_char);
        if valid {
            Ok(Self { name })
        } else {
            Err(VariableNameParseError)
        }
    }

    #[inline]
    pub fn new_unchecked(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "?{}", self.name)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("The variable name is invalid")]
pub struct VariableNameParseError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation() {
        Variable::new("foo").unwrap();
        Variable::new("_1").unwrap();
        Variable::new("").unwrap_err();
        Variable::new("a-b").unwrap_err();
        Variable::new("?a").unwrap_err();
    }
}
