use crate::named_node::{NamedNode, NamedNodeRef};
use crate::vocab::{rdf, xsd};
use oxilangtag::{LanguageTag, LanguageTagParseError};
use oxsdatatypes::{
    Boolean, Date, DateTime, DayTimeDuration, Decimal, Double, Duration, Float, GDay, GMonth,
    GMonthDay, GYear, GYearMonth, Integer, Time, YearMonthDuration,
};
use std::fmt::{self, Write};

/// An RDF [literal](https://www.w3.org/TR/rdf11-concepts/#dfn-literal): a lexical form with either a datatype or a language tag.
///
/// `xsd:string` literals are stored as simple literals, so both spellings compare equal.
///
/// ```
/// use rdfterm::vocab::xsd;
/// use rdfterm::Literal;
///
/// assert_eq!(Literal::new_simple_literal("foo\nbar").to_string(), "\"foo\\nbar\"");
/// assert_eq!(
///     Literal::new_typed_literal("1999-01-01", xsd::DATE).to_string(),
///     "\"1999-01-01\"^^<http://www.w3.org/2001/XMLSchema#date>"
/// );
/// assert_eq!(
///     Literal::new_language_tagged_literal("foo", "EN")?.to_string(),
///     "\"foo\"@en"
/// );
/// # Result::<(), rdfterm::LanguageTagParseError>::Ok(())
/// ```
#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
pub struct Literal {
    annotation: Annotation,
    value: String,
}

#[derive(Eq, PartialEq, Ord, PartialOrd, Debug, Clone, Hash)]
enum Annotation {
    Simple,
    Language(String),
    Datatype(NamedNode),
}

impl Literal {
    #[inline]
    pub fn new_simple_literal(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            annotation: Annotation::Simple,
        }
    }

    pub fn new_typed_literal(value: impl Into<String>, datatype: impl Into<NamedNode>) -> Self {
        let datatype = datatype.into();
        Self {
            value: value.into(),
            annotation: if datatype == xsd::STRING {
                Annotation::Simple
            } else {
                Annotation::Datatype(datatype)
            },
        }
    }

    /// Validates the tag against [BCP47](https://tools.ietf.org/html/bcp47) and lowercases it.
    pub fn new_language_tagged_literal(
        value: impl Into<String>,
        language: impl Into<String>,
    ) -> Result<Self, LanguageTagParseError> {
        let mut language = language.into();
        language.make_ascii_lowercase();
        let language = LanguageTag::parse(language)?.into_inner();
        Ok(Self::new_language_tagged_literal_unchecked(value, language))
    }

    /// The tag must already be a lowercase BCP47 tag.
    #[inline]
    pub fn new_language_tagged_literal_unchecked(
        value: impl Into<String>,
        language: impl Into<String>,
    ) -> Self {
        Self {
            value: value.into(),
            annotation: Annotation::Language(language.into()),
        }
    }

    /// The lexical form.
    #[inline]
    pub fn value(&self) -> &str {
        &self.value
    }

    #[inline]
    pub fn language(&self) -> Option<&str> {
        if let Annotation::Language(language) = &self.annotation {
            Some(language)
        } else {
            None
        }
    }

    /// `rdf:langString` for language-tagged strings, `xsd:string` for simple literals.
    #[inline]
    pub fn datatype(&self) -> NamedNodeRef<'_> {
        match &self.annotation {
            Annotation::Simple => xsd::STRING,
            Annotation::Language(_) => rdf::LANG_STRING,
            Annotation::Datatype(datatype) => datatype.as_ref(),
        }
    }

    /// Splits the literal into its lexical form, its datatype and its language tag.
    ///
    /// The datatype is `None` for simple literals and language-tagged strings.
    #[inline]
    pub fn destruct(self) -> (String, Option<NamedNode>, Option<String>) {
        match self.annotation {
            Annotation::Simple => (self.value, None, None),
            Annotation::Language(language) => (self.value, None, Some(language)),
            Annotation::Datatype(datatype) => (self.value, Some(datatype), None),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_quoted(&self.value, f)?;
        match &self.annotation {
            Annotation::Simple => Ok(()),
            Annotation::Language(language) => write!(f, "@{language}"),
            Annotation::Datatype(datatype) => write!(f, "^^{datatype}"),
        }
    }
}

/// Writes `value` between double quotes with the N-Triples escapes.
fn write_quoted(value: &str, f: &mut impl Write) -> fmt::Result {
    f.write_char('"')?;
    for c in value.chars() {
        match c {
            '"' | '\\' => write!(f, "\\{c}"),
            '\n' => f.write_str("\\n"),
            '\r' => f.write_str("\\r"),
            '\t' => f.write_str("\\t"),
            '\u{08}' => f.write_str("\\b"),
            '\u{0c}' => f.write_str("\\f"),
            '\0'..='\u{1f}' | '\u{7f}' => write!(f, "\\u{:04X}", u32::from(c)),
            c => f.write_char(c),
        }?;
    }
    f.write_char('"')
}

impl From<&str> for Literal {
    #[inline]
    fn from(value: &str) -> Self {
        Self::new_simple_literal(value)
    }
}

impl From<String> for Literal {
    #[inline]
    fn from(value: String) -> Self {
        Self::new_simple_literal(value)
    }
}

/// Literals in the canonical lexical form of a value, given by its `Display` implementation.
macro_rules! literal_from_value {
    ($($value:ty => $datatype:ident),* $(,)?) => {
        $(
            impl From<$value> for Literal {
                #[inline]
                fn from(value: $value) -> Self {
                    Self::new_typed_literal(value.to_string(), xsd::$datatype)
                }
            }
        )*
    };
}

literal_from_value!(
    bool => BOOLEAN,
    i32 => INTEGER,
    i64 => INTEGER,
    Boolean => BOOLEAN,
    Integer => INTEGER,
    Decimal => DECIMAL,
    Float => FLOAT,
    Double => DOUBLE,
    DateTime => DATE_TIME,
    Time => TIME,
    Date => DATE,
    GYearMonth => G_YEAR_MONTH,
    GYear => G_YEAR,
    GMonthDay => G_MONTH_DAY,
    GDay => G_DAY,
    GMonth => G_MONTH,
    Duration => DURATION,
    YearMonthDuration => YEAR_MONTH_DURATION,
    DayTimeDuration => DAY_TIME_DURATION,
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_literal_equality() {
        assert_eq!(
            Literal::new_simple_literal("foo"),
            Literal::new_typed_literal("foo", xsd::STRING)
        );
        assert_eq!(Literal::new_simple_literal("foo").datatype(), xsd::STRING);
    }

    #[test]
    fn test_language_tag_normalization() {
        let literal = Literal::new_language_tagged_literal("foo", "EN-us").unwrap();
        assert_eq!(literal.language(), Some("en-us"));
        assert_eq!(literal.datatype(), rdf::LANG_STRING);
        Literal::new_language_tagged_literal("foo", "").unwrap_err();
    }

    #[test]
    fn test_datatype_xor_language() {
        let (_, datatype, language) = Literal::from(12).destruct();
        assert_eq!(datatype, Some(xsd::INTEGER.into_owned()));
        assert_eq!(language, None);
        let (_, datatype, language) = Literal::new_language_tagged_literal_unchecked("a", "fr").destruct();
        assert_eq!(datatype, None);
        assert_eq!(language.as_deref(), Some("fr"));
    }

    #[test]
    fn test_display() {
        assert_eq!(Literal::from(true).to_string(), "\"true\"^^<http://www.w3.org/2001/XMLSchema#boolean>");
        assert_eq!(Literal::new_simple_literal("a\"b\u{7f}").to_string(), "\"a\\\"b\\u007F\"");
    }
}
