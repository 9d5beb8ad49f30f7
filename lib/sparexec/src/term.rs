use oxsdatatypes::*;
use rdfterm::vocab::{rdf, xsd};
use rdfterm::{BlankNode, Literal, NamedNode, Term};
use std::hash::{Hash, Hasher};
use std::mem::discriminant;

/// Declares the literal variants parsed into their value space, next to the XSD datatype they are read from.
macro_rules! parsed_literals {
    ($($variant:ident($value:ty) = $datatype:ident,)*) => {
        /// A term as understood by the expression evaluator.
        ///
        /// Literals of the supported XSD datatypes are parsed into their value space.
        /// Ill-typed literals and literals of other datatypes are kept as [`ExpressionTerm::OtherTypedLiteral`].
        #[derive(Clone, Debug)]
        pub enum ExpressionTerm {
            NamedNode(NamedNode),
            BlankNode(BlankNode),
            StringLiteral(String),
            LangStringLiteral { value: String, language: String },
            $($variant($value),)*
            OtherTypedLiteral { value: String, datatype: NamedNode },
        }

        impl PartialEq for ExpressionTerm {
            fn eq(&self, other: &Self) -> bool {
                match (self, other) {
                    (Self::NamedNode(a), Self::NamedNode(b)) => a == b,
                    (Self::BlankNode(a), Self::BlankNode(b)) => a == b,
                    (Self::StringLiteral(a), Self::StringLiteral(b)) => a == b,
                    (
                        Self::LangStringLiteral { value: a, language: a_language },
                        Self::LangStringLiteral { value: b, language: b_language },
                    ) => a == b && a_language == b_language,
                    $((Self::$variant(a), Self::$variant(b)) => a.is_identical(b),)*
                    (
                        Self::OtherTypedLiteral { value: a, datatype: a_datatype },
                        Self::OtherTypedLiteral { value: b, datatype: b_datatype },
                    ) => a == b && a_datatype == b_datatype,
                    _ => false,
                }
            }
        }

        impl Hash for ExpressionTerm {
            fn hash<H: Hasher>(&self, state: &mut H) {
                discriminant(self).hash(state);
                match self {
                    Self::NamedNode(node) => node.hash(state),
                    Self::BlankNode(node) => node.hash(state),
                    Self::StringLiteral(value) => value.hash(state),
                    Self::LangStringLiteral { value, language } => {
                        value.hash(state);
                        language.hash(state);
                    }
                    $(Self::$variant(value) => value.hash_identity(state),)*
                    Self::OtherTypedLiteral { value, datatype } => {
                        value.hash(state);
                        datatype.hash(state);
                    }
                }
            }
        }

        impl From<ExpressionTerm> for Term {
            fn from(term: ExpressionTerm) -> Self {
                match term {
                    ExpressionTerm::NamedNode(node) => node.into(),
                    ExpressionTerm::BlankNode(node) => node.into(),
                    ExpressionTerm::StringLiteral(value) => Literal::from(value).into(),
                    ExpressionTerm::LangStringLiteral { value, language } => {
                        Literal::new_language_tagged_literal_unchecked(value, language).into()
                    }
                    $(ExpressionTerm::$variant(value) => Literal::from(value).into(),)*
                    ExpressionTerm::OtherTypedLiteral { value, datatype } => {
                        Literal::new_typed_literal(value, datatype).into()
                    }
                }
            }
        }

        impl ExpressionTerm {
            /// The datatype of a literal, `None` for IRIs and blank nodes.
            pub fn datatype(&self) -> Option<NamedNode> {
                let datatype = match self {
                    Self::NamedNode(_) | Self::BlankNode(_) => return None,
                    Self::StringLiteral(_) => xsd::STRING,
                    Self::LangStringLiteral { .. } => rdf::LANG_STRING,
                    $(Self::$variant(_) => xsd::$datatype,)*
                    Self::OtherTypedLiteral { datatype, .. } => return Some(datatype.clone()),
                };
                Some(datatype.into_owned())
            }
        }

        /// Returns `None` if the datatype is not supported or if `value` is not in its lexical space.
        fn parse_typed_literal(value: &str, datatype: &str) -> Option<ExpressionTerm> {
            let datatype = primitive_datatype(datatype);
            if datatype == xsd::STRING.as_str() {
                return Some(ExpressionTerm::StringLiteral(value.into()));
            }
            $(
                if datatype == xsd::$datatype.as_str() {
                    return Some(ExpressionTerm::$variant(value.parse().ok()?));
                }
            )*
            None
        }
    };
}

parsed_literals! {
    BooleanLiteral(Boolean) = BOOLEAN,
    IntegerLiteral(Integer) = INTEGER,
    DecimalLiteral(Decimal) = DECIMAL,
    FloatLiteral(Float) = FLOAT,
    DoubleLiteral(Double) = DOUBLE,
    DateTimeLiteral(DateTime) = DATE_TIME,
    DateLiteral(Date) = DATE,
    TimeLiteral(Time) = TIME,
    GYearLiteral(GYear) = G_YEAR,
    GYearMonthLiteral(GYearMonth) = G_YEAR_MONTH,
    GMonthLiteral(GMonth) = G_MONTH,
    GMonthDayLiteral(GMonthDay) = G_MONTH_DAY,
    GDayLiteral(GDay) = G_DAY,
    DurationLiteral(Duration) = DURATION,
    YearMonthDurationLiteral(YearMonthDuration) = YEAR_MONTH_DURATION,
    DayTimeDurationLiteral(DayTimeDuration) = DAY_TIME_DURATION,
}

/// Local names of the XSD datatypes read as `xsd:integer`.
const INTEGER_SUBTYPES: &[&str] = &[
    "byte",
    "short",
    "int",
    "long",
    "unsignedByte",
    "unsignedShort",
    "unsignedInt",
    "unsignedLong",
    "positiveInteger",
    "negativeInteger",
    "nonPositiveInteger",
    "nonNegativeInteger",
];

fn primitive_datatype(datatype: &str) -> &str {
    match datatype.strip_prefix(xsd::NAMESPACE) {
        Some(local) if INTEGER_SUBTYPES.contains(&local) => xsd::INTEGER.as_str(),
        Some("dateTimeStamp") => xsd::DATE_TIME.as_str(),
        _ => datatype,
    }
}

/// Identity of parsed values: a `NaN` float is identical to itself.
trait ValueIdentity {
    fn is_identical(&self, other: &Self) -> bool;

    fn hash_identity<H: Hasher>(&self, state: &mut H);
}

macro_rules! value_identity_from_eq {
    ($($value:ty),*) => {
        $(
            impl ValueIdentity for $value {
                #[inline]
                fn is_identical(&self, other: &Self) -> bool {
                    self == other
                }

                #[inline]
                fn hash_identity<H: Hasher>(&self, state: &mut H) {
                    self.hash(state)
                }
            }
        )*
    };
}

value_identity_from_eq!(
    Boolean,
    Integer,
    Decimal,
    DateTime,
    Date,
    Time,
    GYear,
    GYearMonth,
    GMonth,
    GMonthDay,
    GDay,
    Duration,
    YearMonthDuration,
    DayTimeDuration
);

macro_rules! value_identity_from_bits {
    ($($value:ty),*) => {
        $(
            impl ValueIdentity for $value {
                #[inline]
                fn is_identical(&self, other: &Self) -> bool {
                    self.is_identical_with(*other)
                }

                #[inline]
                fn hash_identity<H: Hasher>(&self, state: &mut H) {
                    self.to_be_bytes().hash(state)
                }
            }
        )*
    };
}

value_identity_from_bits!(Float, Double);

impl Eq for ExpressionTerm {}

impl From<Term> for ExpressionTerm {
    fn from(term: Term) -> Self {
        let literal = match term {
            Term::NamedNode(node) => return Self::NamedNode(node),
            Term::BlankNode(node) => return Self::BlankNode(node),
            Term::Literal(literal) => literal,
        };
        match literal.destruct() {
            (value, _, Some(language)) => Self::LangStringLiteral { value, language },
            (value, Some(datatype), None) => parse_typed_literal(&value, datatype.as_str())
                .unwrap_or(Self::OtherTypedLiteral { value, datatype }),
            (value, None, None) => Self::StringLiteral(value),
        }
    }
}

impl From<NamedNode> for ExpressionTerm {
    #[inline]
    fn from(node: NamedNode) -> Self {
        Self::NamedNode(node)
    }
}

impl From<bool> for ExpressionTerm {
    #[inline]
    fn from(value: bool) -> Self {
        Self::BooleanLiteral(value.into())
    }
}

impl From<Literal> for ExpressionTerm {
    #[inline]
    fn from(literal: Literal) -> Self {
        Term::from(literal).into()
    }
}

impl ExpressionTerm {
    /// Computes the [effective boolean value](https://www.w3.org/TR/sparql11-query/#ebv) of the term.
    ///
    /// `None` means that it is a type error to use the term as a condition.
    pub fn effective_boolean_value(&self) -> Option<bool> {
        Some(match self {
            Self::BooleanLiteral(value) => (*value).into(),
            Self::StringLiteral(value) => !value.is_empty(),
            Self::FloatLiteral(value) => Boolean::from(*value).into(),
            Self::DoubleLiteral(value) => Boolean::from(*value).into(),
            Self::IntegerLiteral(value) => Boolean::from(*value).into(),
            Self::DecimalLiteral(value) => Boolean::from(*value).into(),
            _ => return None,
        })
    }

    pub fn is_literal(&self) -> bool {
        !matches!(self, Self::NamedNode(_) | Self::BlankNode(_))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            Self::IntegerLiteral(_)
                | Self::DecimalLiteral(_)
                | Self::FloatLiteral(_)
                | Self::DoubleLiteral(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_literal_parsing() {
        let term = ExpressionTerm::from(Term::from(Literal::new_typed_literal(
            "01",
            xsd::INT,
        )));
        assert_eq!(term, ExpressionTerm::IntegerLiteral(1.into()));

        let term = ExpressionTerm::from(Term::from(Literal::new_typed_literal(
            "foo",
            xsd::INTEGER,
        )));
        assert!(matches!(term, ExpressionTerm::OtherTypedLiteral { .. }));
        assert_eq!(term.effective_boolean_value(), None);
    }

    #[test]
    fn test_effective_boolean_value() {
        assert_eq!(
            ExpressionTerm::StringLiteral(String::new()).effective_boolean_value(),
            Some(false)
        );
        assert_eq!(
            ExpressionTerm::IntegerLiteral(2.into()).effective_boolean_value(),
            Some(true)
        );
        assert_eq!(
            ExpressionTerm::DoubleLiteral(f64::NAN.into()).effective_boolean_value(),
            Some(false)
        );
        assert_eq!(
            ExpressionTerm::LangStringLiteral {
                value: "a".into(),
                language: "en".into()
            }
            .effective_boolean_value(),
            None
        );
    }

    #[test]
    fn test_back_to_term() {
        let term: Term = ExpressionTerm::DecimalLiteral(Decimal::from(2)).into();
        assert_eq!(
            term,
            Literal::new_typed_literal("2", xsd::DECIMAL).into()
        );
        assert_eq!(
            ExpressionTerm::DecimalLiteral(Decimal::from(2)).datatype(),
            Some(xsd::DECIMAL.into_owned())
        );
    }
}
