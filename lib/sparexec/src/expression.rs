//! The [SPARQL operators and functions](https://www.w3.org/TR/sparql11-query/#SparqlOps) on [`ExpressionTerm`]s.
//!
//! They are pure: every function either returns a term or an [`ExpressionError`].

use crate::error::ExpressionError;
use crate::term::ExpressionTerm;
use md5::Digest;
use oxiri::Iri;
use oxsdatatypes::*;
use rand::random;
use rdfterm::vocab::xsd;
use rdfterm::{Literal, NamedNode, NamedNodeRef, Term};
use regex::{Regex, RegexBuilder};
use std::borrow::Cow;
use std::cmp::Ordering;

const REGEX_SIZE_LIMIT: usize = 1_000_000;

pub type ExpressionResult = Result<ExpressionTerm, ExpressionError>;

fn type_error<T>(message: &'static str) -> Result<T, ExpressionError> {
    Err(ExpressionError::Type(message))
}

fn checked<T>(value: Option<T>) -> Result<T, ExpressionError> {
    value.ok_or(ExpressionError::Arithmetic("overflow"))
}

pub fn effective_boolean_value(term: &ExpressionTerm) -> Result<bool, ExpressionError> {
    term.effective_boolean_value()
        .ok_or(ExpressionError::Type("the term has no effective boolean value"))
}

/// Logical-or: an error on one side is hidden if the other side is `true`.
pub fn or(
    left: Result<bool, ExpressionError>,
    right: impl FnOnce() -> Result<bool, ExpressionError>,
) -> Result<bool, ExpressionError> {
    match left {
        Ok(true) => Ok(true),
        Ok(false) => right(),
        Err(e) => match right() {
            Ok(true) => Ok(true),
            _ => Err(e),
        },
    }
}

/// Logical-and: an error on one side is hidden if the other side is `false`.
pub fn and(
    left: Result<bool, ExpressionError>,
    right: impl FnOnce() -> Result<bool, ExpressionError>,
) -> Result<bool, ExpressionError> {
    match left {
        Ok(false) => Ok(false),
        Ok(true) => right(),
        Err(e) => match right() {
            Ok(false) => Ok(false),
            _ => Err(e),
        },
    }
}

pub fn not(term: &ExpressionTerm) -> Result<bool, ExpressionError> {
    Ok(!effective_boolean_value(term)?)
}

/// The `=` operator
pub fn equal(a: &ExpressionTerm, b: &ExpressionTerm) -> Result<bool, ExpressionError> {
    equals(a, b).ok_or(ExpressionError::Type("the terms are not comparable"))
}

/// The `<`, `<=`, `>` and `>=` operators
pub fn compare(a: &ExpressionTerm, b: &ExpressionTerm) -> Result<Ordering, ExpressionError> {
    partial_cmp(a, b).ok_or(ExpressionError::Type("the terms are not comparable"))
}

/// The `IN` operator: `true` as soon as a candidate is equal, an error if none is and one failed.
pub fn is_in(
    needle: &ExpressionTerm,
    candidates: impl IntoIterator<Item = ExpressionResult>,
) -> Result<bool, ExpressionError> {
    let mut error = None;
    for candidate in candidates {
        match candidate.and_then(|c| equal(needle, &c)) {
            Ok(true) => return Ok(true),
            Ok(false) => (),
            Err(e) => error = Some(e),
        }
    }
    error.map_or(Ok(false), Err)
}

/// The [value equality](https://www.w3.org/TR/sparql11-query/#func-RDFterm-equal), `None` if the terms are not comparable.
pub fn equals(a: &ExpressionTerm, b: &ExpressionTerm) -> Option<bool> {
    match a {
        ExpressionTerm::NamedNode(_)
        | ExpressionTerm::BlankNode(_)
        | ExpressionTerm::LangStringLiteral { .. } => Some(a == b),
        ExpressionTerm::StringLiteral(a) => match b {
            ExpressionTerm::StringLiteral(b) => Some(a == b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        ExpressionTerm::OtherTypedLiteral { .. } => match b {
            ExpressionTerm::OtherTypedLiteral { .. } if a == b => Some(true),
            ExpressionTerm::NamedNode(_)
            | ExpressionTerm::BlankNode(_)
            | ExpressionTerm::LangStringLiteral { .. } => Some(false),
            _ => None,
        },
        ExpressionTerm::BooleanLiteral(a) => match b {
            ExpressionTerm::BooleanLiteral(b) => Some(a == b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        ExpressionTerm::FloatLiteral(_)
        | ExpressionTerm::DoubleLiteral(_)
        | ExpressionTerm::IntegerLiteral(_)
        | ExpressionTerm::DecimalLiteral(_) => match b {
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ if b.is_numeric() => Some(partial_cmp_literals(a, b) == Some(Ordering::Equal)),
            _ => Some(false),
        },
        ExpressionTerm::DurationLiteral(a) => match b {
            ExpressionTerm::DurationLiteral(b) => Some(a == b),
            ExpressionTerm::YearMonthDurationLiteral(b) => Some(a == b),
            ExpressionTerm::DayTimeDurationLiteral(b) => Some(a == b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        ExpressionTerm::YearMonthDurationLiteral(a) => match b {
            ExpressionTerm::DurationLiteral(b) => Some(a == b),
            ExpressionTerm::YearMonthDurationLiteral(b) => Some(a == b),
            ExpressionTerm::DayTimeDurationLiteral(b) => Some(a == b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        ExpressionTerm::DayTimeDurationLiteral(a) => match b {
            ExpressionTerm::DurationLiteral(b) => Some(a == b),
            ExpressionTerm::YearMonthDurationLiteral(b) => Some(a == b),
            ExpressionTerm::DayTimeDurationLiteral(b) => Some(a == b),
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(false),
        },
        // date and time values are only comparable with the same kind
        _ => match b {
            ExpressionTerm::OtherTypedLiteral { .. } => None,
            _ => Some(partial_cmp_literals(a, b) == Some(Ordering::Equal)),
        },
    }
}

/// The order of `ORDER BY`: unbound < blank nodes < IRIs < literals.
///
/// It is total: literals that are not comparable by value are ordered by lexical form, datatype and language.
pub fn cmp_terms(a: Option<&ExpressionTerm>, b: Option<&ExpressionTerm>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match a {
            ExpressionTerm::BlankNode(a) => match b {
                ExpressionTerm::BlankNode(b) => a.as_str().cmp(b.as_str()),
                _ => Ordering::Less,
            },
            ExpressionTerm::NamedNode(a) => match b {
                ExpressionTerm::BlankNode(_) => Ordering::Greater,
                ExpressionTerm::NamedNode(b) => a.as_str().cmp(b.as_str()),
                _ => Ordering::Less,
            },
            _ => match b {
                ExpressionTerm::NamedNode(_) | ExpressionTerm::BlankNode(_) => Ordering::Greater,
                _ => partial_cmp_literals(a, b).unwrap_or_else(|| cmp_lexical(a, b)),
            },
        },
        (Some(_), None) => Ordering::Greater,
        (None, Some(_)) => Ordering::Less,
        (None, None) => Ordering::Equal,
    }
}

fn cmp_lexical(a: &ExpressionTerm, b: &ExpressionTerm) -> Ordering {
    let (Term::Literal(a), Term::Literal(b)) = (a.clone().into(), b.clone().into()) else {
        return Ordering::Equal;
    };
    (a.value(), a.datatype().as_str(), a.language()).cmp(&(
        b.value(),
        b.datatype().as_str(),
        b.language(),
    ))
}

/// The partial order of the comparison operators.
pub fn partial_cmp(a: &ExpressionTerm, b: &ExpressionTerm) -> Option<Ordering> {
    if a == b {
        return Some(Ordering::Equal);
    }
    partial_cmp_literals(a, b)
}

fn partial_cmp_literals(a: &ExpressionTerm, b: &ExpressionTerm) -> Option<Ordering> {
    match (a, b) {
        (ExpressionTerm::StringLiteral(a), ExpressionTerm::StringLiteral(b)) => a.partial_cmp(b),
        (
            ExpressionTerm::LangStringLiteral {
                value: va,
                language: la,
            },
            ExpressionTerm::LangStringLiteral {
                value: vb,
                language: lb,
            },
        ) => (la == lb).then(|| va.cmp(vb)),
        (ExpressionTerm::BooleanLiteral(a), ExpressionTerm::BooleanLiteral(b)) => {
            a.partial_cmp(b)
        }
        (ExpressionTerm::FloatLiteral(a), ExpressionTerm::FloatLiteral(b)) => a.partial_cmp(b),
        (ExpressionTerm::FloatLiteral(a), ExpressionTerm::DoubleLiteral(b)) => {
            Double::from(*a).partial_cmp(b)
        }
        (ExpressionTerm::FloatLiteral(a), ExpressionTerm::IntegerLiteral(b)) => {
            a.partial_cmp(&Float::from(*b))
        }
        (ExpressionTerm::FloatLiteral(a), ExpressionTerm::DecimalLiteral(b)) => {
            a.partial_cmp(&(*b).into())
        }
        (ExpressionTerm::DoubleLiteral(a), ExpressionTerm::FloatLiteral(b)) => {
            a.partial_cmp(&(*b).into())
        }
        (ExpressionTerm::DoubleLiteral(a), ExpressionTerm::DoubleLiteral(b)) => a.partial_cmp(b),
        (ExpressionTerm::DoubleLiteral(a), ExpressionTerm::IntegerLiteral(b)) => {
            a.partial_cmp(&Double::from(*b))
        }
        (ExpressionTerm::DoubleLiteral(a), ExpressionTerm::DecimalLiteral(b)) => {
            a.partial_cmp(&(*b).into())
        }
        (ExpressionTerm::IntegerLiteral(a), ExpressionTerm::FloatLiteral(b)) => {
            Float::from(*a).partial_cmp(b)
        }
        (ExpressionTerm::IntegerLiteral(a), ExpressionTerm::DoubleLiteral(b)) => {
            Double::from(*a).partial_cmp(b)
        }
        (ExpressionTerm::IntegerLiteral(a), ExpressionTerm::IntegerLiteral(b)) => a.partial_cmp(b),
        (ExpressionTerm::IntegerLiteral(a), ExpressionTerm::DecimalLiteral(b)) => {
            Decimal::from(*a).partial_cmp(b)
        }
        (ExpressionTerm::DecimalLiteral(a), ExpressionTerm::FloatLiteral(b)) => {
            Float::from(*a).partial_cmp(b)
        }
        (ExpressionTerm::DecimalLiteral(a), ExpressionTerm::DoubleLiteral(b)) => {
            Double::from(*a).partial_cmp(b)
        }
        (ExpressionTerm::DecimalLiteral(a), ExpressionTerm::IntegerLiteral(b)) => {
            a.partial_cmp(&Decimal::from(*b))
        }
        (ExpressionTerm::DecimalLiteral(a), ExpressionTerm::DecimalLiteral(b)) => a.partial_cmp(b),
        (ExpressionTerm::DateTimeLiteral(a), ExpressionTerm::DateTimeLiteral(b)) => {
            a.partial_cmp(b)
        }
        (ExpressionTerm::TimeLiteral(a), ExpressionTerm::TimeLiteral(b)) => a.partial_cmp(b),
        (ExpressionTerm::DateLiteral(a), ExpressionTerm::DateLiteral(b)) => a.partial_cmp(b),
        (ExpressionTerm::GYearMonthLiteral(a), ExpressionTerm::GYearMonthLiteral(b)) => {
            a.partial_cmp(b)
        }
        (ExpressionTerm::GYearLiteral(a), ExpressionTerm::GYearLiteral(b)) => a.partial_cmp(b),
        (ExpressionTerm::GMonthDayLiteral(a), ExpressionTerm::GMonthDayLiteral(b)) => {
            a.partial_cmp(b)
        }
        (ExpressionTerm::GDayLiteral(a), ExpressionTerm::GDayLiteral(b)) => a.partial_cmp(b),
        (ExpressionTerm::GMonthLiteral(a), ExpressionTerm::GMonthLiteral(b)) => a.partial_cmp(b),
        (ExpressionTerm::DurationLiteral(a), ExpressionTerm::DurationLiteral(b)) => {
            a.partial_cmp(b)
        }
        (ExpressionTerm::DurationLiteral(a), ExpressionTerm::YearMonthDurationLiteral(b)) => {
            a.partial_cmp(b)
        }
        (ExpressionTerm::DurationLiteral(a), ExpressionTerm::DayTimeDurationLiteral(b)) => {
            a.partial_cmp(b)
        }
        (ExpressionTerm::YearMonthDurationLiteral(a), ExpressionTerm::DurationLiteral(b)) => {
            a.partial_cmp(b)
        }
        (
            ExpressionTerm::YearMonthDurationLiteral(a),
            ExpressionTerm::YearMonthDurationLiteral(b),
        ) => a.partial_cmp(b),
        (ExpressionTerm::YearMonthDurationLiteral(a), ExpressionTerm::DayTimeDurationLiteral(b)) => {
            a.partial_cmp(b)
        }
        (ExpressionTerm::DayTimeDurationLiteral(a), ExpressionTerm::DurationLiteral(b)) => {
            a.partial_cmp(b)
        }
        (ExpressionTerm::DayTimeDurationLiteral(a), ExpressionTerm::YearMonthDurationLiteral(b)) => {
            a.partial_cmp(b)
        }
        (ExpressionTerm::DayTimeDurationLiteral(a), ExpressionTerm::DayTimeDurationLiteral(b)) => {
            a.partial_cmp(b)
        }
        _ => None,
    }
}

/// The operands of a binary arithmetic operator, after numeric type promotion.
enum NumericBinaryOperands {
    Float(Float, Float),
    Double(Double, Double),
    Integer(Integer, Integer),
    Decimal(Decimal, Decimal),
    Duration(Duration, Duration),
    YearMonthDuration(YearMonthDuration, YearMonthDuration),
    DayTimeDuration(DayTimeDuration, DayTimeDuration),
    DateTime(DateTime, DateTime),
    Time(Time, Time),
    Date(Date, Date),
    DateTimeDuration(DateTime, Duration),
    DateTimeYearMonthDuration(DateTime, YearMonthDuration),
    DateTimeDayTimeDuration(DateTime, DayTimeDuration),
    DateDuration(Date, Duration),
    DateYearMonthDuration(Date, YearMonthDuration),
    DateDayTimeDuration(Date, DayTimeDuration),
    TimeDuration(Time, Duration),
    TimeDayTimeDuration(Time, DayTimeDuration),
}

impl NumericBinaryOperands {
    fn new(a: ExpressionTerm, b: ExpressionTerm) -> Result<Self, ExpressionError> {
        use ExpressionTerm as T;

        Ok(match (a, b) {
            (T::FloatLiteral(v1), T::FloatLiteral(v2)) => Self::Float(v1, v2),
            (T::FloatLiteral(v1), T::DoubleLiteral(v2)) => Self::Double(v1.into(), v2),
            (T::FloatLiteral(v1), T::IntegerLiteral(v2)) => Self::Float(v1, v2.into()),
            (T::FloatLiteral(v1), T::DecimalLiteral(v2)) => Self::Float(v1, v2.into()),
            (T::DoubleLiteral(v1), T::FloatLiteral(v2)) => Self::Double(v1, v2.into()),
            (T::DoubleLiteral(v1), T::DoubleLiteral(v2)) => Self::Double(v1, v2),
            (T::DoubleLiteral(v1), T::IntegerLiteral(v2)) => Self::Double(v1, v2.into()),
            (T::DoubleLiteral(v1), T::DecimalLiteral(v2)) => Self::Double(v1, v2.into()),
            (T::IntegerLiteral(v1), T::FloatLiteral(v2)) => Self::Float(v1.into(), v2),
            (T::IntegerLiteral(v1), T::DoubleLiteral(v2)) => Self::Double(v1.into(), v2),
            (T::IntegerLiteral(v1), T::IntegerLiteral(v2)) => Self::Integer(v1, v2),
            (T::IntegerLiteral(v1), T::DecimalLiteral(v2)) => Self::Decimal(v1.into(), v2),
            (T::DecimalLiteral(v1), T::FloatLiteral(v2)) => Self::Float(v1.into(), v2),
            (T::DecimalLiteral(v1), T::DoubleLiteral(v2)) => Self::Double(v1.into(), v2),
            (T::DecimalLiteral(v1), T::IntegerLiteral(v2)) => Self::Decimal(v1, v2.into()),
            (T::DecimalLiteral(v1), T::DecimalLiteral(v2)) => Self::Decimal(v1, v2),
            (T::DurationLiteral(v1), T::DurationLiteral(v2)) => Self::Duration(v1, v2),
            (T::DurationLiteral(v1), T::YearMonthDurationLiteral(v2)) => {
                Self::Duration(v1, v2.into())
            }
            (T::DurationLiteral(v1), T::DayTimeDurationLiteral(v2)) => {
                Self::Duration(v1, v2.into())
            }
            (T::YearMonthDurationLiteral(v1), T::DurationLiteral(v2)) => {
                Self::Duration(v1.into(), v2)
            }
            (T::YearMonthDurationLiteral(v1), T::YearMonthDurationLiteral(v2)) => {
                Self::YearMonthDuration(v1, v2)
            }
            (T::YearMonthDurationLiteral(v1), T::DayTimeDurationLiteral(v2)) => {
                Self::Duration(v1.into(), v2.into())
            }
            (T::DayTimeDurationLiteral(v1), T::DurationLiteral(v2)) => {
                Self::Duration(v1.into(), v2)
            }
            (T::DayTimeDurationLiteral(v1), T::YearMonthDurationLiteral(v2)) => {
                Self::Duration(v1.into(), v2.into())
            }
            (T::DayTimeDurationLiteral(v1), T::DayTimeDurationLiteral(v2)) => {
                Self::DayTimeDuration(v1, v2)
            }
            (T::DateTimeLiteral(v1), T::DateTimeLiteral(v2)) => Self::DateTime(v1, v2),
            (T::DateLiteral(v1), T::DateLiteral(v2)) => Self::Date(v1, v2),
            (T::TimeLiteral(v1), T::TimeLiteral(v2)) => Self::Time(v1, v2),
            (T::DateTimeLiteral(v1), T::DurationLiteral(v2)) => Self::DateTimeDuration(v1, v2),
            (T::DateTimeLiteral(v1), T::YearMonthDurationLiteral(v2)) => {
                Self::DateTimeYearMonthDuration(v1, v2)
            }
            (T::DateTimeLiteral(v1), T::DayTimeDurationLiteral(v2)) => {
                Self::DateTimeDayTimeDuration(v1, v2)
            }
            (T::DateLiteral(v1), T::DurationLiteral(v2)) => {
                if has_time_of_day(v2.hours(), v2.minutes(), v2.seconds()) {
                    return type_error("a date can only be moved by whole days");
                }
                Self::DateDuration(v1, v2)
            }
            (T::DateLiteral(v1), T::YearMonthDurationLiteral(v2)) => {
                Self::DateYearMonthDuration(v1, v2)
            }
            (T::DateLiteral(v1), T::DayTimeDurationLiteral(v2)) => {
                if has_time_of_day(v2.hours(), v2.minutes(), v2.seconds()) {
                    return type_error("a date can only be moved by whole days");
                }
                Self::DateDayTimeDuration(v1, v2)
            }
            (T::TimeLiteral(v1), T::DurationLiteral(v2)) => {
                if v2.years() != 0 || v2.months() != 0 || v2.days() != 0 {
                    return type_error("a time can only be moved by less than a day");
                }
                Self::TimeDuration(v1, v2)
            }
            (T::TimeLiteral(v1), T::DayTimeDurationLiteral(v2)) => {
                if v2.days() != 0 {
                    return type_error("a time can only be moved by less than a day");
                }
                Self::TimeDayTimeDuration(v1, v2)
            }
            _ => return type_error("arithmetic operators expect numbers, dates or durations"),
        })
    }
}

fn has_time_of_day(hours: i64, minutes: i64, seconds: Decimal) -> bool {
    hours != 0 || minutes != 0 || seconds != Decimal::from(0)
}

pub fn add(a: ExpressionTerm, b: ExpressionTerm) -> ExpressionResult {
    use NumericBinaryOperands as O;

    Ok(match NumericBinaryOperands::new(a, b)? {
        O::Float(v1, v2) => ExpressionTerm::FloatLiteral(v1 + v2),
        O::Double(v1, v2) => ExpressionTerm::DoubleLiteral(v1 + v2),
        O::Integer(v1, v2) => ExpressionTerm::IntegerLiteral(checked(v1.checked_add(v2))?),
        O::Decimal(v1, v2) => ExpressionTerm::DecimalLiteral(checked(v1.checked_add(v2))?),
        O::Duration(v1, v2) => ExpressionTerm::DurationLiteral(checked(v1.checked_add(v2))?),
        O::YearMonthDuration(v1, v2) => {
            ExpressionTerm::YearMonthDurationLiteral(checked(v1.checked_add(v2))?)
        }
        O::DayTimeDuration(v1, v2) => {
            ExpressionTerm::DayTimeDurationLiteral(checked(v1.checked_add(v2))?)
        }
        O::DateTimeDuration(v1, v2) => {
            ExpressionTerm::DateTimeLiteral(checked(v1.checked_add_duration(v2))?)
        }
        O::DateTimeYearMonthDuration(v1, v2) => {
            ExpressionTerm::DateTimeLiteral(checked(v1.checked_add_year_month_duration(v2))?)
        }
        O::DateTimeDayTimeDuration(v1, v2) => {
            ExpressionTerm::DateTimeLiteral(checked(v1.checked_add_day_time_duration(v2))?)
        }
        O::DateDuration(v1, v2) => {
            ExpressionTerm::DateLiteral(checked(v1.checked_add_duration(v2))?)
        }
        O::DateYearMonthDuration(v1, v2) => {
            ExpressionTerm::DateLiteral(checked(v1.checked_add_year_month_duration(v2))?)
        }
        O::DateDayTimeDuration(v1, v2) => {
            ExpressionTerm::DateLiteral(checked(v1.checked_add_day_time_duration(v2))?)
        }
        O::TimeDuration(v1, v2) => {
            ExpressionTerm::TimeLiteral(checked(v1.checked_add_duration(v2))?)
        }
        O::TimeDayTimeDuration(v1, v2) => {
            ExpressionTerm::TimeLiteral(checked(v1.checked_add_day_time_duration(v2))?)
        }
        O::DateTime(_, _) | O::Time(_, _) | O::Date(_, _) => {
            return type_error("date and time values can't be added together");
        }
    })
}

pub fn subtract(a: ExpressionTerm, b: ExpressionTerm) -> ExpressionResult {
    use NumericBinaryOperands as O;

    Ok(match NumericBinaryOperands::new(a, b)? {
        O::Float(v1, v2) => ExpressionTerm::FloatLiteral(v1 - v2),
        O::Double(v1, v2) => ExpressionTerm::DoubleLiteral(v1 - v2),
        O::Integer(v1, v2) => ExpressionTerm::IntegerLiteral(checked(v1.checked_sub(v2))?),
        O::Decimal(v1, v2) => ExpressionTerm::DecimalLiteral(checked(v1.checked_sub(v2))?),
        O::DateTime(v1, v2) => ExpressionTerm::DayTimeDurationLiteral(checked(v1.checked_sub(v2))?),
        O::Date(v1, v2) => ExpressionTerm::DayTimeDurationLiteral(checked(v1.checked_sub(v2))?),
        O::Time(v1, v2) => ExpressionTerm::DayTimeDurationLiteral(checked(v1.checked_sub(v2))?),
        O::Duration(v1, v2) => ExpressionTerm::DurationLiteral(checked(v1.checked_sub(v2))?),
        O::YearMonthDuration(v1, v2) => {
            ExpressionTerm::YearMonthDurationLiteral(checked(v1.checked_sub(v2))?)
        }
        O::DayTimeDuration(v1, v2) => {
            ExpressionTerm::DayTimeDurationLiteral(checked(v1.checked_sub(v2))?)
        }
        O::DateTimeDuration(v1, v2) => {
            ExpressionTerm::DateTimeLiteral(checked(v1.checked_sub_duration(v2))?)
        }
        O::DateTimeYearMonthDuration(v1, v2) => {
            ExpressionTerm::DateTimeLiteral(checked(v1.checked_sub_year_month_duration(v2))?)
        }
        O::DateTimeDayTimeDuration(v1, v2) => {
            ExpressionTerm::DateTimeLiteral(checked(v1.checked_sub_day_time_duration(v2))?)
        }
        O::DateDuration(v1, v2) => {
            ExpressionTerm::DateLiteral(checked(v1.checked_sub_duration(v2))?)
        }
        O::DateYearMonthDuration(v1, v2) => {
            ExpressionTerm::DateLiteral(checked(v1.checked_sub_year_month_duration(v2))?)
        }
        O::DateDayTimeDuration(v1, v2) => {
            ExpressionTerm::DateLiteral(checked(v1.checked_sub_day_time_duration(v2))?)
        }
        O::TimeDuration(v1, v2) => {
            ExpressionTerm::TimeLiteral(checked(v1.checked_sub_duration(v2))?)
        }
        O::TimeDayTimeDuration(v1, v2) => {
            ExpressionTerm::TimeLiteral(checked(v1.checked_sub_day_time_duration(v2))?)
        }
    })
}

pub fn multiply(a: ExpressionTerm, b: ExpressionTerm) -> ExpressionResult {
    use NumericBinaryOperands as O;

    Ok(match NumericBinaryOperands::new(a, b)? {
        O::Float(v1, v2) => ExpressionTerm::FloatLiteral(v1 * v2),
        O::Double(v1, v2) => ExpressionTerm::DoubleLiteral(v1 * v2),
        O::Integer(v1, v2) => ExpressionTerm::IntegerLiteral(checked(v1.checked_mul(v2))?),
        O::Decimal(v1, v2) => ExpressionTerm::DecimalLiteral(checked(v1.checked_mul(v2))?),
        _ => return type_error("only numbers can be multiplied"),
    })
}

/// The division: the division of two integers is a decimal.
pub fn divide(a: ExpressionTerm, b: ExpressionTerm) -> ExpressionResult {
    use NumericBinaryOperands as O;

    let division_error = ExpressionError::Arithmetic("division by zero or overflow");
    Ok(match NumericBinaryOperands::new(a, b)? {
        O::Float(v1, v2) => ExpressionTerm::FloatLiteral(v1 / v2),
        O::Double(v1, v2) => ExpressionTerm::DoubleLiteral(v1 / v2),
        O::Integer(v1, v2) => ExpressionTerm::DecimalLiteral(
            Decimal::from(v1)
                .checked_div(v2)
                .ok_or(division_error)?,
        ),
        O::Decimal(v1, v2) => {
            ExpressionTerm::DecimalLiteral(v1.checked_div(v2).ok_or(division_error)?)
        }
        _ => return type_error("only numbers can be divided"),
    })
}

pub fn unary_plus(term: ExpressionTerm) -> ExpressionResult {
    match term {
        ExpressionTerm::FloatLiteral(_)
        | ExpressionTerm::DoubleLiteral(_)
        | ExpressionTerm::IntegerLiteral(_)
        | ExpressionTerm::DecimalLiteral(_)
        | ExpressionTerm::DurationLiteral(_)
        | ExpressionTerm::YearMonthDurationLiteral(_)
        | ExpressionTerm::DayTimeDurationLiteral(_) => Ok(term),
        _ => type_error("unary plus expects a number or a duration"),
    }
}

pub fn unary_minus(term: ExpressionTerm) -> ExpressionResult {
    Ok(match term {
        ExpressionTerm::FloatLiteral(value) => ExpressionTerm::FloatLiteral(-value),
        ExpressionTerm::DoubleLiteral(value) => ExpressionTerm::DoubleLiteral(-value),
        ExpressionTerm::IntegerLiteral(value) => {
            ExpressionTerm::IntegerLiteral(checked(value.checked_neg())?)
        }
        ExpressionTerm::DecimalLiteral(value) => {
            ExpressionTerm::DecimalLiteral(checked(value.checked_neg())?)
        }
        ExpressionTerm::DurationLiteral(value) => {
            ExpressionTerm::DurationLiteral(checked(value.checked_neg())?)
        }
        ExpressionTerm::YearMonthDurationLiteral(value) => {
            ExpressionTerm::YearMonthDurationLiteral(checked(value.checked_neg())?)
        }
        ExpressionTerm::DayTimeDurationLiteral(value) => {
            ExpressionTerm::DayTimeDurationLiteral(checked(value.checked_neg())?)
        }
        _ => return type_error("unary minus expects a number or a duration"),
    })
}

/// `STR`
pub fn to_str(term: ExpressionTerm) -> ExpressionResult {
    Ok(ExpressionTerm::StringLiteral(match term.into() {
        Term::NamedNode(term) => term.into_string(),
        Term::BlankNode(_) => return type_error("STR is not defined on blank nodes"),
        Term::Literal(term) => term.destruct().0,
    }))
}

pub fn lang(term: ExpressionTerm) -> ExpressionResult {
    Ok(ExpressionTerm::StringLiteral(match term {
        ExpressionTerm::LangStringLiteral { language, .. } => language,
        ExpressionTerm::NamedNode(_) | ExpressionTerm::BlankNode(_) => {
            return type_error("LANG is only defined on literals");
        }
        _ => String::new(),
    }))
}

/// `LANGMATCHES` with the [basic filtering](https://www.rfc-editor.org/rfc/rfc4647#section-3.3.1) scheme.
pub fn lang_matches(tag: ExpressionTerm, range: ExpressionTerm) -> ExpressionResult {
    let (ExpressionTerm::StringLiteral(mut tag), ExpressionTerm::StringLiteral(mut range)) =
        (tag, range)
    else {
        return type_error("LANGMATCHES expects simple literals");
    };
    tag.make_ascii_lowercase();
    range.make_ascii_lowercase();
    Ok(if range == "*" {
        !tag.is_empty()
    } else {
        let mut tag_parts = tag.split('-');
        range
            .split('-')
            .all(|range_part| tag_parts.next() == Some(range_part))
    }
    .into())
}

pub fn datatype(term: ExpressionTerm) -> ExpressionResult {
    term.datatype()
        .map(ExpressionTerm::NamedNode)
        .ok_or(ExpressionError::Type("DATATYPE is only defined on literals"))
}

/// `IRI`, relative IRIs are resolved against the base IRI.
pub fn iri(term: ExpressionTerm, base_iri: Option<&Iri<String>>) -> ExpressionResult {
    Ok(ExpressionTerm::NamedNode(match term {
        ExpressionTerm::NamedNode(iri) => iri,
        ExpressionTerm::StringLiteral(iri) => if let Some(base_iri) = base_iri {
            base_iri.resolve(&iri)
        } else {
            Iri::parse(iri)
        }
        .map_err(|_| ExpressionError::Type("invalid IRI"))?
        .into(),
        _ => return type_error("IRI expects an IRI or a simple literal"),
    }))
}

pub fn abs(term: ExpressionTerm) -> ExpressionResult {
    Ok(match term {
        ExpressionTerm::IntegerLiteral(value) => {
            ExpressionTerm::IntegerLiteral(checked(value.checked_abs())?)
        }
        ExpressionTerm::DecimalLiteral(value) => {
            ExpressionTerm::DecimalLiteral(checked(value.checked_abs())?)
        }
        ExpressionTerm::FloatLiteral(value) => ExpressionTerm::FloatLiteral(value.abs()),
        ExpressionTerm::DoubleLiteral(value) => ExpressionTerm::DoubleLiteral(value.abs()),
        _ => return type_error("ABS expects a number"),
    })
}

pub fn ceil(term: ExpressionTerm) -> ExpressionResult {
    Ok(match term {
        ExpressionTerm::IntegerLiteral(value) => ExpressionTerm::IntegerLiteral(value),
        ExpressionTerm::DecimalLiteral(value) => {
            ExpressionTerm::DecimalLiteral(checked(value.checked_ceil())?)
        }
        ExpressionTerm::FloatLiteral(value) => ExpressionTerm::FloatLiteral(value.ceil()),
        ExpressionTerm::DoubleLiteral(value) => ExpressionTerm::DoubleLiteral(value.ceil()),
        _ => return type_error("CEIL expects a number"),
    })
}

pub fn floor(term: ExpressionTerm) -> ExpressionResult {
    Ok(match term {
        ExpressionTerm::IntegerLiteral(value) => ExpressionTerm::IntegerLiteral(value),
        ExpressionTerm::DecimalLiteral(value) => {
            ExpressionTerm::DecimalLiteral(checked(value.checked_floor())?)
        }
        ExpressionTerm::FloatLiteral(value) => ExpressionTerm::FloatLiteral(value.floor()),
        ExpressionTerm::DoubleLiteral(value) => ExpressionTerm::DoubleLiteral(value.floor()),
        _ => return type_error("FLOOR expects a number"),
    })
}

pub fn round(term: ExpressionTerm) -> ExpressionResult {
    Ok(match term {
        ExpressionTerm::IntegerLiteral(value) => ExpressionTerm::IntegerLiteral(value),
        ExpressionTerm::DecimalLiteral(value) => {
            ExpressionTerm::DecimalLiteral(checked(value.checked_round())?)
        }
        ExpressionTerm::FloatLiteral(value) => ExpressionTerm::FloatLiteral(value.round()),
        ExpressionTerm::DoubleLiteral(value) => ExpressionTerm::DoubleLiteral(value.round()),
        _ => return type_error("ROUND expects a number"),
    })
}

fn to_string_and_language(
    term: ExpressionTerm,
) -> Result<(String, Option<String>), ExpressionError> {
    match term {
        ExpressionTerm::StringLiteral(value) => Ok((value, None)),
        ExpressionTerm::LangStringLiteral { value, language } => Ok((value, Some(language))),
        _ => type_error("a string literal is expected"),
    }
}

fn build_plain_literal(value: String, language: Option<String>) -> ExpressionTerm {
    if let Some(language) = language {
        ExpressionTerm::LangStringLiteral { value, language }
    } else {
        ExpressionTerm::StringLiteral(value)
    }
}

/// The [argument compatibility rules](https://www.w3.org/TR/sparql11-query/#func-arg-compatibility).
fn to_argument_compatible_strings(
    arg1: ExpressionTerm,
    arg2: ExpressionTerm,
) -> Result<(String, String, Option<String>), ExpressionError> {
    let (value1, language1) = to_string_and_language(arg1)?;
    let (value2, language2) = to_string_and_language(arg2)?;
    if language2.is_none() || language1 == language2 {
        Ok((value1, value2, language1))
    } else {
        type_error("incompatible language tags")
    }
}

/// `CONCAT`: the language tag is kept only if all the arguments share it.
pub fn concat(args: impl IntoIterator<Item = ExpressionResult>) -> ExpressionResult {
    let mut result = String::default();
    let mut language = None;
    for arg in args {
        let (value, arg_language) = to_string_and_language(arg?)?;
        if let Some(lang) = &language {
            if *lang != arg_language {
                language = Some(None)
            }
        } else {
            language = Some(arg_language)
        }
        result += &value
    }
    Ok(build_plain_literal(result, language.flatten()))
}

/// `SUBSTR`, positions are counted in characters starting from 1.
pub fn substr(
    source: ExpressionTerm,
    starting_loc: ExpressionTerm,
    length: Option<ExpressionTerm>,
) -> ExpressionResult {
    let (source, language) = to_string_and_language(source)?;
    let ExpressionTerm::IntegerLiteral(starting_loc) = starting_loc else {
        return type_error("SUBSTR expects an integer starting location");
    };
    let starting_location = usize::try_from(i64::from(starting_loc))
        .map_err(|_| ExpressionError::Type("SUBSTR starting location must be positive"))?;
    let length = match length {
        Some(ExpressionTerm::IntegerLiteral(v)) => Some(
            usize::try_from(i64::from(v))
                .map_err(|_| ExpressionError::Type("SUBSTR length must be positive"))?,
        ),
        Some(_) => return type_error("SUBSTR expects an integer length"),
        None => None,
    };

    // We want to slice on char indices, not byte indices
    let mut start_iter = source
        .char_indices()
        .skip(starting_location.saturating_sub(1))
        .peekable();
    let result = if let Some((start_position, _)) = start_iter.peek().copied() {
        if let Some(length) = length {
            let mut end_iter = start_iter.skip(length).peekable();
            if let Some((end_position, _)) = end_iter.peek() {
                &source[start_position..*end_position]
            } else {
                &source[start_position..]
            }
        } else {
            &source[start_position..]
        }
    } else {
        ""
    };
    Ok(build_plain_literal(result.into(), language))
}

pub fn strlen(term: ExpressionTerm) -> ExpressionResult {
    let (string, _) = to_string_and_language(term)?;
    Ok(ExpressionTerm::IntegerLiteral(
        checked(i64::try_from(string.chars().count()).ok())?.into(),
    ))
}

pub fn replace(
    text: ExpressionTerm,
    regex: &Regex,
    replacement: ExpressionTerm,
) -> ExpressionResult {
    let (text, language) = to_string_and_language(text)?;
    let ExpressionTerm::StringLiteral(replacement) = replacement else {
        return type_error("REPLACE expects a simple literal replacement");
    };
    Ok(build_plain_literal(
        match regex.replace_all(&text, replacement.as_str()) {
            Cow::Owned(replaced) => replaced,
            Cow::Borrowed(_) => text,
        },
        language,
    ))
}

pub fn regex_matches(text: ExpressionTerm, regex: &Regex) -> Result<bool, ExpressionError> {
    let (text, _) = to_string_and_language(text)?;
    Ok(regex.is_match(&text))
}

/// Builds a regular expression from a pattern and the `s`, `m`, `i`, `x` and `q` flags.
pub fn compile_pattern(pattern: &str, flags: Option<&str>) -> Result<Regex, ExpressionError> {
    let mut pattern = Cow::Borrowed(pattern);
    let flags = flags.unwrap_or_default();
    if flags.contains('q') {
        pattern = regex::escape(&pattern).into();
    }
    let mut regex_builder = RegexBuilder::new(&pattern);
    regex_builder.size_limit(REGEX_SIZE_LIMIT);
    for flag in flags.chars() {
        match flag {
            's' => {
                regex_builder.dot_matches_new_line(true);
            }
            'm' => {
                regex_builder.multi_line(true);
            }
            'i' => {
                regex_builder.case_insensitive(true);
            }
            'x' => {
                regex_builder.ignore_whitespace(true);
            }
            'q' => (),
            _ => return type_error("invalid regular expression flag"),
        }
    }
    regex_builder
        .build()
        .map_err(|_| ExpressionError::Type("invalid regular expression"))
}

pub fn ucase(term: ExpressionTerm) -> ExpressionResult {
    let (value, language) = to_string_and_language(term)?;
    Ok(build_plain_literal(value.to_uppercase(), language))
}

pub fn lcase(term: ExpressionTerm) -> ExpressionResult {
    let (value, language) = to_string_and_language(term)?;
    Ok(build_plain_literal(value.to_lowercase(), language))
}

pub fn encode_for_uri(term: ExpressionTerm) -> ExpressionResult {
    let (value, _) = to_string_and_language(term)?;
    let mut result = String::with_capacity(value.len());
    for c in value.bytes() {
        match c {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(char::from(c))
            }
            _ => {
                result.push('%');
                result.push_str(&hex::encode_upper([c]));
            }
        }
    }
    Ok(ExpressionTerm::StringLiteral(result))
}

pub fn contains(arg1: ExpressionTerm, arg2: ExpressionTerm) -> ExpressionResult {
    let (arg1, arg2, _) = to_argument_compatible_strings(arg1, arg2)?;
    Ok(arg1.contains(arg2.as_str()).into())
}

pub fn str_starts(arg1: ExpressionTerm, arg2: ExpressionTerm) -> ExpressionResult {
    let (arg1, arg2, _) = to_argument_compatible_strings(arg1, arg2)?;
    Ok(arg1.starts_with(arg2.as_str()).into())
}

pub fn str_ends(arg1: ExpressionTerm, arg2: ExpressionTerm) -> ExpressionResult {
    let (arg1, arg2, _) = to_argument_compatible_strings(arg1, arg2)?;
    Ok(arg1.ends_with(arg2.as_str()).into())
}

pub fn str_before(arg1: ExpressionTerm, arg2: ExpressionTerm) -> ExpressionResult {
    let (arg1, arg2, language) = to_argument_compatible_strings(arg1, arg2)?;
    Ok(if let Some(position) = arg1.find(arg2.as_str()) {
        build_plain_literal(arg1[..position].into(), language)
    } else {
        ExpressionTerm::StringLiteral(String::new())
    })
}

pub fn str_after(arg1: ExpressionTerm, arg2: ExpressionTerm) -> ExpressionResult {
    let (arg1, arg2, language) = to_argument_compatible_strings(arg1, arg2)?;
    Ok(if let Some(position) = arg1.find(arg2.as_str()) {
        build_plain_literal(arg1[position + arg2.len()..].into(), language)
    } else {
        ExpressionTerm::StringLiteral(String::new())
    })
}

pub fn year(term: ExpressionTerm) -> ExpressionResult {
    Ok(ExpressionTerm::IntegerLiteral(
        match term {
            ExpressionTerm::DateTimeLiteral(date_time) => date_time.year(),
            ExpressionTerm::DateLiteral(date) => date.year(),
            ExpressionTerm::GYearMonthLiteral(year_month) => year_month.year(),
            ExpressionTerm::GYearLiteral(year) => year.year(),
            _ => return type_error("YEAR expects a date"),
        }
        .into(),
    ))
}

pub fn month(term: ExpressionTerm) -> ExpressionResult {
    Ok(ExpressionTerm::IntegerLiteral(
        match term {
            ExpressionTerm::DateTimeLiteral(date_time) => date_time.month(),
            ExpressionTerm::DateLiteral(date) => date.month(),
            ExpressionTerm::GYearMonthLiteral(year_month) => year_month.month(),
            ExpressionTerm::GMonthDayLiteral(month_day) => month_day.month(),
            ExpressionTerm::GMonthLiteral(month) => month.month(),
            _ => return type_error("MONTH expects a date"),
        }
        .into(),
    ))
}

pub fn day(term: ExpressionTerm) -> ExpressionResult {
    Ok(ExpressionTerm::IntegerLiteral(
        match term {
            ExpressionTerm::DateTimeLiteral(date_time) => date_time.day(),
            ExpressionTerm::DateLiteral(date) => date.day(),
            ExpressionTerm::GMonthDayLiteral(month_day) => month_day.day(),
            ExpressionTerm::GDayLiteral(day) => day.day(),
            _ => return type_error("DAY expects a date"),
        }
        .into(),
    ))
}

pub fn hours(term: ExpressionTerm) -> ExpressionResult {
    Ok(ExpressionTerm::IntegerLiteral(
        match term {
            ExpressionTerm::DateTimeLiteral(date_time) => date_time.hour(),
            ExpressionTerm::TimeLiteral(time) => time.hour(),
            _ => return type_error("HOURS expects a time"),
        }
        .into(),
    ))
}

pub fn minutes(term: ExpressionTerm) -> ExpressionResult {
    Ok(ExpressionTerm::IntegerLiteral(
        match term {
            ExpressionTerm::DateTimeLiteral(date_time) => date_time.minute(),
            ExpressionTerm::TimeLiteral(time) => time.minute(),
            _ => return type_error("MINUTES expects a time"),
        }
        .into(),
    ))
}

pub fn seconds(term: ExpressionTerm) -> ExpressionResult {
    Ok(ExpressionTerm::DecimalLiteral(match term {
        ExpressionTerm::DateTimeLiteral(date_time) => date_time.second(),
        ExpressionTerm::TimeLiteral(time) => time.second(),
        _ => return type_error("SECONDS expects a time"),
    }))
}

fn timezone_offset(term: ExpressionTerm) -> Result<Option<TimezoneOffset>, ExpressionError> {
    Ok(match term {
        ExpressionTerm::DateTimeLiteral(date_time) => date_time.timezone_offset(),
        ExpressionTerm::TimeLiteral(time) => time.timezone_offset(),
        ExpressionTerm::DateLiteral(date) => date.timezone_offset(),
        ExpressionTerm::GYearMonthLiteral(year_month) => year_month.timezone_offset(),
        ExpressionTerm::GYearLiteral(year) => year.timezone_offset(),
        ExpressionTerm::GMonthDayLiteral(month_day) => month_day.timezone_offset(),
        ExpressionTerm::GDayLiteral(day) => day.timezone_offset(),
        ExpressionTerm::GMonthLiteral(month) => month.timezone_offset(),
        _ => return type_error("a date or a time is expected"),
    })
}

/// `TIMEZONE`, an error if the value has no timezone.
pub fn timezone(term: ExpressionTerm) -> ExpressionResult {
    let offset = timezone_offset(term)?
        .ok_or(ExpressionError::Type("the value has no timezone"))?;
    Ok(ExpressionTerm::DayTimeDurationLiteral(offset.into()))
}

/// `TZ`, the empty string if the value has no timezone.
pub fn tz(term: ExpressionTerm) -> ExpressionResult {
    Ok(ExpressionTerm::StringLiteral(
        timezone_offset(term)?.map_or_else(String::new, |o| o.to_string()),
    ))
}

pub fn rand() -> ExpressionTerm {
    ExpressionTerm::DoubleLiteral(random::<f64>().into())
}

/// `UUID`
pub fn uuid() -> ExpressionTerm {
    let mut buffer = String::with_capacity(45);
    buffer.push_str("urn:uuid:");
    generate_uuid(&mut buffer);
    ExpressionTerm::NamedNode(NamedNode::new_unchecked(buffer))
}

/// `STRUUID`
pub fn str_uuid() -> ExpressionTerm {
    let mut buffer = String::with_capacity(36);
    generate_uuid(&mut buffer);
    ExpressionTerm::StringLiteral(buffer)
}

fn generate_uuid(buffer: &mut String) {
    let mut uuid = random::<u128>().to_le_bytes();
    uuid[6] = (uuid[6] & 0x0F) | 0x40;
    uuid[8] = (uuid[8] & 0x3F) | 0x80;
    for (i, range) in [0..4, 4..6, 6..8, 8..10, 10..16].into_iter().enumerate() {
        if i > 0 {
            buffer.push('-');
        }
        buffer.push_str(&hex::encode(&uuid[range]));
    }
}

/// `MD5`, `SHA1`, `SHA256`, `SHA384` and `SHA512`
pub fn hash<H: Digest>(term: ExpressionTerm) -> ExpressionResult {
    let ExpressionTerm::StringLiteral(input) = term else {
        return type_error("hash functions expect a simple literal");
    };
    Ok(ExpressionTerm::StringLiteral(hex::encode(
        H::new().chain_update(input.as_str()).finalize(),
    )))
}

pub fn str_lang(lexical_form: ExpressionTerm, lang_tag: ExpressionTerm) -> ExpressionResult {
    let (ExpressionTerm::StringLiteral(value), ExpressionTerm::StringLiteral(language)) =
        (lexical_form, lang_tag)
    else {
        return type_error("STRLANG expects simple literals");
    };
    Ok(Literal::new_language_tagged_literal(value, language)
        .map_err(|_| ExpressionError::Type("invalid language tag"))?
        .into())
}

pub fn str_dt(lexical_form: ExpressionTerm, datatype: ExpressionTerm) -> ExpressionResult {
    let (ExpressionTerm::StringLiteral(value), ExpressionTerm::NamedNode(datatype)) =
        (lexical_form, datatype)
    else {
        return type_error("STRDT expects a simple literal and an IRI");
    };
    Ok(Literal::new_typed_literal(value, datatype).into())
}

pub fn is_iri(term: &ExpressionTerm) -> ExpressionTerm {
    matches!(term, ExpressionTerm::NamedNode(_)).into()
}

pub fn is_blank(term: &ExpressionTerm) -> ExpressionTerm {
    matches!(term, ExpressionTerm::BlankNode(_)).into()
}

pub fn is_literal(term: &ExpressionTerm) -> ExpressionTerm {
    term.is_literal().into()
}

pub fn is_numeric(term: &ExpressionTerm) -> ExpressionTerm {
    term.is_numeric().into()
}

/// Checks if a function IRI is one of the supported [XSD casts](https://www.w3.org/TR/sparql11-query/#FunctionMapping).
pub fn is_cast(function: NamedNodeRef<'_>) -> bool {
    [
        xsd::STRING,
        xsd::BOOLEAN,
        xsd::INTEGER,
        xsd::DECIMAL,
        xsd::FLOAT,
        xsd::DOUBLE,
        xsd::DATE_TIME,
        xsd::DATE,
        xsd::TIME,
        xsd::DURATION,
        xsd::YEAR_MONTH_DURATION,
        xsd::DAY_TIME_DURATION,
    ]
    .contains(&function)
}

fn invalid_cast<T>(_: T) -> ExpressionError {
    ExpressionError::Type("invalid cast")
}

/// Casts a term to an XSD datatype.
pub fn cast(target: NamedNodeRef<'_>, term: ExpressionTerm) -> ExpressionResult {
    Ok(match target {
        xsd::STRING => to_str(term)?,
        xsd::BOOLEAN => ExpressionTerm::BooleanLiteral(match term {
            ExpressionTerm::BooleanLiteral(value) => value,
            ExpressionTerm::FloatLiteral(value) => value.into(),
            ExpressionTerm::DoubleLiteral(value) => value.into(),
            ExpressionTerm::IntegerLiteral(value) => value.into(),
            ExpressionTerm::DecimalLiteral(value) => value.into(),
            ExpressionTerm::StringLiteral(value) => value.parse().map_err(invalid_cast)?,
            _ => return type_error("invalid cast to xsd:boolean"),
        }),
        xsd::DOUBLE => ExpressionTerm::DoubleLiteral(match term {
            ExpressionTerm::FloatLiteral(value) => value.into(),
            ExpressionTerm::DoubleLiteral(value) => value,
            ExpressionTerm::IntegerLiteral(value) => value.into(),
            ExpressionTerm::DecimalLiteral(value) => value.into(),
            ExpressionTerm::BooleanLiteral(value) => value.into(),
            ExpressionTerm::StringLiteral(value) => value.parse().map_err(invalid_cast)?,
            _ => return type_error("invalid cast to xsd:double"),
        }),
        xsd::FLOAT => ExpressionTerm::FloatLiteral(match term {
            ExpressionTerm::FloatLiteral(value) => value,
            ExpressionTerm::DoubleLiteral(value) => value.into(),
            ExpressionTerm::IntegerLiteral(value) => value.into(),
            ExpressionTerm::DecimalLiteral(value) => value.into(),
            ExpressionTerm::BooleanLiteral(value) => value.into(),
            ExpressionTerm::StringLiteral(value) => value.parse().map_err(invalid_cast)?,
            _ => return type_error("invalid cast to xsd:float"),
        }),
        xsd::INTEGER => ExpressionTerm::IntegerLiteral(match term {
            ExpressionTerm::FloatLiteral(value) => value.try_into().map_err(invalid_cast)?,
            ExpressionTerm::DoubleLiteral(value) => value.try_into().map_err(invalid_cast)?,
            ExpressionTerm::IntegerLiteral(value) => value,
            ExpressionTerm::DecimalLiteral(value) => value.try_into().map_err(invalid_cast)?,
            ExpressionTerm::BooleanLiteral(value) => value.into(),
            ExpressionTerm::StringLiteral(value) => value.parse().map_err(invalid_cast)?,
            _ => return type_error("invalid cast to xsd:integer"),
        }),
        xsd::DECIMAL => ExpressionTerm::DecimalLiteral(match term {
            ExpressionTerm::FloatLiteral(value) => value.try_into().map_err(invalid_cast)?,
            ExpressionTerm::DoubleLiteral(value) => value.try_into().map_err(invalid_cast)?,
            ExpressionTerm::IntegerLiteral(value) => value.into(),
            ExpressionTerm::DecimalLiteral(value) => value,
            ExpressionTerm::BooleanLiteral(value) => value.into(),
            ExpressionTerm::StringLiteral(value) => value.parse().map_err(invalid_cast)?,
            _ => return type_error("invalid cast to xsd:decimal"),
        }),
        xsd::DATE => ExpressionTerm::DateLiteral(match term {
            ExpressionTerm::DateLiteral(value) => value,
            ExpressionTerm::DateTimeLiteral(value) => value.try_into().map_err(invalid_cast)?,
            ExpressionTerm::StringLiteral(value) => value.parse().map_err(invalid_cast)?,
            _ => return type_error("invalid cast to xsd:date"),
        }),
        xsd::TIME => ExpressionTerm::TimeLiteral(match term {
            ExpressionTerm::TimeLiteral(value) => value,
            ExpressionTerm::DateTimeLiteral(value) => value.into(),
            ExpressionTerm::StringLiteral(value) => value.parse().map_err(invalid_cast)?,
            _ => return type_error("invalid cast to xsd:time"),
        }),
        xsd::DATE_TIME => ExpressionTerm::DateTimeLiteral(match term {
            ExpressionTerm::DateTimeLiteral(value) => value,
            ExpressionTerm::DateLiteral(value) => value.try_into().map_err(invalid_cast)?,
            ExpressionTerm::StringLiteral(value) => value.parse().map_err(invalid_cast)?,
            _ => return type_error("invalid cast to xsd:dateTime"),
        }),
        xsd::DURATION => ExpressionTerm::DurationLiteral(match term {
            ExpressionTerm::DurationLiteral(value) => value,
            ExpressionTerm::YearMonthDurationLiteral(value) => value.into(),
            ExpressionTerm::DayTimeDurationLiteral(value) => value.into(),
            ExpressionTerm::StringLiteral(value) => value.parse().map_err(invalid_cast)?,
            _ => return type_error("invalid cast to xsd:duration"),
        }),
        xsd::YEAR_MONTH_DURATION => ExpressionTerm::YearMonthDurationLiteral(match term {
            ExpressionTerm::DurationLiteral(value) => value.try_into().map_err(invalid_cast)?,
            ExpressionTerm::YearMonthDurationLiteral(value) => value,
            ExpressionTerm::StringLiteral(value) => value.parse().map_err(invalid_cast)?,
            _ => return type_error("invalid cast to xsd:yearMonthDuration"),
        }),
        xsd::DAY_TIME_DURATION => ExpressionTerm::DayTimeDurationLiteral(match term {
            ExpressionTerm::DurationLiteral(value) => value.try_into().map_err(invalid_cast)?,
            ExpressionTerm::DayTimeDurationLiteral(value) => value,
            ExpressionTerm::StringLiteral(value) => value.parse().map_err(invalid_cast)?,
            _ => return type_error("invalid cast to xsd:dayTimeDuration"),
        }),
        _ => return Err(ExpressionError::UnknownFunction(target.into_owned())),
    })
}
