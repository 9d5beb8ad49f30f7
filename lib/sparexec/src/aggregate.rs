//! The accumulators of the [set functions](https://www.w3.org/TR/sparql11-query/#setFunctions).

use crate::binding::Binding;
use crate::expression::{add, divide, partial_cmp, to_str};
use crate::term::ExpressionTerm;
use oxsdatatypes::Integer;
use rustc_hash::FxHashSet;
use sparalgebra::algebra::AggregateFunction;
use std::cmp::Ordering;
use std::rc::Rc;

/// Folds the values of a group into a single term.
pub trait Accumulator {
    fn add(&mut self, element: ExpressionTerm);

    /// `None` if the aggregate is unbound for the group.
    fn finish(&mut self) -> Option<ExpressionTerm>;
}

#[derive(Default, Debug)]
pub struct CountAccumulator {
    count: i64,
}

impl Accumulator for CountAccumulator {
    fn add(&mut self, _element: ExpressionTerm) {
        self.count += 1;
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        Some(ExpressionTerm::IntegerLiteral(self.count.into()))
    }
}

/// Sums numbers. A single non numeric value makes the sum unbound.
#[derive(Debug)]
pub struct SumAccumulator {
    sum: Option<ExpressionTerm>,
}

impl Default for SumAccumulator {
    fn default() -> Self {
        Self {
            sum: Some(ExpressionTerm::IntegerLiteral(Integer::default())),
        }
    }
}

impl Accumulator for SumAccumulator {
    fn add(&mut self, element: ExpressionTerm) {
        let Some(sum) = self.sum.take() else {
            return;
        };
        if element.is_numeric() {
            self.sum = add(sum, element).ok();
        }
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        self.sum.take()
    }
}

/// The average of integers is a decimal.
#[derive(Default, Debug)]
pub struct AvgAccumulator {
    sum: SumAccumulator,
    count: i64,
}

impl Accumulator for AvgAccumulator {
    fn add(&mut self, element: ExpressionTerm) {
        self.sum.add(element);
        self.count += 1;
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        let sum = self.sum.finish()?;
        if self.count == 0 {
            return Some(ExpressionTerm::IntegerLiteral(0.into()));
        }
        divide(sum, ExpressionTerm::IntegerLiteral(self.count.into())).ok()
    }
}

/// Keeps the smallest value, ignoring the ones that are not comparable with it.
#[derive(Default, Debug)]
pub struct MinAccumulator {
    min: Option<ExpressionTerm>,
}

impl Accumulator for MinAccumulator {
    fn add(&mut self, element: ExpressionTerm) {
        match &self.min {
            Some(min) => {
                if partial_cmp(&element, min) == Some(Ordering::Less) {
                    self.min = Some(element);
                }
            }
            None => self.min = Some(element),
        }
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        self.min.take()
    }
}

/// Keeps the greatest value, ignoring the ones that are not comparable with it.
#[derive(Default, Debug)]
pub struct MaxAccumulator {
    max: Option<ExpressionTerm>,
}

impl Accumulator for MaxAccumulator {
    fn add(&mut self, element: ExpressionTerm) {
        match &self.max {
            Some(max) => {
                if partial_cmp(&element, max) == Some(Ordering::Greater) {
                    self.max = Some(element);
                }
            }
            None => self.max = Some(element),
        }
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        self.max.take()
    }
}

#[derive(Default, Debug)]
pub struct SampleAccumulator {
    value: Option<ExpressionTerm>,
}

impl Accumulator for SampleAccumulator {
    fn add(&mut self, element: ExpressionTerm) {
        if self.value.is_none() {
            self.value = Some(element);
        }
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        self.value.take()
    }
}

/// Joins the string forms of the values.
///
/// The result keeps the language tag only if all the values share it.
#[derive(Debug)]
pub struct GroupConcatAccumulator {
    concat: Option<String>,
    language: Option<Option<String>>,
    separator: Rc<str>,
}

impl GroupConcatAccumulator {
    pub fn new(separator: Rc<str>) -> Self {
        Self {
            concat: Some(String::new()),
            language: None,
            separator,
        }
    }
}

impl Accumulator for GroupConcatAccumulator {
    fn add(&mut self, element: ExpressionTerm) {
        let Some(concat) = self.concat.as_mut() else {
            return;
        };
        let (value, e_language) = match element {
            ExpressionTerm::StringLiteral(value) => (value, None),
            ExpressionTerm::LangStringLiteral { value, language } => (value, Some(language)),
            other => match to_str(other) {
                Ok(ExpressionTerm::StringLiteral(value)) => (value, None),
                _ => {
                    self.concat = None;
                    return;
                }
            },
        };
        if let Some(lang) = &self.language {
            if *lang != e_language {
                self.language = Some(None)
            }
            concat.push_str(&self.separator);
        } else {
            self.language = Some(e_language)
        }
        concat.push_str(&value);
    }

    fn finish(&mut self) -> Option<ExpressionTerm> {
        let concat = self.concat.take()?;
        Some(match self.language.take().flatten() {
            Some(language) => ExpressionTerm::LangStringLiteral {
                value: concat,
                language,
            },
            None => ExpressionTerm::StringLiteral(concat),
        })
    }
}

/// The state of one aggregate call for one group.
pub enum Aggregator {
    /// `COUNT(*)` and `COUNT(DISTINCT *)`
    Rows {
        count: i64,
        seen: Option<FxHashSet<Binding>>,
    },
    Values {
        accumulator: Box<dyn Accumulator>,
        seen: Option<FxHashSet<ExpressionTerm>>,
    },
}

impl Aggregator {
    pub fn count_rows(distinct: bool) -> Self {
        Self::Rows {
            count: 0,
            seen: distinct.then(FxHashSet::default),
        }
    }

    pub fn new(function: &AggregateFunction, distinct: bool) -> Self {
        let accumulator: Box<dyn Accumulator> = match function {
            AggregateFunction::Count => Box::<CountAccumulator>::default(),
            AggregateFunction::Sum => Box::<SumAccumulator>::default(),
            AggregateFunction::Avg => Box::<AvgAccumulator>::default(),
            AggregateFunction::Min => Box::<MinAccumulator>::default(),
            AggregateFunction::Max => Box::<MaxAccumulator>::default(),
            AggregateFunction::Sample => Box::<SampleAccumulator>::default(),
            AggregateFunction::GroupConcat { separator } => Box::new(GroupConcatAccumulator::new(
                separator.as_deref().unwrap_or(" ").into(),
            )),
        };
        Self::Values {
            accumulator,
            seen: distinct.then(FxHashSet::default),
        }
    }

    /// Folds a row of `COUNT(*)`.
    pub fn add_row(&mut self, row: &Binding) {
        if let Self::Rows { count, seen } = self {
            if seen.as_mut().is_none_or(|seen| seen.insert(row.clone())) {
                *count += 1;
            }
        }
    }

    /// Folds the value of the aggregated expression for a row.
    pub fn add_value(&mut self, value: ExpressionTerm) {
        if let Self::Values { accumulator, seen } = self {
            if let Some(seen) = seen {
                if !seen.insert(value.clone()) {
                    return;
                }
            }
            accumulator.add(value);
        }
    }

    pub fn finish(self) -> Option<ExpressionTerm> {
        match self {
            Self::Rows { count, .. } => Some(ExpressionTerm::IntegerLiteral(count.into())),
            Self::Values {
                mut accumulator, ..
            } => accumulator.finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxsdatatypes::Decimal;

    fn int(v: i64) -> ExpressionTerm {
        ExpressionTerm::IntegerLiteral(v.into())
    }

    fn aggregate(
        function: AggregateFunction,
        distinct: bool,
        values: impl IntoIterator<Item = ExpressionTerm>,
    ) -> Option<ExpressionTerm> {
        let mut aggregator = Aggregator::new(&function, distinct);
        for value in values {
            aggregator.add_value(value);
        }
        aggregator.finish()
    }

    #[test]
    fn test_empty_groups() {
        assert_eq!(aggregate(AggregateFunction::Count, false, []), Some(int(0)));
        assert_eq!(aggregate(AggregateFunction::Sum, false, []), Some(int(0)));
        assert_eq!(aggregate(AggregateFunction::Avg, false, []), Some(int(0)));
        assert_eq!(aggregate(AggregateFunction::Min, false, []), None);
        assert_eq!(aggregate(AggregateFunction::Sample, false, []), None);
        assert_eq!(
            aggregate(AggregateFunction::GroupConcat { separator: None }, false, []),
            Some(ExpressionTerm::StringLiteral(String::new()))
        );
        assert_eq!(Aggregator::count_rows(false).finish(), Some(int(0)));
    }

    #[test]
    fn test_sum_and_avg() {
        assert_eq!(
            aggregate(AggregateFunction::Sum, false, [int(1), int(2), int(3)]),
            Some(int(6))
        );
        assert_eq!(
            aggregate(AggregateFunction::Avg, false, [int(1), int(2)]),
            Some(ExpressionTerm::DecimalLiteral(Decimal::new(15, 1).unwrap()))
        );
        assert_eq!(
            aggregate(
                AggregateFunction::Sum,
                false,
                [int(1), ExpressionTerm::StringLiteral("a".into())]
            ),
            None
        );
        assert_eq!(
            aggregate(AggregateFunction::Sum, true, [int(1), int(1), int(2)]),
            Some(int(3))
        );
    }

    #[test]
    fn test_min_max() {
        let values = [int(3), ExpressionTerm::StringLiteral("a".into()), int(1), int(2)];
        assert_eq!(
            aggregate(AggregateFunction::Min, false, values.clone()),
            Some(int(1))
        );
        assert_eq!(aggregate(AggregateFunction::Max, false, values), Some(int(3)));
    }

    #[test]
    fn test_group_concat() {
        let lang = |v: &str| ExpressionTerm::LangStringLiteral {
            value: v.into(),
            language: "en".into(),
        };
        assert_eq!(
            aggregate(
                AggregateFunction::GroupConcat { separator: None },
                false,
                [lang("a"), lang("b")]
            ),
            Some(lang("a b"))
        );
        assert_eq!(
            aggregate(
                AggregateFunction::GroupConcat {
                    separator: Some(", ".into())
                },
                false,
                [lang("a"), int(1)]
            ),
            Some(ExpressionTerm::StringLiteral("a, 1".into()))
        );
    }

    #[test]
    fn test_count_distinct_rows() {
        let mut row = Binding::default();
        row.set(0, rdfterm::Literal::from(1).into());
        let mut aggregator = Aggregator::count_rows(true);
        aggregator.add_row(&row);
        aggregator.add_row(&row);
        aggregator.add_row(&Binding::default());
        assert_eq!(aggregator.finish(), Some(int(2)));
    }
}
