use crate::error::QueryEvaluationError;
use rdfterm::{Term, Triple, Variable};
use std::fmt;
use std::ops::Index;
use std::sync::Arc;

type Fallible<'a, T> = Box<dyn Iterator<Item = Result<T, QueryEvaluationError>> + 'a>;

/// What a query evaluates to, depending on its form.
pub enum QueryResults<'a> {
    /// The rows of a `SELECT` query.
    Solutions(QuerySolutionIter<'a>),
    /// The answer of an `ASK` query.
    Boolean(bool),
    /// The triples built by a `CONSTRUCT` or `DESCRIBE` query.
    Graph(QueryTripleIter<'a>),
}

macro_rules! results_from {
    ($($variant:ident($value:ty)),*) => {
        $(
            impl<'a> From<$value> for QueryResults<'a> {
                #[inline]
                fn from(value: $value) -> Self {
                    Self::$variant(value)
                }
            }
        )*
    };
}

results_from!(Solutions(QuerySolutionIter<'a>), Boolean(bool), Graph(QueryTripleIter<'a>));

/// One row of a `SELECT` result: a value or nothing for each projected variable.
///
/// ```
/// use rdfterm::{Literal, Variable};
/// use sparexec::QuerySolution;
///
/// let solution = QuerySolution::from((
///     vec![Variable::new("foo")?, Variable::new("bar")?],
///     vec![Some(Literal::from(1).into()), None],
/// ));
/// assert_eq!(solution.get("foo"), Some(&Literal::from(1).into()));
/// assert_eq!(solution.get(1), None); // ?bar is unbound
/// # Result::<_, rdfterm::VariableNameParseError>::Ok(())
/// ```
pub struct QuerySolution {
    variables: Arc<[Variable]>,
    values: Vec<Option<Term>>,
}

impl QuerySolution {
    /// The value of a column, given by its position ([`usize`]) or its variable ([`&str`](str), [`Variable`] or [`&Variable`]).
    #[inline]
    pub fn get(&self, index: impl VariableSolutionIndex) -> Option<&Term> {
        self.values.get(index.position(&self.variables)?)?.as_ref()
    }

    /// The number of columns, bound or not.
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` if no column is bound.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }

    /// The bound columns, in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&Variable, &Term)> {
        self.variables
            .iter()
            .zip(&self.values)
            .filter_map(|(variable, value)| Some((variable, value.as_ref()?)))
    }

    #[inline]
    pub fn values(&self) -> &[Option<Term>] {
        &self.values
    }

    #[inline]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }
}

impl<V: Into<Arc<[Variable]>>, S: Into<Vec<Option<Term>>>> From<(V, S)> for QuerySolution {
    #[inline]
    fn from((variables, values): (V, S)) -> Self {
        Self {
            variables: variables.into(),
            values: values.into(),
        }
    }
}

impl<I: VariableSolutionIndex + fmt::Display + Copy> Index<I> for QuerySolution {
    type Output = Term;

    #[expect(clippy::panic)]
    #[inline]
    fn index(&self, index: I) -> &Term {
        self.get(index)
            .unwrap_or_else(|| panic!("{index} is not bound in this solution"))
    }
}

/// Column order does not matter: two solutions are equal if they have the same bound variables with the same values.
impl PartialEq for QuerySolution {
    fn eq(&self, other: &Self) -> bool {
        self.iter().count() == other.iter().count()
            && self.iter().all(|(variable, value)| other.get(variable) == Some(value))
    }
}

impl Eq for QuerySolution {}

impl fmt::Debug for QuerySolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Something pointing to a column of a [`QuerySolution`].
///
/// See [`QuerySolution::get`].
pub trait VariableSolutionIndex {
    fn position(self, variables: &[Variable]) -> Option<usize>;
}

impl VariableSolutionIndex for usize {
    #[inline]
    fn position(self, _: &[Variable]) -> Option<usize> {
        Some(self)
    }
}

impl VariableSolutionIndex for &str {
    #[inline]
    fn position(self, variables: &[Variable]) -> Option<usize> {
        variables.iter().position(|v| v.as_str() == self)
    }
}

impl VariableSolutionIndex for &Variable {
    #[inline]
    fn position(self, variables: &[Variable]) -> Option<usize> {
        variables.iter().position(|v| v == self)
    }
}

impl VariableSolutionIndex for Variable {
    #[inline]
    fn position(self, variables: &[Variable]) -> Option<usize> {
        (&self).position(variables)
    }
}

/// The rows of a `SELECT` result.
///
/// The solutions are computed lazily: dropping the iterator stops the evaluation.
pub struct QuerySolutionIter<'a> {
    variables: Arc<[Variable]>,
    inner: Fallible<'a, QuerySolution>,
}

impl<'a> QuerySolutionIter<'a> {
    /// Wraps solutions computed elsewhere, for example by a [`ServiceHandler`](crate::ServiceHandler).
    pub fn new(
        variables: Arc<[Variable]>,
        solutions: impl IntoIterator<Item = Result<QuerySolution, QueryEvaluationError>> + 'a,
    ) -> Self {
        Self {
            variables,
            inner: Box::new(solutions.into_iter()),
        }
    }

    /// Builds the solutions from rows of values, given in the order of `variables`.
    pub fn from_rows(
        variables: Arc<[Variable]>,
        rows: impl IntoIterator<Item = Result<Vec<Option<Term>>, QueryEvaluationError>> + 'a,
    ) -> Self {
        let columns = Arc::clone(&variables);
        Self::new(
            variables,
            rows.into_iter()
                .map(move |row| Ok(QuerySolution::from((Arc::clone(&columns), row?)))),
        )
    }

    /// The projected variables, in column order.
    #[inline]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }
}

/// The triples built by a `CONSTRUCT` or `DESCRIBE` query.
pub struct QueryTripleIter<'a> {
    inner: Fallible<'a, Triple>,
}

impl<'a> QueryTripleIter<'a> {
    pub(crate) fn new(
        triples: impl Iterator<Item = Result<Triple, QueryEvaluationError>> + 'a,
    ) -> Self {
        Self {
            inner: Box::new(triples),
        }
    }
}

macro_rules! fallible_iterator {
    ($($iter:ident => $item:ty),*) => {
        $(
            impl Iterator for $iter<'_> {
                type Item = Result<$item, QueryEvaluationError>;

                #[inline]
                fn next(&mut self) -> Option<Self::Item> {
                    self.inner.next()
                }

                #[inline]
                fn size_hint(&self) -> (usize, Option<usize>) {
                    self.inner.size_hint()
                }
            }
        )*
    };
}

fallible_iterator!(QuerySolutionIter => QuerySolution, QueryTripleIter => Triple);

#[cfg(test)]
mod tests {
    use super::*;
    use rdfterm::Literal;

    #[test]
    fn test_solution_equality_ignores_variable_order() {
        let a = QuerySolution::from((
            vec![Variable::new_unchecked("a"), Variable::new_unchecked("b")],
            vec![Some(Literal::from(1).into()), None],
        ));
        let b = QuerySolution::from((
            vec![Variable::new_unchecked("b"), Variable::new_unchecked("a")],
            vec![None, Some(Literal::from(1).into())],
        ));
        assert_eq!(a, b);
        assert_eq!(a["a"], Literal::from(1).into());
        assert_eq!(a.get(&Variable::new_unchecked("b")), None);
        assert_eq!(a.len(), 2);
        assert!(!a.is_empty());
    }
}
