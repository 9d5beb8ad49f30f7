//! Partial solutions threaded through the evaluation.
//!
//! Variables are identified by their position in the variable table built when a query is compiled.

use rdfterm::Term;
use std::hash::{Hash, Hasher};

/// An immutable partial solution.
///
/// Two bindings are equal if they bind the same positions to the same terms,
/// whatever their capacity.
#[derive(Clone, Debug, Default)]
pub struct Binding {
    inner: Vec<Option<Term>>,
}

impl Binding {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Vec::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    pub fn contains(&self, index: usize) -> bool {
        self.inner.get(index).is_some_and(Option::is_some)
    }

    pub fn get(&self, index: usize) -> Option<&Term> {
        self.inner.get(index).unwrap_or(&None).as_ref()
    }

    pub fn set(&mut self, index: usize, value: Term) {
        if self.inner.len() <= index {
            self.inner.resize(index + 1, None);
        }
        self.inner[index] = Some(value);
    }

    pub fn unset(&mut self, index: usize) {
        if let Some(v) = self.inner.get_mut(index) {
            *v = None;
        }
    }

    /// The bound positions with their values.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Term)> {
        self.inner
            .iter()
            .enumerate()
            .filter_map(|(i, v)| Some((i, v.as_ref()?)))
    }

    pub fn is_empty(&self) -> bool {
        self.inner.iter().all(Option::is_none)
    }

    /// Merges two bindings, returning `None` if they bind a common variable to different terms.
    pub fn merge(&self, other: &Self) -> Option<Self> {
        if self.inner.len() < other.inner.len() {
            let mut result = other.inner.clone();
            for (key, self_value) in self.inner.iter().enumerate() {
                if let Some(self_value) = self_value {
                    match &other.inner[key] {
                        Some(other_value) => {
                            if self_value != other_value {
                                return None;
                            }
                        }
                        None => result[key] = Some(self_value.clone()),
                    }
                }
            }
            Some(Self { inner: result })
        } else {
            let mut result = self.inner.clone();
            for (key, other_value) in other.inner.iter().enumerate() {
                if let Some(other_value) = other_value {
                    match &self.inner[key] {
                        Some(self_value) => {
                            if self_value != other_value {
                                return None;
                            }
                        }
                        None => result[key] = Some(other_value.clone()),
                    }
                }
            }
            Some(Self { inner: result })
        }
    }

    /// Checks that no common variable is bound to different terms.
    pub fn is_compatible_with(&self, other: &Self) -> bool {
        self.inner
            .iter()
            .zip(&other.inner)
            .all(|(a, b)| match (a, b) {
                (Some(a), Some(b)) => a == b,
                _ => true,
            })
    }

    /// Checks that the two bindings have no bound variable in common.
    pub fn is_disjoint_with(&self, other: &Self) -> bool {
        self.inner
            .iter()
            .zip(&other.inner)
            .all(|(a, b)| a.is_none() || b.is_none())
    }

    /// Keeps only the given positions.
    pub fn project(&self, positions: &[usize]) -> Self {
        let mut result = Self::with_capacity(self.inner.len());
        for position in positions {
            if let Some(value) = self.get(*position) {
                result.set(*position, value.clone());
            }
        }
        result
    }

    fn trimmed(&self) -> &[Option<Term>] {
        let len = self
            .inner
            .iter()
            .rposition(Option::is_some)
            .map_or(0, |i| i + 1);
        &self.inner[..len]
    }
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        self.trimmed() == other.trimmed()
    }
}

impl Eq for Binding {}

impl Hash for Binding {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.trimmed().hash(state)
    }
}

impl From<Vec<Option<Term>>> for Binding {
    fn from(inner: Vec<Option<Term>>) -> Self {
        Self { inner }
    }
}

impl From<Binding> for Vec<Option<Term>> {
    fn from(binding: Binding) -> Self {
        binding.inner
    }
}

/// A variable is already bound to another term in a [`ScopedBinding`].
#[derive(Debug, thiserror::Error)]
#[error("The variable at position {0} is already bound to an other term")]
pub struct AlreadyBound(pub usize);

/// A mutable binding made of nested scopes on top of a frozen base.
///
/// Used by the depth first matching of basic graph patterns:
/// each matched triple pattern pushes a scope, backtracking pops it.
#[derive(Debug)]
pub struct ScopedBinding {
    base: Binding,
    scopes: Vec<Vec<(usize, Term)>>,
}

impl ScopedBinding {
    pub fn new(base: Binding) -> Self {
        Self {
            base,
            scopes: Vec::new(),
        }
    }

    pub fn get(&self, index: usize) -> Option<&Term> {
        for scope in self.scopes.iter().rev() {
            for (i, value) in scope {
                if *i == index {
                    return Some(value);
                }
            }
        }
        self.base.get(index)
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(Vec::new());
    }

    /// Drops the innermost scope and everything bound in it.
    pub fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    pub fn depth(&self) -> usize {
        self.scopes.len()
    }

    /// Binds a variable in the innermost scope.
    ///
    /// Binding a variable again to the same term is a no-op.
    pub fn bind(&mut self, index: usize, value: Term) -> Result<(), AlreadyBound> {
        if let Some(existing) = self.get(index) {
            return if *existing == value {
                Ok(())
            } else {
                Err(AlreadyBound(index))
            };
        }
        match self.scopes.last_mut() {
            Some(scope) => scope.push((index, value)),
            None => self.base.set(index, value),
        }
        Ok(())
    }

    /// Freezes the current state into an immutable [`Binding`].
    pub fn snapshot(&self) -> Binding {
        let mut result = self.base.clone();
        for scope in &self.scopes {
            for (index, value) in scope {
                result.set(*index, value.clone());
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdfterm::{Literal, NamedNode};

    fn iri(name: &str) -> Term {
        NamedNode::new_unchecked(format!("http://example.com/{name}")).into()
    }

    fn binding(values: &[(usize, Term)]) -> Binding {
        let mut result = Binding::default();
        for (i, v) in values {
            result.set(*i, v.clone());
        }
        result
    }

    #[test]
    fn test_merge() {
        let a = binding(&[(0, iri("a"))]);
        let b = binding(&[(2, iri("b"))]);
        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.get(0), Some(&iri("a")));
        assert_eq!(merged.get(2), Some(&iri("b")));
        assert_eq!(b.merge(&a), Some(merged));

        let c = binding(&[(0, iri("c"))]);
        assert_eq!(a.merge(&c), None);
        assert!(!a.is_compatible_with(&c));
        assert!(a.is_compatible_with(&b));
    }

    #[test]
    fn test_disjoint() {
        let a = binding(&[(0, iri("a")), (1, iri("b"))]);
        assert!(a.is_disjoint_with(&binding(&[(2, iri("b"))])));
        assert!(!a.is_disjoint_with(&binding(&[(1, iri("b"))])));
        assert!(a.is_disjoint_with(&Binding::default()));
    }

    #[test]
    fn test_equality_ignores_capacity() {
        let mut a = Binding::with_capacity(10);
        a.set(5, iri("a"));
        a.unset(5);
        a.set(1, Literal::from(1).into());
        let b = binding(&[(1, Literal::from(1).into())]);
        assert_eq!(a, b);
        let mut set = rustc_hash::FxHashSet::default();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_project() {
        let a = binding(&[(0, iri("a")), (1, iri("b")), (2, iri("c"))]);
        let projected = a.project(&[0, 2, 7]);
        assert_eq!(projected, binding(&[(0, iri("a")), (2, iri("c"))]));
    }

    #[test]
    fn test_scopes() {
        let mut scoped = ScopedBinding::new(binding(&[(0, iri("a"))]));
        scoped.push_scope();
        scoped.bind(1, iri("b")).unwrap();
        scoped.bind(0, iri("a")).unwrap();
        assert!(scoped.bind(0, iri("z")).is_err());
        scoped.push_scope();
        scoped.bind(2, iri("c")).unwrap();
        assert_eq!(scoped.depth(), 2);
        assert_eq!(
            scoped.snapshot(),
            binding(&[(0, iri("a")), (1, iri("b")), (2, iri("c"))])
        );
        scoped.pop_scope();
        assert_eq!(scoped.get(2), None);
        assert_eq!(scoped.get(1), Some(&iri("b")));
        scoped.pop_scope();
        assert_eq!(scoped.snapshot(), binding(&[(0, iri("a"))]));
    }
}
