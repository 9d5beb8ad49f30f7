use crate::binding::Binding;
use oxiri::Iri;
use oxsdatatypes::DateTime;
use rand::random;
use rdfterm::{BlankNode, NamedNode, Term};
use rustc_hash::FxHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

pub type CustomFunctionRegistry =
    HashMap<NamedNode, Arc<dyn (Fn(&[Term]) -> Option<Term>) + Send + Sync>>;

/// The state shared by all the operators of a single query execution.
pub struct QueryContext {
    /// The value of `NOW()`, fixed for the whole execution
    pub now: DateTime,
    pub base_iri: Option<Arc<Iri<String>>>,
    bnode_seed: u128,
}

impl QueryContext {
    pub fn new(now: Option<DateTime>, base_iri: Option<Arc<Iri<String>>>) -> Self {
        Self {
            now: now.unwrap_or_else(DateTime::now),
            base_iri,
            bnode_seed: random(),
        }
    }

    /// The blank node of `BNODE(label)`.
    ///
    /// It is the same for a given label and solution and differs between solutions and executions.
    pub fn labeled_blank_node(&self, solution: &Binding, label: &str) -> BlankNode {
        let mut hasher = FxHasher::default();
        solution.hash(&mut hasher);
        label.hash(&mut hasher);
        let hash = u128::from(hasher.finish());
        BlankNode::new_from_unique_id(self.bnode_seed ^ ((hash << 64) | hash))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdfterm::Literal;

    #[test]
    fn test_labeled_blank_nodes() {
        let context = QueryContext::new(None, None);
        let mut a = Binding::default();
        a.set(0, Literal::from(1).into());
        let mut b = Binding::default();
        b.set(0, Literal::from(2).into());
        assert_eq!(
            context.labeled_blank_node(&a, "x"),
            context.labeled_blank_node(&a, "x")
        );
        assert_ne!(
            context.labeled_blank_node(&a, "x"),
            context.labeled_blank_node(&a, "y")
        );
        assert_ne!(
            context.labeled_blank_node(&a, "x"),
            context.labeled_blank_node(&b, "x")
        );
    }
}
