//! Rdfterm provides the value types of the [RDF 1.1 data model](https://www.w3.org/TR/rdf11-concepts/)
//! used by the SPARQL translator and evaluator: IRIs, blank nodes, literals, query variables, triples and quads.
//!
//! It also provides [`Dataset`], an in-memory set of quads with explicit named graphs.
//!
//! Usage example:
//! ```
//! use rdfterm::{Dataset, GraphName, NamedNode, Quad};
//!
//! let ex = NamedNode::new("http://example.com")?;
//! let mut dataset = Dataset::new();
//! dataset.insert(Quad::new(ex.clone(), ex.clone(), ex.clone(), GraphName::DefaultGraph));
//!
//! let results = dataset
//!     .quads_for_pattern(Some(&ex.clone().into()), None, None, None)
//!     .count();
//! assert_eq!(results, 1);
//! # Result::<_, Box<dyn std::error::Error>>::Ok(())
//! ```
#![cfg_attr(docsrs, feature(doc_cfg))]

mod blank_node;
mod dataset;
mod literal;
mod name;
mod named_node;
mod term;
mod variable;
pub mod vocab;

pub use crate::blank_node::{BlankNode, BlankNodeIdParseError};
pub use crate::dataset::Dataset;
pub use crate::literal::Literal;
pub use crate::named_node::{NamedNode, NamedNodeRef};
pub use crate::term::{GraphName, NamedOrBlankNode, Quad, Term, Triple};
pub use crate::variable::{Variable, VariableNameParseError};
pub use oxilangtag::LanguageTagParseError;
pub use oxiri::IriParseError;
