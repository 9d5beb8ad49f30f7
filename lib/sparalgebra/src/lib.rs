#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![doc(test(attr(deny(warnings))))]

pub mod algebra;
pub mod ast;
mod error;
mod query;
pub mod term;
mod translator;
mod update;

pub use error::{ResolutionError, SyntaxLoweringError, TranslationError};
pub use query::*;
pub use translator::QueryTranslator;
pub use update::*;
