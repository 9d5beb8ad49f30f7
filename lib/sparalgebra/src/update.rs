use crate::algebra::*;
use crate::term::*;
use oxiri::Iri;
use std::fmt;

/// A translated update request, applied one operation after the other.
///
/// `ADD`, `MOVE` and `COPY` are lowered by the translator into the operations below.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct Update {
    pub base_iri: Option<Iri<String>>,
    pub operations: Vec<GraphUpdateOperation>,
}

impl Update {
    /// The S-expression form of the algebra, as printed in the logs.
    pub fn to_sse(&self) -> String {
        sse_to_string(|f| self.fmt_sse(f))
    }

    fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        if let Some(base_iri) = &self.base_iri {
            write!(f, "(base <{base_iri}> ")?;
        }
        f.write_str("(update")?;
        for op in &self.operations {
            f.write_str(" ")?;
            op.fmt_sse(f)?;
        }
        f.write_str(")")?;
        if self.base_iri.is_some() {
            f.write_str(")")?;
        }
        Ok(())
    }
}

impl fmt::Display for Update {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(base_iri) = &self.base_iri {
            writeln!(f, "BASE <{base_iri}>")?;
        }
        for update in &self.operations {
            writeln!(f, "{update} ;")?;
        }
        Ok(())
    }
}

/// One operation of an [`Update`].
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub enum GraphUpdateOperation {
    /// Adds ground quads.
    InsertData { data: Vec<Quad> },
    /// Removes ground quads.
    ///
    /// The quads never contain blank nodes.
    DeleteData { data: Vec<Quad> },
    /// Instantiates both templates for every row of the pattern, then deletes before inserting.
    DeleteInsert {
        delete: Vec<QuadPattern>,
        insert: Vec<QuadPattern>,
        using: Option<QueryDataset>,
        pattern: Box<GraphPattern>,
    },
    /// Fetches a document into a graph. Loading is not supported by the evaluator, only `SILENT` loads succeed.
    Load {
        silent: bool,
        source: NamedNode,
        destination: GraphName,
    },
    /// Empties the targeted graphs.
    Clear { silent: bool, graph: GraphTarget },
    /// Declares an empty named graph.
    Create { silent: bool, graph: NamedNode },
    /// Removes the targeted graphs.
    Drop { silent: bool, graph: GraphTarget },
}

/// The name of a graph management operation in both textual forms.
struct Keyword {
    sse: &'static str,
    sparql: &'static str,
    silent: bool,
}

impl Keyword {
    fn write_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(f, "({}{} ", self.sse, if self.silent { " silent" } else { "" })
    }

    fn write_sparql(&self, f: &mut impl fmt::Write) -> fmt::Result {
        write!(f, "{}{} ", self.sparql, if self.silent { " SILENT" } else { "" })
    }
}

impl GraphUpdateOperation {
    fn keyword(&self) -> Option<Keyword> {
        let (sse, sparql, silent) = match self {
            Self::InsertData { .. } | Self::DeleteData { .. } | Self::DeleteInsert { .. } => {
                return None;
            }
            Self::Load { silent, .. } => ("load", "LOAD", silent),
            Self::Clear { silent, .. } => ("clear", "CLEAR", silent),
            Self::Create { silent, .. } => ("create", "CREATE", silent),
            Self::Drop { silent, .. } => ("drop", "DROP", silent),
        };
        Some(Keyword {
            sse,
            sparql,
            silent: *silent,
        })
    }

    fn fmt_sse(&self, f: &mut impl fmt::Write) -> fmt::Result {
        if let Some(keyword) = self.keyword() {
            keyword.write_sse(f)?;
        }
        match self {
            Self::InsertData { data } => {
                f.write_str("(insertData (")?;
                write_data(f, data, Syntax::Sse)?;
                f.write_str("))")
            }
            Self::DeleteData { data } => {
                f.write_str("(deleteData (")?;
                write_data(f, data, Syntax::Sse)?;
                f.write_str("))")
            }
            Self::DeleteInsert {
                delete,
                insert,
                using,
                pattern,
            } => {
                f.write_str("(modify ")?;
                match using {
                    Some(using) => {
                        f.write_str("(using ")?;
                        using.fmt_sse(f)?;
                        f.write_str(" ")?;
                        pattern.fmt_sse(f)?;
                        f.write_str(")")?;
                    }
                    None => pattern.fmt_sse(f)?,
                }
                for (name, template) in [("delete", delete), ("insert", insert)] {
                    if template.is_empty() {
                        continue;
                    }
                    write!(f, " ({name} (")?;
                    for (i, quad) in template.iter().enumerate() {
                        if i > 0 {
                            f.write_str(" ")?;
                        }
                        quad.fmt_sse(f)?;
                    }
                    f.write_str("))")?;
                }
                f.write_str(")")
            }
            Self::Load {
                source,
                destination,
                ..
            } => write!(f, "{source} {destination})"),
            Self::Clear { graph, .. } | Self::Drop { graph, .. } => {
                graph.fmt_sse(f)?;
                f.write_str(")")
            }
            Self::Create { graph, .. } => write!(f, "{graph})"),
        }
    }
}

impl fmt::Display for GraphUpdateOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(keyword) = self.keyword() {
            keyword.write_sparql(f)?;
        }
        match self {
            Self::InsertData { data } => {
                writeln!(f, "INSERT DATA {{")?;
                write_data(f, data, Syntax::Sparql)?;
                f.write_str("}")
            }
            Self::DeleteData { data } => {
                writeln!(f, "DELETE DATA {{")?;
                write_data(f, data, Syntax::Sparql)?;
                f.write_str("}")
            }
            Self::DeleteInsert {
                delete,
                insert,
                using,
                pattern,
            } => {
                for (name, template) in [("DELETE", delete), ("INSERT", insert)] {
                    if template.is_empty() {
                        continue;
                    }
                    writeln!(f, "{name} {{")?;
                    for quad in template {
                        writeln!(f, "\t{quad}")?;
                    }
                    writeln!(f, "}}")?;
                }
                if let Some(using) = using {
                    for graph in &using.default {
                        writeln!(f, "USING {graph}")?;
                    }
                    for graph in using.named.iter().flatten() {
                        writeln!(f, "USING NAMED {graph}")?;
                    }
                }
                write!(
                    f,
                    "WHERE {{ {} }}",
                    SparqlGraphRootPattern::new(pattern, None)
                )
            }
            Self::Load {
                source,
                destination,
                ..
            } => {
                write!(f, "{source}")?;
                if !destination.is_default_graph() {
                    write!(f, " INTO GRAPH {destination}")?;
                }
                Ok(())
            }
            Self::Clear { graph, .. } | Self::Drop { graph, .. } => write!(f, "{graph}"),
            Self::Create { graph, .. } => write!(f, "GRAPH {graph}"),
        }
    }
}

#[derive(Clone, Copy)]
enum Syntax {
    Sse,
    Sparql,
}

/// Writes ground quads, space separated in SSE and one per line in SPARQL.
fn write_data(f: &mut impl fmt::Write, quads: &[Quad], syntax: Syntax) -> fmt::Result {
    for (i, quad) in quads.iter().enumerate() {
        let triple = format!("{} {} {}", quad.subject, quad.predicate, quad.object);
        let graph = &quad.graph_name;
        match syntax {
            Syntax::Sse => {
                if i > 0 {
                    f.write_str(" ")?;
                }
                if graph.is_default_graph() {
                    write!(f, "(triple {triple})")?;
                } else {
                    write!(f, "(graph {graph} (triple {triple}))")?;
                }
            }
            Syntax::Sparql => {
                if graph.is_default_graph() {
                    writeln!(f, "\t{triple} .")?;
                } else {
                    writeln!(f, "\tGRAPH {graph} {{ {triple} }}")?;
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex(local: &str) -> NamedNode {
        NamedNode::new_unchecked(format!("http://example.com/{local}"))
    }

    #[test]
    fn test_graph_management_forms() {
        let update = Update {
            base_iri: None,
            operations: vec![
                GraphUpdateOperation::Clear {
                    silent: true,
                    graph: GraphTarget::NamedGraphs,
                },
                GraphUpdateOperation::Load {
                    silent: false,
                    source: ex("file"),
                    destination: ex("g").into(),
                },
            ],
        };
        assert_eq!(
            update.to_sse(),
            "(update (clear silent named) (load <http://example.com/file> <http://example.com/g>))"
        );
        assert_eq!(
            update.to_string(),
            "CLEAR SILENT NAMED ;\nLOAD <http://example.com/file> INTO GRAPH <http://example.com/g> ;\n"
        );
    }

    #[test]
    fn test_data_forms() {
        let operation = GraphUpdateOperation::InsertData {
            data: vec![
                Quad::new(ex("s"), ex("p"), ex("o"), GraphName::DefaultGraph),
                Quad::new(ex("s"), ex("p"), ex("o"), ex("g")),
            ],
        };
        assert_eq!(
            operation.to_string(),
            "INSERT DATA {\n\t<http://example.com/s> <http://example.com/p> <http://example.com/o> .\n\tGRAPH <http://example.com/g> { <http://example.com/s> <http://example.com/p> <http://example.com/o> }\n}"
        );
    }
}
