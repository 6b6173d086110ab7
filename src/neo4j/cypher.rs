// incident_ingestor/src/neo4j/cypher.rs
// Translates planned operations into parameterized Cypher statements.

use std::collections::HashMap;

use crate::error::{IngestorError, Result};
use crate::plan::{NodeRef, Operation, Properties};
use crate::schema::{Label, validate_identifier};

/// One `UNWIND $rows` statement and the rows bound to it.
///
/// Node rows carry `key` and `props`; relationship rows carry `from` and `to`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub text: String,
    pub rows: Vec<Vec<(&'static str, Properties)>>,
}

fn key_pattern(node: &NodeRef, param: &str) -> Result<String> {
    let fields = node
        .key
        .keys()
        .map(|k| {
            validate_identifier(k)?;
            Ok(format!("{k}: row.{param}.{k}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(format!("{}:{} {{{}}}", if param == "to" { "b" } else { "a" }, node.label, fields.join(", ")))
}

fn node_statement(node: &NodeRef) -> Result<String> {
    let fields = node
        .key
        .keys()
        .map(|k| {
            validate_identifier(k)?;
            Ok(format!("{k}: row.key.{k}"))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(format!(
        "UNWIND $rows AS row MERGE (n:{} {{{}}}) SET n += row.props",
        node.label,
        fields.join(", ")
    ))
}

/// Compiles one batch.
///
/// Node merges are emitted before relationship merges, and operations sharing
/// a statement shape are folded together in first-seen order. Relationship
/// endpoints are MATCHed, so a missing endpoint leaves the merge a no-op.
pub fn compile_batch(batch: &[Operation]) -> Result<Vec<Statement>> {
    let mut node_stmts: Vec<Statement> = Vec::new();
    let mut rel_stmts: Vec<Statement> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for op in batch {
        let (text, row, is_node) = match op {
            Operation::Node(upsert) => (
                node_statement(&upsert.node)?,
                vec![("key", upsert.node.key.clone()), ("props", upsert.props.clone())],
                true,
            ),
            Operation::Relationship(rel) => {
                validate_identifier(&rel.rel_type)?;
                let (from_label, to_label) = rel.kind.endpoints();
                if rel.from.label != from_label || rel.to.label != to_label {
                    return Err(IngestorError::InvalidIdentifier(format!(
                        "{} from {} to {}",
                        rel.rel_type, rel.from.label, rel.to.label
                    )));
                }
                let text = format!(
                    "UNWIND $rows AS row MATCH ({}) MATCH ({}) MERGE (a)-[:{}]->(b)",
                    key_pattern(&rel.from, "from")?,
                    key_pattern(&rel.to, "to")?,
                    rel.rel_type
                );
                (text, vec![("from", rel.from.key.clone()), ("to", rel.to.key.clone())], false)
            },
        };

        let target = if is_node { &mut node_stmts } else { &mut rel_stmts };
        match index.get(&text) {
            Some(idx) => target[*idx].rows.push(row),
            None => {
                index.insert(text.clone(), target.len());
                target.push(Statement { text, rows: vec![row] });
            },
        }
    }

    node_stmts.extend(rel_stmts);
    Ok(node_stmts)
}

/// Constraint and index statements for the merge keys of `labels`.
pub fn constraint_statements(labels: &[Label]) -> Vec<String> {
    labels
        .iter()
        .map(|label| {
            let fields = label.key_fields();
            let name = format!("{}_{}", label.as_str().to_lowercase(), fields.join("_"));
            if fields.len() == 1 {
                format!(
                    "CREATE CONSTRAINT {name} IF NOT EXISTS FOR (n:{label}) REQUIRE n.{} IS UNIQUE",
                    fields[0]
                )
            } else {
                let props = fields.iter().map(|f| format!("n.{f}")).collect::<Vec<_>>().join(", ");
                format!("CREATE INDEX {name} IF NOT EXISTS FOR (n:{label}) ON ({props})")
            }
        })
        .collect()
}
