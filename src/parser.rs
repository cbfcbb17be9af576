use std::collections::HashSet;
use std::sync::Arc;

use similar::TextDiff;
use thiserror::Error;
use tree_sitter::{Node, Parser};

use crate::mutants::{Mutation, MutationType, Source};
use crate::operators;

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("source origin is not set")]
    MissingOrigin,
    #[error("unknown mutation category '{0}'")]
    UnknownCategory(String),
    #[error("failed to parse {path}: {detail}")]
    Parse { path: String, detail: String },
}

/// One byte-range rewrite proposed by a mutator.
pub struct Candidate {
    pub start: usize,
    pub end: usize,
    pub replacement: Vec<u8>,
}

impl Candidate {
    fn replace(node: &Node<'_>, replacement: &[u8]) -> Self {
        Self {
            start: node.start_byte(),
            end: node.end_byte(),
            replacement: replacement.to_vec(),
        }
    }
}

/// A versioned mutation category: a predicate over AST nodes plus a candidate
/// generator. Categories register here; nothing else dispatches on names.
pub struct MutatorDef {
    pub name: &'static str,
    pub version: u32,
    pub applies: fn(&Node) -> bool,
    pub candidates: fn(&Node, &[u8]) -> Vec<Candidate>,
}

pub const CATALOG: &[MutatorDef] = &[
    MutatorDef {
        name: "arithmetic",
        version: 1,
        applies: is_binary_expression,
        candidates: arithmetic_candidates,
    },
    MutatorDef {
        name: "comparison",
        version: 1,
        applies: is_binary_expression,
        candidates: comparison_candidates,
    },
    MutatorDef {
        name: "logical",
        version: 1,
        applies: is_binary_expression,
        candidates: logical_candidates,
    },
    MutatorDef {
        name: "unary",
        version: 1,
        applies: is_unary_expression,
        candidates: unary_candidates,
    },
    MutatorDef {
        name: "boolean",
        version: 1,
        applies: is_boolean_literal,
        candidates: boolean_candidates,
    },
    MutatorDef {
        name: "numbers",
        version: 1,
        applies: is_number_literal,
        candidates: number_candidates,
    },
    MutatorDef {
        name: "loop",
        version: 1,
        applies: is_loop_condition_comparison,
        candidates: loop_candidates,
    },
    MutatorDef {
        name: "statement",
        version: 1,
        applies: is_deletable_statement,
        candidates: statement_candidates,
    },
    MutatorDef {
        name: "recursion",
        version: 1,
        applies: is_call_expression,
        candidates: recursion_candidates,
    },
];

pub fn lookup(name: &str) -> Option<&'static MutatorDef> {
    CATALOG.iter().find(|def| def.name == name)
}

pub fn default_categories() -> Vec<String> {
    CATALOG.iter().map(|def| def.name.to_string()).collect()
}

/// Build the mutation set for one file: a single pre-order AST walk, every
/// node dispatched to every requested category.
pub fn generate(
    source: &Arc<Source>,
    bytes: &[u8],
    categories: &[String],
) -> Result<Vec<Mutation>, GenerateError> {
    if source.origin.as_str().is_empty() {
        return Err(GenerateError::MissingOrigin);
    }

    let mut defs = Vec::with_capacity(categories.len());
    for category in categories {
        defs.push(lookup(category).ok_or_else(|| GenerateError::UnknownCategory(category.clone()))?);
    }

    let mut parser = Parser::new();
    let language = tree_sitter_go::LANGUAGE;
    parser
        .set_language(&language.into())
        .map_err(|e| GenerateError::Parse {
            path: source.origin.to_string(),
            detail: e.to_string(),
        })?;
    let tree = parser.parse(bytes, None).ok_or_else(|| GenerateError::Parse {
        path: source.origin.to_string(),
        detail: "parser produced no tree".to_string(),
    })?;
    let root = tree.root_node();
    if root.has_error() {
        return Err(GenerateError::Parse {
            path: source.origin.to_string(),
            detail: "file contains syntax errors".to_string(),
        });
    }

    let mut mutations = Vec::new();
    let mut seen = HashSet::new();
    walk(root, bytes, source, &defs, &mut mutations, &mut seen);
    Ok(mutations)
}

fn walk(
    node: Node,
    bytes: &[u8],
    source: &Arc<Source>,
    defs: &[&'static MutatorDef],
    mutations: &mut Vec<Mutation>,
    seen: &mut HashSet<String>,
) {
    for def in defs {
        if !(def.applies)(&node) {
            continue;
        }
        for candidate in (def.candidates)(&node, bytes) {
            if candidate.start > candidate.end || candidate.end > bytes.len() {
                continue;
            }
            let mut mutated =
                Vec::with_capacity(bytes.len() + candidate.replacement.len());
            mutated.extend_from_slice(&bytes[..candidate.start]);
            mutated.extend_from_slice(&candidate.replacement);
            mutated.extend_from_slice(&bytes[candidate.end..]);
            // No category may emit the original bytes back.
            if mutated == bytes {
                continue;
            }
            let mutator = MutationType::new(def.name, def.version);
            let id = Mutation::content_id(source.origin.as_str(), &mutator, &mutated);
            if !seen.insert(id.clone()) {
                continue;
            }
            let diff = unified_diff(bytes, &mutated, source.origin.as_str());
            mutations.push(Mutation {
                mutator,
                id,
                mutated,
                diff,
                source: Arc::clone(source),
            });
        }
    }

    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            walk(child, bytes, source, defs, mutations, seen);
        }
    }
}

/// Unified diff with 3 lines of context. Trailing newlines are normalized on
/// both sides so the output is byte-stable.
pub fn unified_diff(original: &[u8], mutated: &[u8], path: &str) -> String {
    let old = normalize_trailing_newline(original);
    let new = normalize_trailing_newline(mutated);
    TextDiff::from_lines(&old, &new)
        .unified_diff()
        .context_radius(3)
        .header(&format!("a/{path}"), &format!("b/{path}"))
        .to_string()
}

fn normalize_trailing_newline(bytes: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(bytes).into_owned();
    while text.ends_with('\n') {
        text.pop();
    }
    text.push('\n');
    text
}

/// Bytes of a node, or `None` when the range cannot be resolved. Nodes we
/// cannot resolve are skipped silently.
fn node_text<'a>(node: &Node, bytes: &'a [u8]) -> Option<&'a str> {
    bytes
        .get(node.start_byte()..node.end_byte())
        .and_then(|slice| std::str::from_utf8(slice).ok())
}

fn operator_node<'t>(node: &Node<'t>) -> Option<Node<'t>> {
    node.child_by_field_name("operator")
}

fn substitute_operator(
    node: &Node,
    bytes: &[u8],
    alternatives: fn(&str) -> Vec<&'static str>,
) -> Vec<Candidate> {
    let Some(op) = operator_node(node) else {
        return vec![];
    };
    let Some(text) = node_text(&op, bytes) else {
        return vec![];
    };
    alternatives(text)
        .into_iter()
        .map(|alt| Candidate::replace(&op, alt.as_bytes()))
        .collect()
}

fn is_binary_expression(node: &Node) -> bool {
    node.kind() == "binary_expression"
}

fn is_unary_expression(node: &Node) -> bool {
    node.kind() == "unary_expression"
}

fn is_boolean_literal(node: &Node) -> bool {
    matches!(node.kind(), "true" | "false")
}

fn is_number_literal(node: &Node) -> bool {
    matches!(node.kind(), "int_literal" | "float_literal")
}

fn is_call_expression(node: &Node) -> bool {
    node.kind() == "call_expression"
}

/// Comparison inside a `for` header: climbing to the enclosing for statement
/// must not cross a block, otherwise we are in the body.
fn is_loop_condition_comparison(node: &Node) -> bool {
    if node.kind() != "binary_expression" {
        return false;
    }
    let mut current = node.parent();
    while let Some(ancestor) = current {
        match ancestor.kind() {
            "block" => return false,
            "for_statement" => return true,
            _ => current = ancestor.parent(),
        }
    }
    false
}

const DELETABLE_STATEMENTS: &[&str] = &[
    "expression_statement",
    "assignment_statement",
    "defer_statement",
    "go_statement",
    "send_statement",
];

fn is_deletable_statement(node: &Node) -> bool {
    DELETABLE_STATEMENTS.contains(&node.kind())
}

fn arithmetic_candidates(node: &Node, bytes: &[u8]) -> Vec<Candidate> {
    substitute_operator(node, bytes, operators::arithmetic_alternatives)
}

fn comparison_candidates(node: &Node, bytes: &[u8]) -> Vec<Candidate> {
    substitute_operator(node, bytes, operators::comparison_alternatives)
}

fn logical_candidates(node: &Node, bytes: &[u8]) -> Vec<Candidate> {
    substitute_operator(node, bytes, operators::logical_alternatives)
}

fn unary_candidates(node: &Node, bytes: &[u8]) -> Vec<Candidate> {
    substitute_operator(node, bytes, operators::unary_alternatives)
}

fn loop_candidates(node: &Node, bytes: &[u8]) -> Vec<Candidate> {
    substitute_operator(node, bytes, operators::loop_boundary_alternatives)
}

fn boolean_candidates(node: &Node, bytes: &[u8]) -> Vec<Candidate> {
    let Some(text) = node_text(node, bytes) else {
        return vec![];
    };
    operators::boolean_alternatives(text)
        .into_iter()
        .map(|alt| Candidate::replace(node, alt.as_bytes()))
        .collect()
}

fn number_candidates(node: &Node, bytes: &[u8]) -> Vec<Candidate> {
    let Some(text) = node_text(node, bytes) else {
        return vec![];
    };
    operators::number_alternatives(text)
        .into_iter()
        .map(|alt| Candidate::replace(node, alt.as_bytes()))
        .collect()
}

/// Delete the whole statement, including its trailing newline.
fn statement_candidates(node: &Node, bytes: &[u8]) -> Vec<Candidate> {
    let mut end = node.end_byte();
    if bytes.get(end) == Some(&b'\n') {
        end += 1;
    }
    vec![Candidate {
        start: node.start_byte(),
        end,
        replacement: vec![],
    }]
}

/// Replace a self-recursive call with the neutral literal `0`.
fn recursion_candidates(node: &Node, bytes: &[u8]) -> Vec<Candidate> {
    let Some(callee) = node.child_by_field_name("function") else {
        return vec![];
    };
    if callee.kind() != "identifier" {
        return vec![];
    }
    let Some(called) = node_text(&callee, bytes) else {
        return vec![];
    };
    let mut current = node.parent();
    while let Some(ancestor) = current {
        if matches!(ancestor.kind(), "function_declaration" | "method_declaration") {
            let enclosing = ancestor
                .child_by_field_name("name")
                .and_then(|name| node_text(&name, bytes));
            if enclosing == Some(called) {
                return vec![Candidate::replace(node, b"0")];
            }
            return vec![];
        }
        current = ancestor.parent();
    }
    vec![]
}
