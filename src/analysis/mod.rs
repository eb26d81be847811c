//! Static analysis of candidate handler source.
//!
//! Parses the candidate with tree-sitter's Python grammar, rejects what the
//! grammar tolerates but Python 3 does not, and probes the tree for the pieces
//! of the [`HandlerConvention`]. Nothing is executed. The
//! analyzer never fails once constructed: anything it cannot establish simply
//! contributes no points.

mod python3;

use crate::config::settings::HandlerConvention;
use crate::config::types::{Result, ScoreboxError};
use serde::{Deserialize, Serialize};
use tree_sitter::{Language, Node, Parser};

/// Import of the base-handler module
pub const IMPORT_POINTS: u32 = 5;
/// A class deriving from the base type
pub const BASE_CLASS_POINTS: u32 = 5;
/// The entry method on the first such class
pub const ENTRY_METHOD_POINTS: u32 = 10;

/// What the analyzer established about one candidate
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub syntax_ok: bool,
    pub has_base_import: bool,
    pub has_base_class: bool,
    pub has_entry_method: bool,
    /// Top-level class the sandbox children will instantiate
    pub entry_point: Option<String>,
}

impl AnalysisReport {
    fn syntax_error() -> Self {
        Self::default()
    }

    /// 0..=20; always 0 when the syntax is invalid
    pub fn structure_score(&self) -> u32 {
        if !self.syntax_ok {
            return 0;
        }
        let mut score = 0;
        if self.has_base_import {
            score += IMPORT_POINTS;
        }
        if self.has_base_class {
            score += BASE_CLASS_POINTS;
        }
        if self.has_entry_method {
            score += ENTRY_METHOD_POINTS;
        }
        score
    }
}

/// In-process syntax and structure checker
#[derive(Clone)]
pub struct StaticAnalyzer {
    language: Language,
    convention: HandlerConvention,
}

impl StaticAnalyzer {
    pub fn new(convention: HandlerConvention) -> Result<Self> {
        let language: Language = tree_sitter_python::LANGUAGE.into();

        // Fail at construction rather than on every candidate.
        let mut parser = Parser::new();
        parser
            .set_language(&language)
            .map_err(|e| ScoreboxError::Analyzer(format!("python grammar unusable: {e}")))?;

        Ok(Self {
            language,
            convention,
        })
    }

    pub fn convention(&self) -> &HandlerConvention {
        &self.convention
    }

    pub fn analyze(&self, source: &str) -> AnalysisReport {
        let mut parser = Parser::new();
        if let Err(e) = parser.set_language(&self.language) {
            log::error!("python grammar rejected by parser: {}", e);
            return AnalysisReport::syntax_error();
        }

        let tree = match parser.parse(source, None) {
            Some(tree) => tree,
            None => {
                log::warn!("parser returned no tree; treating candidate as unparseable");
                return AnalysisReport::syntax_error();
            }
        };

        let root = tree.root_node();
        if root.has_error() {
            log::debug!("candidate has syntax errors at {:?}", first_error(root).map(|n| n.start_position()));
            return AnalysisReport::syntax_error();
        }
        if let Some(rejection) = python3::first_rejection(root, source) {
            log::debug!(
                "candidate rejected at {}:{}: {}",
                rejection.row + 1,
                rejection.column + 1,
                rejection.reason
            );
            return AnalysisReport::syntax_error();
        }

        let bytes = source.as_bytes();
        let has_base_import = self.has_base_import(root, bytes);

        let classes = descendants_of_kind(root, "class_definition");
        let handler_classes: Vec<Node> = classes
            .iter()
            .copied()
            .filter(|class| self.derives_from_base(*class, bytes))
            .collect();

        let has_entry_method = handler_classes
            .first()
            .map(|class| self.defines_entry_method(*class, bytes))
            .unwrap_or(false);

        AnalysisReport {
            syntax_ok: true,
            has_base_import,
            has_base_class: !handler_classes.is_empty(),
            has_entry_method,
            entry_point: self.resolve_entry_point(root, bytes),
        }
    }

    fn has_base_import(&self, root: Node, bytes: &[u8]) -> bool {
        let module = self.convention.base_module.as_str();

        let from_imports = descendants_of_kind(root, "import_from_statement")
            .into_iter()
            .filter_map(|stmt| stmt.child_by_field_name("module_name"))
            .any(|name| node_text(name, bytes).is_some_and(|text| text.contains(module)));
        if from_imports {
            return true;
        }

        descendants_of_kind(root, "import_statement")
            .into_iter()
            .any(|stmt| {
                let mut cursor = stmt.walk();
                let names: Vec<Node> = stmt.children_by_field_name("name", &mut cursor).collect();
                names.into_iter().any(|name| {
                    let dotted = match name.kind() {
                        "aliased_import" => name.child_by_field_name("name"),
                        _ => Some(name),
                    };
                    dotted
                        .and_then(|n| node_text(n, bytes))
                        .is_some_and(|text| text.contains(module))
                })
            })
    }

    fn derives_from_base(&self, class: Node, bytes: &[u8]) -> bool {
        let Some(bases) = class.child_by_field_name("superclasses") else {
            return false;
        };
        let base_type = self.convention.base_type.as_str();
        let mut cursor = bases.walk();
        let named: Vec<Node> = bases.named_children(&mut cursor).collect();
        named.into_iter().any(|base| match base.kind() {
            "identifier" => node_text(base, bytes) == Some(base_type),
            // `module.HotHandler`
            "attribute" => base
                .child_by_field_name("attribute")
                .and_then(|attr| node_text(attr, bytes))
                == Some(base_type),
            _ => false,
        })
    }

    fn defines_entry_method(&self, class: Node, bytes: &[u8]) -> bool {
        let Some(body) = class.child_by_field_name("body") else {
            return false;
        };
        let method = self.convention.entry_method.as_str();
        let mut cursor = body.walk();
        let members: Vec<Node> = body.named_children(&mut cursor).collect();
        members.into_iter().any(|member| {
            let function = match member.kind() {
                "function_definition" => Some(member),
                "decorated_definition" => member
                    .child_by_field_name("definition")
                    .filter(|def| def.kind() == "function_definition"),
                _ => None,
            };
            function
                .and_then(|f| f.child_by_field_name("name"))
                .and_then(|name| node_text(name, bytes))
                == Some(method)
        })
    }

    /// First top-level class deriving from the base type, else the first
    /// top-level class whose name carries the entry suffix.
    fn resolve_entry_point(&self, root: Node, bytes: &[u8]) -> Option<String> {
        let top_level = top_level_classes(root);

        let derived = top_level
            .iter()
            .find(|class| self.derives_from_base(**class, bytes));
        let chosen = derived.or_else(|| {
            top_level.iter().find(|class| {
                class_name(**class, bytes)
                    .is_some_and(|name| name.ends_with(self.convention.entry_suffix.as_str()))
            })
        })?;

        class_name(*chosen, bytes).map(str::to_string)
    }
}

fn node_text<'s>(node: Node, bytes: &'s [u8]) -> Option<&'s str> {
    node.utf8_text(bytes).ok()
}

fn class_name<'s>(class: Node, bytes: &'s [u8]) -> Option<&'s str> {
    class
        .child_by_field_name("name")
        .and_then(|name| node_text(name, bytes))
}

/// Pre-order (document order) collection of every node of `kind`
fn descendants_of_kind<'t>(root: Node<'t>, kind: &str) -> Vec<Node<'t>> {
    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.kind() == kind {
            found.push(node);
        }
        let mut cursor = node.walk();
        let children: Vec<Node<'t>> = node.named_children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    found
}

fn top_level_classes<'t>(root: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = root.walk();
    let statements: Vec<Node<'t>> = root.named_children(&mut cursor).collect();
    statements
        .into_iter()
        .filter_map(|stmt| match stmt.kind() {
            "class_definition" => Some(stmt),
            "decorated_definition" => stmt
                .child_by_field_name("definition")
                .filter(|def| def.kind() == "class_definition"),
            _ => None,
        })
        .collect()
}

fn first_error(root: Node) -> Option<Node> {
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if node.is_error() || node.is_missing() {
            return Some(node);
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node.children(&mut cursor).collect();
        stack.extend(children.into_iter().rev());
    }
    None
}
