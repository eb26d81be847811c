/// Python 3 rules the tree-sitter grammar leaves unchecked
///
/// The grammar still parses Python 2 statements and several target, argument
/// and literal forms that CPython 3 refuses to compile. A tree without ERROR
/// nodes is only syntax-valid once [`first_rejection`] finds nothing.
use tree_sitter::Node;

const TAB_SIZE: usize = 8;

/// Soft keywords the grammar lets through as plain names
const RESERVED_NAMES: &[&str] = &["async", "await"];

/// Parents under which `:=` needs parentheses
const BARE_WALRUS_PARENTS: &[&str] = &[
    "expression_statement",
    "assignment",
    "augmented_assignment",
    "keyword_argument",
];

/// Clauses that open their own logical line inside a compound statement
const CLAUSE_KINDS: &[&str] = &[
    "elif_clause",
    "else_clause",
    "except_clause",
    "except_group_clause",
    "finally_clause",
    "case_clause",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Rejection {
    pub row: usize,
    pub column: usize,
    pub reason: &'static str,
}

impl Rejection {
    fn at(row: usize, column: usize, reason: &'static str) -> Self {
        Self { row, column, reason }
    }

    fn node(node: Node, reason: &'static str) -> Self {
        let start = node.start_position();
        Self::at(start.row, start.column, reason)
    }
}

/// First construct in document order that CPython 3 would reject
pub(crate) fn first_rejection(root: Node, source: &str) -> Option<Rejection> {
    let bytes = source.as_bytes();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        if let Some(reason) = reject_node(node, bytes) {
            return Some(Rejection::node(node, reason));
        }
        stack.extend(named(node).into_iter().rev());
    }
    inconsistent_indentation(root, source)
}

fn reject_node(node: Node, bytes: &[u8]) -> Option<&'static str> {
    match node.kind() {
        // `print >>f, x` is still a valid tuple expression in Python 3
        "print_statement" if !has_named(node, "chevron") => Some("print statement"),
        "exec_statement" => Some("exec statement"),
        "identifier" => text(node, bytes)
            .filter(|name| RESERVED_NAMES.contains(name))
            .map(|_| "keyword used as a name"),
        "named_expression" => node
            .parent()
            .filter(|parent| BARE_WALRUS_PARENTS.contains(&parent.kind()))
            .map(|_| "unparenthesized assignment expression"),
        "delete_statement" => named(node)
            .into_iter()
            .any(|target| !deletable(target))
            .then_some("cannot delete expression"),
        "augmented_assignment" => node
            .child_by_field_name("left")
            .filter(|left| !single_target(*left))
            .map(|_| "illegal target for augmented assignment"),
        "integer" => text(node, bytes).and_then(legacy_integer),
        "concatenated_string" => {
            mixes_bytes(node, bytes).then_some("cannot mix bytes and nonbytes literals")
        }
        "argument_list" => argument_order(node),
        // `[x for x in a, b]`
        "for_in_clause" => has_token(node, ",").then_some("unparenthesized tuple in comprehension"),
        _ => None,
    }
}

fn deletable(target: Node) -> bool {
    match target.kind() {
        "identifier" | "attribute" | "subscript" => true,
        "expression_list" | "tuple" | "list" | "parenthesized_expression" => {
            named(target).into_iter().all(deletable)
        }
        _ => false,
    }
}

fn single_target(target: Node) -> bool {
    match target.kind() {
        "identifier" | "attribute" | "subscript" => true,
        // `(x) += 1`
        "tuple_pattern" | "parenthesized_expression" => {
            let inner = named(target);
            inner.len() == 1 && !has_token(target, ",") && single_target(inner[0])
        }
        _ => false,
    }
}

fn legacy_integer(literal: &str) -> Option<&'static str> {
    if literal.ends_with(|c: char| matches!(c, 'l' | 'L')) {
        return Some("long integer suffix");
    }
    if literal.ends_with(|c: char| matches!(c, 'j' | 'J')) {
        return None;
    }
    let digits: Vec<char> = literal.chars().filter(|c| *c != '_').collect();
    let leading_zero = digits.len() > 1 && digits[0] == '0' && digits[1].is_ascii_digit();
    if leading_zero && digits.iter().any(|c| matches!(c, '1'..='9')) {
        return Some("leading zeros in decimal integer literal");
    }
    None
}

fn mixes_bytes(concatenated: Node, bytes: &[u8]) -> bool {
    let kinds: Vec<bool> = named(concatenated)
        .into_iter()
        .filter(|part| part.kind() == "string")
        .filter_map(|part| text(part, bytes))
        .map(|literal| {
            let prefix = literal
                .find(|c: char| c == '\'' || c == '"')
                .map_or(literal, |quote| &literal[..quote]);
            prefix.contains(|c: char| matches!(c, 'b' | 'B'))
        })
        .collect();
    kinds.iter().any(|is_bytes| *is_bytes) && !kinds.iter().all(|is_bytes| *is_bytes)
}

fn argument_order(arguments: Node) -> Option<&'static str> {
    let mut keyword = false;
    let mut mapping = false;
    for argument in named(arguments) {
        match argument.kind() {
            "keyword_argument" => keyword = true,
            "dictionary_splat" => mapping = true,
            "list_splat" => {
                if mapping {
                    return Some("iterable unpacking follows keyword unpacking");
                }
            }
            _ => {
                if keyword || mapping {
                    return Some("positional argument follows keyword argument");
                }
            }
        }
    }
    None
}

/// CPython compares every indent twice, with tabs at 8 columns and at 1.
/// A line whose two readings disagree about the block it belongs to is a
/// `TabError`, even when the grammar's own indent tracking accepts it.
fn inconsistent_indentation(root: Node, source: &str) -> Option<Rejection> {
    let lines: Vec<&str> = source.split('\n').collect();

    let mut starts = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let children = named(node);
        if matches!(node.kind(), "module" | "block") {
            starts.extend(children.iter().map(|child| child.start_position()));
        } else if CLAUSE_KINDS.contains(&node.kind()) {
            starts.push(node.start_position());
        }
        stack.extend(children);
    }
    starts.sort_by_key(|point| (point.row, point.column));
    starts.dedup_by_key(|point| point.row);

    let mut indents = vec![(0usize, 0usize)];
    for start in starts {
        let Some(prefix) = lines.get(start.row).and_then(|line| line.get(..start.column)) else {
            continue;
        };
        // Statement shares its line with an earlier token.
        if !prefix.chars().all(|c| matches!(c, ' ' | '\t' | '\x0c')) {
            continue;
        }
        let (col, alt) = measure(prefix);
        let rejection = Rejection::at(
            start.row,
            start.column,
            "inconsistent use of tabs and spaces in indentation",
        );

        let Some(&(top_col, top_alt)) = indents.last() else {
            break;
        };
        if col == top_col {
            if alt != top_alt {
                return Some(rejection);
            }
        } else if col > top_col {
            if alt <= top_alt {
                return Some(rejection);
            }
            indents.push((col, alt));
        } else {
            while indents.len() > 1 && indents.last().is_some_and(|(c, _)| col < *c) {
                indents.pop();
            }
            if indents.last() != Some(&(col, alt)) {
                return Some(rejection);
            }
        }
    }
    None
}

fn measure(prefix: &str) -> (usize, usize) {
    prefix.chars().fold((0, 0), |(col, alt), c| match c {
        '\t' => ((col / TAB_SIZE + 1) * TAB_SIZE, alt + 1),
        '\x0c' => (0, 0),
        _ => (col + 1, alt + 1),
    })
}

fn text<'s>(node: Node, bytes: &'s [u8]) -> Option<&'s str> {
    node.utf8_text(bytes).ok()
}

/// Named children, comments excluded
fn named<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

fn has_named(node: Node, kind: &str) -> bool {
    named(node).iter().any(|child| child.kind() == kind)
}

fn has_token(node: Node, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node
        .children(&mut cursor)
        .any(|child| !child.is_named() && child.kind() == token);
    found
}
