use tree_sitter::{Node, Parser};

use crate::autoload::NAMESPACE_SEPARATOR;
use crate::detect::{ClassDetector, DEFAULT_MARKER, ModuleClass, base_matches_marker};

/// Detector backed by the tree-sitter PHP grammar.
///
/// Comments, strings and heredocs cannot produce false declarations here. It
/// applies the same first-class policy as the pattern detector and still
/// compares the base type by simple name only.
#[derive(Debug, Clone)]
pub struct SyntaxDetector {
    marker: String,
}

impl SyntaxDetector {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }
}

impl Default for SyntaxDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}

impl ClassDetector for SyntaxDetector {
    fn detect(&self, source: &str) -> Option<ModuleClass> {
        if source.trim().is_empty() {
            return None;
        }

        let mut parser = Parser::new();
        parser
            .set_language(&tree_sitter_php::LANGUAGE_PHP.into())
            .ok()?;
        let tree = parser.parse(source, None)?;
        let bytes = source.as_bytes();

        let mut namespace: Option<String> = None;
        let mut class: Option<Node<'_>> = None;
        visit_declarations(tree.root_node(), bytes, &mut namespace, &mut class);

        let namespace = namespace?;
        let class = class?;
        let base = base_type(&class, bytes)?;
        if !base_matches_marker(&base, &self.marker) {
            return None;
        }

        let name = class.child_by_field_name("name")?;
        Some(ModuleClass::new(
            namespace.trim_matches(NAMESPACE_SEPARATOR),
            node_text(&name, bytes),
        ))
    }
}

/// Pre-order walk that records the first namespace name and the first class
/// declaration in document order.
fn visit_declarations<'t>(
    node: Node<'t>,
    source: &[u8],
    namespace: &mut Option<String>,
    class: &mut Option<Node<'t>>,
) {
    match node.kind() {
        "namespace_definition" if namespace.is_none() => {
            if let Some(name) = node.child_by_field_name("name") {
                *namespace = Some(node_text(&name, source).to_string());
            }
        }
        "class_declaration" if class.is_none() => {
            *class = Some(node);
            return;
        }
        _ => {}
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        if namespace.is_some() && class.is_some() {
            return;
        }
        visit_declarations(child, source, namespace, class);
    }
}

fn base_type(class: &Node<'_>, source: &[u8]) -> Option<String> {
    let mut cursor = class.walk();
    let clause = class
        .children(&mut cursor)
        .find(|child| child.kind() == "base_clause")?;

    let text = node_text(&clause, source).trim();
    let rest = text.get(..7).filter(|kw| kw.eq_ignore_ascii_case("extends")).map(|_| &text[7..])?;
    rest.split(|c: char| c == ',' || c.is_whitespace())
        .find(|token| !token.is_empty())
        .map(str::to_string)
}

fn node_text<'a>(node: &Node<'_>, source: &'a [u8]) -> &'a str {
    std::str::from_utf8(&source[node.byte_range()]).unwrap_or("")
}
