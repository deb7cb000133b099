use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use roxmltree::Document;
use thiserror::Error;

use crate::fs_util::{read_optional_text, write_text_atomic};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("failed to read tree file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed tree file {path} at line {}, column {}: {message}", .location.line, .location.column)]
    Malformed {
        path: PathBuf,
        location: SourceLocation,
        message: String,
    },
    #[error("failed to write tree file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Generic labeled tree used for every persisted universe file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeNode {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub text: String,
    pub children: Vec<TreeNode>,
}

impl TreeNode {
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.attributes.insert(name.into(), value.to_string());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_child(mut self, child: TreeNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn add_child(&mut self, child: TreeNode) -> &mut TreeNode {
        self.children.push(child);
        let last = self.children.len() - 1;
        &mut self.children[last]
    }

    pub fn set_attribute(&mut self, name: impl Into<String>, value: impl ToString) {
        self.attributes.insert(name.into(), value.to_string());
    }

    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn has_attribute(&self, name: &str) -> bool {
        self.attributes.contains_key(name)
    }

    /// First direct child with the given tag.
    pub fn find_child(&self, tag: &str) -> Option<&TreeNode> {
        self.children.iter().find(|child| child.tag == tag)
    }

    /// Depth-first search that also considers `self`.
    pub fn find_descendant(&self, tag: &str) -> Option<&TreeNode> {
        if self.tag == tag {
            return Some(self);
        }
        self.children
            .iter()
            .find_map(|child| child.find_descendant(tag))
    }

    pub fn children_by_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a TreeNode> + 'a {
        self.children.iter().filter(move |child| child.tag == tag)
    }

    /// Child `<param id="...">` lookup used by universe metadata files.
    pub fn find_child_by_id(&self, id: &str) -> Option<&TreeNode> {
        self.children
            .iter()
            .find(|child| child.get_attribute("id") == Some(id))
    }

    pub fn parse(raw: &str, path: &Path) -> Result<TreeNode, TreeError> {
        let doc = Document::parse(raw).map_err(|error| TreeError::Malformed {
            path: path.to_path_buf(),
            location: SourceLocation {
                line: error.pos().row as usize,
                column: error.pos().col as usize,
            },
            message: error.to_string(),
        })?;
        Ok(convert_node(doc.root_element()))
    }

    pub fn to_xml_string(&self) -> String {
        let mut out = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        write_node(&mut out, self, 0);
        out
    }
}

fn convert_node(node: roxmltree::Node<'_, '_>) -> TreeNode {
    let mut converted = TreeNode::new(node.tag_name().name());
    for attribute in node.attributes() {
        converted
            .attributes
            .insert(attribute.name().to_string(), attribute.value().to_string());
    }
    let mut text = String::new();
    for child in node.children() {
        if child.is_element() {
            converted.children.push(convert_node(child));
        } else if child.is_text() {
            if let Some(fragment) = child.text() {
                text.push_str(fragment);
            }
        }
    }
    converted.text = text.trim().to_string();
    converted
}

fn write_node(out: &mut String, node: &TreeNode, depth: usize) {
    let indent = "  ".repeat(depth);
    let _ = write!(out, "{indent}<{}", node.tag);
    for (name, value) in &node.attributes {
        let _ = write!(out, " {name}=\"{}\"", escape(value));
    }
    if node.children.is_empty() && node.text.is_empty() {
        out.push_str(" />\n");
        return;
    }
    out.push('>');
    if node.children.is_empty() {
        let _ = writeln!(out, "{}</{}>", escape(&node.text), node.tag);
        return;
    }
    out.push('\n');
    if !node.text.is_empty() {
        let _ = writeln!(out, "{indent}  {}", escape(&node.text));
    }
    for child in &node.children {
        write_node(out, child, depth + 1);
    }
    let _ = writeln!(out, "{indent}</{}>", node.tag);
}

fn escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Persistence collaborator. A missing file is `Ok(None)`.
pub trait TreeStore {
    fn load_tree(&self, path: &Path) -> Result<Option<TreeNode>, TreeError>;
    fn save_tree(&self, node: &TreeNode, path: &Path) -> Result<(), TreeError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct XmlTreeStore;

impl TreeStore for XmlTreeStore {
    fn load_tree(&self, path: &Path) -> Result<Option<TreeNode>, TreeError> {
        let raw = read_optional_text(path).map_err(|source| TreeError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        match raw {
            Some(raw) => TreeNode::parse(&raw, path).map(Some),
            None => Ok(None),
        }
    }

    fn save_tree(&self, node: &TreeNode, path: &Path) -> Result<(), TreeError> {
        write_text_atomic(path, &node.to_xml_string()).map_err(|source| TreeError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
