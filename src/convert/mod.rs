//! The conversion capability seam.
//!
//! Everything format-specific (parsing, OCR, table recognition, Markdown
//! export) lives behind [`Converter`]. The gateway only sees a
//! [`ConvertedDocument`]: the backend's rendered Markdown plus its document
//! tree, which is needed for presentations.

pub mod docling;

use std::path::Path;

use serde::Deserialize;

use crate::upload::InputFormat;

pub use docling::DoclingCli;

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("failed to start {what}: {source}")]
    Spawn {
        what: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{what} failed: {stderr}")]
    Failed { what: String, stderr: String },
    #[error("{what} timed out after {secs}s")]
    TimedOut { what: String, secs: u64 },
    #[error("converter produced no {0} output")]
    MissingOutput(&'static str),
    #[error("unreadable document structure: {0}")]
    Structure(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[async_trait::async_trait]
pub trait Converter: Send + Sync {
    fn name(&self) -> &str;

    /// Converts the file at `input`, already sniffed as `format`.
    async fn convert(
        &self,
        input: &Path,
        format: InputFormat,
    ) -> Result<ConvertedDocument, ConvertError>;
}

#[derive(Debug, Clone)]
pub struct ConvertedDocument {
    pub structure: DocumentTree,
    markdown: String,
}

impl ConvertedDocument {
    pub fn new(structure: DocumentTree, markdown: impl Into<String>) -> Self {
        Self {
            structure,
            markdown: markdown.into(),
        }
    }

    pub fn export_to_markdown(&self) -> String {
        self.markdown.clone()
    }
}

/// Presentations are flattened to their text items; everything else uses
/// the backend's own Markdown export.
pub fn render_markdown(format: InputFormat, document: &ConvertedDocument) -> String {
    match format {
        InputFormat::Pptx => document.structure.presentation_text(),
        _ => document.export_to_markdown(),
    }
}

const BODY_LAYER: &str = "body";

fn body_layer() -> String {
    BODY_LAYER.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NodeRef {
    #[serde(rename = "$ref")]
    pub cref: String,
}

/// A structural node: the body root, a group, a table or a picture.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeItem {
    #[serde(default)]
    pub children: Vec<NodeRef>,
    #[serde(default = "body_layer")]
    pub content_layer: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextItem {
    #[serde(default)]
    pub children: Vec<NodeRef>,
    #[serde(default = "body_layer")]
    pub content_layer: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub text: String,
}

/// The subset of the converter's JSON document model needed to walk it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DocumentTree {
    #[serde(default)]
    pub body: NodeItem,
    #[serde(default)]
    pub groups: Vec<NodeItem>,
    #[serde(default)]
    pub texts: Vec<TextItem>,
    #[serde(default)]
    pub tables: Vec<NodeItem>,
    #[serde(default)]
    pub pictures: Vec<NodeItem>,
}

#[derive(Debug, Clone, Copy)]
enum Resolved<'a> {
    Node(&'a NodeItem),
    Text(&'a TextItem),
}

impl<'a> Resolved<'a> {
    fn children(&self) -> &'a [NodeRef] {
        match *self {
            Resolved::Node(n) => &n.children,
            Resolved::Text(t) => &t.children,
        }
    }

    fn in_body(&self) -> bool {
        let layer = match *self {
            Resolved::Node(n) => &n.content_layer,
            Resolved::Text(t) => &t.content_layer,
        };
        layer == BODY_LAYER
    }
}

impl DocumentTree {
    pub fn from_json(raw: &str) -> Result<Self, ConvertError> {
        Ok(serde_json::from_str(raw)?)
    }

    fn resolve(&self, node: &NodeRef) -> Option<Resolved<'_>> {
        let path = node.cref.strip_prefix("#/")?;
        if path == "body" {
            return Some(Resolved::Node(&self.body));
        }
        let (collection, index) = path.split_once('/')?;
        let index: usize = index.parse().ok()?;
        match collection {
            "groups" => self.groups.get(index).map(Resolved::Node),
            "tables" => self.tables.get(index).map(Resolved::Node),
            "pictures" => self.pictures.get(index).map(Resolved::Node),
            "texts" => self.texts.get(index).map(Resolved::Text),
            _ => None,
        }
    }

    /// Text of every body-layer text item, each followed by a blank line.
    ///
    /// Walks the tree in document order; at each visited node its direct text
    /// children are emitted before the walk descends into them. Speaker notes
    /// and other non-body layers are skipped with their whole subtree.
    pub fn presentation_text(&self) -> String {
        let mut out = String::new();
        let mut stack: Vec<Resolved<'_>> = vec![Resolved::Node(&self.body)];
        // Guards against reference cycles in malformed input.
        let mut budget =
            1 + self.groups.len() + self.texts.len() + self.tables.len() + self.pictures.len();

        while let Some(node) = stack.pop() {
            if budget == 0 {
                break;
            }
            budget -= 1;

            let children: Vec<Resolved<'_>> = node
                .children()
                .iter()
                .filter_map(|c| self.resolve(c))
                .filter(Resolved::in_body)
                .collect();
            for child in &children {
                if let Resolved::Text(t) = child {
                    out.push_str(&t.text);
                    out.push_str("\n\n");
                }
            }
            stack.extend(children.into_iter().rev());
        }
        out
    }
}
