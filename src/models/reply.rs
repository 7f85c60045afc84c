use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::display_value;

/// Reply returned by a chat model for a single prompt
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelReply {
    pub content: ReplyContent,
}

/// Shape of a model reply body
///
/// Providers either answer with a plain string or with a list of content
/// blocks. Anything else is kept verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ReplyContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
    Other(Value),
}

/// One fragment of a structured reply
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ContentBlock {
    Text {
        #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
        kind: Option<String>,
        text: String,
    },
    Other(Value),
}

impl ModelReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: ReplyContent::Text(text.into()),
        }
    }

    pub fn blocks(blocks: Vec<ContentBlock>) -> Self {
        Self {
            content: ReplyContent::Blocks(blocks),
        }
    }

    /// Primary text payload of the reply
    ///
    /// A string body wins, then the `text` of the first block. When neither
    /// exists the first block is rendered as text (bare strings unquoted), or
    /// failing that the whole reply as compact JSON.
    pub fn primary_text(&self) -> String {
        match &self.content {
            ReplyContent::Text(text) => text.clone(),
            ReplyContent::Blocks(blocks) => match blocks.first() {
                Some(ContentBlock::Text { text, .. }) => text.clone(),
                Some(ContentBlock::Other(value)) => display_value(value),
                None => self.render(),
            },
            ReplyContent::Other(_) => self.render(),
        }
    }

    fn render(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!("{:?}", self))
    }
}

impl ContentBlock {
    pub fn text(text: impl Into<String>) -> Self {
        ContentBlock::Text {
            kind: Some("text".to_string()),
            text: text.into(),
        }
    }
}
