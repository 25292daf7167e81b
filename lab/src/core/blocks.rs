//! Labeled fenced-block extraction from completion replies.
//!
//! Grammar: the reply is split on [`FENCE`]. Segments at odd positions are the
//! bodies of fenced blocks; even positions are prose and never classified. A
//! trailing unterminated fence still yields a block, since replies can be cut
//! off mid-block. A block's label is its first whitespace-delimited token and
//! must equal a requested label exactly (case-sensitive). The body is the
//! remainder of the segment with surrounding whitespace trimmed.
//!
//! When a label occurs in more than one block the last one wins.

use std::collections::BTreeMap;

/// Block delimiter.
pub const FENCE: &str = "```";
/// Label of the explanation block.
pub const REASONING: &str = "reasoning";
/// Label of the source-code block.
pub const PYTHON: &str = "python";

/// Blocks extracted from a reply, keyed by label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedReply {
    blocks: BTreeMap<String, String>,
}

impl ParsedReply {
    /// Body of the block with `label`, or `None` if the reply had no such block.
    ///
    /// A present block with no body is `Some("")`.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.blocks.get(label).map(String::as_str)
    }

    /// Remove and return the body of the block with `label`.
    pub fn take(&mut self, label: &str) -> Option<String> {
        self.blocks.remove(label)
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }
}

/// Extract the blocks whose label is in `labels`.
pub fn parse_reply(reply: &str, labels: &[&str]) -> ParsedReply {
    let mut blocks = BTreeMap::new();
    for segment in reply.split(FENCE).skip(1).step_by(2) {
        if let Some((label, body)) = split_label(segment)
            && labels.contains(&label)
        {
            blocks.insert(label.to_string(), body.to_string());
        }
    }
    ParsedReply { blocks }
}

/// Extract a single block. Shorthand for `parse_reply(reply, &[label]).take(label)`.
pub fn extract_block(reply: &str, label: &str) -> Option<String> {
    parse_reply(reply, &[label]).take(label)
}

fn split_label(segment: &str) -> Option<(&str, &str)> {
    let trimmed = segment.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.find(char::is_whitespace) {
        Some(end) => Some((&trimmed[..end], trimmed[end..].trim())),
        None => Some((trimmed, "")),
    }
}
