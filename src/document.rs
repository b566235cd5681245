use std::collections::HashSet;
use std::fmt;

use itertools::Itertools;
use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::word_count;

/// Separator between blocks in the plain-text rendering
const BLOCK_SEPARATOR: &str = "\n\n";
/// Open and close tokens each block contributes to positions
const BLOCK_BOUNDARY_SIZE: usize = 2;

/// Stable identity of a structural text block, assigned once at creation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(Uuid);

impl BlockId {
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Hands out block identities when blocks are created
#[derive(Debug, Clone)]
pub enum BlockIdAllocator {
    Random,
    /// Deterministic ids for tests
    Sequential { next: u128 },
}

impl BlockIdAllocator {
    pub fn random() -> Self {
        Self::Random
    }

    pub fn sequential() -> Self {
        Self::Sequential { next: 1 }
    }

    pub fn allocate(&mut self) -> BlockId {
        match self {
            Self::Random => BlockId(Uuid::new_v4()),
            Self::Sequential { next } => {
                let id = BlockId(Uuid::from_u128(*next));
                *next += 1;
                id
            }
        }
    }
}

impl Default for BlockIdAllocator {
    fn default() -> Self {
        Self::random()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FadeState {
    #[default]
    Active,
    Fading,
}

/// Location of a block node: start position and size in position units
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockRange {
    pub pos: usize,
    pub size: usize,
}

impl BlockRange {
    pub fn end(&self) -> usize {
        self.pos + self.size
    }

    pub fn contains(&self, pos: usize) -> bool {
        pos >= self.pos && pos < self.end()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Heading(u8),
    Quote,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockSnapshot {
    pub id: BlockId,
    pub range: BlockRange,
    pub kind: BlockKind,
    pub fade: FadeState,
    pub text: String,
}

/// The document surface the engine drives. Positions follow the usual
/// rich-text convention: each block occupies its text length plus two.
pub trait DocumentModel {
    fn text(&self) -> String;
    fn structured_content(&self) -> serde_json::Value;
    fn clear(&mut self);
    /// Innermost block carrying an identity that contains the edit point
    fn edit_point_block(&self) -> Option<BlockId>;
    fn find_block(&self, id: BlockId) -> Option<BlockRange>;
    fn block_id_at(&self, pos: usize) -> Option<BlockId>;
    fn fade_state_at(&self, pos: usize) -> Option<FadeState>;
    /// Returns false when no block lives at `pos`
    fn set_fade_state_at(&mut self, pos: usize, state: FadeState) -> bool;
    /// Delete whole blocks covered by `range`. Returns false when nothing matched.
    fn delete_range(&mut self, range: BlockRange) -> bool;
    fn blocks(&self) -> Vec<BlockSnapshot>;

    fn word_count(&self) -> usize {
        word_count(&self.text())
    }

    fn is_empty(&self) -> bool {
        self.text().trim().is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Block {
    id: BlockId,
    kind: BlockKind,
    fade: FadeState,
    text: String,
}

impl Block {
    fn len(&self) -> usize {
        self.text.chars().count()
    }

    fn byte_index(&self, offset: usize) -> usize {
        self.text
            .char_indices()
            .nth(offset)
            .map_or(self.text.len(), |(i, _)| i)
    }
}

/// Edit point: block index and character offset within it
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Cursor {
    pub block: usize,
    pub offset: usize,
}

/// In-memory flat block document with a single cursor
#[derive(Debug, Clone)]
pub struct BlockDocument {
    blocks: Vec<Block>,
    cursor: Cursor,
    ids: BlockIdAllocator,
}

impl BlockDocument {
    pub fn new(mut ids: BlockIdAllocator) -> Self {
        let first = Self::empty_block(&mut ids);
        Self {
            blocks: vec![first],
            cursor: Cursor::default(),
            ids,
        }
    }

    /// Paragraphs with the cursor at the end of the last one
    pub fn from_paragraphs(mut ids: BlockIdAllocator, paragraphs: &[&str]) -> Self {
        let mut blocks: Vec<Block> = paragraphs
            .iter()
            .map(|text| Block {
                id: ids.allocate(),
                kind: BlockKind::Paragraph,
                fade: FadeState::Active,
                text: text.to_string(),
            })
            .collect();
        if blocks.is_empty() {
            blocks.push(Self::empty_block(&mut ids));
        }
        let last = blocks.len() - 1;
        let cursor = Cursor {
            block: last,
            offset: blocks[last].len(),
        };
        Self { blocks, cursor, ids }
    }

    /// Parse stored structured content. Blocks without a usable identity get one.
    pub fn from_json(json: &str, mut ids: BlockIdAllocator) -> Result<Self, serde_json::Error> {
        let stored: StoredDocument = serde_json::from_str(json)?;
        if stored.node_type != "doc" {
            return Err(serde_json::Error::custom(format!(
                "expected a doc node, found {}",
                stored.node_type
            )));
        }

        let stored_ids: Vec<Option<BlockId>> = stored
            .content
            .iter()
            .map(|node| {
                node.attrs
                    .block_id
                    .as_deref()
                    .and_then(|raw| Uuid::parse_str(raw).ok())
                    .map(BlockId)
            })
            .collect();
        let assigned = assign_missing_ids(stored_ids, &mut ids);

        let mut blocks: Vec<Block> = stored
            .content
            .into_iter()
            .zip(assigned)
            .map(|(node, id)| {
                let kind = match node.node_type.as_str() {
                    "heading" => BlockKind::Heading(node.attrs.level.unwrap_or(1).clamp(1, 3)),
                    "blockquote" => BlockKind::Quote,
                    _ => BlockKind::Paragraph,
                };
                Block {
                    id,
                    kind,
                    fade: node.attrs.fade_state,
                    text: node.content.iter().map(StoredInline::flatten_text).collect(),
                }
            })
            .collect();

        if blocks.is_empty() {
            blocks.push(Self::empty_block(&mut ids));
        }
        Ok(Self {
            blocks,
            cursor: Cursor::default(),
            ids,
        })
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.to_stored()).unwrap_or_default()
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn block_text(&self, index: usize) -> Option<&str> {
        self.blocks.get(index).map(|b| b.text.as_str())
    }

    pub fn insert_char(&mut self, c: char) {
        if c == '\n' {
            self.split_block();
            return;
        }

        let cursor = self.cursor;
        let block = &mut self.blocks[cursor.block];
        let at = block.byte_index(cursor.offset);
        block.text.insert(at, c);
        self.cursor.offset += 1;

        if c == ' ' {
            self.apply_input_rule();
        }
    }

    pub fn insert_str(&mut self, s: &str) {
        for c in s.chars() {
            self.insert_char(c);
        }
    }

    /// Enter: split the current block at the cursor into a new block
    pub fn split_block(&mut self) {
        let cursor = self.cursor;
        let id = self.ids.allocate();
        let block = &mut self.blocks[cursor.block];
        let at = block.byte_index(cursor.offset);
        let tail = block.text.split_off(at);
        let kind = match block.kind {
            BlockKind::Heading(_) => BlockKind::Paragraph,
            other => other,
        };
        self.blocks.insert(
            cursor.block + 1,
            Block {
                id,
                kind,
                fade: FadeState::Active,
                text: tail,
            },
        );
        self.cursor = Cursor {
            block: cursor.block + 1,
            offset: 0,
        };
    }

    /// Delete the character before the cursor, joining blocks at a boundary
    pub fn backspace(&mut self) {
        let cursor = self.cursor;
        if cursor.offset > 0 {
            let block = &mut self.blocks[cursor.block];
            let at = block.byte_index(cursor.offset - 1);
            block.text.remove(at);
            self.cursor.offset -= 1;
        } else if cursor.block > 0 {
            let removed = self.blocks.remove(cursor.block);
            let previous = &mut self.blocks[cursor.block - 1];
            let offset = previous.len();
            previous.text.push_str(&removed.text);
            self.cursor = Cursor {
                block: cursor.block - 1,
                offset,
            };
        } else if self.blocks[0].kind != BlockKind::Paragraph {
            self.blocks[0].kind = BlockKind::Paragraph;
        }
    }

    /// Delete the character after the cursor, pulling the next block up at the end
    pub fn delete_forward(&mut self) {
        let cursor = self.cursor;
        if cursor.offset < self.blocks[cursor.block].len() {
            let block = &mut self.blocks[cursor.block];
            let at = block.byte_index(cursor.offset);
            block.text.remove(at);
        } else if cursor.block + 1 < self.blocks.len() {
            let next = self.blocks.remove(cursor.block + 1);
            self.blocks[cursor.block].text.push_str(&next.text);
        }
    }

    pub fn move_left(&mut self) {
        if self.cursor.offset > 0 {
            self.cursor.offset -= 1;
        } else if self.cursor.block > 0 {
            self.cursor.block -= 1;
            self.cursor.offset = self.blocks[self.cursor.block].len();
        }
    }

    pub fn move_right(&mut self) {
        if self.cursor.offset < self.blocks[self.cursor.block].len() {
            self.cursor.offset += 1;
        } else if self.cursor.block + 1 < self.blocks.len() {
            self.cursor.block += 1;
            self.cursor.offset = 0;
        }
    }

    pub fn move_up(&mut self) {
        if self.cursor.block > 0 {
            self.cursor.block -= 1;
            self.cursor.offset = self.cursor.offset.min(self.blocks[self.cursor.block].len());
        } else {
            self.cursor.offset = 0;
        }
    }

    pub fn move_down(&mut self) {
        if self.cursor.block + 1 < self.blocks.len() {
            self.cursor.block += 1;
            self.cursor.offset = self.cursor.offset.min(self.blocks[self.cursor.block].len());
        } else {
            self.cursor.offset = self.blocks[self.cursor.block].len();
        }
    }

    pub fn move_home(&mut self) {
        self.cursor.offset = 0;
    }

    pub fn move_end(&mut self) {
        self.cursor.offset = self.blocks[self.cursor.block].len();
    }

    /// Markdown-style shortcuts typed at the start of a paragraph
    fn apply_input_rule(&mut self) {
        let cursor = self.cursor;
        let block = &mut self.blocks[cursor.block];
        if block.kind != BlockKind::Paragraph {
            return;
        }
        let prefix: String = block.text.chars().take(cursor.offset).collect();
        let kind = match prefix.as_str() {
            "# " => BlockKind::Heading(1),
            "## " => BlockKind::Heading(2),
            "### " => BlockKind::Heading(3),
            "> " => BlockKind::Quote,
            _ => return,
        };
        let cut = block.byte_index(cursor.offset);
        block.text.replace_range(..cut, "");
        block.kind = kind;
        self.cursor.offset = 0;
    }

    fn empty_block(ids: &mut BlockIdAllocator) -> Block {
        Block {
            id: ids.allocate(),
            kind: BlockKind::Paragraph,
            fade: FadeState::Active,
            text: String::new(),
        }
    }

    fn ranges(&self) -> impl Iterator<Item = (usize, BlockRange)> + '_ {
        self.blocks
            .iter()
            .scan(0usize, |pos, block| {
                let range = BlockRange {
                    pos: *pos,
                    size: block.len() + BLOCK_BOUNDARY_SIZE,
                };
                *pos = range.end();
                Some(range)
            })
            .enumerate()
    }

    fn index_at(&self, pos: usize) -> Option<usize> {
        self.ranges()
            .find(|(_, range)| range.contains(pos))
            .map(|(i, _)| i)
    }

    fn to_stored(&self) -> StoredDocument {
        StoredDocument {
            node_type: "doc".to_string(),
            content: self
                .blocks
                .iter()
                .map(|block| {
                    let (node_type, level) = match block.kind {
                        BlockKind::Paragraph => ("paragraph", None),
                        BlockKind::Heading(level) => ("heading", Some(level)),
                        BlockKind::Quote => ("blockquote", None),
                    };
                    StoredBlock {
                        node_type: node_type.to_string(),
                        attrs: StoredAttrs {
                            block_id: Some(block.id.to_string()),
                            fade_state: block.fade,
                            level,
                        },
                        content: if block.text.is_empty() {
                            Vec::new()
                        } else {
                            vec![StoredInline {
                                node_type: "text".to_string(),
                                text: block.text.clone(),
                                content: Vec::new(),
                            }]
                        },
                    }
                })
                .collect(),
        }
    }
}

/// One-time pass over loaded content: keep each usable identity the first
/// time it appears and allocate fresh ones for missing or repeated ids.
pub fn assign_missing_ids(
    stored: Vec<Option<BlockId>>,
    ids: &mut BlockIdAllocator,
) -> Vec<BlockId> {
    let mut seen = HashSet::new();
    stored
        .into_iter()
        .map(|candidate| match candidate {
            Some(id) if seen.insert(id) => id,
            _ => {
                let id = ids.allocate();
                seen.insert(id);
                id
            }
        })
        .collect()
}

impl Default for BlockDocument {
    fn default() -> Self {
        Self::new(BlockIdAllocator::random())
    }
}

impl DocumentModel for BlockDocument {
    fn text(&self) -> String {
        self.blocks.iter().map(|b| b.text.as_str()).join(BLOCK_SEPARATOR)
    }

    fn structured_content(&self) -> serde_json::Value {
        serde_json::to_value(self.to_stored()).unwrap_or(serde_json::Value::Null)
    }

    fn clear(&mut self) {
        let block = Self::empty_block(&mut self.ids);
        self.blocks = vec![block];
        self.cursor = Cursor::default();
    }

    fn edit_point_block(&self) -> Option<BlockId> {
        self.blocks.get(self.cursor.block).map(|b| b.id)
    }

    fn find_block(&self, id: BlockId) -> Option<BlockRange> {
        self.ranges()
            .find(|(i, _)| self.blocks[*i].id == id)
            .map(|(_, range)| range)
    }

    fn block_id_at(&self, pos: usize) -> Option<BlockId> {
        self.index_at(pos).map(|i| self.blocks[i].id)
    }

    fn fade_state_at(&self, pos: usize) -> Option<FadeState> {
        self.index_at(pos).map(|i| self.blocks[i].fade)
    }

    fn set_fade_state_at(&mut self, pos: usize, state: FadeState) -> bool {
        match self.index_at(pos) {
            Some(i) => {
                self.blocks[i].fade = state;
                true
            }
            None => false,
        }
    }

    fn delete_range(&mut self, range: BlockRange) -> bool {
        let covered: Vec<usize> = self
            .ranges()
            .filter(|(_, r)| r.pos >= range.pos && r.end() <= range.end())
            .map(|(i, _)| i)
            .collect();
        let (Some(&first), Some(&last)) = (covered.first(), covered.last()) else {
            return false;
        };

        self.blocks.drain(first..=last);
        let removed = last - first + 1;

        if self.blocks.is_empty() {
            let block = Self::empty_block(&mut self.ids);
            self.blocks.push(block);
            self.cursor = Cursor::default();
        } else if self.cursor.block > last {
            self.cursor.block -= removed;
        } else if self.cursor.block >= first {
            if first < self.blocks.len() {
                self.cursor = Cursor {
                    block: first,
                    offset: 0,
                };
            } else {
                let block = self.blocks.len() - 1;
                self.cursor = Cursor {
                    block,
                    offset: self.blocks[block].len(),
                };
            }
        }
        true
    }

    fn blocks(&self) -> Vec<BlockSnapshot> {
        self.ranges()
            .map(|(i, range)| {
                let block = &self.blocks[i];
                BlockSnapshot {
                    id: block.id,
                    range,
                    kind: block.kind,
                    fade: block.fade,
                    text: block.text.clone(),
                }
            })
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredDocument {
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    content: Vec<StoredBlock>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredBlock {
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default)]
    attrs: StoredAttrs,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    content: Vec<StoredInline>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredAttrs {
    #[serde(default)]
    block_id: Option<String>,
    #[serde(default)]
    fade_state: FadeState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    level: Option<u8>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredInline {
    #[serde(rename = "type")]
    node_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    content: Vec<StoredInline>,
}

impl StoredInline {
    /// Text of this node and anything nested under it
    fn flatten_text(&self) -> String {
        let mut out = self.text.clone();
        for child in &self.content {
            out.push_str(&child.flatten_text());
        }
        out
    }
}
