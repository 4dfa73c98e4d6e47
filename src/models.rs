//! Normalized Are.na entity model.
//!
//! Both upstream API generations are folded into these shapes by
//! [`crate::normalize`]. Everything is a plain immutable value record owned
//! by the caller; nothing holds a back-reference to the raw response.

use serde::Serialize;

/// Pagination metadata reconciled across both API generations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaginationMeta {
    pub current_page: i64,
    pub next_page: Option<i64>,
    pub prev_page: Option<i64>,
    pub per_page: Option<i64>,
    pub total_pages: Option<i64>,
    pub total_count: Option<i64>,
    /// True iff more results exist beyond `current_page`.
    pub has_more_pages: bool,
}

/// Three representations of one piece of text. When upstream supplies only
/// one representation the others are back-filled with it, so all three
/// fields are always populated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Markdown {
    pub markdown: String,
    pub html: String,
    pub plain: String,
}

/// Compact user record embedded in channels and blocks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub slug: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

/// Channel count block. All-or-nothing: absent unless every field parses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelCounts {
    pub blocks: i64,
    pub channels: i64,
    pub contents: i64,
    pub collaborators: i64,
}

/// A typed link between a connectable and a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedConnection {
    pub id: Option<String>,
    pub position: Option<i64>,
    pub pinned: bool,
    pub channel_id: Option<String>,
    pub connected_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedChannel {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub description: Option<Markdown>,
    pub state: Option<String>,
    pub visibility: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub owner: Option<UserSummary>,
    pub counts: Option<ChannelCounts>,
    /// How this channel relates to a containing query, when embedded.
    pub connection: Option<NormalizedConnection>,
}

/// Block type tag. Unrecognized upstream values coerce to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BlockKind {
    Text,
    Image,
    Link,
    Attachment,
    Embed,
    #[serde(rename = "PendingBlock")]
    Pending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImagePayload {
    pub url: Option<String>,
    pub thumb_url: Option<String>,
    pub display_url: Option<String>,
    pub alt_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttachmentPayload {
    pub url: Option<String>,
    pub file_name: Option<String>,
    pub file_size: Option<i64>,
    pub extension: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbedPayload {
    pub url: Option<String>,
    pub html: Option<String>,
    pub title: Option<String>,
    pub author_name: Option<String>,
    pub author_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedBlock {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: BlockKind,
    pub title: Option<String>,
    pub description: Option<Markdown>,
    pub state: Option<String>,
    pub visibility: Option<String>,
    pub comment_count: Option<i64>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub user: Option<UserSummary>,
    pub source_url: Option<String>,
    pub source_title: Option<String>,
    /// Exactly one of the following is populated for a well-formed block;
    /// all stay `None` when upstream omits the payload, whatever `type` says.
    pub content: Option<Markdown>,
    pub image: Option<ImagePayload>,
    pub attachment: Option<AttachmentPayload>,
    pub embed: Option<EmbedPayload>,
}

/// Anything that can be linked into a channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum Connectable {
    Channel(NormalizedChannel),
    Block(NormalizedBlock),
}

/// An ordered page of mixed channel contents. Order is upstream-provided
/// and meaningful; never re-sorted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedList {
    pub data: Vec<Connectable>,
    pub meta: Option<PaginationMeta>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchEntityType {
    Block,
    Channel,
    User,
    Group,
}

/// Which API generation produced a search result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SearchSource {
    #[serde(rename = "v3")]
    V3,
    #[serde(rename = "v2-fallback")]
    V2Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedSearchItem {
    pub id: String,
    pub entity_type: SearchEntityType,
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub slug: Option<String>,
    pub block_type: Option<String>,
    pub url: Option<String>,
    /// Untouched upstream record. Best-effort escape hatch, not covered by
    /// the normalization contract.
    pub raw: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedSearchResult {
    pub source_api: SearchSource,
    pub items: Vec<NormalizedSearchItem>,
    pub meta: Option<PaginationMeta>,
}

/// User count block. Fields are independently optional; the whole struct is
/// absent when none of them parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserCounts {
    pub channels: Option<i64>,
    pub following: Option<i64>,
    pub followers: Option<i64>,
    pub blocks: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedUser {
    pub id: String,
    pub slug: String,
    pub name: Option<String>,
    pub avatar: Option<String>,
    pub initials: Option<String>,
    pub bio: Option<Markdown>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
    pub counts: Option<UserCounts>,
}
