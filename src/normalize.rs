//! Normalization of raw upstream JSON into the stable entity model.
//!
//! Every function here is pure and never fails: missing or malformed fields
//! degrade to `None` or the least-surprising default (unrecognized block
//! type → `PendingBlock`, missing slug → stringified id). Both the current
//! v3 shapes and the legacy v2 search shape are handled.

use serde_json::Value;

use crate::models::{
    AttachmentPayload, BlockKind, ChannelCounts, Connectable, EmbedPayload, ImagePayload,
    Markdown, NormalizedBlock, NormalizedChannel, NormalizedConnection, NormalizedList,
    NormalizedSearchItem, NormalizedSearchResult, NormalizedUser, PaginationMeta,
    SearchEntityType, SearchSource, UserCounts, UserSummary,
};

fn get_str(v: &Value, key: &str) -> Option<String> {
    v.get(key).and_then(Value::as_str).map(str::to_string)
}

fn get_i64(v: &Value, key: &str) -> Option<i64> {
    match v.get(key) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse().ok(),
        _ => None,
    }
}

fn get_bool(v: &Value, key: &str) -> Option<bool> {
    v.get(key).and_then(Value::as_bool)
}

/// Ids arrive as numbers or strings depending on endpoint and generation.
fn id_string(v: &Value, key: &str) -> Option<String> {
    match v.get(key) {
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

/// Normalizes a markdown-ish value. A bare string counts as all three
/// representations; an object lacking all of `markdown`/`html`/`plain`
/// normalizes to `None`.
pub fn normalize_markdown(raw: &Value) -> Option<Markdown> {
    if let Some(s) = raw.as_str() {
        return Some(Markdown {
            markdown: s.to_string(),
            html: s.to_string(),
            plain: s.to_string(),
        });
    }
    if !raw.is_object() {
        return None;
    }
    let markdown = get_str(raw, "markdown");
    let html = get_str(raw, "html");
    let plain = get_str(raw, "plain");
    let first = markdown
        .clone()
        .or_else(|| html.clone())
        .or_else(|| plain.clone())?;
    Some(Markdown {
        markdown: markdown.unwrap_or_else(|| first.clone()),
        html: html.unwrap_or_else(|| first.clone()),
        plain: plain.unwrap_or(first),
    })
}

fn field_markdown(v: &Value, key: &str) -> Option<Markdown> {
    v.get(key).and_then(normalize_markdown)
}

/// Reconciles pagination meta. An explicit `has_more_pages` flag wins;
/// otherwise more pages are inferred from `next_page > 0`.
pub fn normalize_pagination(raw: &Value) -> Option<PaginationMeta> {
    if !raw.is_object() {
        return None;
    }
    let current_page = get_i64(raw, "current_page").unwrap_or(1);
    let next_page = get_i64(raw, "next_page").filter(|n| *n > 0);
    let prev_page = get_i64(raw, "prev_page").filter(|n| *n > 0);
    let has_more_pages =
        get_bool(raw, "has_more_pages").unwrap_or_else(|| next_page.is_some());
    Some(PaginationMeta {
        current_page,
        next_page,
        prev_page,
        per_page: get_i64(raw, "per_page").or_else(|| get_i64(raw, "per")),
        total_pages: get_i64(raw, "total_pages"),
        total_count: get_i64(raw, "total_count").or_else(|| get_i64(raw, "length")),
        has_more_pages,
    })
}

pub fn normalize_user_summary(raw: &Value) -> Option<UserSummary> {
    let id = id_string(raw, "id")?;
    let slug = get_str(raw, "slug").unwrap_or_else(|| id.clone());
    Some(UserSummary {
        id,
        slug,
        name: get_str(raw, "name").or_else(|| get_str(raw, "full_name")),
        avatar: get_str(raw, "avatar").or_else(|| {
            raw.get("avatar_image")
                .and_then(|img| get_str(img, "display"))
        }),
    })
}

pub fn normalize_user(raw: &Value) -> NormalizedUser {
    let id = id_string(raw, "id").unwrap_or_default();
    let slug = get_str(raw, "slug").unwrap_or_else(|| id.clone());

    let counts = raw.get("counts").map(|c| UserCounts {
        channels: get_i64(c, "channels"),
        following: get_i64(c, "following"),
        followers: get_i64(c, "followers"),
        blocks: get_i64(c, "blocks"),
    });
    let counts = counts.filter(|c| {
        c.channels.is_some() || c.following.is_some() || c.followers.is_some() || c.blocks.is_some()
    });

    NormalizedUser {
        id,
        slug,
        name: get_str(raw, "name").or_else(|| get_str(raw, "full_name")),
        avatar: get_str(raw, "avatar").or_else(|| {
            raw.get("avatar_image")
                .and_then(|img| get_str(img, "display"))
        }),
        initials: get_str(raw, "initials"),
        bio: field_markdown(raw, "bio"),
        created_at: get_str(raw, "created_at"),
        updated_at: get_str(raw, "updated_at"),
        counts,
    }
}

fn normalize_connection(raw: &Value) -> Option<NormalizedConnection> {
    if !raw.is_object() {
        return None;
    }
    Some(NormalizedConnection {
        id: id_string(raw, "id"),
        position: get_i64(raw, "position"),
        pinned: get_bool(raw, "pinned").unwrap_or(false),
        channel_id: id_string(raw, "channel_id"),
        connected_at: get_str(raw, "connected_at").or_else(|| get_str(raw, "created_at")),
    })
}

pub fn normalize_channel(raw: &Value) -> NormalizedChannel {
    let id = id_string(raw, "id").unwrap_or_default();
    let slug = get_str(raw, "slug").unwrap_or_else(|| id.clone());

    // Counts are all-or-nothing: drop the struct unless every field parses.
    let counts = raw.get("counts").and_then(|c| {
        Some(ChannelCounts {
            blocks: get_i64(c, "blocks")?,
            channels: get_i64(c, "channels")?,
            contents: get_i64(c, "contents")?,
            collaborators: get_i64(c, "collaborators")?,
        })
    });

    NormalizedChannel {
        id,
        slug,
        title: get_str(raw, "title").unwrap_or_default(),
        description: field_markdown(raw, "description"),
        state: get_str(raw, "state").or_else(|| get_str(raw, "status")),
        visibility: get_str(raw, "visibility"),
        created_at: get_str(raw, "created_at"),
        updated_at: get_str(raw, "updated_at"),
        owner: raw
            .get("owner")
            .or_else(|| raw.get("user"))
            .and_then(normalize_user_summary),
        counts,
        connection: raw.get("connection").and_then(normalize_connection),
    }
}

fn normalize_block_kind(raw: &str) -> BlockKind {
    match raw {
        "Text" => BlockKind::Text,
        "Image" => BlockKind::Image,
        "Link" => BlockKind::Link,
        "Attachment" => BlockKind::Attachment,
        "Embed" => BlockKind::Embed,
        _ => BlockKind::Pending,
    }
}

fn normalize_image(raw: &Value) -> Option<ImagePayload> {
    if !raw.is_object() {
        return None;
    }
    Some(ImagePayload {
        url: get_str(raw, "url").or_else(|| raw.get("original").and_then(|o| get_str(o, "url"))),
        thumb_url: raw.get("thumb").and_then(|t| get_str(t, "url")),
        display_url: raw.get("display").and_then(|d| get_str(d, "url")),
        alt_text: get_str(raw, "alt_text"),
    })
}

fn normalize_attachment(raw: &Value) -> Option<AttachmentPayload> {
    if !raw.is_object() {
        return None;
    }
    Some(AttachmentPayload {
        url: get_str(raw, "url"),
        file_name: get_str(raw, "file_name"),
        file_size: get_i64(raw, "file_size"),
        extension: get_str(raw, "extension"),
        content_type: get_str(raw, "content_type"),
    })
}

fn normalize_embed(raw: &Value) -> Option<EmbedPayload> {
    if !raw.is_object() {
        return None;
    }
    Some(EmbedPayload {
        url: get_str(raw, "url").or_else(|| get_str(raw, "source_url")),
        html: get_str(raw, "html"),
        title: get_str(raw, "title"),
        author_name: get_str(raw, "author_name"),
        author_url: get_str(raw, "author_url"),
    })
}

pub fn normalize_block(raw: &Value) -> NormalizedBlock {
    let id = id_string(raw, "id").unwrap_or_default();
    let source = raw.get("source");

    NormalizedBlock {
        id,
        kind: get_str(raw, "type")
            .or_else(|| get_str(raw, "class"))
            .map(|t| normalize_block_kind(&t))
            .unwrap_or(BlockKind::Pending),
        title: get_str(raw, "title"),
        description: field_markdown(raw, "description"),
        state: get_str(raw, "state"),
        visibility: get_str(raw, "visibility"),
        comment_count: get_i64(raw, "comment_count"),
        created_at: get_str(raw, "created_at"),
        updated_at: get_str(raw, "updated_at"),
        user: raw.get("user").and_then(normalize_user_summary),
        source_url: source.and_then(|s| get_str(s, "url")),
        source_title: source.and_then(|s| get_str(s, "title")),
        content: field_markdown(raw, "content"),
        image: raw.get("image").and_then(normalize_image),
        attachment: raw.get("attachment").and_then(normalize_attachment),
        embed: raw.get("embed").and_then(normalize_embed),
    }
}

/// Normalizes one element of a mixed list by its declared `type` tag.
/// Channels are recognized explicitly; everything else is a block.
pub fn normalize_connectable(raw: &Value) -> Connectable {
    let tag = get_str(raw, "type")
        .or_else(|| get_str(raw, "base_class"))
        .unwrap_or_default();
    if tag == "Channel" {
        Connectable::Channel(normalize_channel(raw))
    } else {
        Connectable::Block(normalize_block(raw))
    }
}

/// Normalizes a `{data: [...], meta: {...}}` list response element-wise.
/// A bare top-level array is tolerated. Order is preserved as-is.
pub fn normalize_list(raw: &Value) -> NormalizedList {
    let items = raw
        .get("data")
        .and_then(Value::as_array)
        .or_else(|| raw.as_array())
        .map(|arr| arr.iter().map(normalize_connectable).collect())
        .unwrap_or_default();
    NormalizedList {
        data: items,
        meta: raw.get("meta").and_then(normalize_pagination),
    }
}

fn entity_type_from_tag(tag: &str) -> SearchEntityType {
    match tag {
        "Channel" => SearchEntityType::Channel,
        "User" => SearchEntityType::User,
        "Group" => SearchEntityType::Group,
        _ => SearchEntityType::Block,
    }
}

fn search_item(raw: &Value, entity_type: SearchEntityType) -> NormalizedSearchItem {
    let id = id_string(raw, "id").unwrap_or_default();
    let subtitle = get_str(raw, "subtitle").or_else(|| {
        raw.get("user")
            .and_then(|u| get_str(u, "name").or_else(|| get_str(u, "full_name")))
    });
    NormalizedSearchItem {
        id,
        entity_type,
        title: get_str(raw, "title").or_else(|| get_str(raw, "name")),
        subtitle,
        slug: get_str(raw, "slug"),
        block_type: match entity_type {
            SearchEntityType::Block => get_str(raw, "block_type")
                .or_else(|| get_str(raw, "class"))
                .or_else(|| get_str(raw, "type")),
            _ => None,
        },
        url: get_str(raw, "url"),
        raw: raw.clone(),
    }
}

/// Normalizes the current-generation search response: a unified item list
/// tagged per element, plus standard pagination meta.
pub fn normalize_search_v3(raw: &Value) -> NormalizedSearchResult {
    let items = raw
        .get("data")
        .and_then(Value::as_array)
        .map(|arr| {
            arr.iter()
                .map(|item| {
                    let tag = get_str(item, "type")
                        .or_else(|| get_str(item, "base_class"))
                        .unwrap_or_default();
                    search_item(item, entity_type_from_tag(&tag))
                })
                .collect()
        })
        .unwrap_or_default();
    NormalizedSearchResult {
        source_api: SearchSource::V3,
        items,
        meta: raw.get("meta").and_then(normalize_pagination),
    }
}

/// Normalizes the legacy v2 search response into the same result shape.
///
/// The legacy payload has no unified list: blocks, channels, and users live
/// in separately-keyed arrays and are concatenated in that fixed order.
/// `next_page`/`prev_page`/`has_more_pages` are synthesized from
/// `current_page`/`total_pages` since the shape has no native equivalents.
pub fn normalize_search_v2(raw: &Value) -> NormalizedSearchResult {
    let mut items = Vec::new();
    for (key, entity_type) in [
        ("blocks", SearchEntityType::Block),
        ("channels", SearchEntityType::Channel),
        ("users", SearchEntityType::User),
    ] {
        if let Some(arr) = raw.get(key).and_then(Value::as_array) {
            items.extend(arr.iter().map(|item| search_item(item, entity_type)));
        }
    }

    let current_page = get_i64(raw, "current_page").unwrap_or(1);
    let total_pages = get_i64(raw, "total_pages");
    let has_more_pages = total_pages.map(|t| current_page < t).unwrap_or(false);
    let meta = PaginationMeta {
        current_page,
        next_page: has_more_pages.then_some(current_page + 1),
        prev_page: (current_page > 1).then_some(current_page - 1),
        per_page: get_i64(raw, "per"),
        total_pages,
        total_count: get_i64(raw, "length"),
        has_more_pages,
    };

    NormalizedSearchResult {
        source_api: SearchSource::V2Fallback,
        items,
        meta: Some(meta),
    }
}
