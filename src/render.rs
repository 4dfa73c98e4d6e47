//! Markdown rendering of normalized entities for tool and CLI output.
//!
//! Pure string builders; the MCP layer and the CLI both consume these so
//! results read the same everywhere.

use crate::models::{
    Connectable, NormalizedBlock, NormalizedChannel, NormalizedList, NormalizedSearchResult,
    NormalizedUser, PaginationMeta, SearchSource,
};
use crate::resolver::ResolvedChannel;

pub fn render_channel(channel: &NormalizedChannel) -> String {
    let mut out = format!("## {}\n", display_title(&channel.title));
    out.push_str(&format!("slug: `{}`  id: `{}`\n", channel.slug, channel.id));
    if let Some(owner) = &channel.owner {
        out.push_str(&format!(
            "owner: {} (`{}`)\n",
            owner.name.as_deref().unwrap_or(&owner.slug),
            owner.slug
        ));
    }
    if let Some(state) = &channel.visibility {
        out.push_str(&format!("visibility: {state}\n"));
    }
    if let Some(counts) = &channel.counts {
        out.push_str(&format!(
            "contents: {} ({} blocks, {} channels)\n",
            counts.contents, counts.blocks, counts.channels
        ));
    }
    if let Some(desc) = &channel.description {
        out.push_str(&format!("\n{}\n", desc.markdown));
    }
    out
}

pub fn render_block(block: &NormalizedBlock) -> String {
    let kind = serde_json::to_value(block.kind)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    let mut out = format!(
        "## {} [{kind}]\n",
        display_title(block.title.as_deref().unwrap_or(""))
    );
    out.push_str(&format!("id: `{}`\n", block.id));
    if let Some(user) = &block.user {
        out.push_str(&format!(
            "by: {} (`{}`)\n",
            user.name.as_deref().unwrap_or(&user.slug),
            user.slug
        ));
    }
    if let Some(url) = &block.source_url {
        let title = block.source_title.as_deref().unwrap_or(url);
        out.push_str(&format!("source: [{title}]({url})\n"));
    }
    if let Some(content) = &block.content {
        out.push_str(&format!("\n{}\n", content.markdown));
    }
    if let Some(image) = &block.image {
        if let Some(url) = image.display_url.as_ref().or(image.url.as_ref()) {
            out.push_str(&format!("\n![image]({url})\n"));
        }
    }
    if let Some(attachment) = &block.attachment {
        if let Some(url) = &attachment.url {
            let name = attachment.file_name.as_deref().unwrap_or("attachment");
            out.push_str(&format!("\nattachment: [{name}]({url})\n"));
        }
    }
    if let Some(embed) = &block.embed {
        if let Some(url) = &embed.url {
            out.push_str(&format!("\nembed: {url}\n"));
        }
    }
    if let Some(desc) = &block.description {
        out.push_str(&format!("\n{}\n", desc.plain));
    }
    out
}

pub fn render_list(list: &NormalizedList) -> String {
    let mut out = String::new();
    for item in &list.data {
        match item {
            Connectable::Channel(ch) => {
                out.push_str(&format!(
                    "- [channel] {} (`{}`)\n",
                    display_title(&ch.title),
                    ch.slug
                ));
            }
            Connectable::Block(b) => {
                let title = b
                    .title
                    .as_deref()
                    .filter(|t| !t.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("block {}", b.id));
                out.push_str(&format!("- [block] {title} (id: {})\n", b.id));
            }
        }
    }
    if list.data.is_empty() {
        out.push_str("(empty)\n");
    }
    if let Some(meta) = &list.meta {
        out.push_str(&render_meta(meta));
    }
    out
}

pub fn render_search(result: &NormalizedSearchResult) -> String {
    let via = match result.source_api {
        SearchSource::V3 => "",
        SearchSource::V2Fallback => " (via legacy search)",
    };
    let mut out = format!("{} result(s){via}\n", result.items.len());
    for item in &result.items {
        let kind = format!("{:?}", item.entity_type).to_lowercase();
        let title = item
            .title
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{kind} {}", item.id));
        out.push_str(&format!("- [{kind}] {title}"));
        if let Some(slug) = &item.slug {
            out.push_str(&format!(" (`{slug}`)"));
        }
        if let Some(subtitle) = &item.subtitle {
            out.push_str(&format!(" — {subtitle}"));
        }
        out.push('\n');
    }
    if let Some(meta) = &result.meta {
        out.push_str(&render_meta(meta));
    }
    out
}

pub fn render_user(user: &NormalizedUser) -> String {
    let mut out = format!(
        "## {}\n",
        user.name.clone().unwrap_or_else(|| user.slug.clone())
    );
    out.push_str(&format!("slug: `{}`  id: `{}`\n", user.slug, user.id));
    if let Some(counts) = &user.counts {
        let mut parts = Vec::new();
        if let Some(n) = counts.channels {
            parts.push(format!("{n} channels"));
        }
        if let Some(n) = counts.blocks {
            parts.push(format!("{n} blocks"));
        }
        if let Some(n) = counts.followers {
            parts.push(format!("{n} followers"));
        }
        if let Some(n) = counts.following {
            parts.push(format!("{n} following"));
        }
        if !parts.is_empty() {
            out.push_str(&format!("{}\n", parts.join(", ")));
        }
    }
    if let Some(bio) = &user.bio {
        out.push_str(&format!("\n{}\n", bio.markdown));
    }
    out
}

pub fn render_resolved(resolved: &ResolvedChannel) -> String {
    let strategy = serde_json::to_value(resolved.strategy)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();
    format!(
        "resolved to `{}` (strategy: {strategy})\n\n{}",
        resolved.canonical,
        render_channel(&resolved.channel)
    )
}

fn render_meta(meta: &PaginationMeta) -> String {
    let mut out = format!("\npage {}", meta.current_page);
    if let Some(total) = meta.total_pages {
        out.push_str(&format!(" of {total}"));
    }
    if meta.has_more_pages {
        if let Some(next) = meta.next_page {
            out.push_str(&format!(" — more available (next: {next})"));
        } else {
            out.push_str(" — more available");
        }
    }
    out.push('\n');
    out
}

fn display_title(title: &str) -> &str {
    if title.is_empty() {
        "(untitled)"
    } else {
        title
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{normalize_channel, normalize_list, normalize_search_v2};
    use serde_json::json;

    #[test]
    fn channel_render_includes_identity_and_owner() {
        let ch = normalize_channel(&json!({
            "id": 4021,
            "slug": "reading-list",
            "title": "Reading List",
            "owner": {"id": 7, "slug": "morgan", "name": "Morgan"}
        }));
        let out = render_channel(&ch);
        assert!(out.contains("## Reading List"));
        assert!(out.contains("`reading-list`"));
        assert!(out.contains("Morgan"));
    }

    #[test]
    fn list_render_marks_kinds_and_pagination() {
        let list = normalize_list(&json!({
            "data": [
                {"id": 1, "type": "Channel", "title": "Inner", "slug": "inner"},
                {"id": 2, "type": "Text", "title": "Note"}
            ],
            "meta": {"current_page": 1, "next_page": 2, "total_pages": 3}
        }));
        let out = render_list(&list);
        assert!(out.contains("- [channel] Inner"));
        assert!(out.contains("- [block] Note"));
        assert!(out.contains("page 1 of 3"));
        assert!(out.contains("more available"));
    }

    #[test]
    fn fallback_search_render_is_labelled() {
        let result = normalize_search_v2(&json!({
            "channels": [{"id": 1, "title": "Maps", "slug": "maps"}],
            "current_page": 1,
            "total_pages": 1
        }));
        let out = render_search(&result);
        assert!(out.contains("via legacy search"));
        assert!(out.contains("- [channel] Maps (`maps`)"));
    }

    #[test]
    fn empty_list_says_so() {
        let out = render_list(&normalize_list(&json!({"data": []})));
        assert!(out.contains("(empty)"));
    }
}
