//! Free-form channel reference resolution.
//!
//! Upstream accepts only exact ids or slugs, but humans paste titles,
//! partial slugs, `owner/slug` pairs, and full web URLs. The resolver
//! normalizes the input, tries a direct lookup, and on a 404 falls back to
//! a scoped search with three exact-match strategies in fixed priority:
//! slug, then title, then single-result. It refuses to guess when the
//! candidate set stays ambiguous, and it fails closed when the resolved
//! channel's owner does not match an owner extracted from the input.

use serde::Serialize;
use tracing::debug;

use crate::client::{ArenaClient, SearchParams};
use crate::error::{ArenaError, ChannelCandidate};
use crate::models::{NormalizedChannel, SearchEntityType, SearchSource};

/// Hostnames recognized as the canonical Are.na web frontend.
const CANONICAL_HOSTS: &[&str] = &["are.na", "www.are.na"];

/// How many search candidates the fallback considers.
const SEARCH_CANDIDATES: u32 = 10;

/// Which path succeeded in resolving the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolveStrategy {
    Direct,
    UrlExtracted,
    SearchExactSlug,
    SearchExactTitle,
    SearchSingle,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedChannel {
    pub channel: NormalizedChannel,
    /// The verified canonical identifier, suitable for later direct calls.
    pub canonical: String,
    pub strategy: ResolveStrategy,
    pub expected_owner: Option<String>,
    /// Which search generation produced the candidates, when search ran.
    pub search_source: Option<SearchSource>,
}

/// The outcome of input normalization, before any network call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedInput {
    pub identifier: String,
    pub expected_owner: Option<String>,
    pub from_url: bool,
}

/// Normalizes raw human input into an identifier plus optional owner
/// expectation. URL forms on the canonical domain are unpacked; otherwise
/// a single `/` splits an `owner/slug` pair.
pub fn parse_channel_input(raw: &str) -> ParsedInput {
    let trimmed = raw.trim();

    if let Ok(url) = reqwest::Url::parse(trimmed) {
        if let Some(host) = url.host_str() {
            if CANONICAL_HOSTS.contains(&host.to_ascii_lowercase().as_str()) {
                let segments: Vec<&str> = url
                    .path_segments()
                    .map(|s| s.filter(|p| !p.is_empty()).collect())
                    .unwrap_or_default();
                match segments.as_slice() {
                    ["channel", slug, ..] => {
                        return ParsedInput {
                            identifier: slug.to_string(),
                            expected_owner: None,
                            from_url: true,
                        };
                    }
                    [owner, slug]
                        if *owner != "channel"
                            && *owner != "block"
                            && *slug != "channel"
                            && *slug != "block" =>
                    {
                        return ParsedInput {
                            identifier: slug.to_string(),
                            expected_owner: Some(owner.to_string()),
                            from_url: true,
                        };
                    }
                    // block/... and anything else falls through to the
                    // plain-string handling below.
                    _ => {}
                }
            }
        }
    }

    if let Some((owner, slug)) = trimmed.split_once('/') {
        return ParsedInput {
            identifier: slug.to_string(),
            expected_owner: Some(owner.to_string()),
            from_url: false,
        };
    }

    ParsedInput {
        identifier: trimmed.to_string(),
        expected_owner: None,
        from_url: false,
    }
}

/// Resolves a free-form channel reference into a verified channel.
pub async fn resolve_channel(
    client: &ArenaClient,
    raw: &str,
) -> Result<ResolvedChannel, ArenaError> {
    let trimmed = raw.trim();
    let parsed = parse_channel_input(raw);

    let direct_err = match client.get_channel(&parsed.identifier).await {
        Ok(channel) => {
            verify_owner(&channel, parsed.expected_owner.as_deref())?;
            let strategy = if parsed.from_url {
                ResolveStrategy::UrlExtracted
            } else {
                ResolveStrategy::Direct
            };
            return Ok(resolved(channel, strategy, parsed.expected_owner, None));
        }
        // Only a not-found kicks off the search fallback.
        Err(err) if err.is_not_found() => err,
        Err(err) => return Err(err),
    };

    debug!("direct lookup of \"{}\" missed; searching", parsed.identifier);

    let result = client
        .search(&SearchParams {
            query: trimmed.to_string(),
            entities: vec![SearchEntityType::Channel],
            scope: Some("my".to_string()),
            page: Some(1),
            per: Some(SEARCH_CANDIDATES),
        })
        .await?;
    let source = result.source_api;
    let candidates: Vec<_> = result
        .items
        .into_iter()
        .filter(|item| item.entity_type == SearchEntityType::Channel)
        .collect();

    // Priority order is fixed: exact slug, exact title, lone result.
    let slug_matches: Vec<_> = candidates
        .iter()
        .filter(|c| {
            c.slug
                .as_deref()
                .is_some_and(|s| s.eq_ignore_ascii_case(&parsed.identifier))
        })
        .collect();
    if let [only] = slug_matches.as_slice() {
        return fetch_candidate(
            client,
            *only,
            ResolveStrategy::SearchExactSlug,
            &parsed,
            source,
        )
        .await;
    }

    let title_matches: Vec<_> = candidates
        .iter()
        .filter(|c| {
            c.title
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case(trimmed))
        })
        .collect();
    if let [only] = title_matches.as_slice() {
        return fetch_candidate(
            client,
            *only,
            ResolveStrategy::SearchExactTitle,
            &parsed,
            source,
        )
        .await;
    }

    match candidates.as_slice() {
        [only] => fetch_candidate(client, only, ResolveStrategy::SearchSingle, &parsed, source).await,
        [] => Err(direct_err),
        many => Err(ArenaError::AmbiguousChannel {
            input: trimmed.to_string(),
            candidates: many
                .iter()
                .take(5)
                .map(|c| ChannelCandidate {
                    title: c.title.clone().unwrap_or_default(),
                    slug: c.slug.clone().unwrap_or_default(),
                    id: c.id.clone(),
                })
                .collect(),
        }),
    }
}

async fn fetch_candidate(
    client: &ArenaClient,
    candidate: &crate::models::NormalizedSearchItem,
    strategy: ResolveStrategy,
    parsed: &ParsedInput,
    source: SearchSource,
) -> Result<ResolvedChannel, ArenaError> {
    let key = candidate.slug.clone().unwrap_or_else(|| candidate.id.clone());
    let channel = client.get_channel(&key).await?;
    verify_owner(&channel, parsed.expected_owner.as_deref())?;
    Ok(resolved(
        channel,
        strategy,
        parsed.expected_owner.clone(),
        Some(source),
    ))
}

/// A derived owner constraint must match the resolved channel's owner slug
/// case-insensitively. A missing owner fails too: returning content under
/// the wrong assumed owner is worse than failing closed.
fn verify_owner(channel: &NormalizedChannel, expected: Option<&str>) -> Result<(), ArenaError> {
    let Some(expected) = expected else {
        return Ok(());
    };
    let found = channel.owner.as_ref().map(|o| o.slug.clone());
    match &found {
        Some(slug) if slug.eq_ignore_ascii_case(expected) => Ok(()),
        _ => Err(ArenaError::OwnerMismatch {
            slug: channel.slug.clone(),
            expected: expected.to_string(),
            found,
        }),
    }
}

fn resolved(
    channel: NormalizedChannel,
    strategy: ResolveStrategy,
    expected_owner: Option<String>,
    search_source: Option<SearchSource>,
) -> ResolvedChannel {
    let canonical = if channel.slug.is_empty() {
        channel.id.clone()
    } else {
        channel.slug.clone()
    };
    ResolvedChannel {
        channel,
        canonical,
        strategy,
        expected_owner,
        search_source,
    }
}
