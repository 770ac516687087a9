use chrono::{DateTime, Utc};
use feed_rs::parser;

/// Relation tag of the link pointing at an entry's downloadable media.
pub const ENCLOSURE_REL: &str = "enclosure";

/// Relation assumed for links that carry no explicit `rel`.
const DEFAULT_REL: &str = "alternate";

/// A feed document reduced to what the aggregator consumes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedFeed {
    pub title: Option<String>,
    /// Homepage of the show
    pub link: Option<String>,
    pub description: Option<String>,
    /// Cover art URI
    pub image: Option<String>,
    /// Entries in document order
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedEntry {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub links: Vec<EntryLink>,
}

/// One (relation, href, MIME type) link of an entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryLink {
    pub rel: String,
    pub href: String,
    pub mime_type: Option<String>,
}

impl EntryLink {
    pub fn is_enclosure(&self) -> bool {
        self.rel.eq_ignore_ascii_case(ENCLOSURE_REL)
    }
}

/// Parse an RSS/Atom/JSON feed document.
///
/// RSS `<enclosure>` elements are exposed by feed-rs as media content; they
/// are appended to the entry's links as `enclosure` links so that every
/// format looks the same to the reconciler. Image media content (cover art,
/// thumbnails) is not an episode and is left out.
pub fn parse_feed(bytes: &[u8]) -> Result<ParsedFeed, parser::ParseFeedError> {
    let feed = parser::parse(bytes)?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let mut links: Vec<EntryLink> = entry
                .links
                .into_iter()
                .map(|l| EntryLink {
                    rel: l.rel.unwrap_or_else(|| DEFAULT_REL.to_string()),
                    href: l.href,
                    mime_type: l.media_type,
                })
                .collect();

            links.extend(
                entry
                    .media
                    .iter()
                    .flat_map(|m| m.content.iter())
                    .filter_map(|c| {
                        let url = c.url.as_ref()?;
                        let mime_type = c.content_type.as_ref().map(|m| m.to_string());
                        if is_image(url, mime_type.as_deref()) {
                            return None;
                        }
                        Some(EntryLink {
                            rel: ENCLOSURE_REL.to_string(),
                            href: url.to_string(),
                            mime_type,
                        })
                    }),
            );

            let summary = entry
                .summary
                .map(|s| s.content)
                .or_else(|| entry.content.and_then(|c| c.body));

            ParsedEntry {
                title: entry.title.map(|t| t.content),
                summary,
                published: entry.published.or(entry.updated),
                links,
            }
        })
        .collect();

    Ok(ParsedFeed {
        title: feed.title.map(|t| t.content),
        link: feed.links.into_iter().next().map(|l| l.href),
        description: feed.description.map(|d| d.content),
        image: feed.logo.or(feed.icon).map(|i| i.uri),
        entries,
    })
}

/// Whether a media content item is an image, by declared type or, when
/// untyped, by the file extension of its URL.
fn is_image(url: &url::Url, mime_type: Option<&str>) -> bool {
    match mime_type {
        Some(mime) => mime.trim_start().to_ascii_lowercase().starts_with("image/"),
        None => mime_guess::from_path(url.path())
            .first()
            .is_some_and(|m| m.type_() == mime_guess::mime::IMAGE),
    }
}
