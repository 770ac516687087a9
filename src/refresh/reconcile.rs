use chrono::Local;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::feed::{EntryLink, ParsedEntry, ParsedFeed};
use crate::storage::{epoch, Connection, DatabaseError, Episode, Feed};
use crate::util::sanitize_filename;

/// MIME type recorded for enclosures that don't declare one.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// Extension used when a MIME type maps to nothing known.
const FALLBACK_EXTENSION: &str = "bin";

/// Common podcast media types, checked before the general MIME database so
/// the usual cases get the conventional extension (`mp3`, not `mpga`).
const PODCAST_EXTENSIONS: &[(&str, &str)] = &[
    ("audio/mpeg", "mp3"),
    ("audio/mp3", "mp3"),
    ("audio/x-mp3", "mp3"),
    ("audio/x-mpeg", "mp3"),
    ("audio/mp4", "m4a"),
    ("audio/m4a", "m4a"),
    ("audio/x-m4a", "m4a"),
    ("audio/aac", "aac"),
    ("audio/x-aac", "aac"),
    ("audio/ogg", "ogg"),
    ("audio/vorbis", "ogg"),
    ("audio/opus", "opus"),
    ("audio/flac", "flac"),
    ("audio/x-flac", "flac"),
    ("audio/wav", "wav"),
    ("audio/x-wav", "wav"),
    ("video/mp4", "mp4"),
    ("video/x-m4v", "m4v"),
    ("video/webm", "webm"),
    ("video/quicktime", "mov"),
    ("application/pdf", "pdf"),
];

/// Store the episodes of `parsed` that `feed` doesn't know about yet.
///
/// Known episodes are looked up once, up front, by enclosure URL. Each new
/// candidate is then inserted on its own; a candidate storage rejects (a
/// URL already stored, possibly by another feed) is logged and skipped, as
/// is any other failure to insert a single episode.
///
/// Returns the stored episodes in document order.
///
/// # Errors
///
/// Only if the known episodes can't be loaded; nothing is written then.
pub async fn process_feed(
    conn: &mut Connection,
    feed: &Feed,
    parsed: &ParsedFeed,
) -> Result<Vec<Episode>, DatabaseError> {
    let stored = conn.episode_get_by_feed(feed.id).await?;
    let known: HashSet<String> = stored.iter().map(|e| e.url.clone()).collect();
    let taken: HashSet<PathBuf> = stored.into_iter().map(|e| e.path).collect();

    let mut added = Vec::new();
    for mut episode in reconcile(feed, &known, &taken, parsed) {
        match conn.episode_add(&mut episode).await {
            Ok(Some(_)) => {
                tracing::debug!(
                    feed_id = feed.id,
                    title = %episode.title,
                    url = %episode.url,
                    "Stored new episode"
                );
                added.push(episode);
            }
            Ok(None) => {
                tracing::info!(
                    feed_id = feed.id,
                    url = %episode.url,
                    "Skipping episode already stored"
                );
            }
            Err(e) => {
                tracing::warn!(
                    feed_id = feed.id,
                    url = %episode.url,
                    error = %e,
                    "Failed to store episode, skipping"
                );
            }
        }
    }

    Ok(added)
}

/// Build episode records for the entries of `parsed` that are new.
///
/// An entry is new if its first enclosure link has a URL outside `known`.
/// Entries without an enclosure are ignored. Two entries sharing a URL
/// both come back; storage decides which one wins.
///
/// Every returned episode gets a path outside `taken` and distinct from the
/// others, so entries sharing a title are all kept.
pub fn reconcile(
    feed: &Feed,
    known: &HashSet<String>,
    taken: &HashSet<PathBuf>,
    parsed: &ParsedFeed,
) -> Vec<Episode> {
    let mut used = taken.clone();
    parsed
        .entries
        .iter()
        .filter_map(|entry| {
            let enclosure = entry.links.iter().find(|l| l.is_enclosure())?;
            if known.contains(&enclosure.href) {
                return None;
            }
            let episode = build_episode(feed, entry, enclosure, &used);
            used.insert(episode.path.clone());
            Some(episode)
        })
        .collect()
}

fn build_episode(
    feed: &Feed,
    entry: &ParsedEntry,
    enclosure: &EntryLink,
    used: &HashSet<PathBuf>,
) -> Episode {
    let title = entry.title.clone().unwrap_or_default();
    let extension = extension_for_mime(enclosure.mime_type.as_deref());
    let stem = if title.trim().is_empty() {
        url_stem(&enclosure.href).unwrap_or_default()
    } else {
        title.clone()
    };
    let path = unique_path(&feed.folder, &sanitize_filename(&stem), extension, used);

    let link = entry
        .links
        .iter()
        .find(|l| !l.is_enclosure())
        .map(|l| l.href.clone())
        .unwrap_or_default();

    Episode {
        id: 0,
        feed_id: feed.id,
        number: episode_number(&title),
        title,
        url: enclosure.href.clone(),
        published: entry
            .published
            .map(|p| p.with_timezone(&Local))
            .unwrap_or_else(epoch),
        link,
        mime_type: enclosure
            .mime_type
            .clone()
            .unwrap_or_else(|| DEFAULT_MIME_TYPE.to_string()),
        cur_pos: 0,
        finished: false,
        path,
        keep: false,
        description: entry.summary.clone().unwrap_or_default(),
    }
}

/// Last path segment of `url` without its extension, if it has one.
fn url_stem(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.rev().find(|s| !s.is_empty())?;
    let stem = match segment.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => segment,
    };
    Some(stem.to_string())
}

/// `folder/stem.ext`, or `folder/stem (n).ext` with the smallest `n >= 2`
/// not in `used`.
fn unique_path(folder: &Path, stem: &str, extension: &str, used: &HashSet<PathBuf>) -> PathBuf {
    let first = folder.join(format!("{}.{}", stem, extension));
    if !used.contains(&first) {
        return first;
    }
    (2..)
        .map(|n| folder.join(format!("{} ({}).{}", stem, n, extension)))
        .find(|p| !used.contains(p))
        .unwrap_or(first)
}

/// File extension for an enclosure's MIME type, without the dot.
///
/// Parameters such as `; charset=...` are ignored. Unknown or missing
/// types map to `bin`.
pub fn extension_for_mime(mime: Option<&str>) -> &'static str {
    let Some(mime) = mime else {
        return FALLBACK_EXTENSION;
    };
    let essence = mime
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if let Some(&(_, ext)) = PODCAST_EXTENSIONS.iter().find(|(m, _)| *m == essence) {
        return ext;
    }

    mime_guess::get_mime_extensions_str(&essence)
        .and_then(|exts| exts.first().copied())
        .unwrap_or(FALLBACK_EXTENSION)
}

/// Guess an episode number from its title.
///
/// Recognizes `#12`, `Episode 12`, `Ep. 12` and `Ep12`, case-insensitively.
/// Returns 0 when nothing matches.
pub fn episode_number(title: &str) -> i64 {
    let lower = title.to_lowercase();

    for marker in ["episode", "ep.", "ep", "#"] {
        for (idx, _) in lower.match_indices(marker) {
            let at_word_start = marker == "#"
                || lower[..idx]
                    .chars()
                    .next_back()
                    .map_or(true, |c| !c.is_alphanumeric());
            if !at_word_start {
                continue;
            }

            let rest = lower[idx + marker.len()..]
                .trim_start_matches(|c: char| c.is_whitespace() || c == '#' || c == '.');
            let digits: String = rest
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .take(9)
                .collect();
            if let Ok(n) = digits.parse() {
                return n;
            }
        }
    }

    0
}
