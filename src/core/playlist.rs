//! Playlist grammar: a line reader for variant lists, `m3u8-rs` for media
//! playlist snapshots, and segment naming.

use crate::core::error::ParseError;
use crate::core::model::{NamingScheme, SegmentIndex, StreamVariant};
use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;
use url::Url;

pub const PLAYLIST_HEADER: &str = "#EXTM3U";
pub const STREAM_INF: &str = "#EXT-X-STREAM-INF:";

/// A segment URI split around its sequence index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentMatch {
    pub index: SegmentIndex,
    pub prefix: String,
    pub suffix: String,
}

impl SegmentMatch {
    pub fn scheme(&self) -> NamingScheme {
        NamingScheme { prefix: self.prefix.clone(), suffix: self.suffix.clone() }
    }
}

fn segment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<prefix>.*_\d+)_(?P<index>\d+)(?P<ext>\.[A-Za-z0-9]+)$").expect("segment pattern compiles")
    })
}

/// Text from the first `#EXTM3U` marker on, if any.
pub fn playlist_body(input: &str) -> Option<&str> {
    input.find(PLAYLIST_HEADER).map(|start| &input[start..])
}

pub fn is_variant_list(text: &str) -> bool {
    text.lines().any(|l| l.trim_start().starts_with(STREAM_INF))
}

/// Variant entries in document order; URLs are left as written.
pub fn parse_variants(text: &str) -> Vec<StreamVariant> {
    let mut variants = vec![];
    let mut pending: Option<&str> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(attrs) = line.strip_prefix(STREAM_INF) {
            pending = Some(attrs);
        } else if line.starts_with('#') {
            pending = None;
        } else if let Some(attrs) = pending.take() {
            let mut resolution = None;
            let mut bandwidth = 0;
            for (key, value) in split_attributes(attrs) {
                match key {
                    "RESOLUTION" => resolution = Some(value.to_string()),
                    "BANDWIDTH" => bandwidth = value.parse().unwrap_or(0),
                    _ => {}
                }
            }
            variants.push(StreamVariant { resolution, bandwidth, url: line.to_string() });
        }
    }
    variants
}

/// `KEY=VALUE` pairs of an attribute list; commas inside quotes do not split.
fn split_attributes(attrs: &str) -> Vec<(&str, &str)> {
    let mut out = vec![];
    let mut start = 0;
    let mut quoted = false;
    for (i, c) in attrs.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                push_attribute(&attrs[start..i], &mut out);
                start = i + 1;
            }
            _ => {}
        }
    }
    push_attribute(&attrs[start..], &mut out);
    out
}

fn push_attribute<'a>(raw: &'a str, out: &mut Vec<(&'a str, &'a str)>) {
    if let Some((k, v)) = raw.split_once('=') {
        out.push((k.trim(), v.trim().trim_matches('"')));
    }
}

/// Highest resolution first, then highest bandwidth.
pub fn sort_by_height_desc(variants: &mut [StreamVariant]) {
    variants.sort_by(|a, b| b.height().cmp(&a.height()).then(b.bandwidth.cmp(&a.bandwidth)));
}

pub fn resolve_reference(base: Option<&Url>, reference: &str) -> Result<Url, ParseError> {
    match Url::parse(reference) {
        Ok(u) => Ok(u),
        Err(url::ParseError::RelativeUrlWithoutBase) => match base {
            Some(b) => b.join(reference).map_err(|e| ParseError::InvalidUrl {
                url: reference.to_string(),
                reason: e.to_string(),
            }),
            None => Err(ParseError::MissingSource),
        },
        Err(e) => Err(ParseError::InvalidUrl { url: reference.to_string(), reason: e.to_string() }),
    }
}

/// Splits an absolute segment URL per `<prefix>_<rendition>_<index>.<ext>[?query]`.
pub fn match_segment(url: &str) -> Option<SegmentMatch> {
    let (path, query) = match url.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (url, None),
    };
    let caps = segment_pattern().captures(path)?;
    let index = caps["index"].parse().ok()?;
    let suffix = match query {
        Some(q) => format!("{}?{}", &caps["ext"], q),
        None => caps["ext"].to_string(),
    };
    Some(SegmentMatch { index, prefix: caps["prefix"].to_string(), suffix })
}

/// Segment URIs of one media playlist snapshot, resolved against `base`.
pub fn media_segment_uris(text: &str, base: &Url) -> Result<Vec<String>, ParseError> {
    let body = playlist_body(text).unwrap_or(text);
    let body: Cow<str> = if body.ends_with('\n') { Cow::Borrowed(body) } else { Cow::Owned(format!("{body}\n")) };
    let playlist = m3u8_rs::parse_media_playlist_res(body.as_bytes()).map_err(|e| ParseError::Malformed {
        url: base.to_string(),
        reason: e.to_string().chars().take(160).collect(),
    })?;
    Ok(playlist
        .segments
        .iter()
        .map(|seg| seg.uri.trim())
        .filter(|uri| !uri.is_empty())
        .filter_map(|uri| base.join(uri).ok().map(String::from))
        .collect())
}

/// Naming scheme and horizon from the highest-index segment of one snapshot.
pub fn derive_scheme(text: &str, base: &Url) -> Result<(NamingScheme, SegmentIndex), ParseError> {
    if is_variant_list(text) {
        return Err(ParseError::NoSegments { url: base.to_string() });
    }
    let top = media_segment_uris(text, base)?
        .iter()
        .filter_map(|uri| match_segment(uri))
        .max_by_key(|m| m.index)
        .ok_or_else(|| ParseError::NoSegments { url: base.to_string() })?;
    Ok((top.scheme(), top.index))
}
