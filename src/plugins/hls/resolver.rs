use crate::core::model::{RequestHeaders, StreamReference};
use crate::core::playlist::{self, PLAYLIST_HEADER};
use crate::plugins::registry::{InputResolver, ResolvedInput};
use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;
use tokio::io::AsyncReadExt;
use url::Url;

/// Marker input meaning "read the document from stdin".
pub const STDIN_INPUT: &str = "-";

pub struct UrlInputResolver;

impl UrlInputResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl InputResolver for UrlInputResolver {
    fn name(&self) -> &'static str {
        "url-input"
    }

    fn can_handle(&self, raw: &str) -> u8 {
        match Url::parse(raw) {
            Ok(u) if u.scheme() == "http" || u.scheme() == "https" => 60,
            _ => 0,
        }
    }

    async fn resolve(&self, raw: &str) -> anyhow::Result<ResolvedInput> {
        let url = Url::parse(raw).with_context(|| format!("invalid playlist url: {raw}"))?;
        let mut warnings = vec![];
        if !url.path().ends_with(".m3u8") {
            warnings.push(format!("{} does not look like an .m3u8 playlist", url));
        }
        Ok(ResolvedInput {
            reference: StreamReference::Url(url.into()),
            headers: RequestHeaders::new(),
            warnings,
        })
    }
}

/// Pasted text: a playlist body, or any document (a copied request, notes)
/// that mentions an `.m3u8` URL.
pub struct DocumentInputResolver;

impl DocumentInputResolver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl InputResolver for DocumentInputResolver {
    fn name(&self) -> &'static str {
        "document-input"
    }

    fn can_handle(&self, raw: &str) -> u8 {
        if raw == STDIN_INPUT || Path::new(raw).is_file() {
            40
        } else {
            0
        }
    }

    async fn resolve(&self, raw: &str) -> anyhow::Result<ResolvedInput> {
        let text = if raw == STDIN_INPUT {
            let mut buf = String::new();
            tokio::io::stdin().read_to_string(&mut buf).await.context("read playlist from stdin")?;
            buf
        } else {
            tokio::fs::read_to_string(raw).await.with_context(|| format!("read {raw}"))?
        };
        parse_document(&text)
    }
}

fn playlist_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"https?://[^\s'"<>]+?\.m3u8(?:\?[^\s'"<>]*)?"#).expect("valid regex"))
}

fn cookie_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?im)\bcookie:\s*([^'"\r\n]+)"#).expect("valid regex"))
}

/// Playlist text wins over a URL; a URL seen before the playlist becomes its base.
pub fn parse_document(text: &str) -> anyhow::Result<ResolvedInput> {
    if text.trim().is_empty() {
        anyhow::bail!("input document is empty");
    }

    let mut headers = RequestHeaders::new();
    if let Some(c) = cookie_re().captures(text).and_then(|c| c.get(1)) {
        let value = c.as_str().trim();
        if !value.is_empty() {
            headers.insert("Cookie".to_string(), value.to_string());
        }
    }

    let mut warnings = vec![];
    let reference = match playlist::playlist_body(text) {
        Some(body) => {
            let preamble = &text[..text.len() - body.len()];
            let base = playlist_url_re().find(preamble).map(|m| m.as_str().to_string());
            if base.is_none() {
                warnings.push("no playlist url in the document; relative entries cannot be fetched".to_string());
            }
            StreamReference::Inline { text: body.to_string(), base }
        }
        None => {
            let m = playlist_url_re()
                .find(text)
                .ok_or_else(|| anyhow::anyhow!("no {} marker and no .m3u8 url in the input", PLAYLIST_HEADER))?;
            StreamReference::Url(m.as_str().to_string())
        }
    };

    Ok(ResolvedInput { reference, headers, warnings })
}
