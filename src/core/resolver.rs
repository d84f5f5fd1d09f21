use crate::core::error::{ArchiveError, FetchError, ParseError};
use crate::core::model::{NamingScheme, RequestHeaders, SegmentIndex, StreamReference, StreamVariant, VariantPreference};
use crate::core::playlist;
use crate::plugins::registry::HttpFetch;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone)]
pub struct ResolvedStream {
    /// `None` when the reference already was a media playlist, or no variant matched.
    pub variant: Option<StreamVariant>,
    pub media_url: Url,
    pub scheme: NamingScheme,
    /// Highest segment index in the first media playlist snapshot.
    pub horizon: SegmentIndex,
}

pub struct PlaylistResolver {
    fetch: Arc<dyn HttpFetch>,
    headers: RequestHeaders,
    timeout: Duration,
}

impl PlaylistResolver {
    pub fn new(fetch: Arc<dyn HttpFetch>, headers: RequestHeaders, timeout: Duration) -> Self {
        Self { fetch, headers, timeout }
    }

    /// Single attempt; retrying is left to the caller.
    pub async fn fetch_text(&self, url: &Url) -> Result<String, FetchError> {
        let body = self
            .fetch
            .get(url.as_str(), &self.headers, self.timeout)
            .await?
            .into_success(url.as_str())?;
        Ok(String::from_utf8_lossy(&body).into_owned())
    }

    async fn load(&self, reference: &StreamReference) -> Result<(String, Option<Url>), ArchiveError> {
        match reference {
            StreamReference::Url(raw) => {
                let url = playlist::resolve_reference(None, raw)?;
                debug!(url = %url, "fetching top-level playlist");
                let text = self.fetch_text(&url).await?;
                Ok((text, Some(url)))
            }
            StreamReference::Inline { text, base } => {
                let base = base.as_deref().map(|b| playlist::resolve_reference(None, b)).transpose()?;
                Ok((text.clone(), base))
            }
        }
    }

    /// Variants of the reference with absolute URLs, tallest first.
    pub async fn list_variants(&self, reference: &StreamReference) -> Result<Vec<StreamVariant>, ArchiveError> {
        let (text, source) = self.load(reference).await?;
        Ok(absolute_variants(&text, source.as_ref()))
    }

    pub async fn resolve(
        &self,
        reference: &StreamReference,
        pref: &VariantPreference,
    ) -> Result<ResolvedStream, ArchiveError> {
        let (top, source) = self.load(reference).await?;

        let (variant, media_url, media_text) = if playlist::is_variant_list(&top) {
            let variants = absolute_variants(&top, source.as_ref());
            match select_variant(&variants, pref) {
                Some(v) => {
                    let url = playlist::resolve_reference(None, &v.url)?;
                    info!(resolution = v.resolution_label(), bandwidth = v.bandwidth, url = %url, "variant selected");
                    let text = self.fetch_text(&url).await?;
                    (Some(v), url, text)
                }
                None => {
                    warn!(?pref, "no variant matches, using the source as the media playlist");
                    let url = source.ok_or(ParseError::MissingSource)?;
                    (None, url, top)
                }
            }
        } else {
            let url = source.ok_or(ParseError::MissingSource)?;
            (None, url, top)
        };

        let (scheme, horizon) = playlist::derive_scheme(&media_text, &media_url)?;
        info!(horizon, prefix = %scheme.prefix, suffix = %scheme.suffix, "segment naming derived");
        Ok(ResolvedStream { variant, media_url, scheme, horizon })
    }
}

fn absolute_variants(text: &str, base: Option<&Url>) -> Vec<StreamVariant> {
    let mut variants: Vec<StreamVariant> = playlist::parse_variants(text)
        .into_iter()
        .filter_map(|mut v| match playlist::resolve_reference(base, &v.url) {
            Ok(u) => {
                v.url = u.into();
                Some(v)
            }
            Err(e) => {
                debug!(url = %v.url, error = %e, "dropping unresolvable variant");
                None
            }
        })
        .collect();
    playlist::sort_by_height_desc(&mut variants);
    variants
}

/// Tallest variant when `pref` is empty; otherwise the closest match within tolerance.
pub fn select_variant(variants: &[StreamVariant], pref: &VariantPreference) -> Option<StreamVariant> {
    if pref.is_empty() {
        return variants
            .iter()
            .max_by(|a, b| a.height().cmp(&b.height()).then(a.bandwidth.cmp(&b.bandwidth)))
            .cloned();
    }
    variants
        .iter()
        .filter(|v| v.matches(pref))
        .min_by_key(|v| pref.bandwidth.map(|bw| v.bandwidth.abs_diff(bw)).unwrap_or(u64::MAX - v.bandwidth))
        .cloned()
}
