use std::collections::HashMap;
use std::path::PathBuf;
use uuid::Uuid;

pub type SessionId = Uuid;
pub type SegmentIndex = u64;
pub type RequestHeaders = HashMap<String, String>;

/// Allowed distance between a preferred bandwidth and a candidate's, in bits/s.
pub const BANDWIDTH_TOLERANCE: u64 = 10_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamVariant {
    /// `WxH`, if the playlist declared one.
    pub resolution: Option<String>,
    /// Declared peak bandwidth in bits per second.
    pub bandwidth: u64,
    pub url: String,
}

impl StreamVariant {
    pub fn height(&self) -> u32 {
        self.resolution
            .as_deref()
            .and_then(|r| r.split_once('x'))
            .and_then(|(_, h)| h.parse().ok())
            .unwrap_or(0)
    }

    pub fn resolution_label(&self) -> &str {
        self.resolution.as_deref().unwrap_or("N/A")
    }

    pub fn bandwidth_label(&self) -> String {
        format!("{:.2} Mbps", self.bandwidth as f64 / 1_000_000.0)
    }

    pub fn matches(&self, pref: &VariantPreference) -> bool {
        if let Some(res) = &pref.resolution {
            if self.resolution.as_deref() != Some(res.as_str()) {
                return false;
            }
        }
        match pref.bandwidth {
            Some(bw) => self.bandwidth.abs_diff(bw) <= BANDWIDTH_TOLERANCE,
            None => true,
        }
    }
}

/// What the operator chose previously; both fields empty means "best available".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VariantPreference {
    pub resolution: Option<String>,
    pub bandwidth: Option<u64>,
}

impl VariantPreference {
    pub fn is_empty(&self) -> bool {
        self.resolution.is_none() && self.bandwidth.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingScheme {
    pub prefix: String,
    pub suffix: String,
}

impl NamingScheme {
    pub fn url_for(&self, index: SegmentIndex) -> String {
        format!("{}_{}{}", self.prefix, index, self.suffix)
    }

    /// Suffix without any query string, e.g. `.ts`.
    pub fn extension(&self) -> &str {
        match self.suffix.split_once('?') {
            Some((ext, _)) => ext,
            None => &self.suffix,
        }
    }

    pub fn file_name_for(&self, index: SegmentIndex) -> String {
        format!("{:08}{}", index, self.extension())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentStatus {
    Pending,
    Fetching,
    Done,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRef {
    pub index: SegmentIndex,
    pub url: String,
    pub path: PathBuf,
    pub status: SegmentStatus,
    pub attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Resolving,
    BackfillDownload,
    LiveTail,
    Assembling,
    Cleanup,
    Completed,
    CompletedWithGaps,
    Failed,
}

impl SessionPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::CompletedWithGaps | Self::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamReference {
    Url(String),
    /// Playlist text supplied directly; `base` resolves relative entries and is
    /// the URL polled for a media playlist.
    Inline { text: String, base: Option<String> },
}

#[derive(Debug, Clone)]
pub struct ArchiveRequest {
    pub reference: StreamReference,
    /// `None` derives a name from the selected variant.
    pub destination: Option<PathBuf>,
    pub headers: RequestHeaders,
    pub preference: VariantPreference,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_synthesizes_urls_and_file_names() {
        let scheme = NamingScheme {
            prefix: "https://cdn.example/live/index_0".to_string(),
            suffix: ".ts?m=100".to_string(),
        };
        assert_eq!(scheme.url_for(12), "https://cdn.example/live/index_0_12.ts?m=100");
        assert_eq!(scheme.extension(), ".ts");
        assert_eq!(scheme.file_name_for(12), "00000012.ts");
    }

    #[test]
    fn variant_matching_uses_resolution_then_bandwidth_tolerance() {
        let v = StreamVariant {
            resolution: Some("1280x720".to_string()),
            bandwidth: 2_500_000,
            url: "v.m3u8".to_string(),
        };
        let near = VariantPreference { resolution: Some("1280x720".to_string()), bandwidth: Some(2_509_000) };
        let far = VariantPreference { resolution: Some("1280x720".to_string()), bandwidth: Some(2_520_000) };
        let other = VariantPreference { resolution: Some("1920x1080".to_string()), bandwidth: None };
        assert!(v.matches(&near));
        assert!(!v.matches(&far));
        assert!(!v.matches(&other));
        assert_eq!(v.height(), 720);
        assert_eq!(v.bandwidth_label(), "2.50 Mbps");
    }
}
