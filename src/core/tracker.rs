use crate::core::config::DEFAULT_MAX_SEGMENTS;
use crate::core::error::ParseError;
use crate::core::model::{NamingScheme, SegmentIndex, SegmentRef, SegmentStatus};
use crate::core::playlist;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use url::Url;

pub type SharedTracker = Arc<Mutex<SegmentIndexTracker>>;

/// Result of trying to take a segment for fetching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Claim {
    Ready { url: String, path: PathBuf },
    AlreadyDone,
    /// Unknown index, or another worker holds it / already failed it.
    Unavailable,
}

/// Every known segment index, keyed in ascending order. Indices are only ever added.
#[derive(Debug)]
pub struct SegmentIndexTracker {
    scheme: NamingScheme,
    work_dir: PathBuf,
    segments: BTreeMap<SegmentIndex, SegmentRef>,
    max_known: Option<SegmentIndex>,
    /// Indices at or above this are refused.
    limit: u64,
}

impl SegmentIndexTracker {
    pub fn new(scheme: NamingScheme, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            scheme,
            work_dir: work_dir.into(),
            segments: BTreeMap::new(),
            max_known: None,
            limit: DEFAULT_MAX_SEGMENTS,
        }
    }

    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    pub fn into_shared(self) -> SharedTracker {
        Arc::new(Mutex::new(self))
    }

    pub fn scheme(&self) -> &NamingScheme {
        &self.scheme
    }

    pub fn max_known(&self) -> Option<SegmentIndex> {
        self.max_known
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn get(&self, index: SegmentIndex) -> Option<&SegmentRef> {
        self.segments.get(&index)
    }

    /// Ascending by index.
    pub fn snapshot(&self) -> Vec<SegmentRef> {
        self.segments.values().cloned().collect()
    }

    fn ensure(&mut self, index: SegmentIndex) -> bool {
        if self.segments.contains_key(&index) {
            return false;
        }
        let seg = SegmentRef {
            index,
            url: self.scheme.url_for(index),
            path: self.work_dir.join(self.scheme.file_name_for(index)),
            status: SegmentStatus::Pending,
            attempts: 0,
        };
        self.segments.insert(index, seg);
        self.max_known = Some(self.max_known.map_or(index, |m| m.max(index)));
        true
    }

    fn check_limit(&self, index: SegmentIndex) -> Result<(), ParseError> {
        if index >= self.limit {
            return Err(ParseError::IndexLimit { index, limit: self.limit });
        }
        Ok(())
    }

    /// Creates `[0, horizon]`; returns the indices that did not exist yet.
    pub fn register_range(&mut self, horizon: SegmentIndex) -> Result<Vec<SegmentIndex>, ParseError> {
        self.check_limit(horizon)?;
        Ok((0..=horizon).filter(|&i| self.ensure(i)).collect())
    }

    /// Registers every index above the current maximum up to the snapshot's highest.
    ///
    /// Entries whose URL no longer starts with the session prefix are ignored; if
    /// the snapshot has segment URIs but none under the prefix, the upstream naming
    /// changed and `ParseError::SchemeDrift` is returned.
    pub fn observe_live_playlist(&mut self, content: &str, base: &Url) -> Result<Vec<SegmentIndex>, ParseError> {
        let uris = playlist::media_segment_uris(content, base)?;
        let mut top: Option<SegmentIndex> = None;
        for uri in &uris {
            if let Some(m) = playlist::match_segment(uri) {
                if m.prefix == self.scheme.prefix {
                    top = Some(top.map_or(m.index, |t| t.max(m.index)));
                }
            }
        }

        let top = match top {
            Some(t) => t,
            None if !uris.is_empty() => {
                return Err(ParseError::SchemeDrift { expected_prefix: self.scheme.prefix.clone() });
            }
            None => return Ok(vec![]),
        };

        let start = self.max_known.map_or(0, |m| m + 1);
        if top < start {
            return Ok(vec![]);
        }
        self.check_limit(top)?;
        Ok((start..=top).filter(|&i| self.ensure(i)).collect())
    }

    /// Pending → Fetching. Only one caller can win a given index.
    pub fn claim(&mut self, index: SegmentIndex) -> Claim {
        match self.segments.get_mut(&index) {
            Some(seg) if seg.status == SegmentStatus::Pending => {
                seg.status = SegmentStatus::Fetching;
                Claim::Ready { url: seg.url.clone(), path: seg.path.clone() }
            }
            Some(seg) if seg.status == SegmentStatus::Done => Claim::AlreadyDone,
            _ => Claim::Unavailable,
        }
    }

    /// Records the end state of a claimed segment.
    pub fn settle(&mut self, index: SegmentIndex, status: SegmentStatus, attempts: u32) {
        if let Some(seg) = self.segments.get_mut(&index) {
            seg.status = status;
            seg.attempts = attempts;
        }
    }

    /// Gives an abandoned claim back so a later run can take it.
    pub fn release(&mut self, index: SegmentIndex, attempts: u32) {
        if let Some(seg) = self.segments.get_mut(&index) {
            if seg.status == SegmentStatus::Fetching {
                seg.status = SegmentStatus::Pending;
                seg.attempts = attempts;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> NamingScheme {
        NamingScheme { prefix: "https://cdn.example/live/index_0".to_string(), suffix: ".ts?m=100".to_string() }
    }

    fn base() -> Url {
        Url::parse("https://cdn.example/live/index.m3u8").unwrap()
    }

    fn snapshot(indices: &[u64]) -> String {
        let mut s = String::from("#EXTM3U\n");
        for i in indices {
            s.push_str(&format!("#EXTINF:2.0,\nindex_0_{i}.ts?m=100\n"));
        }
        s
    }

    #[test]
    fn register_range_creates_every_index_with_synthesized_url() {
        let mut t = SegmentIndexTracker::new(scheme(), "/tmp/w");
        let created = t.register_range(7).unwrap();
        assert_eq!(created, (0..=7).collect::<Vec<_>>());
        assert_eq!(t.len(), 8);
        for i in 0..=7 {
            let seg = t.get(i).unwrap();
            assert_eq!(seg.url, format!("https://cdn.example/live/index_0_{i}.ts?m=100"));
            assert_eq!(seg.status, SegmentStatus::Pending);
            assert_eq!(seg.path, PathBuf::from(format!("/tmp/w/{i:08}.ts")));
        }
        assert_eq!(t.max_known(), Some(7));
        assert!(t.register_range(7).unwrap().is_empty());
    }

    #[test]
    fn observe_is_idempotent_and_fills_gaps() {
        let mut t = SegmentIndexTracker::new(scheme(), "/tmp/w");
        t.register_range(7).unwrap();

        let fresh = t.observe_live_playlist(&snapshot(&[8, 10]), &base()).unwrap();
        assert_eq!(fresh, vec![8, 9, 10]);
        let again = t.observe_live_playlist(&snapshot(&[8, 10]), &base()).unwrap();
        assert!(again.is_empty());
        assert_eq!(t.len(), 11);
        assert_eq!(t.max_known(), Some(10));
    }

    #[test]
    fn older_snapshot_creates_nothing() {
        let mut t = SegmentIndexTracker::new(scheme(), "/tmp/w");
        t.register_range(7).unwrap();
        assert!(t.observe_live_playlist(&snapshot(&[5, 6]), &base()).unwrap().is_empty());
        assert!(t.observe_live_playlist("#EXTM3U\n", &base()).unwrap().is_empty());
    }

    #[test]
    fn renamed_segments_surface_scheme_drift() {
        let mut t = SegmentIndexTracker::new(scheme(), "/tmp/w");
        t.register_range(3).unwrap();
        let err = t
            .observe_live_playlist("#EXTM3U\n#EXTINF:2.0,\nchunk_1_9.ts\n", &base())
            .unwrap_err();
        assert_eq!(err, ParseError::SchemeDrift { expected_prefix: scheme().prefix });
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn timestamp_sized_indices_are_refused() {
        let mut t = SegmentIndexTracker::new(scheme(), "/tmp/w").with_limit(100);
        let err = t.register_range(1_700_000_000).unwrap_err();
        assert_eq!(err, ParseError::IndexLimit { index: 1_700_000_000, limit: 100 });
        assert!(t.is_empty());

        t.register_range(99).unwrap();
        let err = t.observe_live_playlist(&snapshot(&[100]), &base()).unwrap_err();
        assert_eq!(err, ParseError::IndexLimit { index: 100, limit: 100 });
        assert_eq!(t.max_known(), Some(99));
    }

    #[test]
    fn malformed_snapshot_is_reported() {
        let mut t = SegmentIndexTracker::new(scheme(), "/tmp/w");
        t.register_range(3).unwrap();
        let err = t.observe_live_playlist("<html>503</html>", &base()).unwrap_err();
        assert!(matches!(err, ParseError::Malformed { .. }));
        assert_eq!(t.len(), 4);
    }

    #[test]
    fn claim_is_exclusive() {
        let mut t = SegmentIndexTracker::new(scheme(), "/tmp/w");
        t.register_range(1).unwrap();
        assert!(matches!(t.claim(0), Claim::Ready { .. }));
        assert_eq!(t.claim(0), Claim::Unavailable);
        t.release(0, 1);
        assert!(matches!(t.claim(0), Claim::Ready { .. }));
        t.settle(0, SegmentStatus::Done, 2);
        assert_eq!(t.claim(0), Claim::AlreadyDone);
        assert_eq!(t.get(0).unwrap().attempts, 2);
        assert_eq!(t.claim(42), Claim::Unavailable);
    }
}
