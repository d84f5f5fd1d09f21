use crate::core::error::{ArchiveError, AssemblyError};
use crate::core::model::{SegmentIndex, SegmentRef, SegmentStatus};
use std::path::PathBuf;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyReport {
    pub output: PathBuf,
    pub segments_written: usize,
    pub bytes_written: u64,
    /// Indices left out because they never reached `Done`.
    pub skipped: Vec<SegmentIndex>,
}

/// Byte-level concatenation of finished segments in ascending index order.
pub struct OrderedAssembler {
    path: PathBuf,
}

impl OrderedAssembler {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Completion order is irrelevant: segments are sorted here before writing.
    /// Nothing is created when no segment is `Done`.
    pub async fn assemble<'a, I>(&self, segments: I) -> Result<AssemblyReport, ArchiveError>
    where
        I: IntoIterator<Item = &'a SegmentRef>,
    {
        let mut ordered: Vec<&SegmentRef> = segments.into_iter().collect();
        ordered.sort_by_key(|s| s.index);

        let (done, mut skipped): (Vec<&SegmentRef>, Vec<SegmentIndex>) =
            ordered.iter().fold((vec![], vec![]), |(mut done, mut skipped), seg| {
                if seg.status == SegmentStatus::Done {
                    done.push(*seg);
                } else {
                    skipped.push(seg.index);
                }
                (done, skipped)
            });

        if done.is_empty() {
            return Err(AssemblyError::Empty.into());
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ArchiveError::fs("create directory", parent, e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)
            .await
            .map_err(|e| ArchiveError::fs("create", &self.path, e))?;
        let mut out = BufWriter::new(file);

        let mut segments_written = 0;
        let mut bytes_written = 0u64;
        for seg in done {
            let mut src = match File::open(&seg.path).await {
                Ok(f) => f,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(index = seg.index, path = %seg.path.display(), "finished segment vanished from disk");
                    skipped.push(seg.index);
                    continue;
                }
                Err(e) => return Err(ArchiveError::fs("open", &seg.path, e)),
            };
            bytes_written += tokio::io::copy(&mut src, &mut out)
                .await
                .map_err(|e| ArchiveError::fs("append", &seg.path, e))?;
            segments_written += 1;
        }
        out.flush().await.map_err(|e| ArchiveError::fs("flush", &self.path, e))?;
        drop(out);

        skipped.sort_unstable();
        if segments_written == 0 {
            let _ = tokio::fs::remove_file(&self.path).await;
            return Err(AssemblyError::Empty.into());
        }

        debug!(output = %self.path.display(), segments_written, bytes_written, gaps = skipped.len(), "assembled");
        Ok(AssemblyReport { output: self.path.clone(), segments_written, bytes_written, skipped })
    }
}
