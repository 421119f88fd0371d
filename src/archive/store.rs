//! File-backed append-only archive.

use super::framing::{
    encode_frame, Frame, FrameError, FrameReader, HEADER_LEN, MAX_PAYLOAD_LEN,
};
use super::record::EvaluationRecord;
use crate::error::{CampaignError, Result};
use crate::pareto::non_dominated_sort;
use crate::types::ObjectiveVector;
use log::{debug, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};

/// Durable, append-only log of every evaluation of a campaign.
///
/// The archive is the source of truth for how many candidates have been
/// evaluated and in which order. Opening it repairs a torn trailing record
/// left by a crash mid-append; every other defect is fatal.
///
/// # Example
///
/// ```no_run
/// use mach_opt::archive::ArchiveStore;
///
/// let archive = ArchiveStore::open("opti_archive.bin")?;
/// for record in archive.read_all()? {
///     let record = record?;
///     println!("{:?} -> {:?}", record.x.as_slice(), record.objs);
/// }
/// # Ok::<(), mach_opt::CampaignError>(())
/// ```
#[derive(Debug)]
pub struct ArchiveStore {
    path: PathBuf,
    file: File,
    len: usize,
    bytes: u64,
}

impl ArchiveStore {
    /// Opens (creating if absent) the archive at `path`, validating every
    /// record and truncating a torn trailing one.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| CampaignError::io(parent, e))?;
        }

        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&path)
            .map_err(|e| CampaignError::io(&path, e))?;

        let reader = File::open(&path).map_err(|e| CampaignError::io(&path, e))?;
        let mut frames = FrameReader::new(BufReader::new(reader));
        let mut len = 0usize;
        loop {
            match frames.next_frame() {
                Ok(Frame::Record(payload)) => {
                    decode(&path, frames.offset(), &payload)?;
                    len += 1;
                }
                Ok(Frame::End) => break,
                Ok(Frame::Torn { offset, reason }) => {
                    warn!(
                        "archive '{}': discarding torn trailing record at byte {offset} ({reason}); \
                         it was never evaluated to completion",
                        path.display()
                    );
                    file.set_len(offset)
                        .and_then(|()| file.sync_all())
                        .map_err(|e| CampaignError::io(&path, e))?;
                    break;
                }
                Err(e) => return Err(frame_error(&path, e)),
            }
        }

        let bytes = frames.offset();
        debug!("archive '{}': {len} records, {bytes} bytes", path.display());
        Ok(Self {
            path,
            file,
            len,
            bytes,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of complete records.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Durably appends one record before returning.
    ///
    /// Records whose encoding exceeds the frame size limit are refused
    /// before anything is written. If the write itself fails, the file is
    /// cut back to its previous length so no partial frame is left in
    /// front of later appends.
    pub fn append(&mut self, record: &EvaluationRecord) -> Result<()> {
        let payload = serde_json::to_vec(record).map_err(|source| CampaignError::Serialization {
            path: self.path.clone(),
            source,
        })?;
        let frame = encode_frame(&payload).ok_or_else(|| CampaignError::RecordTooLarge {
            path: self.path.clone(),
            len: payload.len(),
            limit: MAX_PAYLOAD_LEN,
        })?;

        if let Err(e) = self
            .file
            .write_all(&frame)
            .and_then(|()| self.file.sync_data())
        {
            if let Err(rollback) = self.file.set_len(self.bytes) {
                warn!(
                    "archive '{}': could not roll back failed append: {rollback}",
                    self.path.display()
                );
            }
            return Err(CampaignError::io(&self.path, e));
        }

        self.bytes += frame.len() as u64;
        self.len += 1;
        Ok(())
    }

    /// Lazily reads every record in append order.
    pub fn read_all(&self) -> Result<ArchiveReader> {
        let file = File::open(&self.path).map_err(|e| CampaignError::io(&self.path, e))?;
        Ok(ArchiveReader {
            path: self.path.clone(),
            frames: FrameReader::new(BufReader::new(file)),
            done: false,
        })
    }

    /// The last `n` records (fewer if the archive is shorter), in order.
    pub fn tail(&self, n: usize) -> Result<Vec<EvaluationRecord>> {
        let skip = self.len.saturating_sub(n);
        self.read_all()?.skip(skip).collect()
    }

    /// All objective vectors and candidates, in append order.
    pub fn objectives_and_candidates(&self) -> Result<(Vec<ObjectiveVector>, Vec<Vec<f64>>)> {
        let mut objs = Vec::with_capacity(self.len);
        let mut xs = Vec::with_capacity(self.len);
        for record in self.read_all()? {
            let record = record?;
            xs.push(record.x.to_vec());
            objs.push(record.objs);
        }
        Ok((objs, xs))
    }

    /// Records on the first non-dominated front of the archive.
    ///
    /// Rejected designs are excluded before sorting, so a sentinel-scored
    /// record is never reported as Pareto-optimal.
    pub fn pareto_records(&self) -> Result<Vec<EvaluationRecord>> {
        let feasible: Vec<EvaluationRecord> = self
            .read_all()?
            .filter(|r| r.as_ref().map_or(true, |r| !r.is_rejected()))
            .collect::<Result<_>>()?;
        let objs: Vec<&[f64]> = feasible.iter().map(|r| r.objs.as_slice()).collect();
        let sorted = non_dominated_sort(&objs);
        let front = sorted.fronts.into_iter().next().unwrap_or_default();

        let mut keep = vec![false; feasible.len()];
        for i in front {
            keep[i] = true;
        }
        Ok(feasible
            .into_iter()
            .zip(keep)
            .filter_map(|(r, k)| k.then_some(r))
            .collect())
    }
}

/// Sequential reader over archived records. Restart by calling
/// [`ArchiveStore::read_all`] again.
#[derive(Debug)]
pub struct ArchiveReader {
    path: PathBuf,
    frames: FrameReader<BufReader<File>>,
    done: bool,
}

impl Iterator for ArchiveReader {
    type Item = Result<EvaluationRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let item = match self.frames.next_frame() {
            Ok(Frame::Record(payload)) => Some(decode(&self.path, self.frames.offset(), &payload)),
            Ok(Frame::End) => None,
            Ok(Frame::Torn { offset, reason }) => {
                warn!(
                    "archive '{}': ignoring torn trailing record at byte {offset} ({reason})",
                    self.path.display()
                );
                None
            }
            Err(e) => Some(Err(frame_error(&self.path, e))),
        };
        self.done = !matches!(item, Some(Ok(_)));
        item
    }
}

/// `end` is the offset just past the frame holding `payload`.
fn decode(path: &Path, end: u64, payload: &[u8]) -> Result<EvaluationRecord> {
    serde_json::from_slice(payload).map_err(|e| CampaignError::CorruptArchive {
        path: path.to_path_buf(),
        offset: end - (HEADER_LEN + payload.len()) as u64,
        reason: format!("undecodable record payload: {e}"),
    })
}

fn frame_error(path: &Path, e: FrameError) -> CampaignError {
    match e {
        FrameError::Io(source) => CampaignError::io(path, source),
        FrameError::Corrupt { offset, reason } => CampaignError::CorruptArchive {
            path: path.to_path_buf(),
            offset,
            reason,
        },
    }
}
