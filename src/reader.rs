//! Chunked whole-file reading.



use std::fs::File;

use crate::{Error, Flag, Mapper, Prot, Result, MAX_MAP_SIZE};



/// Map a file in windows of at most [`MAX_MAP_SIZE`] bytes and feed each
/// window's bytes to `consume`, in offset order.
///
/// The file size is read once up front; a file that shrinks mid-iteration
/// is the caller's problem. Returns the total number of bytes consumed,
/// which on success equals that size. When `consume` fails, its error comes
/// back wrapped together with the byte count that was fully processed
/// beforehand, and the window being read is still released.
pub fn read_chunks<F, E>(file: &File, mut consume: F) -> Result<u64>
where
    F: FnMut(&[u8]) -> std::result::Result<(), E>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let meta = file
        .metadata()
        .map_err(|source| Error::Stat { size: 0, offset: 0, source })?;

    let mapper = Mapper::new(file);
    let mut done = 0u64;

    for (offset, len) in windows(meta.len(), MAX_MAP_SIZE) {
        let p = mapper.map(len as i64, offset as i64, Prot::READ, Flag::READAHEAD)?;

        match consume(p.bytes()) {
            Ok(()) => p.unmap()?,
            Err(e) => {
                // The window goes away even though its consumer failed.
                if let Err(unmap) = p.unmap() {
                    log::debug!("failed to release chunk at {offset}: {unmap}");
                }
                return Err(Error::Consumer {
                    processed: done,
                    source: e.into(),
                });
            }
        }

        done += len;
    }

    Ok(done)
}


/// Consecutive `(offset, length)` windows covering `[0, total)`, each no
/// longer than `max`.
fn windows(total: u64, max: u64) -> Windows {
    Windows { offset: 0, total, max }
}

struct Windows {
    offset: u64,
    total: u64,
    max: u64,
}

impl Iterator for Windows {
    type Item = (u64, u64);

    fn next(&mut self) -> Option<(u64, u64)> {
        let left = self.total - self.offset;
        if left == 0 {
            return None;
        }

        let len = left.min(self.max);
        let offset = self.offset;
        self.offset += len;

        Some((offset, len))
    }
}



#[cfg(test)]
mod tests {
    use rand::RngCore;
    use sha2::{Digest, Sha256};

    use super::*;
    use crate::page_size;

    #[test]
    fn windows_cover_everything_once() {
        let spans: Vec<_> = windows(10, 4).collect();
        assert_eq!(spans, vec![(0, 4), (4, 4), (8, 2)]);
    }

    #[test]
    fn window_count_is_ceiling_division() {
        for (total, max, count) in [(0u64, 4u64, 0usize), (1, 4, 1), (4, 4, 1), (5, 4, 2), (12, 4, 3)] {
            assert_eq!(windows(total, max).count(), count, "{total}/{max}");
        }
    }

    #[test]
    fn windows_are_contiguous_and_sum_to_the_total() {
        let mut expect = 0;
        let mut sum = 0;
        for (offset, len) in windows(4097, 512) {
            assert_eq!(offset, expect);
            assert!(len <= 512);
            expect += len;
            sum += len;
        }
        assert_eq!(sum, 4097);
    }

    #[test]
    fn checksum_matches_ordinary_io() {
        let sz = 3 * page_size() + page_size() / 3;
        let mut data = vec![0u8; sz];
        rand::thread_rng().fill_bytes(&mut data);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, &data).unwrap();
        let fd = File::open(&path).unwrap();

        let mut hasher = Sha256::new();
        let n = read_chunks(&fd, |chunk| -> std::io::Result<()> {
            hasher.update(chunk);
            Ok(())
        })
        .unwrap();

        assert_eq!(n, sz as u64);
        assert_eq!(hasher.finalize(), Sha256::digest(&data));
    }

    #[test]
    fn consumer_failure_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, vec![7u8; page_size()]).unwrap();
        let fd = File::open(&path).unwrap();

        let err = read_chunks(&fd, |_| Err::<(), _>("checksum mismatch".to_string())).unwrap_err();
        match err {
            Error::Consumer { processed, source } => {
                assert_eq!(processed, 0);
                assert_eq!(source.to_string(), "checksum mismatch");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn empty_file_reads_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, b"").unwrap();
        let fd = File::open(&path).unwrap();

        let n = read_chunks(&fd, |_| -> std::io::Result<()> {
            panic!("no chunks expected");
        })
        .unwrap();
        assert_eq!(n, 0);
    }
}
