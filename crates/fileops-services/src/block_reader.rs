//! Positioned block reads off the async runtime.

use std::io;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};

use fileops_core::FileOpsError;

use crate::fs::OpenFile;

/// Read up to `length` bytes at `offset`.
///
/// Keeps reading until the block is full or the file ends, so a short
/// result only ever means end of file.
pub fn read_block(
    file: &dyn OpenFile,
    path: &str,
    offset: u64,
    length: u64,
) -> Result<Bytes, FileOpsError> {
    let length = usize::try_from(length)
        .map_err(|_| FileOpsError::protocol(format!("block length {length} too large")))?;
    let mut buf = BytesMut::zeroed(length);
    let mut filled = 0;

    while filled < length {
        match file.read_at(&mut buf[filled..], offset + filled as u64) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(FileOpsError::from_io(path, Some(offset + filled as u64), &e)),
        }
    }

    buf.truncate(filled);
    Ok(buf.freeze())
}

/// [`read_block`] on the blocking pool.
pub async fn read_block_async(
    file: Arc<dyn OpenFile>,
    path: &str,
    offset: u64,
    length: u64,
) -> Result<Bytes, FileOpsError> {
    let owned_path = path.to_string();
    tokio::task::spawn_blocking(move || read_block(file.as_ref(), &owned_path, offset, length))
        .await
        .map_err(|e| FileOpsError::Io {
            path: path.to_string(),
            offset: Some(offset),
            message: format!("read task failed: {e}"),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug)]
    struct Trickle {
        data: Vec<u8>,
        step: usize,
        interrupts: AtomicUsize,
    }

    impl OpenFile for Trickle {
        fn size(&self) -> io::Result<u64> {
            Ok(self.data.len() as u64)
        }

        fn read_at(&self, buf: &mut [u8], offset: u64) -> io::Result<usize> {
            if self.interrupts.fetch_sub(1, Ordering::SeqCst) > 0 {
                return Err(io::ErrorKind::Interrupted.into());
            }
            self.interrupts.store(0, Ordering::SeqCst);
            let start = (offset as usize).min(self.data.len());
            let n = buf.len().min(self.step).min(self.data.len() - start);
            buf[..n].copy_from_slice(&self.data[start..start + n]);
            Ok(n)
        }
    }

    fn trickle(len: usize, step: usize, interrupts: usize) -> Trickle {
        Trickle {
            data: (0..len).map(|i| (i % 251) as u8).collect(),
            step,
            interrupts: AtomicUsize::new(interrupts),
        }
    }

    #[test]
    fn short_reads_are_stitched_together() {
        let file = trickle(1000, 7, 0);
        let block = read_block(&file, "t", 100, 300).unwrap();
        assert_eq!(block.len(), 300);
        assert_eq!(&block[..], &file.data[100..400]);
    }

    #[test]
    fn interrupted_reads_are_retried() {
        let file = trickle(64, 64, 2);
        let block = read_block(&file, "t", 0, 64).unwrap();
        assert_eq!(block.len(), 64);
    }

    #[test]
    fn block_past_eof_is_truncated() {
        let file = trickle(1000, 1000, 0);
        assert_eq!(read_block(&file, "t", 900, 300).unwrap().len(), 100);
        assert!(read_block(&file, "t", 1000, 300).unwrap().is_empty());
    }

    #[derive(Debug)]
    struct Broken;

    impl OpenFile for Broken {
        fn size(&self) -> io::Result<u64> {
            Ok(10)
        }

        fn read_at(&self, _buf: &mut [u8], _offset: u64) -> io::Result<usize> {
            Err(io::Error::other("disk on fire"))
        }
    }

    #[tokio::test]
    async fn failures_carry_path_and_offset() {
        let err = read_block_async(Arc::new(Broken), "/x", 4096, 10)
            .await
            .unwrap_err();
        assert_eq!(err.path(), Some("/x"));
        assert_eq!(err.offset(), Some(4096));
        assert_eq!(err.kind(), fileops_core::ErrorKind::Io);
    }
}
