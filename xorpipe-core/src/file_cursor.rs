// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Byte sources for producers.
//!
//! A producer either owns its source file outright ([`ExclusiveReader`]) or
//! shares it with other producer processes through the segment's file cursor
//! ([`SharedFileCursor`]). With the shared cursor each byte offset is claimed
//! exactly once across all producers.
//!
//! Known gap: a byte is claimed (cursor advanced, `file_lock` released) before
//! its producer waits for a free slot. If that producer stops in between, the
//! byte is never published and nothing reports the loss.

use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom};

use crate::error::{PipeError, PipeResult};
use crate::shm::Segment;

/// One byte taken from a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceByte {
    pub byte: u8,
    /// Offset in the shared file, when the source is shared.
    pub origin: Option<u64>,
}

/// Sequential supplier of source bytes.
pub trait ByteSource {
    /// Next byte, or `None` at end of input.
    fn next_byte(&mut self) -> PipeResult<Option<SourceByte>>;
}

/// Reads a source that no other producer touches.
pub struct ExclusiveReader<R> {
    inner: BufReader<R>,
}

impl<R: Read> ExclusiveReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner: BufReader::new(inner),
        }
    }
}

impl<R: Read> ByteSource for ExclusiveReader<R> {
    fn next_byte(&mut self) -> PipeResult<Option<SourceByte>> {
        let mut buf = [0u8; 1];
        loop {
            return match self.inner.read(&mut buf) {
                Ok(0) => Ok(None),
                Ok(_) => Ok(Some(SourceByte {
                    byte: buf[0],
                    origin: None,
                })),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => Err(PipeError::Io {
                    context: "reading source file",
                    source: e,
                }),
            };
        }
    }
}

/// Reads a source shared with other producers via `shared_file_cursor`.
pub struct SharedFileCursor<'a, R> {
    segment: &'a Segment,
    inner: R,
}

impl<'a, R: Read + Seek> SharedFileCursor<'a, R> {
    pub fn new(segment: &'a Segment, inner: R) -> Self {
        Self { segment, inner }
    }

    /// Claim the byte at the shared cursor and advance the cursor.
    ///
    /// Seek, read and advance all happen under `file_lock`, so concurrent
    /// claimants never see the same offset.
    pub fn claim(&mut self) -> PipeResult<Option<SourceByte>> {
        let mut file = self.segment.lock_file()?;
        let offset = file.cursor();

        self.inner
            .seek(SeekFrom::Start(offset))
            .map_err(|e| PipeError::Io {
                context: "seeking shared source file",
                source: e,
            })?;

        let mut buf = [0u8; 1];
        let read = loop {
            match self.inner.read(&mut buf) {
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                other => break other,
            }
        };

        match read {
            Ok(0) => Ok(None),
            Ok(_) => {
                file.advance();
                Ok(Some(SourceByte {
                    byte: buf[0],
                    origin: Some(offset),
                }))
            }
            Err(e) => Err(PipeError::Io {
                context: "reading shared source file",
                source: e,
            }),
        }
    }
}

impl<R: Read + Seek> ByteSource for SharedFileCursor<'_, R> {
    fn next_byte(&mut self) -> PipeResult<Option<SourceByte>> {
        self.claim()
    }
}
