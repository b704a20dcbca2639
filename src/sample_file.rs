// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
// Random access files of interleaved little-endian f32 frames. Every stake
// reads and writes through one of these; a single file is usually shared by
// many stakes, so the OS handle and cursor live behind a mutex.
//

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tempfile::TempPath;
use tracing::debug;

use crate::error::StoreError;
use crate::sink::FrameSink;

const BYTES_PER_SAMPLE: usize = 4;

/// Cursor value after a failed or short I/O call. Forces the next call to seek.
const UNKNOWN_POSITION: i64 = -1;

struct FileState {
    file: File,
    /// Current cursor, in frames.
    position: i64,
    /// Logical length in frames: everything allocated or written so far.
    frames: i64,
    /// Reused byte buffer for (de)interleaving.
    scratch: Vec<u8>,
}

impl FileState {
    /// Moves the cursor, skipping the syscall if it's already there.
    fn seek_frame(&mut self, frame: i64, frame_bytes: usize) -> Result<(), StoreError> {
        if self.position != frame {
            self.position = UNKNOWN_POSITION;
            self.file
                .seek(SeekFrom::Start(frame as u64 * frame_bytes as u64))?;
            self.position = frame;
        }
        Ok(())
    }
}

/// A file of interleaved 32-bit float frames.
pub struct SampleFile {
    path: PathBuf,
    channels: usize,
    state: Mutex<FileState>,
    /// Set for temp files, which are deleted once the last handle is gone.
    temp_path: Option<TempPath>,
}

/// Maps file channels to planar buffer slots for a single call. `route[c]` is
/// the buffer index file channel `c` is read into or written from; `None`
/// skips the channel on reads and writes silence on writes.
pub type ChannelRoute<'a> = &'a [Option<usize>];

impl SampleFile {
    /// Creates an empty temp file in `dir` (or the system temp dir).
    pub fn create_temp(dir: Option<&Path>, channels: usize) -> Result<SampleFile, StoreError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("trail").suffix(".f32");
        let temp = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        let (file, temp_path) = temp.into_parts();
        let path = temp_path.to_path_buf();
        debug!(path = %path.display(), channels, "Created temp sample file");

        Ok(SampleFile {
            path,
            channels,
            state: Mutex::new(FileState {
                file,
                position: 0,
                frames: 0,
                scratch: Vec::new(),
            }),
            temp_path: Some(temp_path),
        })
    }

    /// Creates (or truncates) a sample file at the given path.
    pub fn create<P: AsRef<Path>>(path: P, channels: usize) -> Result<SampleFile, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path.as_ref())?;
        Ok(Self::from_parts(path.as_ref().to_path_buf(), file, channels, 0))
    }

    /// Opens an existing sample file; its length is derived from the file size.
    pub fn open<P: AsRef<Path>>(path: P, channels: usize) -> Result<SampleFile, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path.as_ref())?;
        let bytes = file.metadata()?.len();
        let frames = (bytes / (channels.max(1) * BYTES_PER_SAMPLE) as u64) as i64;
        Ok(Self::from_parts(
            path.as_ref().to_path_buf(),
            file,
            channels,
            frames,
        ))
    }

    fn from_parts(path: PathBuf, file: File, channels: usize, frames: i64) -> SampleFile {
        SampleFile {
            path,
            channels,
            state: Mutex::new(FileState {
                file,
                position: 0,
                frames,
                scratch: Vec::new(),
            }),
            temp_path: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn is_temp(&self) -> bool {
        self.temp_path.is_some()
    }

    /// Logical length in frames.
    pub fn frame_count(&self) -> i64 {
        self.state.lock().frames
    }

    /// Current cursor position in frames.
    pub fn position(&self) -> i64 {
        self.state.lock().position
    }

    fn frame_bytes(&self) -> usize {
        self.channels * BYTES_PER_SAMPLE
    }

    /// Reserves `len` frames at the end of the file and returns the offset of
    /// the reserved region. The file never shrinks.
    pub fn allocate(&self, len: i64) -> i64 {
        let mut state = self.state.lock();
        let start = state.frames;
        state.frames += len.max(0);
        start
    }

    /// Moves the cursor to the given frame.
    pub fn seek(&self, frame: i64) -> Result<(), StoreError> {
        let frame_bytes = self.frame_bytes();
        self.state.lock().seek_frame(frame, frame_bytes)
    }

    /// Reads `len` frames starting at file frame `offset` into
    /// `buffers[route[c]][buf_offset..]`. Regions that were reserved but never
    /// written read as silence.
    pub fn read_frames(
        &self,
        offset: i64,
        buffers: &mut [Vec<f32>],
        buf_offset: usize,
        len: usize,
        route: ChannelRoute,
    ) -> Result<(), StoreError> {
        StoreError::check_channels(self.channels, route.len())?;
        if len == 0 {
            return Ok(());
        }
        let frame_bytes = self.frame_bytes();
        let total = len * frame_bytes;

        let mut state = self.state.lock();
        state.seek_frame(offset, frame_bytes)?;

        let FileState {
            file,
            scratch,
            position,
            ..
        } = &mut *state;
        let start = *position;
        *position = UNKNOWN_POSITION;
        scratch.resize(total, 0);
        let mut filled = 0;
        while filled < total {
            match file.read(&mut scratch[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        scratch[filled..].fill(0);
        // Past the end of the file the OS cursor stops short.
        if filled == total {
            *position = start + len as i64;
        }

        for (file_ch, slot) in route.iter().enumerate() {
            let Some(slot) = *slot else {
                continue;
            };
            let out = &mut buffers[slot][buf_offset..buf_offset + len];
            for (frame, sample) in out.iter_mut().enumerate() {
                let at = frame * frame_bytes + file_ch * BYTES_PER_SAMPLE;
                *sample = f32::from_le_bytes([
                    scratch[at],
                    scratch[at + 1],
                    scratch[at + 2],
                    scratch[at + 3],
                ]);
            }
        }

        Ok(())
    }

    /// Writes `len` frames from `buffers[route[c]][buf_offset..]` to file frame
    /// `offset`. Channels routed to `None` are written as silence.
    pub fn write_frames(
        &self,
        offset: i64,
        buffers: &[Vec<f32>],
        buf_offset: usize,
        len: usize,
        route: ChannelRoute,
    ) -> Result<(), StoreError> {
        StoreError::check_channels(self.channels, route.len())?;
        if len == 0 {
            return Ok(());
        }
        let frame_bytes = self.frame_bytes();
        let total = len * frame_bytes;

        let mut state = self.state.lock();
        state.seek_frame(offset, frame_bytes)?;

        let FileState {
            file,
            scratch,
            position,
            frames,
        } = &mut *state;
        scratch.resize(total, 0);
        for (file_ch, slot) in route.iter().enumerate() {
            match *slot {
                Some(slot) => {
                    let input = &buffers[slot][buf_offset..buf_offset + len];
                    for (frame, sample) in input.iter().enumerate() {
                        let at = frame * frame_bytes + file_ch * BYTES_PER_SAMPLE;
                        scratch[at..at + BYTES_PER_SAMPLE].copy_from_slice(&sample.to_le_bytes());
                    }
                }
                None => {
                    for frame in 0..len {
                        let at = frame * frame_bytes + file_ch * BYTES_PER_SAMPLE;
                        scratch[at..at + BYTES_PER_SAMPLE].fill(0);
                    }
                }
            }
        }
        let start = *position;
        *position = UNKNOWN_POSITION;
        file.write_all(&scratch[..])?;
        *position = start + len as i64;
        *frames = (*frames).max(*position);

        Ok(())
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.state.lock().file.flush()?;
        Ok(())
    }

    /// The identity route for this file.
    pub fn identity_route(&self) -> Vec<Option<usize>> {
        (0..self.channels).map(Some).collect()
    }
}

/// Appending at the cursor lets a sample file be the target of `copy_frames`
/// and `flatten`.
impl FrameSink for SampleFile {
    fn channels(&self) -> usize {
        self.channels
    }

    fn write_frames(
        &mut self,
        buffers: &[Vec<f32>],
        buf_offset: usize,
        len: usize,
    ) -> Result<(), StoreError> {
        let route = self.identity_route();
        let position = self.position();
        let position = if position < 0 { self.frame_count() } else { position };
        SampleFile::write_frames(self, position, buffers, buf_offset, len, &route)
    }
}

impl std::fmt::Debug for SampleFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleFile")
            .field("path", &self.path)
            .field("channels", &self.channels)
            .finish()
    }
}
