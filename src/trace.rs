// Copyright (c) 2026 The TimelyCC Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Replay of pre-recorded video frame traces.
//!
//! A trace is whitespace-delimited text with four columns per line: frame
//! index, frame type (I, P or B), generation time in seconds relative to
//! the trace start, and frame size in bytes. The two header lines of the
//! raw capture format are assumed already stripped. A malformed line is
//! skipped with a warning so one corrupt record cannot kill a multi-hour
//! replay.

use std::fs::File;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use log::*;
use strum_macros::EnumString;

use crate::Result;

/// MPEG-4 frame type.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString)]
pub enum FrameType {
    /// Intra-coded frame.
    I,
    /// Predicted frame.
    P,
    /// Bidirectionally predicted frame.
    B,
}

/// One frame record of a trace, read-only after load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TraceRecord {
    /// Frame index as recorded in the trace.
    pub index: u64,

    /// Frame type.
    pub frame_type: FrameType,

    /// Generation time offset from the trace start.
    pub generation_time: Duration,

    /// Frame size in bytes.
    pub frame_size: usize,
}

/// Replays an ordered frame sequence against a simulation/flow clock.
#[derive(Debug)]
pub struct TraceReplayFeed {
    records: Vec<TraceRecord>,

    /// Index of the next record to hand out.
    cursor: usize,

    /// Lines dropped during parsing.
    skipped_lines: u64,
}

impl TraceReplayFeed {
    /// Load a trace from a file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_reader(BufReader::new(File::open(path)?))
    }

    /// Load a trace from any buffered reader.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut records = Vec::new();
        let mut skipped_lines = 0;

        for (lineno, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line) {
                Some(record) => records.push(record),
                None => {
                    warn!("skipping malformed trace line {}: {:?}", lineno + 1, line);
                    skipped_lines += 1;
                }
            }
        }

        // Replay is by ascending generation time regardless of file order.
        records.sort_by_key(|r| r.generation_time);

        Ok(Self {
            records,
            cursor: 0,
            skipped_lines,
        })
    }

    /// Return the next frame whose generation time has elapsed, advancing
    /// the replay cursor. None if the next frame is still in the future or
    /// the trace is exhausted.
    pub fn next_frame(&mut self, elapsed: Duration) -> Option<&TraceRecord> {
        let record = self.records.get(self.cursor)?;
        if record.generation_time > elapsed {
            return None;
        }
        self.cursor += 1;
        Some(record)
    }

    /// Generation time of the next pending frame, if any.
    pub fn next_generation_time(&self) -> Option<Duration> {
        self.records.get(self.cursor).map(|r| r.generation_time)
    }

    /// True once every record has been replayed.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.records.len()
    }

    /// Number of records loaded.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Lines dropped while parsing the trace.
    pub fn skipped_lines(&self) -> u64 {
        self.skipped_lines
    }
}

fn parse_line(line: &str) -> Option<TraceRecord> {
    let mut cols = line.split_whitespace();

    let index = cols.next()?.parse::<u64>().ok()?;
    let frame_type = FrameType::from_str(cols.next()?).ok()?;
    let generation_secs = cols.next()?.parse::<f64>().ok()?;
    let frame_size = cols.next()?.parse::<usize>().ok()?;

    if cols.next().is_some() {
        return None;
    }
    // Rejects NaN, negatives and values too large for a Duration.
    let generation_time = Duration::try_from_secs_f64(generation_secs).ok()?;

    Some(TraceRecord {
        index,
        frame_type,
        generation_time,
        frame_size,
    })
}

/// Split a frame into per-packet payload sizes, none above `max_payload`.
/// A frame no larger than `max_payload` maps to a single packet.
pub fn fragment_sizes(frame_size: usize, max_payload: usize) -> Vec<usize> {
    if frame_size == 0 || max_payload == 0 {
        return Vec::new();
    }
    let full = frame_size / max_payload;
    let mut sizes = vec![max_payload; full];
    if frame_size % max_payload != 0 {
        sizes.push(frame_size % max_payload);
    }
    sizes
}
