//! Snapshot source abstraction for telemetry ingestion.
//!
//! Provides a unified trait for reading snapshots from different sources:
//! JSON lines on stdin, recorded files (replay), and a synthetic generator.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};
use tracing::warn;

use crate::types::{FlareRecord, Geomagnetic, Snapshot, SolarWind};

/// Events produced by a snapshot source.
#[derive(Debug)]
pub enum SnapshotEvent {
    /// A parsed snapshot.
    Snapshot(Snapshot),
    /// Source reached end of data.
    Eof,
}

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to read replay file {}: {}", .0.display(), .1)]
    ReplayFile(PathBuf, std::io::Error),
    #[error("Replay file {} is not a JSON array of snapshots: {}", .0.display(), .1)]
    ReplayParse(PathBuf, serde_json::Error),
}

/// Where snapshots come from.
///
/// Implementations handle parsing and pacing internally. The processing
/// loop calls [`next_snapshot`](SnapshotSource::next_snapshot) in a
/// `select!` with cancellation.
#[async_trait]
pub trait SnapshotSource: Send + 'static {
    /// Read the next snapshot. Returns `SnapshotEvent::Eof` when exhausted.
    async fn next_snapshot(&mut self) -> Result<SnapshotEvent, SourceError>;

    /// Human-readable name for logging.
    fn source_name(&self) -> &str;
}

// ============================================================================
// JSON-lines source (stdin or any async reader)
// ============================================================================

/// Reads one JSON snapshot per line. Blank, non-UTF-8 and malformed lines
/// are skipped.
pub struct JsonLinesSource<R> {
    reader: R,
    line_buffer: Vec<u8>,
    lines_read: u64,
    name: &'static str,
}

/// `heliocast --stdin`: `fetch_swpc.py | heliocast --stdin`
pub type StdinSource = JsonLinesSource<BufReader<Stdin>>;

impl StdinSource {
    pub fn stdin() -> Self {
        JsonLinesSource::new(BufReader::new(tokio::io::stdin()), "stdin")
    }
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    pub fn new(reader: R, name: &'static str) -> Self {
        Self {
            reader,
            line_buffer: Vec::with_capacity(2048),
            lines_read: 0,
            name,
        }
    }
}

#[async_trait]
impl<R> SnapshotSource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send + 'static,
{
    async fn next_snapshot(&mut self) -> Result<SnapshotEvent, SourceError> {
        loop {
            self.line_buffer.clear();
            let bytes = self.reader.read_until(b'\n', &mut self.line_buffer).await?;
            if bytes == 0 {
                return Ok(SnapshotEvent::Eof);
            }
            self.lines_read += 1;
            let line = match std::str::from_utf8(&self.line_buffer) {
                Ok(text) => text.trim(),
                Err(e) => {
                    warn!(source = self.name, line = self.lines_read, error = %e, "Skipping non-UTF-8 snapshot line");
                    continue;
                }
            };
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<Snapshot>(line) {
                Ok(snapshot) => return Ok(SnapshotEvent::Snapshot(snapshot)),
                Err(e) => {
                    warn!(source = self.name, line = self.lines_read, error = %e, "Skipping malformed snapshot line");
                }
            }
        }
    }

    fn source_name(&self) -> &str {
        self.name
    }
}

// ============================================================================
// Replay source (recorded file)
// ============================================================================

/// Replays pre-loaded snapshots with an optional inter-snapshot delay.
pub struct ReplaySource {
    snapshots: std::vec::IntoIter<Snapshot>,
    delay_ms: u64,
    yielded_first: bool,
}

impl ReplaySource {
    pub fn new(snapshots: Vec<Snapshot>, delay_ms: u64) -> Self {
        Self {
            snapshots: snapshots.into_iter(),
            delay_ms,
            yielded_first: false,
        }
    }

    /// Load a JSON array or JSON-lines file.
    pub fn from_file(path: &Path, delay_ms: u64) -> Result<Self, SourceError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SourceError::ReplayFile(path.to_path_buf(), e))?;
        let snapshots = parse_recording(&contents)
            .map_err(|e| SourceError::ReplayParse(path.to_path_buf(), e))?;
        tracing::info!(path = %path.display(), count = snapshots.len(), "Loaded replay file");
        Ok(Self::new(snapshots, delay_ms))
    }

    pub fn remaining(&self) -> usize {
        self.snapshots.len()
    }
}

/// A document starting with `[` must be a valid array; otherwise each line
/// is parsed on its own and bad lines are skipped.
fn parse_recording(contents: &str) -> Result<Vec<Snapshot>, serde_json::Error> {
    if contents.trim_start().starts_with('[') {
        return serde_json::from_str(contents);
    }
    Ok(contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(n, line)| match serde_json::from_str::<Snapshot>(line) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!(line = n + 1, error = %e, "Skipping malformed replay line");
                None
            }
        })
        .collect())
}

#[async_trait]
impl SnapshotSource for ReplaySource {
    async fn next_snapshot(&mut self) -> Result<SnapshotEvent, SourceError> {
        // no delay before the first snapshot
        if self.yielded_first && self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        match self.snapshots.next() {
            Some(s) => {
                self.yielded_first = true;
                Ok(SnapshotEvent::Snapshot(s))
            }
            None => Ok(SnapshotEvent::Eof),
        }
    }

    fn source_name(&self) -> &str {
        "replay"
    }
}

// ============================================================================
// Synthetic source (demo / soak testing)
// ============================================================================

/// Random-walk telemetry with occasional storms and flares. Never ends.
pub struct SyntheticSource {
    rng: StdRng,
    interval_ms: u64,
    clock: DateTime<Utc>,
    speed: f64,
    kp: f64,
    flare_seq: u64,
    yielded_first: bool,
}

impl SyntheticSource {
    pub fn new(interval_ms: u64) -> Self {
        Self::with_rng(StdRng::from_entropy(), interval_ms, Utc::now())
    }

    /// Reproducible sequence starting at `start`.
    pub fn seeded(seed: u64, interval_ms: u64, start: DateTime<Utc>) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), interval_ms, start)
    }

    fn with_rng(rng: StdRng, interval_ms: u64, start: DateTime<Utc>) -> Self {
        Self {
            rng,
            interval_ms,
            clock: start,
            speed: 420.0,
            kp: 2.0,
            flare_seq: 0,
            yielded_first: false,
        }
    }

    fn generate(&mut self) -> Snapshot {
        // mean-reverting walk with rare CME-style jumps
        self.speed += (420.0 - self.speed) * 0.05 + self.rng.gen_range(-25.0..25.0);
        if self.rng.gen_bool(0.02) {
            self.speed += self.rng.gen_range(200.0..500.0);
        }
        self.speed = self.speed.clamp(250.0, 1_200.0);

        self.kp += (2.0 - self.kp) * 0.1 + self.rng.gen_range(-0.4..0.4);
        if self.speed > 650.0 {
            self.kp += self.rng.gen_range(0.0..0.8);
        }
        self.kp = self.kp.clamp(0.0, 9.0);

        let mut flares = Vec::new();
        if self.rng.gen_bool(0.03) {
            self.flare_seq += 1;
            let class = if self.rng.gen_bool(0.25) { 'X' } else { 'M' };
            let magnitude = (self.rng.gen_range(1.0..9.9_f64) * 10.0).round() / 10.0;
            flares.push(FlareRecord {
                id: format!("synthetic-{}", self.flare_seq),
                class_type: format!("{class}{magnitude:.1}"),
                magnitude: Some(magnitude),
                begin_time: Some(self.clock),
                peak_time: Some(self.clock),
                source_region: Some(self.rng.gen_range(13_600..13_700).to_string()),
            });
        }

        let kp = (self.kp * 3.0).round() / 3.0;
        Snapshot {
            timestamp: self.clock,
            solar_wind: SolarWind {
                speed: Some(self.speed.round()),
                density: Some(self.rng.gen_range(1.0..15.0)),
                temperature: Some(self.rng.gen_range(40_000.0..400_000.0)),
            },
            geomagnetic: Geomagnetic {
                kp_index: Some(kp),
                storm: kp >= 5.0,
                storm_level: (kp >= 5.0).then(|| format!("G{}", (kp.round() as i64 - 4).clamp(1, 5))),
            },
            flares,
        }
    }
}

#[async_trait]
impl SnapshotSource for SyntheticSource {
    async fn next_snapshot(&mut self) -> Result<SnapshotEvent, SourceError> {
        if self.yielded_first {
            if self.interval_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.interval_ms)).await;
            }
            self.clock += chrono::Duration::milliseconds(self.interval_ms.max(1) as i64);
        }
        self.yielded_first = true;
        Ok(SnapshotEvent::Snapshot(self.generate()))
    }

    fn source_name(&self) -> &str {
        "synthetic"
    }
}
