//! Ring cue synthesis and the audio output seam
//!
//! A cue is two sine tones mixed into 16-bit PCM. The second tone starts
//! `offset_ms` after the first, so with the default settings the tones
//! overlap for 200 ms and one cue lasts 600 ms.

use ringline_core::{config::RingtoneConfig, AppError, AppResult};
use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// One rendered dual-tone cue
#[derive(Debug, Clone)]
pub struct RingCue {
    samples: Arc<[i16]>,
    sample_rate: u32,
}

impl RingCue {
    pub fn render(config: &RingtoneConfig) -> Self {
        let rate = config.sample_rate.max(1) as f32;
        let per_sec = config.sample_rate as u64;
        let tone_len = (config.tone_ms * per_sec / 1000) as usize;
        let offset = (config.offset_ms * per_sec / 1000) as usize;
        let total = tone_len.max(offset + tone_len);
        let peak = config.amplitude.clamp(0.0, 1.0) * i16::MAX as f32;

        let samples: Vec<i16> = (0..total)
            .map(|n| {
                let mut mixed = 0.0;
                if n < tone_len {
                    mixed += (2.0 * PI * config.first_tone_hz * n as f32 / rate).sin();
                }
                if n >= offset && n < offset + tone_len {
                    let t = (n - offset) as f32 / rate;
                    mixed += (2.0 * PI * config.second_tone_hz * t).sin();
                }
                (mixed * peak).clamp(i16::MIN as f32, i16::MAX as f32) as i16
            })
            .collect();

        Self {
            samples: samples.into(),
            sample_rate: config.sample_rate,
        }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_micros(self.samples.len() as u64 * 1_000_000 / self.sample_rate as u64)
    }
}

/// An open, exclusively owned output. Dropping it releases the device.
pub trait AudioStream: Send {
    fn play(&mut self, cue: &RingCue) -> AppResult<()>;
}

/// Something that can hand out audio streams
pub trait AudioSink: Send + Sync {
    fn open(&self) -> AppResult<Box<dyn AudioStream>>;
}

/// Headless sink that only logs each cue
#[derive(Debug, Default)]
pub struct TracingAudioSink;

struct TracingStream {
    played: u64,
}

impl AudioSink for TracingAudioSink {
    fn open(&self) -> AppResult<Box<dyn AudioStream>> {
        debug!("Audio stream opened");
        Ok(Box::new(TracingStream { played: 0 }))
    }
}

impl AudioStream for TracingStream {
    fn play(&mut self, cue: &RingCue) -> AppResult<()> {
        self.played += 1;
        info!(
            "Ring cue #{} ({} samples, {:?})",
            self.played,
            cue.samples().len(),
            cue.duration()
        );
        Ok(())
    }
}

impl Drop for TracingStream {
    fn drop(&mut self) {
        debug!("Audio stream released after {} cues", self.played);
    }
}

#[derive(Debug, Default)]
struct SinkCounters {
    open: AtomicUsize,
    max_open: AtomicUsize,
    opened: AtomicUsize,
    cues: AtomicUsize,
}

/// Sink that records what was played, for tests and diagnostics
#[derive(Debug, Clone, Default)]
pub struct MemoryAudioSink {
    counters: Arc<SinkCounters>,
    failing: Arc<AtomicBool>,
}

impl MemoryAudioSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Streams currently held open
    pub fn open_streams(&self) -> usize {
        self.counters.open.load(Ordering::SeqCst)
    }

    /// Highest number of streams ever open at once
    pub fn max_open_streams(&self) -> usize {
        self.counters.max_open.load(Ordering::SeqCst)
    }

    pub fn streams_opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn cues_played(&self) -> usize {
        self.counters.cues.load(Ordering::SeqCst)
    }

    /// Make `open` fail, as a missing device would
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

struct MemoryStream {
    counters: Arc<SinkCounters>,
}

impl AudioSink for MemoryAudioSink {
    fn open(&self) -> AppResult<Box<dyn AudioStream>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(AppError::Audio("no output device".to_string()));
        }

        let now_open = self.counters.open.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_open.fetch_max(now_open, Ordering::SeqCst);
        self.counters.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(MemoryStream {
            counters: self.counters.clone(),
        }))
    }
}

impl AudioStream for MemoryStream {
    fn play(&mut self, _cue: &RingCue) -> AppResult<()> {
        self.counters.cues.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

impl Drop for MemoryStream {
    fn drop(&mut self) {
        self.counters.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cue_shape() {
        let config = RingtoneConfig::default();
        let cue = RingCue::render(&config);

        // 600 ms at 8 kHz
        assert_eq!(cue.samples().len(), 4800);
        assert_eq!(cue.duration(), Duration::from_millis(600));
        assert_eq!(cue.samples()[0], 0);

        let peak = cue.samples().iter().map(|s| s.unsigned_abs()).max().unwrap();
        let single = (0.25 * i16::MAX as f32) as u16;
        // Overlap region mixes both tones above a single tone's peak
        assert!(peak > single);
        assert!(peak <= 2 * single + 1);
    }

    #[test]
    fn test_tail_is_second_tone_only() {
        let config = RingtoneConfig::default();
        let cue = RingCue::render(&config);
        let single = (0.25 * i16::MAX as f32) as u16 + 1;

        // 400..600 ms carries only the 480 Hz tone
        assert!(cue.samples()[3200..]
            .iter()
            .all(|s| s.unsigned_abs() <= single));
    }

    #[test]
    fn test_memory_sink_counts_streams() {
        let sink = MemoryAudioSink::new();
        let cue = RingCue::render(&RingtoneConfig::default());

        let mut first = sink.open().unwrap();
        first.play(&cue).unwrap();
        assert_eq!(sink.open_streams(), 1);

        drop(first);
        assert_eq!(sink.open_streams(), 0);
        assert_eq!(sink.cues_played(), 1);

        sink.set_failing(true);
        assert!(matches!(sink.open(), Err(AppError::Audio(_))));
    }
}
