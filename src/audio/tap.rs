use crossbeam_channel::{Receiver, Sender, TrySendError};
use rodio::source::SeekError;
use rodio::Source;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Mono samples sent per channel message.
const TAP_CHUNK: usize = 256;

/// Chunks buffered before the tap starts dropping.
const TAP_CAPACITY: usize = 64;

/// Pass-through source that copies a mono mix of everything the output
/// thread pulls into a channel, and counts played frames for the position
/// readout.
pub struct TappedSource<S> {
    inner: S,
    sender: Sender<Vec<f32>>,
    connected: Arc<AtomicBool>,
    played_frames: Arc<AtomicU64>,
    chunk: Vec<f32>,
    frame_sum: f32,
    frame_channels: u16,
    channel_index: u16,
    dropped_chunks: u64,
}

/// Consumer side of a tap, held by the UI thread.
pub struct TapHandle {
    receiver: Receiver<Vec<f32>>,
    connected: Arc<AtomicBool>,
    played_frames: Arc<AtomicU64>,
    sample_rate: u32,
}

impl<S> TappedSource<S>
where
    S: Source<Item = f32>,
{
    pub fn new(inner: S) -> (Self, TapHandle) {
        let (sender, receiver) = crossbeam_channel::bounded(TAP_CAPACITY);
        let connected = Arc::new(AtomicBool::new(true));
        let played_frames = Arc::new(AtomicU64::new(0));
        let sample_rate = inner.sample_rate();
        let frame_channels = inner.channels().max(1);

        let handle = TapHandle {
            receiver,
            connected: Arc::clone(&connected),
            played_frames: Arc::clone(&played_frames),
            sample_rate,
        };
        let source = Self {
            inner,
            sender,
            connected,
            played_frames,
            chunk: Vec::with_capacity(TAP_CHUNK),
            frame_sum: 0.0,
            frame_channels,
            channel_index: 0,
            dropped_chunks: 0,
        };
        (source, handle)
    }

    fn flush(&mut self) {
        if self.chunk.is_empty() {
            return;
        }
        if !self.connected.load(Ordering::Relaxed) {
            self.chunk.clear();
            return;
        }
        let chunk = std::mem::replace(&mut self.chunk, Vec::with_capacity(TAP_CHUNK));
        match self.sender.try_send(chunk) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped_chunks += 1;
                if self.dropped_chunks % 100 == 1 {
                    log::debug!("Sample tap full, dropped {} chunks so far", self.dropped_chunks);
                }
            }
            Err(TrySendError::Disconnected(_)) => {
                self.connected.store(false, Ordering::Relaxed);
            }
        }
    }
}

impl<S> Iterator for TappedSource<S>
where
    S: Source<Item = f32>,
{
    type Item = f32;

    fn next(&mut self) -> Option<f32> {
        let sample = match self.inner.next() {
            Some(sample) => sample,
            None => {
                self.flush();
                return None;
            }
        };

        if self.channel_index == 0 {
            self.frame_channels = self.inner.channels().max(1);
        }
        self.frame_sum += sample;
        self.channel_index += 1;

        if self.channel_index >= self.frame_channels {
            self.chunk.push(self.frame_sum / self.frame_channels as f32);
            self.played_frames.fetch_add(1, Ordering::Relaxed);
            self.frame_sum = 0.0;
            self.channel_index = 0;

            if self.chunk.len() >= TAP_CHUNK {
                self.flush();
            }
        }

        Some(sample)
    }
}

impl<S> Source for TappedSource<S>
where
    S: Source<Item = f32>,
{
    fn current_frame_len(&self) -> Option<usize> {
        self.inner.current_frame_len()
    }

    fn channels(&self) -> u16 {
        self.inner.channels()
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }

    fn total_duration(&self) -> Option<Duration> {
        self.inner.total_duration()
    }

    fn try_seek(&mut self, pos: Duration) -> Result<(), SeekError> {
        self.inner.try_seek(pos)?;
        let frames = pos.as_secs_f64() * self.inner.sample_rate() as f64;
        self.played_frames.store(frames as u64, Ordering::Relaxed);
        self.chunk.clear();
        self.frame_sum = 0.0;
        self.channel_index = 0;
        Ok(())
    }
}

impl TapHandle {
    /// Moves every pending sample into `out`.
    pub fn drain_into(&self, out: &mut Vec<f32>) {
        while let Ok(chunk) = self.receiver.try_recv() {
            out.extend_from_slice(&chunk);
        }
    }

    /// Stops the tap from forwarding anything further.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::Relaxed);
        while self.receiver.try_recv().is_ok() {}
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    pub fn position(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = self.played_frames.load(Ordering::Relaxed);
        Duration::from_secs_f64(frames as f64 / self.sample_rate as f64)
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rodio::buffer::SamplesBuffer;

    #[test]
    fn test_passes_samples_through_and_mixes_to_mono() {
        let interleaved: Vec<f32> = (0..1024).map(|i| if i % 2 == 0 { 0.5 } else { -0.1 }).collect();
        let (tapped, handle) = TappedSource::new(SamplesBuffer::new(2, 48000, interleaved.clone()));

        let played: Vec<f32> = tapped.collect();
        assert_eq!(played, interleaved);

        let mut mono = Vec::new();
        handle.drain_into(&mut mono);
        assert_eq!(mono.len(), 512);
        assert!(mono.iter().all(|&s| (s - 0.2).abs() < 1e-6));
        assert_eq!(handle.position(), Duration::from_secs_f64(512.0 / 48000.0));
    }

    #[test]
    fn test_disconnected_tap_forwards_nothing() {
        let (tapped, handle) = TappedSource::new(SamplesBuffer::new(1, 44100, vec![0.3f32; 2048]));
        handle.disconnect();

        let played = tapped.count();
        assert_eq!(played, 2048);

        let mut mono = Vec::new();
        handle.drain_into(&mut mono);
        assert!(mono.is_empty());
        assert!(!handle.is_connected());
    }

    #[test]
    fn test_trailing_partial_chunk_is_flushed() {
        let (tapped, handle) = TappedSource::new(SamplesBuffer::new(1, 44100, vec![0.0f32; 300]));
        tapped.for_each(drop);

        let mut mono = Vec::new();
        handle.drain_into(&mut mono);
        assert_eq!(mono.len(), 300);
    }
}
