use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use log::{info, warn};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::tap::{TapHandle, TappedSource};
use crate::error::{Result, VisualizerError};

/// Opens decoded audio connections. There is one backend per process; it
/// owns the output device.
pub trait MediaBackend {
    fn open(&mut self, path: &Path) -> Result<Box<dyn MediaSource>>;
}

/// One decoded source connected to the output, with its playback clock and
/// an analysis tap.
pub trait MediaSource {
    fn play(&mut self);

    fn pause(&mut self);

    fn seek(&mut self, position: Duration) -> Result<()>;

    fn position(&self) -> Duration;

    /// `None` until the container reports a length.
    fn duration(&self) -> Option<Duration>;

    fn sample_rate(&self) -> u32;

    /// The "ready to play" signal. Returns true exactly once.
    fn take_ready(&mut self) -> bool;

    fn is_ended(&self) -> bool;

    /// Moves mono samples played since the last call into `out`.
    fn drain_samples(&mut self, out: &mut Vec<f32>);

    /// Detaches the source from the output. Idempotent.
    fn disconnect(&mut self);
}

/// Owner of the output stream; every source it opens plays through it.
pub struct AudioOutput {
    #[allow(dead_code)]
    stream: OutputStream,
    stream_handle: OutputStreamHandle,
    volume: f32,
}

impl AudioOutput {
    pub fn new(volume: f32) -> Result<Self> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| VisualizerError::OutputDevice(e.to_string()))?;
        Ok(Self {
            stream,
            stream_handle,
            volume: volume.clamp(0.0, 1.0),
        })
    }
}

impl MediaBackend for AudioOutput {
    fn open(&mut self, path: &Path) -> Result<Box<dyn MediaSource>> {
        let decoded = DecodedSource::open(path)?;
        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| VisualizerError::OutputDevice(e.to_string()))?;
        sink.pause();
        sink.set_volume(self.volume);
        sink.append(decoded.source);

        info!(
            "Loaded audio file: {:?} ({}Hz, duration {:?})",
            path, decoded.sample_rate, decoded.duration
        );

        Ok(Box::new(RodioSource {
            path: path.to_path_buf(),
            sink,
            tap: decoded.tap,
            duration: decoded.duration,
            sample_rate: decoded.sample_rate,
            ready_pending: true,
            disconnected: false,
        }))
    }
}

/// A file decoded and wrapped in an analysis tap, not yet attached to any
/// output.
pub struct DecodedSource {
    pub source: TappedSource<rodio::source::SamplesConverter<Decoder<BufReader<File>>, f32>>,
    pub tap: TapHandle,
    pub duration: Option<Duration>,
    pub sample_rate: u32,
}

impl DecodedSource {
    pub fn open(path: &Path) -> Result<Self> {
        let decode_error = |message: String| VisualizerError::Decode {
            path: path.to_path_buf(),
            message,
        };

        let file = File::open(path).map_err(|e| decode_error(e.to_string()))?;
        let decoder = Decoder::new(BufReader::new(file)).map_err(|e| decode_error(e.to_string()))?;
        let sample_rate = decoder.sample_rate();
        let duration = probe_duration(path).or_else(|| decoder.total_duration());

        let (source, tap) = TappedSource::new(decoder.convert_samples::<f32>());
        Ok(Self {
            source,
            tap,
            duration,
            sample_rate,
        })
    }
}

/// Reads the track length from the container header, if it has one.
pub fn probe_duration(path: &Path) -> Option<Duration> {
    let file = File::open(path).ok()?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .ok()?;
    let track = probed.format.default_track()?;
    let frames = track.codec_params.n_frames?;
    let sample_rate = track.codec_params.sample_rate?;
    if sample_rate == 0 {
        return None;
    }
    Some(Duration::from_secs_f64(frames as f64 / sample_rate as f64))
}

pub struct RodioSource {
    path: PathBuf,
    sink: Sink,
    tap: TapHandle,
    duration: Option<Duration>,
    sample_rate: u32,
    ready_pending: bool,
    disconnected: bool,
}

impl MediaSource for RodioSource {
    fn play(&mut self) {
        if !self.disconnected {
            self.sink.play();
            info!("Audio playback started");
        }
    }

    fn pause(&mut self) {
        if !self.disconnected {
            self.sink.pause();
            info!("Audio playback paused");
        }
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        if self.disconnected {
            return Err(VisualizerError::MissingContext("seek on a disconnected source"));
        }
        self.sink
            .try_seek(position)
            .map_err(|e| VisualizerError::Seek(format!("{:?}", e)))
    }

    fn position(&self) -> Duration {
        self.tap.position()
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn take_ready(&mut self) -> bool {
        std::mem::take(&mut self.ready_pending)
    }

    fn is_ended(&self) -> bool {
        self.sink.empty()
    }

    fn drain_samples(&mut self, out: &mut Vec<f32>) {
        if !self.disconnected {
            self.tap.drain_into(out);
        }
    }

    fn disconnect(&mut self) {
        if self.disconnected {
            return;
        }
        self.tap.disconnect();
        self.sink.stop();
        self.disconnected = true;
        info!("Disconnected audio source {:?}", self.path);
    }
}

impl Drop for RodioSource {
    fn drop(&mut self) {
        if !self.disconnected {
            warn!("Audio source {:?} dropped while connected", self.path);
            self.disconnect();
        }
    }
}
