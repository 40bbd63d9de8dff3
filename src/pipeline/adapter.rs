use log::{error, info, warn};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::watch;

use crate::audio::{
    create_analyzer, AnalyzerConfig, FeatureKind, FeatureReadout, FeatureSnapshot, FrameAnalyzer, LiveFeatures,
    RawFeatures,
};
use crate::error::{Result, VisualizerError};
use crate::render::SharedHistory;

/// The source an adapter is attached to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfo {
    pub generation: u64,
    pub sample_rate: u32,
}

/// Runs the frame analyzer for the current source and publishes what it
/// produces.
///
/// Every accepted frame is written twice: into [`LiveFeatures`], which the
/// render loop reads synchronously each tick, and into a watch channel the
/// UI subscribes to. The render loop never goes through the watch channel.
pub struct FeatureStreamAdapter {
    frame_size: usize,
    features: Vec<FeatureKind>,
    live: LiveFeatures,
    readout: Rc<watch::Sender<FeatureReadout>>,
    history: SharedHistory,
    now: Rc<Cell<Duration>>,
    analyzer: Option<FrameAnalyzer>,
    source: Option<SourceInfo>,
}

impl FeatureStreamAdapter {
    pub fn new(frame_size: usize, features: Vec<FeatureKind>, live: LiveFeatures, history: SharedHistory) -> Self {
        let (sender, _) = watch::channel(FeatureReadout::default());
        Self {
            frame_size,
            features,
            live,
            readout: Rc::new(sender),
            history,
            now: Rc::new(Cell::new(Duration::ZERO)),
            analyzer: None,
            source: None,
        }
    }

    /// A receiver for UI bindings.
    pub fn subscribe(&self) -> watch::Receiver<FeatureReadout> {
        self.readout.subscribe()
    }

    /// Builds the analyzer for `source`, replacing any previous one. On
    /// failure the adapter stays detached and the error is returned for
    /// logging.
    pub fn attach(&mut self, source: Option<SourceInfo>) -> Result<()> {
        self.detach();
        let source = source.ok_or(VisualizerError::MissingContext("feature analysis needs an audio source"))?;

        let live = self.live.clone();
        let readout = Rc::clone(&self.readout);
        let history = Rc::clone(&self.history);
        let now = Rc::clone(&self.now);
        let generation = source.generation;

        let analyzer = create_analyzer(
            AnalyzerConfig {
                frame_size: self.frame_size,
                features: self.features.clone(),
                sample_rate: source.sample_rate as f32,
            },
            Box::new(move |raw: RawFeatures| {
                let snapshot = FeatureSnapshot::from_payload(&raw, generation);
                if snapshot.is_empty() {
                    return;
                }
                let latest = live.publish(&snapshot);
                if let Some(chroma) = snapshot.chroma {
                    history.borrow_mut().record(chroma, now.get());
                }
                readout.send_replace(FeatureReadout::from(&latest));
            }),
        )?;

        info!("Feature analysis attached to source #{} ({} Hz)", generation, source.sample_rate);
        self.analyzer = Some(analyzer);
        self.source = Some(source);
        Ok(())
    }

    /// Same as [`attach`](Self::attach) but logs instead of returning the
    /// error.
    pub fn initialize(&mut self, source: Option<SourceInfo>) -> bool {
        match self.attach(source) {
            Ok(()) => true,
            Err(e @ VisualizerError::MissingContext(_)) => {
                warn!("Feature analysis not started: {}", e);
                false
            }
            Err(e) => {
                error!("Error initiating feature analysis: {}", e);
                false
            }
        }
    }

    /// Begins analysis callbacks. Without an analyzer this only logs.
    pub fn start(&mut self) {
        match &mut self.analyzer {
            Some(analyzer) if !analyzer.is_running() => {
                analyzer.start();
                info!("Feature analysis started");
            }
            Some(_) => {}
            None => warn!("Feature analysis unavailable: no analyzer for the current source"),
        }
    }

    /// Halts callbacks. Safe to call when never started.
    pub fn stop(&mut self) {
        if let Some(analyzer) = &mut self.analyzer {
            if analyzer.is_running() {
                analyzer.stop();
                info!("Feature analysis stopped");
            }
        }
    }

    /// Drops the analyzer and clears every published value.
    pub fn detach(&mut self) {
        self.stop();
        if self.analyzer.take().is_some() {
            if let Some(source) = self.source {
                info!("Feature analysis detached from source #{}", source.generation);
            }
        }
        self.source = None;
        self.live.reset();
        self.readout.send_replace(FeatureReadout::default());
    }

    /// Feeds drained source samples; `now` stamps history entries recorded
    /// from these frames.
    pub fn feed(&mut self, samples: &[f32], now: Duration) -> usize {
        self.now.set(now);
        match &mut self.analyzer {
            Some(analyzer) => analyzer.push_samples(samples),
            None => 0,
        }
    }

    pub fn is_running(&self) -> bool {
        self.analyzer.as_ref().map_or(false, |a| a.is_running())
    }

    pub fn is_attached(&self) -> bool {
        self.analyzer.is_some()
    }

    pub fn source(&self) -> Option<SourceInfo> {
        self.source
    }

    pub fn live(&self) -> &LiveFeatures {
        &self.live
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::ChromaHistory;

    fn adapter(frame_size: usize) -> (FeatureStreamAdapter, SharedHistory) {
        let history = ChromaHistory::shared(Duration::from_millis(1000));
        let adapter = FeatureStreamAdapter::new(
            frame_size,
            FeatureKind::ALL.to_vec(),
            LiveFeatures::new(),
            Rc::clone(&history),
        );
        (adapter, history)
    }

    fn source(generation: u64) -> Option<SourceInfo> {
        Some(SourceInfo { generation, sample_rate: 44100 })
    }

    #[test]
    fn test_publishes_to_cell_and_watch_channel() {
        let (mut adapter, history) = adapter(512);
        let mut ui = adapter.subscribe();
        adapter.attach(source(1)).unwrap();
        adapter.start();

        let tone: Vec<f32> = (0..1024).map(|i| (i as f32 * 0.07).sin() * 0.4).collect();
        assert_eq!(adapter.feed(&tone, Duration::from_millis(10)), 2);

        let latest = adapter.live().read();
        assert_eq!(latest.generation, Some(1));
        assert_eq!(latest.frames, 2);
        assert!(latest.rms.unwrap() > 0.2);

        assert!(ui.has_changed().unwrap());
        let readout = ui.borrow_and_update().clone();
        assert_eq!(readout.rms, latest.rms);
        assert_eq!(history.borrow().len(), 1);
    }

    #[test]
    fn test_silence_publishes_real_zeros() {
        let (mut adapter, _) = adapter(512);
        adapter.attach(source(1)).unwrap();
        adapter.start();
        adapter.feed(&vec![0.0; 512], Duration::ZERO);

        let readout = FeatureReadout::from(&adapter.live().read());
        assert_eq!(readout.rms, Some(0.0));
        assert_eq!(readout.rms_label(), "0.00");
        assert_eq!(readout.zcr, Some(0.0));
        assert_eq!(readout.spectral_centroid, Some(0.0));
    }

    #[test]
    fn test_start_and_stop_without_source_are_harmless() {
        let (mut adapter, _) = adapter(512);
        adapter.stop();
        adapter.start();
        assert!(!adapter.is_running());
        assert!(!adapter.initialize(None));
        assert_eq!(adapter.feed(&vec![0.1; 2048], Duration::ZERO), 0);
        assert_eq!(adapter.live().read().frames, 0);
    }

    #[test]
    fn test_init_failure_leaves_adapter_detached() {
        let (mut adapter, _) = adapter(500);
        let err = adapter.attach(source(1)).unwrap_err();
        assert!(matches!(err, VisualizerError::AnalyzerInit(_)));
        assert!(!adapter.is_attached());
        adapter.start();
        assert!(!adapter.is_running());
    }

    #[test]
    fn test_reattach_clears_previous_values() {
        let (mut adapter, _) = adapter(512);
        let ui = adapter.subscribe();
        adapter.attach(source(1)).unwrap();
        adapter.start();
        adapter.feed(&vec![0.3; 512], Duration::ZERO);
        assert!(adapter.live().read().rms.is_some());

        adapter.attach(source(2)).unwrap();
        assert_eq!(adapter.live().read().rms, None);
        assert_eq!(ui.borrow().rms, None);
        assert!(!adapter.is_running());
        assert_eq!(adapter.source().unwrap().generation, 2);
    }
}
