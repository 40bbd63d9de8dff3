use log::{error, info, warn};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;

use super::adapter::{FeatureStreamAdapter, SourceInfo};
use super::{PlaybackState, PlayingFlag};
use crate::audio::{FeatureReadout, LiveFeatures, MediaBackend, MediaSource, SpectrumAnalyser};
use crate::config::VisualizerConfig;
use crate::error::VisualizerError;
use crate::render::{ChromaHistory, FrameInputs, FrameScheduler, RenderLoop, SharedHistory, Surfaces, TickOutcome};

/// Owner of the audio source, the feature adapter and the render loop.
///
/// All lifetime transitions go through here: a new source is only attached
/// after the previous one, its analyzer and its pending render tick are gone.
pub struct PlaybackController {
    backend: Option<Box<dyn MediaBackend>>,
    source: Option<Box<dyn MediaSource>>,
    path: Option<PathBuf>,
    generation: u64,
    adapter: FeatureStreamAdapter,
    spectrum: SpectrumAnalyser,
    scheduler: FrameScheduler,
    render_loop: RenderLoop,
    surfaces: Surfaces,
    playing: PlayingFlag,
    history: SharedHistory,
    state: PlaybackState,
    playback_tx: watch::Sender<PlaybackState>,
    position_interval: Duration,
    last_position_publish: Option<Duration>,
    finish_after_frame: bool,
    samples: Vec<f32>,
}

impl PlaybackController {
    /// `backend` is `None` when no output device could be opened; loading a
    /// source then fails with a logged `MissingContext`.
    pub fn new(backend: Option<Box<dyn MediaBackend>>, scheduler: FrameScheduler, config: &VisualizerConfig) -> Self {
        let playing = PlayingFlag::new();
        let history = ChromaHistory::shared(config.history_interval());
        let adapter = FeatureStreamAdapter::new(
            config.frame_size,
            config.features.clone(),
            LiveFeatures::new(),
            history.clone(),
        );
        let (playback_tx, _) = watch::channel(PlaybackState::default());

        Self {
            backend,
            source: None,
            path: None,
            generation: 0,
            adapter,
            spectrum: SpectrumAnalyser::new(&config.spectrum),
            scheduler,
            render_loop: RenderLoop::new(playing.clone()),
            surfaces: Surfaces::new(&config.canvas),
            playing,
            history,
            state: PlaybackState::default(),
            playback_tx,
            position_interval: config.position_update_interval(),
            last_position_publish: None,
            finish_after_frame: false,
            samples: Vec::with_capacity(4096),
        }
    }

    pub fn subscribe_features(&self) -> watch::Receiver<FeatureReadout> {
        self.adapter.subscribe()
    }

    pub fn subscribe_playback(&self) -> watch::Receiver<PlaybackState> {
        self.playback_tx.subscribe()
    }

    /// Replaces the current source. Playback starts once the new source
    /// reports it is ready. Returns false if the file could not be opened.
    pub fn load_source(&mut self, path: &Path) -> bool {
        self.teardown();

        let backend = match self.backend.as_mut() {
            Some(backend) => backend,
            None => {
                error!("Error loading {:?}: {}", path, VisualizerError::MissingContext("no audio output"));
                return false;
            }
        };

        let source = match backend.open(path) {
            Ok(source) => source,
            Err(e) => {
                error!("Error handling file change: {}", e);
                return false;
            }
        };

        self.generation += 1;
        let info = SourceInfo {
            generation: self.generation,
            sample_rate: source.sample_rate(),
        };
        self.state = PlaybackState {
            is_playing: false,
            position: Duration::ZERO,
            duration: source.duration(),
        };
        self.source = Some(source);
        self.path = Some(path.to_path_buf());
        self.spectrum.reset();
        self.surfaces.clear();
        self.render_loop.invalidate_history();
        self.adapter.initialize(Some(info));
        self.publish_state();

        info!("Source #{} loaded: {:?}", self.generation, path);
        true
    }

    /// Flips between playing and paused.
    pub fn toggle(&mut self) {
        if self.source.is_none() {
            warn!("Cannot toggle playback: {}", VisualizerError::MissingContext("no audio source loaded"));
            return;
        }
        if self.playing.get() {
            self.pause();
        } else if self.source.as_ref().map_or(false, |s| s.is_ended()) {
            self.replay();
        } else {
            self.play();
        }
    }

    /// A drained source cannot be resumed; it is reopened from the start.
    fn replay(&mut self) {
        let path = match self.path.clone() {
            Some(path) => path,
            None => return,
        };
        info!("Replaying {:?} from the start", path);
        if self.load_source(&path) {
            self.play();
        }
    }

    fn play(&mut self) {
        let source = match self.source.as_mut() {
            Some(source) => source,
            None => return,
        };
        source.play();
        self.playing.set(true);
        self.state.is_playing = true;
        self.adapter.start();
        self.render_loop.start(&mut self.scheduler);
        self.publish_state();
    }

    fn pause(&mut self) {
        self.playing.set(false);
        self.render_loop.cancel(&mut self.scheduler);
        self.adapter.stop();
        if let Some(source) = self.source.as_mut() {
            source.pause();
        }
        self.state.is_playing = false;
        self.finish_after_frame = false;
        self.publish_state();
    }

    /// Seeks the current source, clamped to its known length.
    pub fn seek(&mut self, position: Duration) {
        let source = match self.source.as_mut() {
            Some(source) => source,
            None => {
                warn!("Cannot seek: {}", VisualizerError::MissingContext("no audio source loaded"));
                return;
            }
        };
        let target = match self.state.duration {
            Some(duration) => position.min(duration),
            None => position,
        };
        match source.seek(target) {
            Ok(()) => {
                self.state.position = target;
                self.finish_after_frame = false;
                self.publish_state();
            }
            Err(e) => warn!("{}", e),
        }
    }

    /// Moves played samples into the analyser and the feature adapter,
    /// handles the ready signal and keeps the position current. `now` is
    /// session time, used to stamp chroma history entries.
    pub fn pump(&mut self, now: Duration) {
        let source = match self.source.as_mut() {
            Some(source) => source,
            None => return,
        };

        self.samples.clear();
        source.drain_samples(&mut self.samples);
        let ready = source.take_ready();
        let ended = source.is_ended();
        let mut position = source.position();

        if !self.samples.is_empty() {
            self.spectrum.push_samples(&self.samples);
            self.adapter.feed(&self.samples, now);
        }

        if let Some(duration) = self.state.duration {
            position = position.min(duration);
        }
        if ended {
            position = self.state.duration.unwrap_or(position);
            if self.playing.get() && !self.finish_after_frame {
                self.finish_after_frame = true;
                info!("Playback reached the end of source #{}", self.generation);
            }
        }
        self.state.position = position;

        let due = self
            .last_position_publish
            .map_or(true, |last| now.saturating_sub(last) >= self.position_interval);
        if due {
            self.last_position_publish = Some(now);
            self.publish_state();
        }

        if ready && !self.playing.get() {
            self.play();
        }
    }

    /// Runs the render tick if one is due at this display refresh.
    pub fn on_redraw(&mut self) -> Option<TickOutcome> {
        let mut outcome = None;
        for handle in self.scheduler.take_due() {
            if !self.render_loop.owns(handle) {
                continue;
            }
            let history = self.history.borrow();
            let inputs = FrameInputs {
                features: self.adapter.live().read(),
                playback: &self.state,
                history: &history,
            };
            outcome = Some(self.render_loop.run_frame(
                &mut self.scheduler,
                &mut self.spectrum,
                inputs,
                &mut self.surfaces,
            ));
        }

        if self.finish_after_frame && outcome == Some(TickOutcome::Drawn) {
            self.pause();
        }
        outcome
    }

    /// Cancels the pending tick, stops and drops the analyzer and
    /// disconnects the source, in that order.
    pub fn teardown(&mut self) {
        self.playing.set(false);
        self.render_loop.cancel(&mut self.scheduler);
        self.adapter.detach();
        if let Some(mut source) = self.source.take() {
            source.disconnect();
        }
        self.path = None;
        self.finish_after_frame = false;
        self.state = PlaybackState::default();
        self.last_position_publish = None;
        self.publish_state();
    }

    fn publish_state(&self) {
        self.playback_tx.send_replace(self.state);
    }

    pub fn is_playing(&self) -> bool {
        self.playing.get()
    }

    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn live_features(&self) -> &LiveFeatures {
        self.adapter.live()
    }

    pub fn history(&self) -> SharedHistory {
        self.history.clone()
    }

    pub fn surfaces_mut(&mut self) -> &mut Surfaces {
        &mut self.surfaces
    }

    pub fn adapter(&self) -> &FeatureStreamAdapter {
        &self.adapter
    }

    pub fn scheduler(&self) -> &FrameScheduler {
        &self.scheduler
    }

    /// Whether a render tick is waiting for the next display refresh.
    pub fn frame_pending(&self) -> bool {
        self.scheduler.pending_count() > 0
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::audio::LatestFeatures;
    use crate::render::{DrawSurface, Rgba};
    use std::cell::RefCell;
    use std::path::PathBuf;
    use std::rc::Rc;

    #[derive(Default)]
    struct FakeState {
        queue: Vec<f32>,
        playing: bool,
        disconnected: bool,
        ready: bool,
        ended: bool,
        position: Duration,
        duration: Option<Duration>,
    }

    struct FakeSource(Rc<RefCell<FakeState>>);

    impl MediaSource for FakeSource {
        fn play(&mut self) {
            self.0.borrow_mut().playing = true;
        }
        fn pause(&mut self) {
            self.0.borrow_mut().playing = false;
        }
        fn seek(&mut self, position: Duration) -> Result<()> {
            self.0.borrow_mut().position = position;
            Ok(())
        }
        fn position(&self) -> Duration {
            self.0.borrow().position
        }
        fn duration(&self) -> Option<Duration> {
            self.0.borrow().duration
        }
        fn sample_rate(&self) -> u32 {
            44100
        }
        fn take_ready(&mut self) -> bool {
            std::mem::take(&mut self.0.borrow_mut().ready)
        }
        fn is_ended(&self) -> bool {
            self.0.borrow().ended
        }
        fn drain_samples(&mut self, out: &mut Vec<f32>) {
            out.append(&mut self.0.borrow_mut().queue);
        }
        fn disconnect(&mut self) {
            self.0.borrow_mut().disconnected = true;
        }
    }

    /// Hands out fake sources and keeps their state reachable from the test.
    #[derive(Default, Clone)]
    struct FakeBackend {
        opened: Rc<RefCell<Vec<Rc<RefCell<FakeState>>>>>,
        duration: Option<Duration>,
    }

    impl MediaBackend for FakeBackend {
        fn open(&mut self, path: &Path) -> Result<Box<dyn MediaSource>> {
            if path.to_string_lossy().contains("broken") {
                return Err(VisualizerError::Decode {
                    path: path.to_path_buf(),
                    message: "unsupported format".to_string(),
                });
            }
            let state = Rc::new(RefCell::new(FakeState {
                ready: true,
                duration: self.duration,
                ..Default::default()
            }));
            self.opened.borrow_mut().push(Rc::clone(&state));
            Ok(Box::new(FakeSource(state)))
        }
    }

    fn controller_with(backend: FakeBackend, config: &VisualizerConfig) -> PlaybackController {
        PlaybackController::new(Some(Box::new(backend)), FrameScheduler::new(), config)
    }

    fn controller(backend: FakeBackend) -> PlaybackController {
        controller_with(backend, &VisualizerConfig::default())
    }

    fn tone(len: usize) -> Vec<f32> {
        (0..len).map(|i| (i as f32 * 0.05).sin() * 0.5).collect()
    }

    #[test]
    fn test_load_auto_starts_when_ready() {
        let backend = FakeBackend { duration: Some(Duration::from_secs(10)), ..Default::default() };
        let mut controller = controller(backend.clone());

        assert!(controller.load_source(&PathBuf::from("song.wav")));
        assert!(!controller.is_playing());
        controller.pump(Duration::ZERO);

        assert!(controller.is_playing());
        assert!(backend.opened.borrow()[0].borrow().playing);
        assert!(controller.adapter().is_running());
        assert_eq!(controller.scheduler().pending_count(), 1);
        assert_eq!(controller.state().duration, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_toggle_twice_leaves_one_analyzer_and_one_tick() {
        let mut controller = controller(FakeBackend::default());
        controller.load_source(&PathBuf::from("song.wav"));
        controller.pump(Duration::ZERO);

        for _ in 0..2 {
            controller.toggle();
            assert!(!controller.is_playing());
            assert_eq!(controller.scheduler().pending_count(), 0);
            assert!(!controller.adapter().is_running());

            controller.toggle();
        }
        assert!(controller.is_playing());
        assert!(controller.adapter().is_running());
        assert_eq!(controller.scheduler().pending_count(), 1);

        assert_eq!(controller.on_redraw(), Some(TickOutcome::Drawn));
        assert_eq!(controller.scheduler().pending_count(), 1);
    }

    #[test]
    fn test_paused_controller_never_draws() {
        let mut controller = controller(FakeBackend::default());
        controller.load_source(&PathBuf::from("song.wav"));
        controller.pump(Duration::ZERO);
        controller.toggle();

        assert_eq!(controller.on_redraw(), None);
        assert_eq!(controller.scheduler().pending_count(), 0);
    }

    #[test]
    fn test_switching_source_isolates_old_samples() {
        let backend = FakeBackend::default();
        let mut controller = controller(backend.clone());
        controller.load_source(&PathBuf::from("first.wav"));
        controller.pump(Duration::ZERO);

        let first = Rc::clone(&backend.opened.borrow()[0]);
        first.borrow_mut().queue.extend(tone(2048));
        controller.pump(Duration::from_millis(50));
        assert_eq!(controller.live_features().read().generation, Some(1));

        controller.load_source(&PathBuf::from("second.wav"));
        assert!(first.borrow().disconnected);
        assert!(!controller.is_playing());
        assert_eq!(controller.scheduler().pending_count(), 0);
        assert_eq!(controller.live_features().read(), LatestFeatures::default());

        // the old source keeps producing; none of it may reach the new analyzer
        first.borrow_mut().queue.extend(tone(4096));
        controller.pump(Duration::from_millis(100));
        controller.on_redraw();
        assert_eq!(controller.live_features().read().frames, 0);
        assert_eq!(controller.live_features().read().generation, None);
        assert_eq!(first.borrow().queue.len(), 4096);

        let second = Rc::clone(&backend.opened.borrow()[1]);
        second.borrow_mut().queue.extend(tone(1024));
        controller.pump(Duration::from_millis(150));
        assert_eq!(controller.live_features().read().generation, Some(2));
        assert_eq!(controller.generation(), 2);
        assert_eq!(controller.scheduler().pending_count(), 1);
    }

    #[test]
    fn test_failed_load_leaves_controller_idle() {
        let mut controller = controller(FakeBackend::default());
        assert!(!controller.load_source(&PathBuf::from("broken.xyz")));
        assert!(!controller.has_source());

        controller.toggle();
        assert!(!controller.is_playing());
        assert_eq!(controller.scheduler().pending_count(), 0);
    }

    #[test]
    fn test_missing_backend_is_not_fatal() {
        let mut controller = PlaybackController::new(None, FrameScheduler::new(), &VisualizerConfig::default());
        assert!(!controller.load_source(&PathBuf::from("song.wav")));
        controller.pump(Duration::ZERO);
        assert_eq!(controller.on_redraw(), None);
    }

    #[test]
    fn test_analyzer_failure_still_plays_and_draws() {
        let config = VisualizerConfig { frame_size: 500, ..Default::default() };
        let backend = FakeBackend::default();
        let mut controller = controller_with(backend.clone(), &config);
        controller.load_source(&PathBuf::from("song.wav"));
        controller.pump(Duration::ZERO);

        assert!(controller.is_playing());
        assert!(!controller.adapter().is_attached());

        backend.opened.borrow()[0].borrow_mut().queue.extend(tone(1024));
        controller.pump(Duration::from_millis(20));
        assert_eq!(controller.on_redraw(), Some(TickOutcome::Drawn));
        assert_eq!(controller.live_features().read().frames, 0);
    }

    #[test]
    fn test_seek_is_clamped_to_duration() {
        let backend = FakeBackend { duration: Some(Duration::from_secs(120)), ..Default::default() };
        let mut controller = controller(backend.clone());
        controller.load_source(&PathBuf::from("song.wav"));
        controller.seek(Duration::from_secs(500));

        assert_eq!(controller.state().position, Duration::from_secs(120));
        assert_eq!(backend.opened.borrow()[0].borrow().position, Duration::from_secs(120));
    }

    #[test]
    fn test_position_updates_are_published_periodically() {
        let backend = FakeBackend { duration: Some(Duration::from_secs(120)), ..Default::default() };
        let mut controller = controller(backend.clone());
        let mut playback = controller.subscribe_playback();
        controller.load_source(&PathBuf::from("song.wav"));
        controller.pump(Duration::ZERO);
        playback.borrow_and_update();

        let state = Rc::clone(&backend.opened.borrow()[0]);
        state.borrow_mut().position = Duration::from_secs(1);
        controller.pump(Duration::from_millis(100));
        assert!(!playback.has_changed().unwrap());
        assert_eq!(controller.state().position, Duration::from_secs(1));

        controller.pump(Duration::from_millis(300));
        assert!(playback.has_changed().unwrap());
        assert_eq!(playback.borrow_and_update().position, Duration::from_secs(1));
    }

    #[test]
    fn test_silent_clip_plays_to_the_end() {
        let backend = FakeBackend { duration: Some(Duration::from_secs(2)), ..Default::default() };
        let mut controller = controller(backend.clone());
        let features = controller.subscribe_features();
        controller.load_source(&PathBuf::from("silence.wav"));
        controller.pump(Duration::ZERO);

        let state = Rc::clone(&backend.opened.borrow()[0]);
        let chunk = 44100 / 60;
        let mut played = 0usize;
        let mut elapsed = Duration::ZERO;
        while played < 2 * 44100 {
            state.borrow_mut().queue.extend(vec![0.0f32; chunk]);
            played += chunk;
            elapsed += Duration::from_secs_f64(chunk as f64 / 44100.0);
            state.borrow_mut().position = elapsed;
            controller.pump(elapsed);
            assert_eq!(controller.on_redraw(), Some(TickOutcome::Drawn));
        }

        let readout = features.borrow().clone();
        assert_eq!(readout.rms, Some(0.0));
        assert_eq!(readout.rms_label(), "0.00");
        assert_eq!(readout.zcr, Some(0.0));
        assert_eq!(readout.spectral_centroid, Some(0.0));

        {
            let surfaces = controller.surfaces_mut();
            for x in (0..500).step_by(5) {
                assert_eq!(surfaces.main.pixel(x, 50), Rgba::TRANSPARENT);
            }
        }

        state.borrow_mut().ended = true;
        controller.pump(elapsed + Duration::from_millis(20));
        assert_eq!(controller.state().position, Duration::from_secs(2));
        assert_eq!(controller.on_redraw(), Some(TickOutcome::Drawn));

        let surfaces = controller.surfaces_mut();
        let width = surfaces.main.width();
        assert_eq!(surfaces.main.pixel(width - 1, 116), Rgba::rgb(230, 230, 230));
        assert!(!controller.is_playing());
        assert_eq!(controller.scheduler().pending_count(), 0);
    }

    #[test]
    fn test_ended_position_stays_at_duration_until_final_frame() {
        let backend = FakeBackend { duration: Some(Duration::from_secs(2)), ..Default::default() };
        let mut controller = controller(backend.clone());
        controller.load_source(&PathBuf::from("clip.wav"));
        controller.pump(Duration::ZERO);

        let state = Rc::clone(&backend.opened.borrow()[0]);
        {
            let mut state = state.borrow_mut();
            state.position = Duration::from_millis(1950);
            state.ended = true;
        }
        controller.pump(Duration::from_millis(10));
        controller.pump(Duration::from_millis(20));
        assert_eq!(controller.state().position, Duration::from_secs(2));

        assert_eq!(controller.on_redraw(), Some(TickOutcome::Drawn));
        let surfaces = controller.surfaces_mut();
        let width = surfaces.main.width();
        assert_eq!(surfaces.main.pixel(width - 1, 116), Rgba::rgb(230, 230, 230));
        assert!(!controller.is_playing());
    }

    #[test]
    fn test_play_after_end_restarts_from_the_beginning() {
        let backend = FakeBackend { duration: Some(Duration::from_secs(2)), ..Default::default() };
        let mut controller = controller(backend.clone());
        controller.load_source(&PathBuf::from("clip.wav"));
        controller.pump(Duration::ZERO);

        let first = Rc::clone(&backend.opened.borrow()[0]);
        {
            let mut first = first.borrow_mut();
            first.position = Duration::from_secs(2);
            first.ended = true;
        }
        controller.pump(Duration::from_millis(10));
        controller.on_redraw();
        assert!(!controller.is_playing());

        controller.toggle();
        assert_eq!(backend.opened.borrow().len(), 2);
        assert!(first.borrow().disconnected);
        assert!(controller.is_playing());
        assert_eq!(controller.state().position, Duration::ZERO);
        assert_eq!(controller.generation(), 2);

        controller.pump(Duration::from_millis(30));
        assert_eq!(controller.on_redraw(), Some(TickOutcome::Drawn));
        assert!(controller.is_playing());
        assert!(backend.opened.borrow()[1].borrow().playing);
        assert_eq!(controller.scheduler().pending_count(), 1);
    }

    #[test]
    fn test_frame_pending_only_while_playing() {
        let mut controller = controller(FakeBackend::default());
        assert!(!controller.frame_pending());
        controller.load_source(&PathBuf::from("song.wav"));
        assert!(!controller.frame_pending());

        controller.pump(Duration::ZERO);
        assert!(controller.frame_pending());
        controller.on_redraw();
        assert!(controller.frame_pending());

        controller.toggle();
        assert!(!controller.frame_pending());
    }

    #[test]
    fn test_history_fills_at_one_entry_per_second() {
        let backend = FakeBackend::default();
        let mut controller = controller(backend.clone());
        controller.load_source(&PathBuf::from("song.wav"));
        controller.pump(Duration::ZERO);

        let state = Rc::clone(&backend.opened.borrow()[0]);
        for step in 0..300u64 {
            state.borrow_mut().queue.extend(tone(512));
            controller.pump(Duration::from_millis(step * 12));
        }
        // 0 .. 3.588 s of session time
        assert_eq!(controller.history().borrow().len(), 4);
    }

    #[test]
    fn test_teardown_disconnects_source() {
        let backend = FakeBackend::default();
        let mut controller = controller(backend.clone());
        controller.load_source(&PathBuf::from("song.wav"));
        controller.pump(Duration::ZERO);
        drop(controller);

        let state = backend.opened.borrow()[0].clone();
        assert!(state.borrow().disconnected);
    }
}
