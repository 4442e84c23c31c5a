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
use std::{collections::BTreeMap, error::Error, sync::Arc};

use crossbeam_channel::{unbounded, Receiver};
use tracing::{debug, info, span, warn, Level};

use super::context::{Cue, EngineContext, TransportState};
use super::table::SampleTable;
use crate::config::{
    EngineConfig, LoopId, LoopSettings, SampleSettings, SessionState, Timing,
};
use crate::error::EngineError;
use crate::events::{EventStore, SampleEvent, SampleId};
use crate::midi::{self, normalizer::transpose_offset, NoteAction, Normalizer};
use crate::note::Note;
use crate::recorder::{Committed, Control, InputId, Recorder};
use crate::router::{self, Route};
use crate::scheduler::{PlaybackState, Scheduler};
use crate::timebase::{self, Ticks};
use crate::transport::Transport;
use crate::voice;

/// A looper session: four loops, a set of samples and their recorded events, wired to a
/// transport and a voice device.
///
/// Transport callbacks never touch the session. They post cues, which [`Session::pump`] applies
/// on the thread that owns the session.
pub struct Session {
    ctx: EngineContext,
    recorder: Recorder,
    scheduler: Scheduler,
    normalizer: Normalizer,
    cue_receiver: Receiver<Cue>,
}

impl Session {
    /// Creates a stopped session with every loop set to `default_loop` and no samples.
    pub fn new(
        transport: Arc<dyn Transport>,
        voices: Arc<dyn voice::Device>,
        default_loop: LoopSettings,
        reference: Note,
        timing: Timing,
    ) -> Result<Session, EngineError> {
        default_loop
            .validate()
            .map_err(|e| EngineError::InvalidLoopSettings(LoopId::A, e))?;

        let (cues, cue_receiver) = unbounded();
        let loops = LoopId::ALL
            .iter()
            .map(|loop_id| (*loop_id, default_loop))
            .collect();

        let mut session = Session {
            ctx: EngineContext {
                transport_state: TransportState::default(),
                transport_changes: 0,
                loops,
                samples: SampleTable::new(),
                store: EventStore::new(),
                selected_sample: None,
                reference,
                timing,
                transport,
                voices,
                cues,
            },
            recorder: Recorder::new(),
            scheduler: Scheduler::new(),
            normalizer: Normalizer::new(timing.midi_dedup_window, None),
            cue_receiver,
        };
        session.sync_transport()?;
        Ok(session)
    }

    /// Creates a session from the engine configuration.
    pub fn from_config(
        config: &EngineConfig,
        transport: Arc<dyn Transport>,
        voices: Arc<dyn voice::Device>,
    ) -> Result<Session, Box<dyn Error>> {
        let timing = config.timing()?;
        let mut session = Session::new(
            transport,
            voices,
            config.default_loop(),
            config.reference_note(),
            timing,
        )?;

        if let Some(midi) = config.midi() {
            session.normalizer = Normalizer::new(timing.midi_dedup_window, midi.channel()?);
        }
        Ok(session)
    }

    /// The engine state, for inspection.
    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn transport_state(&self) -> TransportState {
        self.ctx.transport_state
    }

    pub fn loop_settings(&self, loop_id: LoopId) -> Result<LoopSettings, EngineError> {
        self.ctx.loop_settings(loop_id).copied()
    }

    /// Replaces the settings of a loop. Invalid settings are rejected and the old ones kept.
    /// Events past the end of a shortened loop are kept but don't play.
    pub fn set_loop_settings(
        &mut self,
        loop_id: LoopId,
        settings: LoopSettings,
    ) -> Result<(), EngineError> {
        settings
            .validate()
            .map_err(|e| EngineError::InvalidLoopSettings(loop_id, e))?;
        self.ctx.loop_settings(loop_id)?;
        self.ctx.loops.insert(loop_id, settings);

        info!(
            loop_id = %loop_id,
            bpm = settings.bpm(),
            beats_per_bar = settings.beats_per_bar(),
            bars = settings.bars(),
            swing = settings.swing(),
            "Loop settings changed."
        );

        if self.ctx.transport_state.current_loop == loop_id {
            self.sync_transport()?;
            self.scheduler.schedule_loop(&self.ctx, loop_id);
        }
        Ok(())
    }

    /// Switches the active loop. Held notes keep recording into the loop they started in.
    pub fn select_loop(&mut self, loop_id: LoopId) -> Result<(), EngineError> {
        self.ctx.loop_settings(loop_id)?;
        let previous = self.ctx.transport_state.current_loop;
        if previous == loop_id {
            return Ok(());
        }

        self.scheduler.cancel_loop(previous);
        self.ctx.transport_state.current_loop = loop_id;
        self.sync_transport()?;
        self.scheduler.schedule_loop(&self.ctx, loop_id);
        info!(from = %previous, to = %loop_id, "Selected loop.");
        Ok(())
    }

    /// Adds a sample, or replaces the settings of an existing one. The first sample added
    /// becomes the selected sample.
    pub fn add_sample(
        &mut self,
        sample: SampleId,
        settings: SampleSettings,
    ) -> Result<(), EngineError> {
        settings
            .validate()
            .map_err(|e| EngineError::InvalidSampleSettings(sample.clone(), e))?;

        if self.ctx.samples.contains(&sample) {
            self.scheduler.cancel_sample(&sample);
        }
        let generation = self.ctx.samples.insert(sample.clone(), settings);
        info!(sample = sample.as_str(), generation, "Added sample.");

        if self.ctx.selected_sample.is_none() {
            self.ctx.selected_sample = Some(sample.clone());
        }

        self.reroute();
        let current = self.ctx.transport_state.current_loop;
        self.scheduler.schedule(&self.ctx, &sample, current);
        Ok(())
    }

    /// Removes a sample along with its recorded events.
    pub fn remove_sample(&mut self, sample: &SampleId) -> Result<SampleSettings, EngineError> {
        let settings = self
            .ctx
            .samples
            .remove(sample)
            .ok_or_else(|| EngineError::UnknownSample(sample.clone()))?;

        self.scheduler.cancel_sample(sample);
        self.ctx.store.remove_sample(sample);
        if self.ctx.selected_sample.as_ref() == Some(sample) {
            self.select_sample(None)?;
        }

        info!(sample = sample.as_str(), "Removed sample.");
        self.reroute();
        Ok(settings)
    }

    /// Changes the settings of a sample. The change is validated before it's applied, and
    /// every route is pushed again since a solo affects every sample.
    pub fn update_sample<F>(&mut self, sample: &SampleId, update: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut SampleSettings),
    {
        let mut settings = self.ctx.sample_settings(sample)?.clone();
        update(&mut settings);
        settings
            .validate()
            .map_err(|e| EngineError::InvalidSampleSettings(sample.clone(), e))?;

        if let Some(current) = self.ctx.samples.get_mut(sample) {
            *current = settings;
        }
        debug!(sample = sample.as_str(), "Updated sample.");

        self.reroute();
        let current = self.ctx.transport_state.current_loop;
        self.scheduler.schedule(&self.ctx, sample, current);
        Ok(())
    }

    pub fn sample_settings(&self, sample: &SampleId) -> Result<&SampleSettings, EngineError> {
        self.ctx.sample_settings(sample)
    }

    /// Selects the sample the pitch grid and MIDI input play. Notes held on those inputs are
    /// dropped without recording.
    pub fn select_sample(&mut self, sample: Option<SampleId>) -> Result<(), EngineError> {
        if let Some(sample) = &sample {
            self.ctx.sample_settings(sample)?;
        }
        if self.ctx.selected_sample == sample {
            return Ok(());
        }

        self.recorder.invalidate(&self.ctx, Control::PitchGrid);
        self.recorder.invalidate(&self.ctx, Control::Midi);
        debug!(sample = ?sample, "Selected sample.");
        self.ctx.selected_sample = sample;
        Ok(())
    }

    pub fn selected_sample(&self) -> Option<&SampleId> {
        self.ctx.selected_sample.as_ref()
    }

    /// The resolved route of every sample.
    pub fn routes(&self) -> BTreeMap<SampleId, Route> {
        router::resolve_all(self.ctx.samples.iter())
    }

    /// Starts the transport at the top of the current loop.
    pub fn start(&mut self) -> Result<(), EngineError> {
        if self.ctx.transport_state.playing {
            return Ok(());
        }

        let span = span!(Level::INFO, "start");
        let _enter = span.enter();

        self.sync_transport()?;
        self.ctx.transport_state.playing = true;
        let current = self.ctx.transport_state.current_loop;
        // Lanes go in first, the transport fires whatever sits at the top of the loop as soon
        // as it starts.
        self.scheduler.schedule_loop(&self.ctx, current);
        self.ctx.transport.start();
        info!(loop_id = %current, transport = %self.ctx.transport, "Started.");
        Ok(())
    }

    /// Stops the transport, silencing scheduled voices and dropping held notes.
    pub fn stop(&mut self) {
        if !self.ctx.transport_state.playing {
            return;
        }

        let span = span!(Level::INFO, "stop");
        let _enter = span.enter();

        let now = self.ctx.transport.now();
        self.ctx.transport_state.playing = false;
        self.scheduler.stop(&self.ctx, now);
        self.recorder.clear(&self.ctx);
        self.ctx.transport.stop();

        let dropped = self.cue_receiver.try_iter().count();
        info!(dropped, "Stopped.");
    }

    /// Arms or disarms recording. Gestures already held keep their recording state.
    pub fn set_recording(&mut self, recording: bool) {
        self.ctx.transport_state.recording = recording;
        info!(recording, "Recording changed.");
    }

    /// Stops and returns the transport state to its defaults. Samples and events are kept.
    pub fn reset(&mut self) -> Result<(), EngineError> {
        self.stop();
        self.ctx.transport_state = TransportState::default();
        self.normalizer.reset();
        self.sync_transport()
    }

    /// Presses an input. Pads play the sample they belong to, everything else plays the
    /// selected sample.
    pub fn press(&mut self, input: InputId, note: Note, velocity: f32) {
        let sample = match &input {
            InputId::Pad(sample) => Some(sample.clone()),
            _ => self.ctx.selected_sample.clone(),
        };
        let Some(sample) = sample else {
            debug!(input = ?input, "No sample selected, ignoring press.");
            return;
        };

        self.recorder
            .on_press(&self.ctx, input, &sample, note, velocity);
    }

    /// Releases an input, recording the gesture if it was recording.
    pub fn release(&mut self, input: &InputId) {
        if let Some(committed) = self.recorder.on_release(&self.ctx, input) {
            self.commit(committed);
        }
    }

    /// Presses the pad of a sample. Pads play the reference note.
    pub fn pad_down(&mut self, sample: &SampleId, velocity: f32) {
        let note = self.ctx.reference;
        self.press(InputId::Pad(sample.clone()), note, velocity);
    }

    pub fn pad_up(&mut self, sample: &SampleId) {
        self.release(&InputId::Pad(sample.clone()));
    }

    /// Presses a cell of the pitch grid. The cell's note is transposed so that the selected
    /// sample's base note plays at the natural rate.
    pub fn cell_down(&mut self, cell: Note, velocity: f32) {
        let note = cell.transpose(self.selected_offset());
        self.press(InputId::PitchCell(cell), note, velocity);
    }

    pub fn cell_up(&mut self, cell: Note) {
        self.release(&InputId::PitchCell(cell));
    }

    /// Handles a raw message from the MIDI input.
    pub fn handle_midi(&mut self, message: &midi::RawMessage) {
        let offset = self.selected_offset();
        match self.normalizer.normalize(message, offset) {
            Some(NoteAction::On {
                key,
                note,
                velocity,
            }) => self.press(InputId::Midi(key), note, velocity),
            Some(NoteAction::Off { key }) => self.release(&InputId::Midi(key)),
            None => {}
        }
    }

    /// The recorded events of a sample in a loop.
    pub fn events(&self, sample: &SampleId, loop_id: LoopId) -> &[SampleEvent] {
        self.ctx.store.events(sample, loop_id)
    }

    /// Moves and resizes one recorded event.
    pub fn edit_event(
        &mut self,
        sample: &SampleId,
        loop_id: LoopId,
        index: usize,
        start_time: Ticks,
        duration: f64,
    ) -> Result<(), EngineError> {
        let loop_ticks = timebase::loop_ticks(self.ctx.loop_settings(loop_id)?);
        if start_time >= loop_ticks {
            return Err(EngineError::InvalidEvent(format!(
                "start time {} is past the loop end ({} ticks)",
                start_time, loop_ticks
            )));
        }
        if !duration.is_finite() || duration <= 0.0 {
            return Err(EngineError::InvalidEvent(format!(
                "duration {} must be positive",
                duration
            )));
        }

        if !self
            .ctx
            .store
            .edit(sample, loop_id, index, start_time, duration)
        {
            return Err(EngineError::EventOutOfRange {
                sample: sample.clone(),
                loop_id,
                index,
            });
        }
        self.scheduler.schedule(&self.ctx, sample, loop_id);
        Ok(())
    }

    /// Deletes one recorded event, returning it.
    pub fn delete_event(
        &mut self,
        sample: &SampleId,
        loop_id: LoopId,
        index: usize,
    ) -> Result<SampleEvent, EngineError> {
        let event = self
            .ctx
            .store
            .remove(sample, loop_id, index)
            .ok_or_else(|| EngineError::EventOutOfRange {
                sample: sample.clone(),
                loop_id,
                index,
            })?;
        self.scheduler.schedule(&self.ctx, sample, loop_id);
        Ok(event)
    }

    /// Deletes every event recorded in the loop.
    pub fn clear_loop(&mut self, loop_id: LoopId) {
        self.ctx.store.clear_loop(loop_id);
        self.scheduler.cancel_loop(loop_id);
        info!(loop_id = %loop_id, "Cleared loop.");
    }

    /// Applies every cue posted by the transport since the last pump. Returns the number of
    /// cues handled.
    pub fn pump(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(cue) = self.cue_receiver.try_recv() {
            handled += 1;
            match &cue {
                Cue::Play { .. } => self.scheduler.on_cue(&self.ctx, &cue),
                Cue::AutoRelease {
                    input,
                    serial,
                    time,
                } => {
                    if let Some(committed) =
                        self.recorder
                            .on_auto_release(&self.ctx, input, *serial, *time)
                    {
                        self.commit(committed);
                    }
                }
            }
        }
        handled
    }

    /// The playback state of a sample's lane in a loop.
    pub fn playback_state(&self, sample: &SampleId, loop_id: LoopId) -> PlaybackState {
        self.scheduler.state(sample, loop_id)
    }

    /// The number of callbacks registered for a sample's lane in a loop.
    pub fn pending_cues(&self, sample: &SampleId, loop_id: LoopId) -> usize {
        self.scheduler.pending(sample, loop_id)
    }

    /// Whether the input currently holds a note.
    pub fn is_held(&self, input: &InputId) -> bool {
        self.recorder.is_held(input)
    }

    /// Whether the input holds a note that will be recorded on release.
    pub fn is_recording(&self, input: &InputId) -> bool {
        self.recorder.is_recording(input)
    }

    /// Captures the loops, samples and events of the session.
    pub fn snapshot(&self) -> SessionState {
        SessionState {
            loops: self.ctx.loops.clone(),
            samples: self
                .ctx
                .samples
                .iter()
                .map(|(id, settings)| (id.clone(), settings.clone()))
                .collect(),
            events: self.ctx.store.to_map(),
        }
    }

    /// Replaces the session's loops, samples and events. The session is stopped first. Loops
    /// missing from the state keep their settings. Nothing is changed if the state is invalid.
    pub fn restore(&mut self, state: SessionState) -> Result<(), EngineError> {
        for (loop_id, settings) in &state.loops {
            settings
                .validate()
                .map_err(|e| EngineError::InvalidLoopSettings(*loop_id, e))?;
        }
        for (sample, settings) in &state.samples {
            settings
                .validate()
                .map_err(|e| EngineError::InvalidSampleSettings(sample.clone(), e))?;
        }

        self.stop();
        self.recorder.clear(&self.ctx);

        let mut events = state.events;
        events.retain(|sample, _| {
            let known = state.samples.contains_key(sample);
            if !known {
                warn!(sample = sample.as_str(), "Dropping events of unknown sample.");
            }
            known
        });

        for removed in self.ctx.samples.ids() {
            self.scheduler.cancel_sample(&removed);
        }
        self.ctx.loops.extend(state.loops);
        self.ctx.samples = SampleTable::new();
        for (sample, settings) in state.samples {
            self.ctx.samples.insert(sample, settings);
        }
        self.ctx.store = EventStore::from_map(events);

        let selected = self
            .ctx
            .selected_sample
            .take()
            .filter(|sample| self.ctx.samples.contains(sample))
            .or_else(|| self.ctx.samples.ids().into_iter().next());
        self.ctx.selected_sample = selected;

        info!(
            samples = self.ctx.samples.len(),
            events = self.ctx.store.len(),
            "Restored session."
        );
        self.reroute();
        self.sync_transport()
    }

    fn commit(&mut self, committed: Committed) {
        let Committed {
            sample,
            loop_id,
            event,
        } = committed;
        self.ctx.store.append(&sample, loop_id, event);
        if self.ctx.is_playing(loop_id) {
            self.scheduler.schedule(&self.ctx, &sample, loop_id);
        }
    }

    /// The transposition that makes the selected sample's base note play at the natural rate.
    fn selected_offset(&self) -> i32 {
        self.ctx
            .selected_sample
            .as_ref()
            .and_then(|sample| self.ctx.samples.get(sample))
            .map(|settings| transpose_offset(self.ctx.reference, settings.base_note))
            .unwrap_or(0)
    }

    fn reroute(&self) {
        for (sample, route) in self.routes() {
            self.ctx.voices.route(&sample, &route);
        }
    }

    fn sync_transport(&mut self) -> Result<(), EngineError> {
        let settings = self
            .ctx
            .loop_settings(self.ctx.transport_state.current_loop)?;
        self.ctx
            .transport
            .configure(settings.bpm(), timebase::loop_end_seconds(settings));
        self.ctx.transport_changes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use std::time::Duration;

    use super::*;
    use crate::timebase::Subdivision;
    use crate::transport::mock;
    use crate::voice::mock::Device;

    struct Fixture {
        transport: Arc<mock::Transport>,
        voices: Arc<Device>,
        session: Session,
    }

    impl Fixture {
        fn new(loop_settings: LoopSettings) -> Fixture {
            Fixture::with_transport(mock::Transport::new("mock"), loop_settings)
        }

        fn with_transport(transport: mock::Transport, loop_settings: LoopSettings) -> Fixture {
            let transport = Arc::new(transport);
            let voices = Arc::new(Device::get("mock"));
            let session = Session::new(
                transport.clone(),
                voices.clone(),
                loop_settings,
                Note::C4,
                Timing::default(),
            )
            .expect("valid session");
            Fixture {
                transport,
                voices,
                session,
            }
        }

        fn advance(&mut self, seconds: f64) {
            self.transport.advance(seconds);
            self.session.pump();
        }
    }

    fn kick() -> SampleId {
        SampleId::from("kick")
    }

    fn snare() -> SampleId {
        SampleId::from("snare")
    }

    fn recording_fixture(loop_settings: LoopSettings) -> Fixture {
        let mut fixture = Fixture::new(loop_settings);
        fixture
            .session
            .add_sample(kick(), SampleSettings::default())
            .expect("valid sample");
        fixture.session.set_recording(true);
        fixture.session.start().expect("started");
        fixture
    }

    #[test]
    fn records_a_pad_press() {
        let mut fixture = recording_fixture(LoopSettings::new(4, 2, 120.0, 0.0));

        fixture.session.pad_down(&kick(), 1.0);
        assert!(fixture.session.is_recording(&InputId::Pad(kick())));
        fixture.advance(0.4);
        fixture.session.pad_up(&kick());

        let events = fixture.session.events(&kick(), LoopId::A);
        assert_eq!(events, &[SampleEvent::new(0, 0.4, Note::C4, 1.0)]);
        assert_eq!(fixture.voices.attacks(), vec![(kick(), Note::C4, 0.0)]);
        assert_eq!(fixture.voices.releases(), vec![(kick(), Note::C4, 0.4)]);

        // The recorded event plays on the next pass.
        fixture.advance(4.0);
        assert_eq!(
            fixture.voices.attacks(),
            vec![(kick(), Note::C4, 0.0), (kick(), Note::C4, 4.0)]
        );
        assert_eq!(
            fixture.session.playback_state(&kick(), LoopId::A),
            PlaybackState::Playing
        );
    }

    #[test]
    fn records_across_the_loop_end() {
        let mut fixture = recording_fixture(LoopSettings::new(4, 4, 120.0, 0.0));

        fixture.advance(3.5);
        fixture.session.pad_down(&kick(), 0.8);
        fixture.advance(5.5);
        fixture.session.pad_up(&kick());

        let events = fixture.session.events(&kick(), LoopId::A);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start_time, 1344);
        assert!((events[0].duration - 5.5).abs() < 1e-9);
    }

    #[test]
    fn retrigger_discards_the_first_gesture() {
        let mut fixture = recording_fixture(LoopSettings::new(4, 2, 120.0, 0.0));

        fixture.session.pad_down(&kick(), 1.0);
        fixture.advance(0.2);
        fixture.session.pad_down(&kick(), 1.0);
        fixture.advance(0.2);
        fixture.session.pad_up(&kick());

        let events = fixture.session.events(&kick(), LoopId::A);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].start_time, 77);
        assert!((events[0].duration - (0.4 - 77.0 / 192.0 * 0.5)).abs() < 1e-9);
        assert_eq!(fixture.voices.attacks().len(), 2);
        assert!(fixture
            .voices
            .releases()
            .iter()
            .any(|(_, _, time)| (*time - 0.2).abs() < 1e-9));
    }

    #[test]
    fn presses_without_recording_only_sound() {
        let mut fixture = Fixture::new(LoopSettings::default());
        fixture
            .session
            .add_sample(kick(), SampleSettings::default())
            .expect("valid sample");

        fixture.session.pad_down(&kick(), 1.0);
        assert!(fixture.session.is_held(&InputId::Pad(kick())));
        assert!(!fixture.session.is_recording(&InputId::Pad(kick())));
        fixture.advance(0.3);
        fixture.session.pad_up(&kick());

        assert!(fixture.session.events(&kick(), LoopId::A).is_empty());
        assert_eq!(fixture.voices.attacks().len(), 1);
        assert_eq!(fixture.voices.releases().len(), 1);
    }

    #[test]
    fn auto_release_at_the_trim_end() {
        let mut fixture = Fixture::new(LoopSettings::new(4, 2, 120.0, 0.0));
        fixture
            .session
            .add_sample(
                kick(),
                SampleSettings {
                    trim_end: Some(0.5),
                    ..Default::default()
                },
            )
            .expect("valid sample");
        fixture.session.set_recording(true);
        fixture.session.start().expect("started");

        fixture.session.pad_down(&kick(), 1.0);
        fixture.advance(1.0);
        assert!(!fixture.session.is_held(&InputId::Pad(kick())));
        fixture.session.pad_up(&kick());

        let events = fixture.session.events(&kick(), LoopId::A);
        assert_eq!(events.len(), 1);
        assert!((events[0].duration - 0.5).abs() < 1e-9);
        assert_eq!(fixture.voices.releases(), vec![(kick(), Note::C4, 0.5)]);
    }

    #[test]
    fn playback_is_capped_at_the_trim_end() {
        let mut fixture = Fixture::new(LoopSettings::new(4, 2, 120.0, 0.0));
        let state = SessionState {
            samples: BTreeMap::from([(
                kick(),
                SampleSettings {
                    trim_end: Some(0.5),
                    ..Default::default()
                },
            )]),
            events: BTreeMap::from([(
                kick(),
                BTreeMap::from([(LoopId::A, vec![SampleEvent::new(0, 2.0, Note::C4, 1.0)])]),
            )]),
            ..Default::default()
        };
        fixture.session.restore(state).expect("valid state");
        fixture.session.start().expect("started");
        fixture.session.pump();

        assert_eq!(fixture.voices.attacks(), vec![(kick(), Note::C4, 0.0)]);
        assert_eq!(fixture.voices.releases(), vec![(kick(), Note::C4, 0.5)]);
    }

    #[test]
    fn simultaneous_events_play_once() {
        let mut fixture = Fixture::new(LoopSettings::new(4, 2, 120.0, 0.0));
        let state = SessionState {
            samples: BTreeMap::from([(
                kick(),
                SampleSettings {
                    quantize: true,
                    quantize_unit: "8n".parse().expect("valid subdivision"),
                    ..Default::default()
                },
            )]),
            events: BTreeMap::from([(
                kick(),
                BTreeMap::from([(
                    LoopId::A,
                    vec![
                        SampleEvent::new(100, 0.1, Note::C4, 1.0),
                        SampleEvent::new(90, 0.3, Note::C4, 1.0),
                    ],
                )]),
            )]),
            ..Default::default()
        };
        fixture.session.restore(state).expect("valid state");
        fixture.session.start().expect("started");
        assert_eq!(fixture.session.pending_cues(&kick(), LoopId::A), 1);

        fixture.advance(1.0);
        assert_eq!(fixture.voices.attacks(), vec![(kick(), Note::C4, 0.25)]);
    }

    #[test]
    fn stop_silences_and_cancels() {
        let mut fixture = Fixture::new(LoopSettings::new(4, 2, 120.0, 0.0));
        fixture
            .session
            .add_sample(kick(), SampleSettings::default())
            .expect("valid sample");
        fixture.session.ctx.store.append(
            &kick(),
            LoopId::A,
            SampleEvent::new(0, 1.0, Note::C4, 1.0),
        );
        fixture.session.start().expect("started");
        fixture.session.pump();
        assert_eq!(fixture.voices.attacks(), vec![(kick(), Note::C4, 0.0)]);

        fixture.advance(0.2);
        fixture.session.stop();
        assert!(!fixture.session.transport_state().playing);
        assert!(fixture
            .voices
            .releases()
            .contains(&(kick(), Note::C4, 0.2)));
        assert_eq!(fixture.transport.pending(), 0);
        assert_eq!(
            fixture.session.playback_state(&kick(), LoopId::A),
            PlaybackState::Idle
        );

        fixture.advance(8.0);
        assert_eq!(fixture.voices.attacks().len(), 1);
    }

    #[test]
    fn stale_cues_are_dropped() {
        let mut fixture = Fixture::new(LoopSettings::new(4, 2, 120.0, 0.0));
        fixture
            .session
            .add_sample(kick(), SampleSettings::default())
            .expect("valid sample");
        fixture.session.ctx.store.append(
            &kick(),
            LoopId::A,
            SampleEvent::new(0, 0.1, Note::C4, 1.0),
        );
        fixture.session.start().expect("started");

        // The cue for the top of the loop is queued, then the sample is replaced.
        fixture
            .session
            .add_sample(kick(), SampleSettings::default())
            .expect("valid sample");
        fixture.session.pump();
        assert!(fixture.voices.attacks().is_empty());

        fixture.advance(4.0);
        assert_eq!(fixture.voices.attacks(), vec![(kick(), Note::C4, 4.0)]);

        // Removing the sample drops the queued cue and its events.
        fixture.transport.advance(4.0);
        fixture.session.remove_sample(&kick()).expect("known sample");
        fixture.session.pump();
        assert_eq!(fixture.voices.attacks().len(), 1);
        assert!(fixture.session.events(&kick(), LoopId::A).is_empty());
    }

    #[test]
    fn selecting_a_sample_drops_grid_gestures() {
        let mut fixture = recording_fixture(LoopSettings::new(4, 2, 120.0, 0.0));
        fixture
            .session
            .add_sample(snare(), SampleSettings::default())
            .expect("valid sample");
        assert_eq!(fixture.session.selected_sample(), Some(&kick()));

        fixture.session.cell_down(Note::C4, 1.0);
        fixture.session.pad_down(&snare(), 1.0);
        fixture.advance(0.2);
        fixture
            .session
            .select_sample(Some(snare()))
            .expect("known sample");
        assert!(!fixture.session.is_held(&InputId::PitchCell(Note::C4)));

        fixture.advance(0.2);
        fixture.session.cell_up(Note::C4);
        fixture.session.pad_up(&snare());

        assert!(fixture.session.events(&kick(), LoopId::A).is_empty());
        assert_eq!(fixture.session.events(&snare(), LoopId::A).len(), 1);
    }

    #[test]
    fn pitch_grid_transposes_from_the_base_note() {
        let mut fixture = Fixture::new(LoopSettings::default());
        fixture
            .session
            .add_sample(
                kick(),
                SampleSettings {
                    base_note: "A3".parse().expect("valid note"),
                    ..Default::default()
                },
            )
            .expect("valid sample");

        fixture.session.cell_down("A3".parse().expect("valid note"), 1.0);
        assert_eq!(fixture.voices.attacks(), vec![(kick(), Note::C4, 0.0)]);
    }

    #[test]
    fn duplicate_midi_note_ons_are_dropped() {
        let mut fixture = Fixture::new(LoopSettings::default());
        fixture
            .session
            .add_sample(kick(), SampleSettings::default())
            .expect("valid sample");

        let message = |millis: u64, bytes: &[u8]| midi::RawMessage {
            at: Duration::from_millis(millis),
            bytes: bytes.to_vec(),
        };
        fixture.session.handle_midi(&message(0, &[0x90, 60, 100]));
        fixture.session.handle_midi(&message(5, &[0x91, 60, 100]));
        assert_eq!(fixture.voices.attacks().len(), 1);
        assert!(fixture.session.is_held(&InputId::Midi(Note::C4)));

        fixture.session.handle_midi(&message(30, &[0x90, 60, 100]));
        assert_eq!(fixture.voices.attacks().len(), 2);

        fixture.session.handle_midi(&message(40, &[0x80, 60, 0]));
        assert!(!fixture.session.is_held(&InputId::Midi(Note::C4)));
    }

    #[test]
    fn solo_is_pushed_to_every_route() {
        let mut fixture = Fixture::new(LoopSettings::default());
        fixture
            .session
            .add_sample(kick(), SampleSettings::default())
            .expect("valid sample");
        fixture
            .session
            .add_sample(snare(), SampleSettings::default())
            .expect("valid sample");

        fixture
            .session
            .update_sample(&kick(), |settings| {
                settings.solo = true;
                settings.mute = true;
            })
            .expect("valid update");
        assert_eq!(fixture.voices.route_for(&kick()).map(|r| r.gain), Some(1.0));
        assert_eq!(fixture.voices.route_for(&snare()).map(|r| r.gain), Some(0.0));

        fixture
            .session
            .update_sample(&kick(), |settings| settings.solo = false)
            .expect("valid update");
        assert_eq!(fixture.voices.route_for(&kick()).map(|r| r.gain), Some(0.0));
        assert_eq!(fixture.voices.route_for(&snare()).map(|r| r.gain), Some(1.0));

        // Invalid updates change nothing.
        assert!(fixture
            .session
            .update_sample(&kick(), |settings| settings.trim_start = -1.0)
            .is_err());
        assert_eq!(
            fixture.session.sample_settings(&kick()).map(|s| s.trim_start),
            Ok(0.0)
        );
    }

    #[test]
    fn loop_settings_are_validated() {
        let mut fixture = Fixture::new(LoopSettings::default());
        let before = fixture.session.loop_settings(LoopId::B).expect("loop B");

        assert!(matches!(
            fixture
                .session
                .set_loop_settings(LoopId::B, LoopSettings::new(0, 2, 120.0, 0.0)),
            Err(EngineError::InvalidLoopSettings(LoopId::B, _))
        ));
        assert_eq!(fixture.session.loop_settings(LoopId::B), Ok(before));

        fixture
            .session
            .set_loop_settings(LoopId::A, before.with_bpm(60.0))
            .expect("valid settings");
        assert_eq!(fixture.transport.bpm(), 60.0);
        assert_eq!(fixture.transport.loop_end_seconds(), 8.0);

        fixture.session.ctx.loops.remove(&LoopId::C);
        assert_eq!(
            fixture.session.loop_settings(LoopId::C),
            Err(EngineError::LoopNotInitialized(LoopId::C))
        );
        assert!(fixture.session.select_loop(LoopId::C).is_err());
    }

    #[test]
    fn switching_loops_moves_the_lanes() {
        let mut fixture = Fixture::new(LoopSettings::new(4, 2, 120.0, 0.0));
        fixture
            .session
            .add_sample(kick(), SampleSettings::default())
            .expect("valid sample");
        for loop_id in [LoopId::A, LoopId::B] {
            fixture.session.ctx.store.append(
                &kick(),
                loop_id,
                SampleEvent::new(192, 0.1, Note::C4, 1.0),
            );
        }
        fixture.session.start().expect("started");
        assert_eq!(fixture.session.pending_cues(&kick(), LoopId::A), 1);

        fixture.session.select_loop(LoopId::B).expect("loop B");
        assert_eq!(fixture.session.pending_cues(&kick(), LoopId::A), 0);
        assert_eq!(fixture.session.pending_cues(&kick(), LoopId::B), 1);
        assert_eq!(fixture.session.transport_state().current_loop, LoopId::B);
    }

    #[test]
    fn editing_events() {
        let mut fixture = Fixture::new(LoopSettings::new(4, 2, 120.0, 0.0));
        fixture
            .session
            .add_sample(kick(), SampleSettings::default())
            .expect("valid sample");
        fixture.session.ctx.store.append(
            &kick(),
            LoopId::A,
            SampleEvent::new(0, 0.1, Note::C4, 1.0),
        );

        fixture
            .session
            .edit_event(&kick(), LoopId::A, 0, 384, 0.5)
            .expect("valid edit");
        assert_eq!(
            fixture.session.events(&kick(), LoopId::A),
            &[SampleEvent::new(384, 0.5, Note::C4, 1.0)]
        );

        assert!(matches!(
            fixture.session.edit_event(&kick(), LoopId::A, 0, 1536, 0.5),
            Err(EngineError::InvalidEvent(_))
        ));
        assert!(matches!(
            fixture.session.edit_event(&kick(), LoopId::A, 0, 0, 0.0),
            Err(EngineError::InvalidEvent(_))
        ));
        assert!(matches!(
            fixture.session.delete_event(&kick(), LoopId::A, 3),
            Err(EngineError::EventOutOfRange { index: 3, .. })
        ));

        fixture
            .session
            .delete_event(&kick(), LoopId::A, 0)
            .expect("event exists");
        assert!(fixture.session.events(&kick(), LoopId::A).is_empty());
    }

    #[test]
    fn stop_releases_voices_that_have_not_started() {
        let mut fixture = Fixture::with_transport(
            mock::Transport::with_lookahead("mock", 0.3),
            LoopSettings::new(4, 2, 120.0, 0.0),
        );
        fixture
            .session
            .add_sample(kick(), SampleSettings::default())
            .expect("valid sample");
        fixture.session.ctx.store.append(
            &kick(),
            LoopId::A,
            SampleEvent::new(48, 1.0, Note::C4, 1.0),
        );
        fixture.session.start().expect("started");
        fixture.advance(0.03);
        assert_eq!(fixture.voices.attacks(), vec![(kick(), Note::C4, 0.125)]);

        fixture.session.stop();
        let releases = fixture.voices.releases();
        assert!(releases.contains(&(kick(), Note::C4, 0.125)));
        assert!(releases.iter().all(|(_, _, time)| *time >= 0.125));
    }

    #[test]
    fn switching_loops_mid_gesture_keeps_the_held_time() {
        let mut fixture = recording_fixture(LoopSettings::new(4, 4, 120.0, 0.0));
        fixture
            .session
            .set_loop_settings(LoopId::B, LoopSettings::new(4, 1, 120.0, 0.0))
            .expect("valid settings");

        fixture.advance(3.5);
        fixture.session.pad_down(&kick(), 1.0);
        fixture.advance(0.5);
        fixture.session.select_loop(LoopId::B).expect("loop B");
        fixture.advance(0.5);
        fixture.session.pad_up(&kick());

        assert!(fixture.session.events(&kick(), LoopId::B).is_empty());
        assert_eq!(
            fixture.session.events(&kick(), LoopId::A),
            &[SampleEvent::new(1344, 1.0, Note::C4, 1.0)]
        );
    }

    #[test]
    fn tempo_and_length_change_while_playing() {
        let mut fixture = Fixture::new(LoopSettings::new(4, 2, 120.0, 0.0));
        fixture
            .session
            .add_sample(kick(), SampleSettings::default())
            .expect("valid sample");
        // Beat 2: one second in at 120 bpm.
        fixture.session.ctx.store.append(
            &kick(),
            LoopId::A,
            SampleEvent::new(384, 0.1, Note::C4, 1.0),
        );
        fixture.session.start().expect("started");
        fixture.advance(0.5);
        assert!(fixture.voices.attacks().is_empty());

        // Half a second in is beat 1. At 60 bpm that's one second into a four second loop,
        // so beat 2 comes one second later.
        fixture
            .session
            .set_loop_settings(LoopId::A, LoopSettings::new(4, 1, 60.0, 0.0))
            .expect("valid settings");
        assert_eq!(fixture.transport.loop_end_seconds(), 4.0);
        assert_eq!(fixture.session.pending_cues(&kick(), LoopId::A), 1);

        fixture.advance(1.5);
        assert_eq!(fixture.voices.attacks(), vec![(kick(), Note::C4, 1.5)]);
        fixture.advance(4.0);
        assert_eq!(
            fixture.voices.attacks(),
            vec![(kick(), Note::C4, 1.5), (kick(), Note::C4, 5.5)]
        );
    }

    #[test]
    fn quantize_change_while_playing() {
        let mut fixture = Fixture::new(LoopSettings::new(4, 2, 120.0, 0.0));
        fixture
            .session
            .add_sample(kick(), SampleSettings::default())
            .expect("valid sample");
        fixture.session.ctx.store.append(
            &kick(),
            LoopId::A,
            SampleEvent::new(100, 0.1, Note::C4, 1.0),
        );
        fixture.session.start().expect("started");
        fixture.advance(1.0);
        let attacks = fixture.voices.attacks();
        assert_eq!(attacks.len(), 1);
        assert!((attacks[0].2 - 100.0 / 192.0 * 0.5).abs() < 1e-9);

        fixture
            .session
            .update_sample(&kick(), |settings| {
                settings.quantize = true;
                settings.quantize_unit = Subdivision::QUARTER;
            })
            .expect("valid update");
        assert_eq!(fixture.session.pending_cues(&kick(), LoopId::A), 1);
        fixture.advance(4.0);
        let attacks = fixture.voices.attacks();
        assert_eq!(attacks.len(), 2);
        assert_eq!(attacks[1].2, 4.5);

        fixture
            .session
            .update_sample(&kick(), |settings| {
                settings.quantize_unit = Subdivision::EIGHTH;
            })
            .expect("valid update");
        fixture.advance(4.0);
        let attacks = fixture.voices.attacks();
        assert_eq!(attacks.len(), 3);
        assert_eq!(attacks[2].2, 8.25);
    }

    #[test]
    fn velocity_is_clamped() {
        let mut fixture = recording_fixture(LoopSettings::new(4, 2, 120.0, 0.0));
        fixture
            .session
            .add_sample(snare(), SampleSettings::default())
            .expect("valid sample");

        fixture.session.pad_down(&kick(), 2.0);
        fixture.session.pad_down(&snare(), f32::NAN);
        fixture.advance(0.2);
        fixture.session.pad_up(&kick());
        fixture.session.pad_up(&snare());

        assert_eq!(fixture.session.events(&kick(), LoopId::A)[0].velocity, 1.0);
        assert_eq!(fixture.session.events(&snare(), LoopId::A)[0].velocity, 0.0);
    }

    #[test]
    fn pads_play_the_reference_note() {
        let mut fixture = Fixture::new(LoopSettings::new(4, 2, 120.0, 0.0));
        fixture
            .session
            .add_sample(
                kick(),
                SampleSettings {
                    base_note: "A3".parse().expect("valid note"),
                    ..Default::default()
                },
            )
            .expect("valid sample");
        fixture.session.set_recording(true);
        fixture.session.start().expect("started");

        fixture.session.pad_down(&kick(), 1.0);
        fixture.advance(0.2);
        fixture.session.pad_up(&kick());

        // The reference note plays the sample at its natural rate, whatever its base note.
        assert_eq!(fixture.voices.attacks(), vec![(kick(), Note::C4, 0.0)]);
        assert_eq!(fixture.session.events(&kick(), LoopId::A)[0].note, Note::C4);
        let settings = fixture.session.sample_settings(&kick()).expect("known sample");
        assert_eq!(router::playback_rate(settings, Note::C4, Note::C4), 1.0);
    }

    #[test]
    fn snapshot_and_restore() {
        let mut fixture = recording_fixture(LoopSettings::new(3, 2, 90.0, 0.2));
        fixture.session.pad_down(&kick(), 0.5);
        fixture.advance(0.25);
        fixture.session.pad_up(&kick());
        let state = fixture.session.snapshot();
        assert_eq!(state.event_count(), 1);
        assert_eq!(state.loops.len(), 4);

        let yaml = state.to_yaml().expect("serializes");
        let mut other = Fixture::new(LoopSettings::default());
        other
            .session
            .restore(SessionState::from_yaml(&yaml).expect("parses"))
            .expect("valid state");
        assert_eq!(other.session.snapshot(), state);
        assert_eq!(other.session.selected_sample(), Some(&kick()));
    }
}
