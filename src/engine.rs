//! Real-time pitch shift engine: parameter churn handling, stretcher lifecycle and the
//! block processing pipeline.

mod lifecycle;
mod scratch;

use std::sync::{Mutex, MutexGuard};

use strum::IntoEnumIterator;

use crate::{
    parameter::{FloatParameter, ParameterId, ParameterStore},
    stretcher::{SignalsmithStretcherFactory, StretcherFactory},
    Error,
};

use lifecycle::StretcherLifecycle;
use scratch::ScratchBuffers;

// -------------------------------------------------------------------------------------------------

/// Mix levels at or below this wet amount are indistinguishable from dry, so such blocks
/// bypass the stretcher entirely.
const BYPASS_WET_THRESHOLD: f32 = 0.01;

/// Informational tail time reported to hosts.
const TAIL_TIME_SECONDS: f64 = 0.5;

/// Number of channels the stretched path processes. Further channels pass through dry.
const MAX_PROCESSED_CHANNELS: usize = 2;

// -------------------------------------------------------------------------------------------------

/// Engine lifecycle states. `Processing` is transient within a single
/// [`PitchShiftEngine::process_block`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Uninitialized,
    Ready,
    Processing,
}

// -------------------------------------------------------------------------------------------------

struct EngineInner {
    state: EngineState,
    sample_rate: u32,
    channel_count: usize,
    params: ParameterStore,
    lifecycle: StretcherLifecycle,
    scratch: ScratchBuffers,
}

// -------------------------------------------------------------------------------------------------

/// Real-time polyphonic pitch shifting engine.
///
/// The engine mediates control-rate parameter changes against audio-rate block
/// processing: parameter setters may be called at any time from a control context while
/// [`PitchShiftEngine::process_block`] runs in the real-time render context. Both sides
/// serialize through one internal lock with short critical sections; setters only clamp,
/// store and flag, and pending structural changes (pitch, formant mode, quality mode) are
/// applied at the start of the next processed block. Mix changes apply at the next
/// block's mixing step without touching the stretcher.
///
/// A structural write is guaranteed visible to the next `process_block` call that starts
/// after the write returned. Changes never apply mid-block, and the mix is block
/// granular - there is no per-sample ramping of the wet/dry coefficient.
pub struct PitchShiftEngine {
    inner: Mutex<EngineInner>,
}

impl PitchShiftEngine {
    /// Create a new engine using the Signalsmith Stretch backend.
    pub fn new() -> Self {
        Self::with_factory(Box::new(SignalsmithStretcherFactory))
    }

    /// Create a new engine with a custom stretcher backend.
    pub fn with_factory(factory: Box<dyn StretcherFactory>) -> Self {
        Self {
            inner: Mutex::new(EngineInner {
                state: EngineState::Uninitialized,
                sample_rate: 0,
                channel_count: 0,
                params: ParameterStore::new(),
                lifecycle: StretcherLifecycle::new(factory),
                scratch: ScratchBuffers::default(),
            }),
        }
    }

    /// Prepare the engine for the given stream format. Constructs the stretcher and the
    /// scratch buffers, applying all current parameter values.
    ///
    /// Calling this on an already initialized engine tears the previous instance down
    /// first, as hosts do on stream format changes. A stereo pair at most is stretched;
    /// further channels pass through unprocessed.
    pub fn initialize(
        &self,
        sample_rate: u32,
        channel_count: usize,
        max_block_size: usize,
    ) -> Result<(), Error> {
        if sample_rate == 0 || channel_count == 0 || max_block_size == 0 {
            return Err(Error::InvalidConfiguration(format!(
                "invalid stream properties: {sample_rate} Hz, \
                 {channel_count} channel(s), {max_block_size} max frames"
            )));
        }
        let mut inner = self.lock();
        let inner = &mut *inner;
        inner.state = EngineState::Uninitialized;

        let stretch_channels = channel_count.min(MAX_PROCESSED_CHANNELS);
        inner
            .lifecycle
            .initialize(sample_rate, stretch_channels, max_block_size, &inner.params)?;
        inner.params.clear_dirty();
        inner.scratch = ScratchBuffers::new(stretch_channels, max_block_size);
        inner.sample_rate = sample_rate;
        inner.channel_count = channel_count;
        inner.state = EngineState::Ready;

        log::info!(
            "Initialized pitch shift engine: {} Hz, {} channel(s), {} max frames, {} frames latency",
            sample_rate,
            channel_count,
            max_block_size,
            inner.lifecycle.latency()
        );
        Ok(())
    }

    /// Tear down the stretcher and all buffers.
    pub fn cleanup(&self) {
        let mut inner = self.lock();
        inner.lifecycle.cleanup();
        inner.scratch = ScratchBuffers::default();
        inner.sample_rate = 0;
        inner.channel_count = 0;
        inner.state = EngineState::Uninitialized;
    }

    /// Clear the stretcher's internal buffering state, e.g. on a host transport
    /// discontinuity. Does nothing on an uninitialized engine.
    pub fn reset(&self) {
        self.lock().lifecycle.reset();
    }

    /// True when the engine got successfully initialized.
    pub fn is_initialized(&self) -> bool {
        self.lock().state != EngineState::Uninitialized
    }

    /// Clamp and store a new parameter value.
    ///
    /// Never blocks on stretcher work: structural changes only flag the pending
    /// reconfiguration, which is then serviced at the start of the next processed block.
    pub fn set_parameter(&self, id: ParameterId, value: f32) {
        self.lock().params.set(id, value);
    }

    /// The current, clamped value of the given parameter.
    pub fn get_parameter(&self, id: ParameterId) -> f32 {
        self.lock().params.get(id)
    }

    /// Set a parameter via its raw host-facing index.
    pub fn set_parameter_indexed(&self, id: u32, value: f32) -> Result<(), Error> {
        match ParameterId::from_repr(id) {
            Some(id) => {
                self.set_parameter(id, value);
                Ok(())
            }
            None => Err(Error::InvalidParameter(format!("unknown parameter id {id}"))),
        }
    }

    /// Get a parameter value via its raw host-facing index.
    pub fn get_parameter_indexed(&self, id: u32) -> Result<f32, Error> {
        match ParameterId::from_repr(id) {
            Some(id) => Ok(self.get_parameter(id)),
            None => Err(Error::InvalidParameter(format!("unknown parameter id {id}"))),
        }
    }

    /// Descriptors of all parameters, for host registration and UIs.
    pub fn parameters(&self) -> Vec<FloatParameter> {
        ParameterId::iter().map(|id| id.descriptor()).collect()
    }

    /// True while a structural parameter change is waiting to be applied by the next
    /// processed block.
    pub fn needs_reconfigure(&self) -> bool {
        self.lock().params.needs_reconfigure()
    }

    /// The engine's current processing latency, derived from the stretcher's latency
    /// frame count. 0.0 when uninitialized.
    pub fn reported_latency_seconds(&self) -> f64 {
        let inner = self.lock();
        if inner.sample_rate == 0 {
            return 0.0;
        }
        inner.lifecycle.latency() as f64 / inner.sample_rate as f64
    }

    /// Informational tail time for hosts.
    pub fn tail_time_seconds(&self) -> f64 {
        TAIL_TIME_SECONDS
    }

    /// Process one block of planar audio from `input` into `output`.
    ///
    /// Up to a stereo pair gets pitch processed and mixed with the dry signal; further
    /// output channels receive the corresponding input channel verbatim, or silence when
    /// no such input exists. While the stretcher hasn't produced a full block yet (during
    /// its latency fill, or right after a reset), the missing frames pass through dry
    /// instead of going silent.
    ///
    /// Fails with [`Error::EngineUninitialized`] before a successful
    /// [`PitchShiftEngine::initialize`], leaving all output buffers untouched.
    pub fn process_block(
        &self,
        input: &[&[f32]],
        output: &mut [&mut [f32]],
        frame_count: usize,
    ) -> Result<(), Error> {
        let mut inner = self.lock();
        if inner.state != EngineState::Ready {
            return Err(Error::EngineUninitialized);
        }
        inner.state = EngineState::Processing;
        let result = inner.process_block(input, output, frame_count);
        inner.state = EngineState::Ready;
        result
    }

    fn lock(&self) -> MutexGuard<'_, EngineInner> {
        // a panicking control thread must never wedge the audio callback
        self.inner.lock().unwrap_or_else(|err| err.into_inner())
    }
}

impl Default for PitchShiftEngine {
    fn default() -> Self {
        Self::new()
    }
}

// -------------------------------------------------------------------------------------------------

impl EngineInner {
    fn process_block(
        &mut self,
        input: &[&[f32]],
        output: &mut [&mut [f32]],
        frame_count: usize,
    ) -> Result<(), Error> {
        if frame_count == 0 {
            return Ok(());
        }
        if input.iter().any(|channel| channel.len() < frame_count)
            || output.iter().any(|channel| channel.len() < frame_count)
        {
            return Err(Error::InvalidConfiguration(format!(
                "host buffers are shorter than the requested {frame_count} frames"
            )));
        }

        // pending structural changes apply at block boundaries only, at most once per block
        if self.params.needs_reconfigure() {
            self.lifecycle.reconfigure(&mut self.params)?;
        }

        let wet = self.params.wet_mix();
        if wet <= BYPASS_WET_THRESHOLD {
            // indistinguishable from dry at this mix level: skip the stretcher entirely
            assert_no_alloc(|| copy_dry(input, output, frame_count));
            return Ok(());
        }

        // grow scratch before any sample of this block gets copied
        if frame_count > self.scratch.capacity() {
            self.scratch.ensure_capacity(frame_count);
            self.lifecycle.grow_block_size(frame_count);
        }

        let EngineInner {
            lifecycle, scratch, ..
        } = self;
        let Some(stretcher) = lifecycle.stretcher_mut() else {
            return Err(Error::EngineUninitialized);
        };

        let dry = 1.0 - wet;
        let channels_to_process = input
            .len()
            .min(output.len())
            .min(scratch.channel_count());

        assert_no_alloc(|| {
            // copy host input into scratch, silencing stretcher channels the host
            // doesn't provide
            for (channel, scratch_input) in scratch.input_mut().iter_mut().enumerate() {
                if let Some(host_input) = input.get(channel) {
                    scratch_input[..frame_count].copy_from_slice(&host_input[..frame_count]);
                } else {
                    scratch_input[..frame_count].fill(0.0);
                }
            }

            stretcher.process(scratch.input(), frame_count, false);

            let available = stretcher.available();
            let retrieved = if available > 0 {
                stretcher.retrieve(scratch.output_mut(), frame_count.min(available))
            } else {
                // still filling its latency buffers: the whole block passes through dry
                0
            };

            for (channel, host_output) in output.iter_mut().enumerate() {
                let host_output = &mut host_output[..frame_count];
                if channel < channels_to_process {
                    let host_input = &input[channel][..frame_count];
                    let processed = &scratch.output()[channel];
                    for frame in 0..retrieved {
                        host_output[frame] =
                            wet * processed[frame] + dry * host_input[frame];
                    }
                    // dry passthrough for whatever the stretcher couldn't deliver yet
                    host_output[retrieved..].copy_from_slice(&host_input[retrieved..]);
                } else if let Some(host_input) = input.get(channel) {
                    host_output.copy_from_slice(&host_input[..frame_count]);
                } else {
                    host_output.fill(0.0);
                }
            }
        });

        Ok(())
    }
}

// -------------------------------------------------------------------------------------------------

/// Copy input to output verbatim on every channel, zero-filling output channels which
/// have no corresponding input.
fn copy_dry(input: &[&[f32]], output: &mut [&mut [f32]], frame_count: usize) {
    for (channel, host_output) in output.iter_mut().enumerate() {
        let host_output = &mut host_output[..frame_count];
        if let Some(host_input) = input.get(channel) {
            host_output.copy_from_slice(&host_input[..frame_count]);
        } else {
            host_output.fill(0.0);
        }
    }
}

fn assert_no_alloc<T, F: FnOnce() -> T>(func: F) -> T {
    #[cfg(feature = "assert-allocs")]
    return ::assert_no_alloc::assert_no_alloc::<T, F>(func);

    #[cfg(not(feature = "assert-allocs"))]
    return func();
}

// -------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        stretcher::{StretchProfile, StretcherConfig, TimeStretcher},
        utils::assert_eq_with_epsilon,
    };

    // ---------------------------------------------------------------------------------------------

    #[derive(Debug, Default)]
    struct MockState {
        created: usize,
        pitch_scales: Vec<f64>,
        formant_toggles: Vec<bool>,
        profile_changes: usize,
        process_calls: usize,
        max_block_sizes: Vec<usize>,
        resets: usize,
    }

    type SharedMockState = Arc<Mutex<MockState>>;

    /// Deterministic stretcher stand-in: forwards its input scaled by `gain`, withholding
    /// the first `latency` frames the way a real latent stretcher does.
    struct MockStretcher {
        state: SharedMockState,
        latency: usize,
        gain: f32,
        can_toggle_formant: bool,
        can_set_profile: bool,
        pending_skip: usize,
        fifo: Vec<Vec<f32>>,
    }

    impl TimeStretcher for MockStretcher {
        fn set_pitch_scale(&mut self, pitch_scale: f64) {
            self.state.lock().unwrap().pitch_scales.push(pitch_scale);
        }

        fn set_formant_preserved(&mut self, preserved: bool) -> bool {
            self.state.lock().unwrap().formant_toggles.push(preserved);
            self.can_toggle_formant
        }

        fn set_profile(&mut self, _profile: StretchProfile) -> bool {
            self.state.lock().unwrap().profile_changes += 1;
            self.can_set_profile
        }

        fn set_max_block_size(&mut self, max_block_size: usize) {
            self.state
                .lock()
                .unwrap()
                .max_block_sizes
                .push(max_block_size);
        }

        fn process(&mut self, input: &[Vec<f32>], frame_count: usize, _is_final: bool) {
            self.state.lock().unwrap().process_calls += 1;
            let skip = self.pending_skip.min(frame_count);
            self.pending_skip -= skip;
            for (channel, fifo) in self.fifo.iter_mut().enumerate() {
                fifo.extend(
                    input[channel][skip..frame_count]
                        .iter()
                        .map(|sample| sample * self.gain),
                );
            }
        }

        fn available(&self) -> usize {
            self.fifo[0].len()
        }

        fn retrieve(&mut self, output: &mut [Vec<f32>], frame_count: usize) -> usize {
            let frames = frame_count.min(self.available());
            for (channel, fifo) in self.fifo.iter_mut().enumerate() {
                output[channel][..frames].copy_from_slice(&fifo[..frames]);
                fifo.drain(..frames);
            }
            frames
        }

        fn reset(&mut self) {
            self.state.lock().unwrap().resets += 1;
            self.pending_skip = self.latency;
            for fifo in self.fifo.iter_mut() {
                fifo.clear();
            }
        }

        fn latency(&self) -> usize {
            self.latency
        }
    }

    struct MockFactory {
        state: SharedMockState,
        latency: usize,
        gain: f32,
        can_toggle_formant: bool,
        can_set_profile: bool,
    }

    impl MockFactory {
        fn new(latency: usize, gain: f32) -> Self {
            Self {
                state: SharedMockState::default(),
                latency,
                gain,
                can_toggle_formant: true,
                can_set_profile: true,
            }
        }

        fn without_live_toggles(latency: usize, gain: f32) -> Self {
            Self {
                can_toggle_formant: false,
                can_set_profile: false,
                ..Self::new(latency, gain)
            }
        }

        fn state(&self) -> SharedMockState {
            Arc::clone(&self.state)
        }
    }

    impl StretcherFactory for MockFactory {
        fn create(&self, config: &StretcherConfig) -> Result<Box<dyn TimeStretcher>, Error> {
            self.state.lock().unwrap().created += 1;
            Ok(Box::new(MockStretcher {
                state: Arc::clone(&self.state),
                latency: self.latency,
                gain: self.gain,
                can_toggle_formant: self.can_toggle_formant,
                can_set_profile: self.can_set_profile,
                pending_skip: self.latency,
                fifo: vec![Vec::new(); config.channel_count],
            }))
        }
    }

    // ---------------------------------------------------------------------------------------------

    const BLOCK_SIZE: usize = 256;

    fn mock_engine(factory: MockFactory) -> (PitchShiftEngine, SharedMockState) {
        let state = factory.state();
        let engine = PitchShiftEngine::with_factory(Box::new(factory));
        (engine, state)
    }

    fn ramp_block(frame_count: usize, channel_count: usize) -> Vec<Vec<f32>> {
        (0..channel_count)
            .map(|channel| {
                (0..frame_count)
                    .map(|frame| (channel * 1000 + frame) as f32 * 1e-3)
                    .collect()
            })
            .collect()
    }

    fn process(
        engine: &PitchShiftEngine,
        input: &[Vec<f32>],
        output: &mut [Vec<f32>],
        frame_count: usize,
    ) -> Result<(), Error> {
        let input_refs = input.iter().map(|c| c.as_slice()).collect::<Vec<_>>();
        let mut output_refs = output
            .iter_mut()
            .map(|c| c.as_mut_slice())
            .collect::<Vec<_>>();
        engine.process_block(&input_refs, &mut output_refs, frame_count)
    }

    // ---------------------------------------------------------------------------------------------

    #[test]
    fn process_before_initialize_fails_without_touching_buffers() {
        let (engine, _) = mock_engine(MockFactory::new(0, 1.0));
        let input = ramp_block(BLOCK_SIZE, 2);
        let mut output = vec![vec![9.0f32; BLOCK_SIZE]; 2];

        let result = process(&engine, &input, &mut output, BLOCK_SIZE);
        assert!(matches!(result, Err(Error::EngineUninitialized)));
        assert!(output.iter().flatten().all(|sample| *sample == 9.0));
    }

    #[test]
    fn initialize_validates_stream_properties() {
        let (engine, state) = mock_engine(MockFactory::new(0, 1.0));
        assert!(matches!(
            engine.initialize(0, 2, 512),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            engine.initialize(44100, 0, 512),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(matches!(
            engine.initialize(44100, 2, 0),
            Err(Error::InvalidConfiguration(_))
        ));
        assert!(!engine.is_initialized());
        assert_eq!(state.lock().unwrap().created, 0);

        engine.initialize(44100, 2, 512).unwrap();
        assert!(engine.is_initialized());
    }

    #[test]
    fn unknown_parameter_ids_are_rejected() {
        let (engine, _) = mock_engine(MockFactory::new(0, 1.0));
        engine.set_parameter(ParameterId::PitchShift, 3.0);

        assert!(matches!(
            engine.set_parameter_indexed(4, 1.0),
            Err(Error::InvalidParameter(_))
        ));
        assert!(matches!(
            engine.get_parameter_indexed(u32::MAX),
            Err(Error::InvalidParameter(_))
        ));

        // stored values stay unchanged after a rejected write
        assert_eq!(engine.get_parameter(ParameterId::PitchShift), 3.0);
        assert_eq!(engine.get_parameter(ParameterId::Mix), 100.0);
        assert_eq!(engine.get_parameter_indexed(0).unwrap(), 3.0);
    }

    #[test]
    fn parameter_values_are_clamped() {
        let (engine, _) = mock_engine(MockFactory::new(0, 1.0));
        engine.set_parameter(ParameterId::PitchShift, 100.0);
        assert_eq!(engine.get_parameter(ParameterId::PitchShift), 24.0);
        engine.set_parameter(ParameterId::Mix, 150.0);
        assert_eq!(engine.get_parameter(ParameterId::Mix), 100.0);
    }

    #[test]
    fn mix_zero_bypasses_the_stretcher() {
        let (engine, state) = mock_engine(MockFactory::new(0, 0.5));
        engine.initialize(44100, 2, BLOCK_SIZE).unwrap();
        engine.set_parameter(ParameterId::Mix, 0.0);

        let input = ramp_block(BLOCK_SIZE, 2);
        let mut output = vec![vec![0.0f32; BLOCK_SIZE]; 2];
        process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();

        // sample exact passthrough, and the stretcher never got fed
        assert_eq!(input, output);
        assert_eq!(state.lock().unwrap().process_calls, 0);
    }

    #[test]
    fn latency_fill_passes_through_dry() {
        // a stretcher which won't produce anything for a long while
        let (engine, state) = mock_engine(MockFactory::new(100_000, 0.5));
        engine.initialize(44100, 2, BLOCK_SIZE).unwrap();
        engine.set_parameter(ParameterId::Mix, 100.0);

        let input = ramp_block(BLOCK_SIZE, 2);
        let mut output = vec![vec![0.0f32; BLOCK_SIZE]; 2];
        process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();

        // dry passthrough, not silence, although the mix is full wet
        assert_eq!(input, output);
        assert_eq!(state.lock().unwrap().process_calls, 1);
    }

    #[test]
    fn partial_output_mixes_head_and_passes_tail_dry() {
        const LATENCY: usize = 100;
        let (engine, _) = mock_engine(MockFactory::new(LATENCY, 1.0));
        engine.initialize(44100, 1, BLOCK_SIZE).unwrap();
        engine.set_parameter(ParameterId::Mix, 50.0);

        let input = ramp_block(BLOCK_SIZE, 1);
        let mut output = vec![vec![0.0f32; BLOCK_SIZE]; 1];
        process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();

        // the mock withheld its first LATENCY frames, so BLOCK_SIZE - LATENCY processed
        // frames got mixed and the rest of the block passed through dry
        let available = BLOCK_SIZE - LATENCY;
        for frame in 0..available {
            let expected = 0.5 * input[0][LATENCY + frame] + 0.5 * input[0][frame];
            assert_eq_with_epsilon!(output[0][frame], expected, 1e-6);
        }
        for frame in available..BLOCK_SIZE {
            assert_eq!(output[0][frame], input[0][frame]);
        }
    }

    #[test]
    fn mix_law_applies_per_sample() {
        let (engine, _) = mock_engine(MockFactory::new(0, 0.5));
        engine.initialize(44100, 2, BLOCK_SIZE).unwrap();

        let input = ramp_block(BLOCK_SIZE, 2);
        let mut output = vec![vec![0.0f32; BLOCK_SIZE]; 2];

        // full wet: output is the processed signal only
        engine.set_parameter(ParameterId::Mix, 100.0);
        process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();
        for channel in 0..2 {
            for frame in 0..BLOCK_SIZE {
                assert_eq!(output[channel][frame], 0.5 * input[channel][frame]);
            }
        }

        // 25% wet
        engine.set_parameter(ParameterId::Mix, 25.0);
        process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();
        for channel in 0..2 {
            for frame in 0..BLOCK_SIZE {
                let expected =
                    0.25 * 0.5 * input[channel][frame] + 0.75 * input[channel][frame];
                assert_eq_with_epsilon!(output[channel][frame], expected, 1e-6);
            }
        }
    }

    #[test]
    fn structural_writes_stay_flagged_until_the_next_block() {
        let (engine, _) = mock_engine(MockFactory::new(0, 1.0));
        engine.initialize(44100, 2, BLOCK_SIZE).unwrap();
        assert!(!engine.needs_reconfigure());

        engine.set_parameter(ParameterId::PitchShift, 5.0);
        assert!(engine.needs_reconfigure());

        let input = ramp_block(BLOCK_SIZE, 2);
        let mut output = vec![vec![0.0f32; BLOCK_SIZE]; 2];
        process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();
        assert!(!engine.needs_reconfigure());

        // mix writes never flag a reconfiguration
        engine.set_parameter(ParameterId::Mix, 30.0);
        assert!(!engine.needs_reconfigure());
    }

    #[test]
    fn pitch_changes_apply_in_place() {
        let (engine, state) = mock_engine(MockFactory::new(0, 1.0));
        engine.initialize(44100, 2, BLOCK_SIZE).unwrap();
        engine.set_parameter(ParameterId::PitchShift, 12.0);

        let input = ramp_block(BLOCK_SIZE, 2);
        let mut output = vec![vec![0.0f32; BLOCK_SIZE]; 2];
        process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();

        let state = state.lock().unwrap();
        assert_eq!(state.created, 1, "pitch changes must not rebuild");
        let applied = *state.pitch_scales.last().unwrap();
        assert_eq_with_epsilon!(applied, 2.0, 1e-9);
    }

    #[test]
    fn formant_toggles_in_place_when_the_backend_can() {
        let (engine, state) = mock_engine(MockFactory::new(0, 1.0));
        engine.initialize(44100, 2, BLOCK_SIZE).unwrap();
        engine.set_parameter(ParameterId::Formant, 80.0);

        let input = ramp_block(BLOCK_SIZE, 2);
        let mut output = vec![vec![0.0f32; BLOCK_SIZE]; 2];
        process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();

        let state = state.lock().unwrap();
        assert_eq!(state.created, 1);
        assert_eq!(state.formant_toggles.as_slice(), &[true]);
    }

    #[test]
    fn formant_changes_rebuild_when_the_backend_cant_toggle() {
        let (engine, state) = mock_engine(MockFactory::without_live_toggles(0, 1.0));
        engine.initialize(44100, 2, BLOCK_SIZE).unwrap();
        engine.set_parameter(ParameterId::Formant, 80.0);

        let input = ramp_block(BLOCK_SIZE, 2);
        let mut output = vec![vec![0.0f32; BLOCK_SIZE]; 2];
        process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();

        assert_eq!(state.lock().unwrap().created, 2);

        // the rebuilt instance keeps processing
        process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();
        assert_eq!(state.lock().unwrap().created, 2);
    }

    #[test]
    fn quality_changes_rebuild_when_the_backend_cant_retune() {
        let (engine, state) = mock_engine(MockFactory::without_live_toggles(0, 1.0));
        engine.initialize(44100, 2, BLOCK_SIZE).unwrap();
        engine.set_parameter(ParameterId::LatencyMode, 1.0);

        let input = ramp_block(BLOCK_SIZE, 2);
        let mut output = vec![vec![0.0f32; BLOCK_SIZE]; 2];
        process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();
        assert_eq!(state.lock().unwrap().created, 2);
    }

    #[test]
    fn unchanged_quality_does_not_reconfigure_the_stretcher() {
        let (engine, state) = mock_engine(MockFactory::without_live_toggles(0, 1.0));
        engine.initialize(44100, 2, BLOCK_SIZE).unwrap();
        // a write within the same quality band is clamped-stored but changes nothing
        engine.set_parameter(ParameterId::LatencyMode, 0.3);

        let input = ramp_block(BLOCK_SIZE, 2);
        let mut output = vec![vec![0.0f32; BLOCK_SIZE]; 2];
        process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();

        let state = state.lock().unwrap();
        assert_eq!(state.created, 1);
        assert_eq!(state.profile_changes, 0);
        assert!(!engine.needs_reconfigure());
    }

    #[test]
    fn block_growth_is_lossless() {
        let (engine, state) = mock_engine(MockFactory::new(0, 1.0));
        engine.initialize(44100, 2, 128).unwrap();
        engine.set_parameter(ParameterId::Mix, 100.0);

        let small = ramp_block(128, 2);
        let mut small_out = vec![vec![0.0f32; 128]; 2];
        process(&engine, &small, &mut small_out, 128).unwrap();
        assert_eq!(small, small_out);

        // a larger block than announced at initialize time grows the buffers before any
        // sample of the triggering block gets copied
        let large = ramp_block(1024, 2);
        let mut large_out = vec![vec![0.0f32; 1024]; 2];
        process(&engine, &large, &mut large_out, 1024).unwrap();
        assert_eq!(large, large_out);
        assert_eq!(state.lock().unwrap().max_block_sizes.as_slice(), &[1024]);

        // shrinking again afterwards triggers no further capacity changes
        process(&engine, &small, &mut small_out, 128).unwrap();
        assert_eq!(state.lock().unwrap().max_block_sizes.as_slice(), &[1024]);
    }

    #[test]
    fn extra_channels_pass_through_or_get_silenced() {
        let (engine, _) = mock_engine(MockFactory::new(0, 0.5));
        engine.initialize(44100, 2, BLOCK_SIZE).unwrap();
        engine.set_parameter(ParameterId::Mix, 100.0);

        // four input channels, four output channels: only the first two get processed
        let input = ramp_block(BLOCK_SIZE, 4);
        let mut output = vec![vec![9.0f32; BLOCK_SIZE]; 4];
        process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();
        for channel in 0..2 {
            for frame in 0..BLOCK_SIZE {
                assert_eq!(output[channel][frame], 0.5 * input[channel][frame]);
            }
        }
        assert_eq!(output[2], input[2]);
        assert_eq!(output[3], input[3]);

        // mono input into stereo output: the second output channel gets silenced
        let input = ramp_block(BLOCK_SIZE, 1);
        let mut output = vec![vec![9.0f32; BLOCK_SIZE]; 2];
        process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();
        for frame in 0..BLOCK_SIZE {
            assert_eq!(output[0][frame], 0.5 * input[0][frame]);
        }
        assert!(output[1].iter().all(|sample| *sample == 0.0));
    }

    #[test]
    fn reset_clears_stretcher_buffering() {
        let (engine, state) = mock_engine(MockFactory::new(600, 1.0));

        // resetting an uninitialized engine is a no-op
        engine.reset();
        assert_eq!(state.lock().unwrap().resets, 0);

        engine.initialize(44100, 2, BLOCK_SIZE).unwrap();

        // feed past the mock's latency so processed output starts flowing
        let input = ramp_block(BLOCK_SIZE, 2);
        let mut output = vec![vec![0.0f32; BLOCK_SIZE]; 2];
        for _ in 0..3 {
            process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();
        }
        assert_ne!(input, output);

        engine.reset();
        assert_eq!(state.lock().unwrap().resets, 1);

        // the first block after a reset is a pure dry passthrough again, not silence
        process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();
        assert_eq!(input, output);
    }

    #[test]
    fn cleanup_returns_to_uninitialized() {
        let (engine, state) = mock_engine(MockFactory::new(0, 1.0));
        engine.initialize(44100, 2, BLOCK_SIZE).unwrap();

        let input = ramp_block(BLOCK_SIZE, 2);
        let mut output = vec![vec![0.0f32; BLOCK_SIZE]; 2];
        process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();

        engine.cleanup();
        assert!(!engine.is_initialized());
        assert!(matches!(
            process(&engine, &input, &mut output, BLOCK_SIZE),
            Err(Error::EngineUninitialized)
        ));
        assert_eq!(engine.reported_latency_seconds(), 0.0);

        // and a fresh initialize brings it back
        engine.initialize(48000, 2, BLOCK_SIZE).unwrap();
        process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();
        assert_eq!(state.lock().unwrap().created, 2);
    }

    #[test]
    fn latency_and_tail_reporting() {
        let (engine, _) = mock_engine(MockFactory::new(441, 1.0));
        assert_eq!(engine.reported_latency_seconds(), 0.0);

        engine.initialize(44100, 2, BLOCK_SIZE).unwrap();
        assert_eq_with_epsilon!(engine.reported_latency_seconds(), 0.01, 1e-9);
        assert_eq!(engine.tail_time_seconds(), 0.5);
    }

    #[test]
    fn control_and_render_contexts_serialize() {
        let (engine, _) = mock_engine(MockFactory::new(0, 1.0));
        engine.initialize(44100, 2, BLOCK_SIZE).unwrap();

        let engine = Arc::new(engine);
        let control_engine = Arc::clone(&engine);
        let control_thread = std::thread::spawn(move || {
            for round in 0..500 {
                control_engine.set_parameter(ParameterId::PitchShift, (round % 24) as f32);
                control_engine.set_parameter(ParameterId::Mix, (round % 100) as f32);
                control_engine.set_parameter(ParameterId::Formant, (round % 100) as f32);
            }
        });

        let input = ramp_block(BLOCK_SIZE, 2);
        let mut output = vec![vec![0.0f32; BLOCK_SIZE]; 2];
        for _ in 0..200 {
            process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();
        }
        control_thread.join().unwrap();

        // a final block still sees a consistent engine
        process(&engine, &input, &mut output, BLOCK_SIZE).unwrap();
        assert!(!engine.needs_reconfigure());
    }

    #[test]
    fn parameter_descriptors_are_listed_for_hosts() {
        let (engine, _) = mock_engine(MockFactory::new(0, 1.0));
        let descriptors = engine.parameters();
        assert_eq!(descriptors.len(), 4);
        assert_eq!(descriptors[0].name(), "Pitch Shift");
        assert_eq!(descriptors[1].name(), "Mix");
    }

    // ---------------------------------------------------------------------------------------------
    // End-to-end checks against the real Signalsmith Stretch backend.

    const E2E_SAMPLE_RATE: u32 = 44100;
    const E2E_BLOCK_SIZE: usize = 512;

    fn sine_block(block_index: usize, frequency: f32) -> Vec<Vec<f32>> {
        let omega = 2.0 * std::f32::consts::PI * frequency / E2E_SAMPLE_RATE as f32;
        (0..2)
            .map(|_| {
                (0..E2E_BLOCK_SIZE)
                    .map(|frame| {
                        let n = block_index * E2E_BLOCK_SIZE + frame;
                        (omega * n as f32).sin() * 0.5
                    })
                    .collect()
            })
            .collect()
    }

    fn rms(samples: &[f32]) -> f32 {
        (samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32).sqrt()
    }

    #[test]
    fn unshifted_full_wet_sine_keeps_its_level() {
        let engine = PitchShiftEngine::new();
        engine.initialize(E2E_SAMPLE_RATE, 2, E2E_BLOCK_SIZE).unwrap();
        engine.set_parameter(ParameterId::PitchShift, 0.0);
        engine.set_parameter(ParameterId::Mix, 100.0);

        let latency_frames =
            (engine.reported_latency_seconds() * E2E_SAMPLE_RATE as f64).round() as usize;
        assert!(latency_frames > 0);

        // feed until the latency is consumed, then measure a few settled blocks
        let latency_blocks = latency_frames.div_ceil(E2E_BLOCK_SIZE);
        let settle_blocks = 8;
        let measure_blocks = 4;
        let mut settled = Vec::new();

        let mut output = vec![vec![0.0f32; E2E_BLOCK_SIZE]; 2];
        for block_index in 0..latency_blocks + settle_blocks + measure_blocks {
            let input = sine_block(block_index, 1000.0);
            process(&engine, &input, &mut output, E2E_BLOCK_SIZE).unwrap();
            if block_index >= latency_blocks + settle_blocks {
                settled.extend_from_slice(&output[0]);
            }
        }

        let input_rms = 0.5 / 2.0f32.sqrt();
        let output_rms = rms(&settled);
        assert!(
            (output_rms - input_rms).abs() / input_rms < 0.3,
            "Output RMS {output_rms} deviates too much from input RMS {input_rms}"
        );
    }

    #[test]
    fn zero_mix_is_sample_exact_regardless_of_stretcher_state() {
        let engine = PitchShiftEngine::new();
        engine.initialize(E2E_SAMPLE_RATE, 2, E2E_BLOCK_SIZE).unwrap();
        engine.set_parameter(ParameterId::PitchShift, 7.0);
        engine.set_parameter(ParameterId::Mix, 0.0);

        let mut output = vec![vec![0.0f32; E2E_BLOCK_SIZE]; 2];
        for block_index in 0..8 {
            let input = sine_block(block_index, 440.0);
            process(&engine, &input, &mut output, E2E_BLOCK_SIZE).unwrap();
            assert_eq!(input, output);
        }
    }
}
