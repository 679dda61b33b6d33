use super::{MixMode, PlayerOption};
use crate::format::protracker::{EffectType, ProtrackerMod, NUM_CHANNELS, ROWS_PER_PATTERN};

mod channel;

use channel::{samples_per_tick, ChannelState, PendingSlide};

pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;

const DEFAULT_SPEED: u32 = 6;
const DEFAULT_TEMPO: u32 = 125;

/// Transient marker set by a jump-to-start command; the end-of-sequence
/// check resolves it before the tick returns.
const POSITION_WRAPPED: usize = usize::MAX;

pub struct ProtrackerPlayer<'a> {
    module: ProtrackerMod<'a>,
    sample_rate: u32,
    song_loop: bool,
    support_tempo: bool,
    state: PlayerState<'a>,
}

struct PlayerState<'a> {
    position: usize,
    row: usize,
    speed: u32,
    tempo: u32,
    /// Ticks left until the next row is read; counts down from `speed`.
    tick_counter: u32,
    samples_per_tick: u32,
    /// Output frames left until the next tick; counts down from
    /// `samples_per_tick`.
    sample_counter: u32,
    finished: bool,
    channels: [ChannelState<'a>; NUM_CHANNELS],
}

impl<'a> ProtrackerPlayer<'a> {
    pub fn new(module: ProtrackerMod<'a>) -> ProtrackerPlayer<'a> {
        Self::with_sample_rate(module, DEFAULT_SAMPLE_RATE)
    }

    pub fn with_sample_rate(module: ProtrackerMod<'a>, sample_rate: u32) -> ProtrackerPlayer<'a> {
        let spt = samples_per_tick(sample_rate, DEFAULT_TEMPO);
        ProtrackerPlayer {
            module,
            sample_rate,
            song_loop: true,
            support_tempo: true,
            state: PlayerState {
                position: 0,
                row: 0,
                speed: DEFAULT_SPEED,
                tempo: DEFAULT_TEMPO,
                tick_counter: 0,
                samples_per_tick: spt,
                sample_counter: spt,
                finished: false,
                channels: [ChannelState::new(); NUM_CHANNELS],
            },
        }
    }

    pub fn module(&self) -> &ProtrackerMod<'a> {
        &self.module
    }

    pub fn set_option(&mut self, option: PlayerOption, value: u32) {
        match option {
            PlayerOption::Loop => self.song_loop = value != 0,
            PlayerOption::SupportTempo => self.support_tempo = value != 0,
        }
    }

    /// Number of entries in the song sequence.
    pub fn sequence_len(&self) -> usize {
        self.module.sequence_len()
    }

    pub fn position(&self) -> usize {
        self.state.position
    }

    /// Seek to a song position. Out-of-range positions are ignored.
    pub fn set_position(&mut self, position: usize) {
        if position < self.module.sequence_len() {
            self.state.position = position;
            self.state.row = 0;
            self.state.finished = false;
        }
    }

    /// Render into `samples`, which counts individual s16 values; the
    /// stereo modes consume it in L/R pairs and expect an even length.
    /// Emitted values are stored little-endian. Returns true while the
    /// song has more to play; after the song terminates (looping off) the
    /// buffer is filled with silence and the call keeps returning false
    /// until `set_position`.
    pub fn fill_buffer(&mut self, samples: &mut [i16], mix: MixMode) -> bool {
        match mix {
            MixMode::Mono => self.fill_mono(samples),
            MixMode::StereoHard => self.fill_stereo(samples, mix_stereo_hard),
            MixMode::StereoSoft => self.fill_stereo(samples, mix_stereo_soft),
        }
    }

    fn fill_mono(&mut self, samples: &mut [i16]) -> bool {
        if self.state.finished {
            samples.fill(0);
            return false;
        }

        let mut done = false;
        for slot in samples.iter_mut() {
            let csamp = self.render_channels();
            *slot = mix_mono(csamp).to_le();
            done |= self.clock_frame();
        }

        self.state.finished = done;
        !done
    }

    fn fill_stereo(&mut self, samples: &mut [i16], mix: fn([i16; NUM_CHANNELS]) -> (i16, i16)) -> bool {
        if self.state.finished {
            samples.fill(0);
            return false;
        }

        let mut done = false;
        let mut frames = samples.chunks_exact_mut(2);
        for frame in frames.by_ref() {
            let (l, r) = mix(self.render_channels());
            frame[0] = l.to_le();
            frame[1] = r.to_le();
            done |= self.clock_frame();
        }
        // An odd trailing slot cannot hold a frame.
        frames.into_remainder().fill(0);

        self.state.finished = done;
        !done
    }

    fn render_channels(&mut self) -> [i16; NUM_CHANNELS] {
        let mut csamp = [0i16; NUM_CHANNELS];
        for (ch, out) in self.state.channels.iter_mut().zip(csamp.iter_mut()) {
            *out = ch.render();
        }
        csamp
    }

    /// Advance the tick clock by one output frame.
    fn clock_frame(&mut self) -> bool {
        self.state.sample_counter -= 1;
        if self.state.sample_counter == 0 {
            self.state.sample_counter = self.state.samples_per_tick;
            self.tick()
        } else {
            false
        }
    }

    /// One tick: either apply inter-row slides, or read the next row.
    /// Returns true when the song has ended and looping is off.
    fn tick(&mut self) -> bool {
        if self.state.tick_counter > 1 {
            for ch in self.state.channels.iter_mut() {
                ch.slide_tick(self.sample_rate);
            }
            self.state.tick_counter -= 1;
            return false;
        }

        self.state.tick_counter = self.state.speed;

        let pattern = usize::from(self.module.pattern_at(self.state.position));
        let row = self.state.row;
        log::trace!("pos {:02}({:02}) row {:02}", self.state.position, pattern, row);

        // Commands below may override the advanced row (break, jump).
        self.state.row += 1;

        for chan in 0..NUM_CHANNELS {
            let note = self.module.note(pattern, row, chan);

            self.state.channels[chan].slide = PendingSlide::None;

            // A period starts a note; instrument 0 keeps the channel's
            // current instrument and volume.
            if note.period != 0 && usize::from(note.instrument) <= self.module.num_instruments() {
                let inst_index = if note.instrument != 0 {
                    usize::from(note.instrument) - 1
                } else {
                    self.state.channels[chan].inst
                };
                let inst = *self.module.instrument(inst_index);

                let ch = &mut self.state.channels[chan];
                ch.on = true;
                if note.instrument != 0 {
                    ch.inst = inst_index;
                    ch.vol = inst.default_volume;
                }
                ch.start(&inst, note.period, self.sample_rate);
            }

            self.apply_effect(chan, note.effect, note.param);
        }

        if self.state.row >= ROWS_PER_PATTERN {
            self.state.position = self.state.position.wrapping_add(1);
            self.state.row = 0;
        }

        // Covers normal advance past the last position, out-of-range jump
        // targets, and the jump-to-start sentinel.
        if self.state.position >= self.module.sequence_len() {
            self.state.position = 0;
            if !self.song_loop {
                return true;
            }
        }

        false
    }

    fn apply_effect(&mut self, chan: usize, effect: EffectType, param: u8) {
        match effect {
            EffectType::Arpeggio => {
                if param != 0 {
                    log::debug!("unsupported effect: arpeggio {:02x}", param);
                }
            }

            EffectType::PortamentoUp => {
                self.state.channels[chan].slide = PendingSlide::PortaUp(param);
            }
            EffectType::PortamentoDown => {
                self.state.channels[chan].slide = PendingSlide::PortaDown(param);
            }

            EffectType::VolumeSlide => {
                let vol = i32::from(self.state.channels[chan].vol) + i32::from(param as i8);
                self.state.channels[chan].vol = vol.clamp(0, 64) as u8;
            }

            EffectType::PositionJump => {
                self.state.row = 0;
                // A jump to 0 is the usual "loop the song" idiom; route it
                // through the terminal check so non-looping playback stops.
                self.state.position = if param == 0 {
                    POSITION_WRAPPED
                } else {
                    usize::from(param)
                };
            }

            EffectType::SetVolume => {
                self.state.channels[chan].vol = param.min(64);
            }

            EffectType::PatternBreak => {
                // Decimal nibbles.
                let target = usize::from(param >> 4) * 10 + usize::from(param & 0x0f);
                if target >= ROWS_PER_PATTERN {
                    log::debug!("pattern break to out-of-range row {:02x}", param);
                } else {
                    self.state.row = target;
                    self.state.position = self.state.position.wrapping_add(1);
                }
            }

            EffectType::SetSpeed => {
                if param > 0 && param < 0x1f {
                    self.state.speed = u32::from(param);
                    self.state.tick_counter = self.state.speed;
                } else if param >= 0x20 {
                    if self.support_tempo {
                        self.state.tempo = u32::from(param);
                        self.state.samples_per_tick =
                            samples_per_tick(self.sample_rate, self.state.tempo);
                    } else {
                        log::debug!("ignoring tempo change {:02x}", param);
                    }
                }
            }

            EffectType::Extended => {
                log::debug!("unsupported extended effect {:02x}", param);
            }

            other => {
                log::debug!("unsupported effect {:?} {:02x}", other, param);
            }
        }
    }
}

fn mix_mono(csamp: [i16; NUM_CHANNELS]) -> i16 {
    let sum: i32 = csamp.iter().map(|&c| i32::from(c)).sum();
    (sum / 4) as i16
}

/// Classic Amiga LRRL panning.
fn mix_stereo_hard(csamp: [i16; NUM_CHANNELS]) -> (i16, i16) {
    let l = (i32::from(csamp[0]) + i32::from(csamp[3])) / 2;
    let r = (i32::from(csamp[1]) + i32::from(csamp[2])) / 2;
    (l as i16, r as i16)
}

/// 3:1 blend between the channel pairs instead of full separation.
fn mix_stereo_soft(csamp: [i16; NUM_CHANNELS]) -> (i16, i16) {
    let lp = i32::from(csamp[0]) + i32::from(csamp[3]);
    let rp = i32::from(csamp[1]) + i32::from(csamp[2]);
    (((lp * 3 + rp) / 8) as i16, ((rp * 3 + lp) / 8) as i16)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Offsets of the 31-instrument layout, as written to disk.
    const LENGTH_AT: usize = 0x3b6;
    const SEQUENCE_AT: usize = 0x3b8;
    const MAGIC_AT: usize = 0x438;
    const PATTERNS_AT: usize = 0x43c;
    const PATTERN_BYTES: usize = 1024;

    struct ModImage {
        data: Vec<u8>,
    }

    impl ModImage {
        fn new(num_patterns: usize, sequence: &[u8]) -> ModImage {
            let mut data = vec![0u8; PATTERNS_AT + num_patterns * PATTERN_BYTES];
            data[MAGIC_AT..MAGIC_AT + 4].copy_from_slice(b"M.K.");
            data[LENGTH_AT] = sequence.len() as u8;
            data[SEQUENCE_AT..SEQUENCE_AT + sequence.len()].copy_from_slice(sequence);
            ModImage { data }
        }

        // Instruments must be added in ascending order: sample data is
        // appended to the image as it comes.
        fn instrument(&mut self, num: usize, sample: &[u8], volume: u8, rlen_hw: u16) {
            let rec = 0x14 + (num - 1) * 30;
            let len_hw = (sample.len() / 2) as u16;
            self.data[rec + 22..rec + 24].copy_from_slice(&len_hw.to_be_bytes());
            self.data[rec + 25] = volume;
            self.data[rec + 28..rec + 30].copy_from_slice(&rlen_hw.to_be_bytes());
            self.data.extend_from_slice(sample);
        }

        fn note(&mut self, pattern: usize, row: usize, chan: usize, period: u16, inst: u8, cmd: u8, param: u8) {
            let at = PATTERNS_AT + pattern * PATTERN_BYTES + (row * 4 + chan) * 4;
            self.data[at] = (inst & 0xf0) | ((period >> 8) as u8 & 0x0f);
            self.data[at + 1] = period as u8;
            self.data[at + 2] = ((inst & 0x0f) << 4) | (cmd & 0x0f);
            self.data[at + 3] = param;
        }
    }

    fn player(image: &ModImage) -> ProtrackerPlayer<'_> {
        let module = ProtrackerMod::parse(&image.data).unwrap();
        ProtrackerPlayer::new(module)
    }

    // One fill of `samples_per_tick` mono samples fires exactly one tick,
    // at the last frame of the buffer.
    fn run_ticks(p: &mut ProtrackerPlayer, n: usize) -> bool {
        let mut more = true;
        for _ in 0..n {
            let mut buf = vec![0i16; p.state.samples_per_tick as usize];
            more = p.fill_buffer(&mut buf, MixMode::Mono);
        }
        more
    }

    #[test]
    fn defaults_after_init() {
        let image = ModImage::new(1, &[0]);
        let p = player(&image);
        assert_eq!(p.state.speed, 6);
        assert_eq!(p.state.tempo, 125);
        assert_eq!(p.state.samples_per_tick, 882);
        assert_eq!(p.state.sample_counter, 882);
        assert_eq!(p.sequence_len(), 1);
        for ch in &p.state.channels {
            assert!(!ch.on);
            assert_eq!(ch.vol, 64);
        }
    }

    #[test]
    fn set_speed_and_tempo_commands() {
        let mut image = ModImage::new(1, &[0]);
        image.note(0, 0, 0, 0, 0, 0xf, 0x06);
        image.note(0, 1, 0, 0, 0, 0xf, 0x7d);
        let mut p = player(&image);

        run_ticks(&mut p, 1);
        assert_eq!(p.state.speed, 6);
        assert_eq!(p.state.tick_counter, 6);

        run_ticks(&mut p, 6);
        assert_eq!(p.state.tempo, 125);
        assert_eq!(p.state.samples_per_tick, 882);
    }

    #[test]
    fn speed_boundary_values_ignored() {
        let mut image = ModImage::new(1, &[0]);
        image.note(0, 0, 0, 0, 0, 0xf, 0x00);
        image.note(0, 1, 0, 0, 0, 0xf, 0x1f);
        let mut p = player(&image);
        run_ticks(&mut p, 7);
        // F00 and F1F fall in neither the speed nor the tempo range.
        assert_eq!(p.state.speed, 6);
        assert_eq!(p.state.tempo, 125);
    }

    #[test]
    fn tempo_command_respects_option() {
        let mut image = ModImage::new(1, &[0]);
        image.note(0, 0, 0, 0, 0, 0xf, 0x40);
        let mut p = player(&image);
        p.set_option(PlayerOption::SupportTempo, 0);
        run_ticks(&mut p, 1);
        assert_eq!(p.state.tempo, 125);
        assert_eq!(p.state.samples_per_tick, 882);
    }

    #[test]
    fn tempo_change_recomputes_samples_per_tick() {
        let mut image = ModImage::new(1, &[0]);
        image.note(0, 0, 0, 0, 0, 0xf, 0xfa); // tempo 250
        let mut p = player(&image);
        run_ticks(&mut p, 1);
        assert_eq!(p.state.tempo, 250);
        assert_eq!(p.state.samples_per_tick, 441);
    }

    #[test]
    fn pattern_break_presets_row_and_advances_position() {
        let mut image = ModImage::new(2, &[0, 1]);
        image.note(0, 10, 0, 0, 0, 0xd, 0x20);
        let mut p = player(&image);

        // Row 10 is read on tick 6 * 10 + 1.
        run_ticks(&mut p, 61);
        assert_eq!(p.position(), 1);
        assert_eq!(p.state.row, 20);
    }

    #[test]
    fn pattern_break_to_invalid_row_ignored() {
        let mut image = ModImage::new(2, &[0, 1]);
        image.note(0, 0, 0, 0, 0, 0xd, 0x64); // decimal 64, out of range
        let mut p = player(&image);
        run_ticks(&mut p, 1);
        assert_eq!(p.position(), 0);
        assert_eq!(p.state.row, 1);
    }

    #[test]
    fn position_jump_to_start_loops_when_enabled() {
        let mut image = ModImage::new(1, &[0]);
        image.note(0, 0, 0, 0, 0, 0xb, 0x00);
        let mut p = player(&image);
        let more = run_ticks(&mut p, 1);
        assert!(more);
        assert_eq!(p.position(), 0);
        assert_eq!(p.state.row, 0);
    }

    #[test]
    fn position_jump_targets_sequence_entry() {
        let mut image = ModImage::new(1, &[0, 0, 0]);
        image.note(0, 0, 0, 0, 0, 0xb, 0x02);
        let mut p = player(&image);
        run_ticks(&mut p, 1);
        assert_eq!(p.position(), 2);
        assert_eq!(p.state.row, 0);
    }

    #[test]
    fn portamento_down_accumulates_on_inter_ticks() {
        let mut image = ModImage::new(1, &[0]);
        image.instrument(1, &[1, 2, 3, 4, 5, 6, 7, 8], 0x40, 1);
        image.note(0, 0, 0, 300, 1, 0x2, 0x10);
        let mut p = player(&image);

        run_ticks(&mut p, 1);
        assert_eq!(p.state.channels[0].pitch, 300);

        // The remaining 5 ticks of the row each add 0x10.
        run_ticks(&mut p, 5);
        assert_eq!(p.state.channels[0].pitch, 300 + 5 * 0x10);
    }

    #[test]
    fn portamento_clamps_at_max_period() {
        let mut image = ModImage::new(1, &[0]);
        image.instrument(1, &[1, 2, 3, 4, 5, 6, 7, 8], 0x40, 1);
        image.note(0, 0, 0, 300, 1, 0x2, 0xff);
        for row in 1..8 {
            image.note(0, row, 0, 0, 0, 0x2, 0xff);
        }
        let mut p = player(&image);
        run_ticks(&mut p, 8 * 6);
        assert_eq!(p.state.channels[0].pitch, 856);
    }

    #[test]
    fn volume_commands_clamp() {
        let mut image = ModImage::new(1, &[0]);
        image.note(0, 0, 0, 0, 0, 0xc, 0x80); // set volume, past max
        image.note(0, 1, 0, 0, 0, 0xa, 0x7f); // slide up, clamps at 64
        image.note(0, 2, 0, 0, 0, 0xa, 0x80); // slide down by -128
        let mut p = player(&image);

        run_ticks(&mut p, 1);
        assert_eq!(p.state.channels[0].vol, 64);
        run_ticks(&mut p, 6);
        assert_eq!(p.state.channels[0].vol, 64);
        run_ticks(&mut p, 6);
        assert_eq!(p.state.channels[0].vol, 0);
    }

    #[test]
    fn instrument_zero_keeps_current_volume() {
        let mut image = ModImage::new(1, &[0]);
        image.instrument(1, &[10, 20, 30, 40, 50, 60, 70, 80], 0x20, 1);
        image.note(0, 0, 0, 254, 1, 0, 0);
        image.note(0, 1, 0, 254, 0, 0, 0); // retrigger, no instrument
        let mut p = player(&image);

        run_ticks(&mut p, 1);
        assert_eq!(p.state.channels[0].vol, 0x20);
        p.state.channels[0].vol = 10;

        run_ticks(&mut p, 6);
        assert!(p.state.channels[0].on);
        assert_eq!(p.state.channels[0].vol, 10);
        assert_eq!(p.state.channels[0].inst, 0);
    }

    #[test]
    fn out_of_range_instrument_ignored() {
        let mut image = ModImage::new(1, &[0]);
        // Instrument 32 does not exist in a 31-instrument module: the
        // whole note is skipped, playback continues.
        image.note(0, 0, 0, 254, 32, 0, 0);
        let mut p = player(&image);
        run_ticks(&mut p, 1);
        assert!(!p.state.channels[0].on);
    }

    #[test]
    fn row_and_position_invariants_hold_throughout() {
        let mut image = ModImage::new(2, &[0, 1, 0]);
        image.instrument(1, &[1u8; 32], 0x40, 1);
        image.note(0, 0, 0, 254, 1, 0xa, 0x05);
        image.note(0, 20, 1, 400, 1, 0x1, 0x02);
        image.note(1, 5, 2, 0, 0, 0xd, 0x05);
        let mut p = player(&image);

        for _ in 0..800 {
            run_ticks(&mut p, 1);
            assert!(p.state.row < ROWS_PER_PATTERN);
            assert!(p.position() < p.sequence_len());
            for ch in &p.state.channels {
                assert!(ch.vol <= 64);
            }
        }
    }

    #[test]
    fn mixdown_formulas() {
        let csamp = [100i16, 200, 300, 400];
        assert_eq!(mix_mono(csamp), 250);
        assert_eq!(mix_stereo_hard(csamp), (250, 250));
        assert_eq!(mix_stereo_soft(csamp), (250, 250));

        // Asymmetric input separates the pairs.
        let csamp = [1000i16, 0, 0, 1000];
        assert_eq!(mix_mono(csamp), 500);
        assert_eq!(mix_stereo_hard(csamp), (1000, 0));
        assert_eq!(mix_stereo_soft(csamp), (750, 250));
    }
}
