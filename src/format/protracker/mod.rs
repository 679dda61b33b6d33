use byteorder::{BigEndian, ByteOrder};
use num_enum::{IntoPrimitive, TryFromPrimitive};
use std::str::from_utf8;
use thiserror::Error;

mod info;

pub const NUM_CHANNELS: usize = 4;
pub const ROWS_PER_PATTERN: usize = 64;
pub const SEQUENCE_ENTRIES: usize = 128;

/// 64 rows x 4 channels x 4 bytes per cell.
pub const PATTERN_BYTES: usize = ROWS_PER_PATTERN * NUM_CHANNELS * 4;

const TITLE_LEN: usize = 20;
const INSTRUMENT_TABLE: usize = 0x14;
const INSTRUMENT_RECORD: usize = 30;
const INSTRUMENT_NAME_LEN: usize = 22;

const MAGIC: &[u8; 4] = b"M.K.";
const MAGIC_OFFSET: usize = 0x438;

// 31-instrument layout.
const LENGTH_31: usize = 0x3b6;
const SEQUENCE_31: usize = 0x3b8;
const PATTERNS_31: usize = 0x43c;

// 15-instrument layout.
const LENGTH_15: usize = 0x1d6;
const SEQUENCE_15: usize = 0x1d8;
const PATTERNS_15: usize = 0x258;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ModError {
    #[error("module truncated: need at least {0} bytes")]
    Truncated(usize),
}

/// Parsed view of a MOD file. Borrows the caller's bytes; nothing is copied.
pub struct ProtrackerMod<'a> {
    title: &'a [u8],
    thirty_one: bool,
    sequence_len: usize,
    sequence: &'a [u8],
    patterns: &'a [u8],
    instruments: [Instrument<'a>; 31],
    num_instruments: usize,
}

/// One instrument directory entry. `data` points into the module blob and
/// holds the bytes actually present there, which for truncated files can be
/// shorter than the header-declared length.
#[derive(Clone, Copy, Default)]
pub struct Instrument<'a> {
    name: &'a [u8],
    pub data: &'a [u8],
    pub finetune: i8,
    pub default_volume: u8,
    pub repeat_offset: u32,
    pub repeat_length: u32,
}

impl<'a> Instrument<'a> {
    pub fn name(&self) -> &'a str {
        trimmed_str(self.name)
    }
}

/// One decoded 4-byte pattern cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note {
    /// Amiga period; 0 means no new note.
    pub period: u16,
    /// 1-based instrument number; 0 means keep the channel's current one.
    pub instrument: u8,
    pub effect: EffectType,
    pub param: u8,
}

impl Note {
    pub fn decode(cell: &[u8]) -> Note {
        let period = (u16::from(cell[0] & 0x0f) << 8) | u16::from(cell[1]);
        let instrument = (cell[0] & 0xf0) | (cell[2] >> 4);
        // The command nibble covers all 16 variants, so the conversion
        // cannot actually fail.
        let effect = EffectType::try_from(cell[2] & 0x0f).unwrap_or(EffectType::Arpeggio);
        Note {
            period,
            instrument,
            effect,
            param: cell[3],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.period == 0
            && self.instrument == 0
            && self.effect == EffectType::Arpeggio
            && self.param == 0
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum EffectType {
    Arpeggio = 0x0,
    PortamentoUp = 0x1,
    PortamentoDown = 0x2,
    TonePortamento = 0x3,
    Vibrato = 0x4,
    TonePortamentoVolumeSlide = 0x5,
    VibratoVolumeSlide = 0x6,
    Tremolo = 0x7,
    SetPanning = 0x8,
    SampleOffset = 0x9,
    VolumeSlide = 0xa,
    PositionJump = 0xb,
    SetVolume = 0xc,
    PatternBreak = 0xd,
    Extended = 0xe,
    SetSpeed = 0xf,
}

impl<'a> ProtrackerMod<'a> {
    pub fn parse(data: &'a [u8]) -> Result<ProtrackerMod<'a>, ModError> {
        let thirty_one = data.len() >= MAGIC_OFFSET + MAGIC.len()
            && &data[MAGIC_OFFSET..MAGIC_OFFSET + MAGIC.len()] == MAGIC;

        let (num_instruments, length_at, sequence_at, patterns_at) = if thirty_one {
            (31, LENGTH_31, SEQUENCE_31, PATTERNS_31)
        } else {
            (15, LENGTH_15, SEQUENCE_15, PATTERNS_15)
        };

        if data.len() < patterns_at {
            return Err(ModError::Truncated(patterns_at));
        }

        let title = &data[0..TITLE_LEN];
        let sequence_len = (data[length_at] as usize).min(SEQUENCE_ENTRIES);
        let sequence = &data[sequence_at..sequence_at + SEQUENCE_ENTRIES];

        // The whole 128-entry table participates: patterns past the song
        // length still occupy space before the sample data.
        let max_pattern = sequence.iter().copied().max().unwrap_or(0) as usize;

        let patterns_end = patterns_at + PATTERN_BYTES * (max_pattern + 1);
        if data.len() < patterns_end {
            return Err(ModError::Truncated(patterns_end));
        }
        let patterns = &data[patterns_at..patterns_end];

        log::debug!(
            "module '{}': length {}, max pattern {}, {} instrument slots",
            trimmed_str(title),
            sequence_len,
            max_pattern,
            num_instruments
        );

        let mut instruments = [Instrument::default(); 31];
        let mut sample_at = patterns_end;
        for (i, inst) in instruments.iter_mut().take(num_instruments).enumerate() {
            let rec = &data[INSTRUMENT_TABLE + i * INSTRUMENT_RECORD..];
            let length = BigEndian::read_u16(&rec[22..24]) as usize * 2;

            // Sample data runs off the end in plenty of real modules; play
            // the bytes that are there.
            let start = sample_at.min(data.len());
            let end = (sample_at + length).min(data.len());

            *inst = Instrument {
                name: &rec[0..INSTRUMENT_NAME_LEN],
                data: &data[start..end],
                finetune: rec[24] as i8,
                default_volume: (rec[25] & 0x7f).min(64),
                repeat_offset: BigEndian::read_u16(&rec[26..28]) as u32 * 2,
                repeat_length: BigEndian::read_u16(&rec[28..30]) as u32 * 2,
            };
            sample_at += length;

            log::trace!(
                "instrument {:2}: len {:5} vol {:2} roff {:5} rlen {:5} '{}'",
                i + 1,
                inst.data.len(),
                inst.default_volume,
                inst.repeat_offset,
                inst.repeat_length,
                inst.name()
            );
        }

        Ok(ProtrackerMod {
            title,
            thirty_one,
            sequence_len,
            sequence,
            patterns,
            instruments,
            num_instruments,
        })
    }

    pub fn title(&self) -> &'a str {
        trimmed_str(self.title)
    }

    /// True for the 31-instrument variant (magic `M.K.` present).
    pub fn thirty_one(&self) -> bool {
        self.thirty_one
    }

    pub fn sequence_len(&self) -> usize {
        self.sequence_len
    }

    /// Pattern index played at the given song position.
    pub fn pattern_at(&self, position: usize) -> u8 {
        self.sequence[position]
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len() / PATTERN_BYTES
    }

    pub fn num_instruments(&self) -> usize {
        self.num_instruments
    }

    /// 0-based instrument lookup.
    pub fn instrument(&self, index: usize) -> &Instrument<'a> {
        &self.instruments[index]
    }

    /// Decode the cell at (pattern, row, channel).
    pub fn note(&self, pattern: usize, row: usize, channel: usize) -> Note {
        let offset = pattern * PATTERN_BYTES + (row * NUM_CHANNELS + channel) * 4;
        Note::decode(&self.patterns[offset..offset + 4])
    }
}

fn trimmed_str(bytes: &[u8]) -> &str {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    from_utf8(&bytes[..end]).unwrap_or("")
}
