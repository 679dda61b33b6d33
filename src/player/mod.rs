pub mod protracker;

/// How the four module channels are combined into output frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MixMode {
    /// One sample per frame, all channels averaged.
    Mono,
    /// Interleaved L/R with classic Amiga LRRL panning.
    StereoHard,
    /// Interleaved L/R with 3:1 cross-blend between the channel pairs.
    StereoSoft,
}

/// Runtime-tweakable playback options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerOption {
    /// Restart from the first position when the song ends (default on).
    Loop,
    /// Honour Fxx tempo commands (>= 0x20). A few modules use those values
    /// in ways that expect them ignored (default on).
    SupportTempo,
}
