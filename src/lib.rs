//! Small SoundTracker/ProTracker MOD playback engine.
//!
//! Consumes a 4-channel, 15- or 31-instrument MOD module from a caller-owned
//! byte slice and renders signed 16-bit little-endian PCM on demand, at a
//! sample rate chosen when the player is created (44100 Hz by default).
//! The parser borrows the module bytes instead of copying them, and the
//! playback path uses only fixed-point integer arithmetic, so the engine is
//! usable from buffer-fill callbacks on small targets.
//!
//! ```no_run
//! use modplay::format::protracker::ProtrackerMod;
//! use modplay::player::protracker::ProtrackerPlayer;
//! use modplay::player::MixMode;
//!
//! let data = std::fs::read("song.mod").unwrap();
//! let module = ProtrackerMod::parse(&data).unwrap();
//! let mut player = ProtrackerPlayer::new(module);
//!
//! let mut buffer = [0i16; 1024];
//! while player.fill_buffer(&mut buffer, MixMode::StereoSoft) {
//!     // hand `buffer` to the audio device
//! }
//! ```

pub mod format;
pub mod player;
