//! Cassette Core - playback orchestration engine
//!
//! This crate provides the core of the Cassette terminal music player:
//! playlist traversal (upcoming/history stacks with shuffle and repeat),
//! the playback session wrapping one decode/output pair, and the
//! coordination loop that serializes commands, completion signals, and
//! position polling against them.

pub mod command;
pub mod control;
pub mod decoder;
pub mod library;
pub mod output;
pub mod playlist;
pub mod session;
pub mod song;

pub use command::{ Command, CommandError };
pub use control::{ ControlLoop, PlayerEvent };
pub use playlist::Playlist;
pub use session::{ PlaybackSession, SessionError, SessionSignal };
pub use song::Song;
