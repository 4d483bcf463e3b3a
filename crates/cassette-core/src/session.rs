//! The playback session
//!
//! Wraps exactly one active decode/output pair at a time: the decode
//! thread feeding the shared buffer, the cpal stream draining it, and
//! the position counters. The coordination loop is the only caller.

use std::sync::atomic::{ AtomicBool, AtomicU64, Ordering };
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::decoder::{ Decoder, DecoderError, SongFormat };
use crate::output::{ AudioDevice, OutputError, OutputStream, SharedBuffer };
use crate::song::Song;


/// Errors that make a song unplayable.
#[derive( Debug, Error )]
pub enum SessionError {
    #[error( transparent )]
    Decoder( #[from] DecoderError ),

    #[error( transparent )]
    Output( #[from] OutputError ),
}


/// Signals sent by the decode thread to the coordination loop.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum SessionSignal {
    /// The stream played to its natural end.
    Finished,

    /// The stream died mid-song.
    Failed { message: String },
}


/// Wrapper that lets the session live inside the coordination task.
///
/// SAFETY: cpal::Stream is !Send because of raw pointers used by the
/// audio callback thread, which cpal manages internally. Only the
/// coordination task ever touches the handle after creation.
struct OutputStreamHandle( OutputStream );

unsafe impl Send for OutputStreamHandle {}


/// State for one playing stream.
struct ActiveStream {
    stop_flag: Arc<AtomicBool>,
    buffer: Arc<SharedBuffer>,
    /// Kept alive for its Drop impl, which stops the cpal stream
    _stream: OutputStreamHandle,
    thread: Option<thread::JoinHandle<()>>,
    /// Frames decoded so far; the position source
    frames_played: Arc<AtomicU64>,
    /// Total frames, 0 while unknown; the decode thread fills it in at
    /// end of stream
    total_frames: Arc<AtomicU64>,
    sample_rate: u32,
}


/// One active decode/output pairing, or idle.
pub struct PlaybackSession {
    device: Option<AudioDevice>,
    active: Option<ActiveStream>,
    /// Carried across songs; applied to each new stream's buffer
    volume: f32,
    signals: mpsc::UnboundedSender<SessionSignal>,
}


impl PlaybackSession {
    /// Creates an idle session plus the receiving end of its signal
    /// channel.
    ///
    /// The channel is long-lived and shared by every decode thread the
    /// session ever spawns, so a signal from an already-replaced stream
    /// can still arrive late; the coordination loop's staleness check
    /// discards those.
    pub fn new() -> ( Self, mpsc::UnboundedReceiver<SessionSignal> ) {
        let ( signals, signal_rx ) = mpsc::unbounded_channel();

        (
            Self {
                device: None,
                active: None,
                volume: 1.0,
                signals,
            },
            signal_rx,
        )
    }


    /// Starts playing `song`, closing any active stream first.
    ///
    /// Returns Ok( false ) without starting anything for a file
    /// extension the player does not handle; no completion signal will
    /// ever fire for it. Open or decoder-setup failure is a hard error
    /// for this song only.
    pub fn start( &mut self, song: &Song ) -> Result<bool, SessionError> {
        self.close();

        let Some( format ) = SongFormat::from_path( &song.path ) else {
            // Discovery should have filtered this out before it got here
            tracing::warn!( "Refusing to play {:?}: unsupported extension", song.path );
            return Ok( false );
        };

        let decoder = Decoder::open( &song.path, format )?;

        // The device is opened on first use only; every later song
        // reuses it
        if self.device.is_none() {
            self.device = Some( AudioDevice::open()? );
        }
        let device = self.device.as_ref().unwrap();

        let sample_rate = decoder.sample_rate();
        let channels = decoder.channels() as u16;

        let ( stream, buffer ) = device.open_stream( sample_rate, channels )?;
        buffer.set_volume( self.volume );
        stream.play()?;

        let stop_flag = Arc::new( AtomicBool::new( false ) );
        let frames_played = Arc::new( AtomicU64::new( 0 ) );
        let total_frames = Arc::new( AtomicU64::new( decoder.total_frames().unwrap_or( 0 ) ) );

        // Clone for the decode thread
        let buffer_clone = Arc::clone( &buffer );
        let stop_flag_clone = Arc::clone( &stop_flag );
        let frames_played_clone = Arc::clone( &frames_played );
        let total_frames_clone = Arc::clone( &total_frames );
        let signals = self.signals.clone();

        let thread = thread::spawn( move || {
            decode_loop(
                decoder,
                buffer_clone,
                stop_flag_clone,
                frames_played_clone,
                total_frames_clone,
                signals,
            );
        });

        tracing::info!( "Playing {:?}", song.path );

        self.active = Some( ActiveStream {
            stop_flag,
            buffer,
            _stream: OutputStreamHandle( stream ),
            thread: Some( thread ),
            frames_played,
            total_frames,
            sample_rate,
        });

        Ok( true )
    }


    /// Flips the pause state of the active stream, returning the new
    /// state; no-op when idle.
    pub fn toggle_pause( &self ) -> Option<bool> {
        self.active.as_ref().map( |active| active.buffer.toggle_paused() )
    }


    /// Releases the current stream; safe to call when none is active.
    pub fn close( &mut self ) {
        if let Some( mut active ) = self.active.take() {
            active.stop_flag.store( true, Ordering::Relaxed );
            active.buffer.clear();

            if let Some( thread ) = active.thread.take() {
                let _ = thread.join();
            }

            // The cpal stream stops when the handle drops here
            tracing::debug!( "Closed stream" );
        }
    }


    /// Returns true while a stream is active.
    pub fn is_active( &self ) -> bool {
        self.active.is_some()
    }


    /// Position and length of the active stream, each rounded to the
    /// nearest whole second; None when idle. The length stays zero
    /// until it is known.
    pub fn progress( &self ) -> Option<( Duration, Duration )> {
        let active = self.active.as_ref()?;

        let position = round_to_second(
            active.frames_played.load( Ordering::Relaxed ),
            active.sample_rate,
        );
        let length = round_to_second(
            active.total_frames.load( Ordering::Relaxed ),
            active.sample_rate,
        );

        Some(( position, length ))
    }


    /// Sets the volume level (0.0 = mute, 1.0 = normal), applied now and
    /// to every later stream.
    pub fn set_volume( &mut self, volume: f32 ) {
        self.volume = volume.clamp( 0.0, 1.0 );

        if let Some( active ) = &self.active {
            active.buffer.set_volume( self.volume );
        }
    }


    /// Gets the current volume level.
    pub fn volume( &self ) -> f32 {
        self.volume
    }
}


impl Drop for PlaybackSession {
    fn drop( &mut self ) {
        self.close();
    }
}


/// Converts a frame count to a duration rounded to the nearest second.
fn round_to_second( frames: u64, sample_rate: u32 ) -> Duration {
    Duration::from_secs(( frames as f64 / sample_rate as f64 ).round() as u64 )
}


/// The decode loop that runs in a separate thread.
///
/// Feeds the shared buffer, backing off while it is full or paused. On
/// natural end of stream it records the true length, waits for the
/// buffer to drain, and sends Finished; when closed early it sends
/// nothing at all.
fn decode_loop(
    mut decoder: Decoder,
    buffer: Arc<SharedBuffer>,
    stop_flag: Arc<AtomicBool>,
    frames_played: Arc<AtomicU64>,
    total_frames: Arc<AtomicU64>,
    signals: mpsc::UnboundedSender<SessionSignal>,
) {
    let channels = decoder.channels();

    loop {
        if stop_flag.load( Ordering::Relaxed ) {
            tracing::debug!( "Decode loop: stop signal received" );
            return;
        }

        if buffer.is_paused() {
            thread::sleep( Duration::from_millis( 10 ) );
            continue;
        }

        // Keep roughly 50ms decoded ahead, no more
        let target = ( decoder.sample_rate() as usize * channels ) / 20;
        if buffer.len() > target {
            thread::sleep( Duration::from_millis( 5 ) );
            continue;
        }

        match decoder.decode_next() {
            Ok( Some( samples ) ) => {
                frames_played.fetch_add(( samples.len() / channels ) as u64, Ordering::Relaxed );

                let mut offset = 0;
                while offset < samples.len() && !stop_flag.load( Ordering::Relaxed ) {
                    let pushed = buffer.push( &samples[ offset.. ] );
                    offset += pushed;
                    if pushed == 0 {
                        // Buffer full, wait a bit
                        thread::sleep( Duration::from_millis( 5 ) );
                    }
                }
            }
            Ok( None ) => {
                tracing::debug!( "Decode loop: reached end of stream" );

                // The decoded frame count is the true length, whatever
                // the container claimed
                total_frames.store( frames_played.load( Ordering::Relaxed ), Ordering::Relaxed );

                while !buffer.is_empty() && !stop_flag.load( Ordering::Relaxed ) {
                    thread::sleep( Duration::from_millis( 10 ) );
                }

                if !stop_flag.load( Ordering::Relaxed ) {
                    let _ = signals.send( SessionSignal::Finished );
                }
                return;
            }
            Err( e ) => {
                tracing::error!( "Decode error: {}", e );
                let _ = signals.send( SessionSignal::Failed { message: e.to_string() } );
                return;
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_round_to_second() {
        assert_eq!( round_to_second( 44100, 44100 ), Duration::from_secs( 1 ) );
        assert_eq!( round_to_second( 44100 * 10 + 17_000, 44100 ), Duration::from_secs( 10 ) );
        assert_eq!( round_to_second( 44100 * 10 + 30_000, 44100 ), Duration::from_secs( 11 ) );
        assert_eq!( round_to_second( 0, 44100 ), Duration::ZERO );
    }


    #[test]
    fn test_idle_session_has_no_progress() {
        let ( session, _signals ) = PlaybackSession::new();
        assert!( !session.is_active() );
        assert!( session.progress().is_none() );
        assert!( session.toggle_pause().is_none() );
    }


    #[test]
    fn test_close_when_idle_is_safe() {
        let ( mut session, _signals ) = PlaybackSession::new();
        session.close();
        session.close();
        assert!( !session.is_active() );
    }


    #[test]
    fn test_unsupported_extension_is_a_noop() {
        let ( mut session, mut signals ) = PlaybackSession::new();
        let song = Song {
            path: "/music/notes.txt".into(),
            title: "notes.txt".to_string(),
            artist: "No Data".to_string(),
            album: "No Data".to_string(),
        };

        assert!( matches!( session.start( &song ), Ok( false ) ) );
        assert!( !session.is_active() );
        assert!( signals.try_recv().is_err() );
    }


    #[test]
    fn test_missing_file_is_a_hard_error() {
        let ( mut session, _signals ) = PlaybackSession::new();
        let song = Song {
            path: "/nonexistent/missing.mp3".into(),
            title: "missing.mp3".to_string(),
            artist: "No Data".to_string(),
            album: "No Data".to_string(),
        };

        assert!( matches!(
            session.start( &song ),
            Err( SessionError::Decoder( DecoderError::FileOpen( _ ) ) )
        ));
        assert!( !session.is_active() );
    }
}
