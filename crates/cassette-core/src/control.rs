//! The coordination loop
//!
//! One task owns the playlist and the playback session and serializes
//! every mutation: user commands, end-of-stream signals from the decode
//! thread, and the periodic position report all funnel through here, so
//! a command can never race a completion against the same session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{ self, MissedTickBehavior };

use crate::command::Command;
use crate::playlist::Playlist;
use crate::session::{ PlaybackSession, SessionSignal };
use crate::song::Song;


/// State-change events pushed out to the UI.
#[derive( Debug, Clone )]
pub enum PlayerEvent {
    SongChanged { song: Arc<Song> },
    PositionUpdated { position: Duration, length: Duration },
    ModeChanged { shuffle: bool, repeat: bool },
    Error { message: String },
}


enum Direction {
    Forward,
    Backward,
}


/// The coordination loop: sole mutator of the session, sole driver of
/// playlist transitions.
pub struct ControlLoop {
    playlist: Playlist,
    session: PlaybackSession,
    signals: mpsc::UnboundedReceiver<SessionSignal>,
    commands: mpsc::UnboundedReceiver<Command>,
    /// Sender into our own command queue, for self-dispatched commands
    loopback: mpsc::UnboundedSender<Command>,
    events: mpsc::UnboundedSender<PlayerEvent>,
    /// Consecutive failed starts, bounded by the playlist length so an
    /// entirely unplayable playlist with repeat on cannot spin
    failures: usize,
}


impl ControlLoop {
    /// Creates the loop over `playlist`. `loopback` must feed the queue
    /// behind `commands`.
    pub fn new(
        playlist: Playlist,
        commands: mpsc::UnboundedReceiver<Command>,
        loopback: mpsc::UnboundedSender<Command>,
        events: mpsc::UnboundedSender<PlayerEvent>,
    ) -> Self {
        let ( session, signals ) = PlaybackSession::new();

        Self {
            playlist,
            session,
            signals,
            commands,
            loopback,
            events,
            failures: 0,
        }
    }


    /// Runs until Quit arrives or the command channel closes.
    pub async fn run( mut self ) {
        // Synthesized first action: start playing immediately
        self.advance( Direction::Forward );

        let mut tick = time::interval( Duration::from_secs( 1 ) );
        tick.set_missed_tick_behavior( MissedTickBehavior::Skip );

        loop {
            tokio::select! {
                Some( signal ) = self.signals.recv() => {
                    match signal {
                        SessionSignal::Finished => self.on_finished(),
                        SessionSignal::Failed { message } => self.on_failed( message ),
                    }
                }
                command = self.commands.recv() => {
                    match command {
                        Some( command ) => {
                            if !self.handle_command( command ) {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = tick.tick() => {
                    self.report_position();
                }
            }
        }

        self.session.close();
        tracing::info!( "Coordination loop stopped" );
    }


    /// Applies one command. Returns false when the loop should stop.
    fn handle_command( &mut self, command: Command ) -> bool {
        match command {
            Command::Pause => {
                if let Some( paused ) = self.session.toggle_pause() {
                    tracing::debug!( "Paused: {}", paused );
                }
            }
            Command::Next => {
                self.session.close();
                self.advance( Direction::Forward );
            }
            Command::Back => {
                self.session.close();
                self.advance( Direction::Backward );
            }
            Command::Shuffle => {
                self.playlist.toggle_shuffle();
                self.emit_modes();
            }
            Command::Repeat => {
                self.playlist.toggle_repeat();
                self.emit_modes();
            }
            Command::Volume { level } => {
                self.session.set_volume( level.min( 100 ) as f32 / 100.0 );
            }
            Command::Quit => return false,
        }
        true
    }


    /// Handles an end-of-stream signal.
    ///
    /// A signal can outlive its stream: a decoder replaced at the moment
    /// it finished leaves its Finished behind in the channel. Those are
    /// detected by the whole-second position/length comparison against
    /// whatever is active now, and dropped.
    fn on_finished( &mut self ) {
        let Some(( position, length )) = self.session.progress() else {
            return;
        };
        if stale_completion( position, length ) {
            tracing::debug!( "Ignoring stale completion signal" );
            return;
        }

        self.failures = 0;
        self.session.close();
        self.advance( Direction::Forward );
    }


    /// A stream died mid-song: surface it and move on, as if the song
    /// had been played.
    fn on_failed( &mut self, message: String ) {
        let _ = self.events.send( PlayerEvent::Error { message } );
        self.session.close();
        self.advance_after_failure();
    }


    /// Moves the playlist and starts the resulting song, or parks the
    /// engine when traversal comes up empty.
    fn advance( &mut self, direction: Direction ) {
        let song = match direction {
            Direction::Forward => self.playlist.next(),
            Direction::Backward => self.playlist.previous(),
        };

        match song {
            Some( song ) => self.start( song ),
            None => {
                // Nothing to play; idle instead of spinning. Pause is a
                // no-op with no active session
                let _ = self.loopback.send( Command::Pause );
            }
        }
    }


    fn start( &mut self, song: Arc<Song> ) {
        match self.session.start( &song ) {
            Ok( true ) => {
                let _ = self.events.send( PlayerEvent::SongChanged { song } );
                self.report_position();
            }
            Ok( false ) => {
                // Unsupported extension: already consumed by the
                // playlist, stays silent until the user advances
            }
            Err( e ) => {
                let _ = self.events.send( PlayerEvent::Error {
                    message: format!( "{}: {}", song.title, e ),
                });
                self.advance_after_failure();
            }
        }
    }


    /// Skip-and-continue for a failed song, capped so an entirely
    /// unplayable playlist ends up idle rather than spinning through
    /// refills forever.
    fn advance_after_failure( &mut self ) {
        self.failures += 1;
        if self.failures >= self.playlist.len().max( 1 ) {
            let _ = self.loopback.send( Command::Pause );
        } else {
            let _ = self.loopback.send( Command::Next );
        }
    }


    fn emit_modes( &mut self ) {
        let _ = self.events.send( PlayerEvent::ModeChanged {
            shuffle: self.playlist.shuffle(),
            repeat: self.playlist.repeat(),
        });
    }


    /// Emits the periodic position report; silent while idle.
    fn report_position( &mut self ) {
        if let Some(( position, length )) = self.session.progress() {
            let _ = self.events.send( PlayerEvent::PositionUpdated { position, length } );
        }
    }
}


/// True when a completion signal does not belong to the stream that is
/// active now: the position it would have fired at does not line up
/// with the stream's length.
fn stale_completion( position: Duration, length: Duration ) -> bool {
    position != length
}


#[cfg( test )]
mod tests {
    use super::*;
    use std::path::PathBuf;


    fn song( name: &str ) -> Song {
        Song {
            path: PathBuf::from( name ),
            title: name.to_string(),
            artist: "No Data".to_string(),
            album: "No Data".to_string(),
        }
    }


    /// Control loop wired so the test holds both outbound receivers and
    /// a separate receiver observing self-dispatched commands.
    fn control_loop(
        songs: Vec<Song>,
    ) -> (
        ControlLoop,
        mpsc::UnboundedReceiver<Command>,
        mpsc::UnboundedReceiver<PlayerEvent>,
    ) {
        let ( _command_tx, command_rx ) = mpsc::unbounded_channel();
        let ( loopback_tx, loopback_rx ) = mpsc::unbounded_channel();
        let ( event_tx, event_rx ) = mpsc::unbounded_channel();

        let playlist = Playlist::new( songs, false, true );
        let control = ControlLoop::new( playlist, command_rx, loopback_tx, event_tx );

        ( control, loopback_rx, event_rx )
    }


    #[test]
    fn test_stale_completion_comparison() {
        assert!( stale_completion( Duration::from_secs( 3 ), Duration::from_secs( 200 ) ) );
        assert!( stale_completion( Duration::from_secs( 0 ), Duration::from_secs( 1 ) ) );
        assert!( !stale_completion( Duration::from_secs( 200 ), Duration::from_secs( 200 ) ) );
    }


    #[test]
    fn test_empty_playlist_parks_instead_of_starting() {
        let ( mut control, mut loopback_rx, mut event_rx ) = control_loop( Vec::new() );

        control.advance( Direction::Forward );

        assert!( matches!( loopback_rx.try_recv(), Ok( Command::Pause ) ) );
        assert!( event_rx.try_recv().is_err() );
        assert!( !control.session.is_active() );
    }


    #[test]
    fn test_unreadable_song_skips_to_next() {
        let ( mut control, mut loopback_rx, mut event_rx ) = control_loop( vec![
            song( "/nonexistent/one.mp3" ),
            song( "/nonexistent/two.mp3" ),
        ]);

        control.advance( Direction::Forward );

        assert!( matches!( event_rx.try_recv(), Ok( PlayerEvent::Error { .. } ) ) );
        assert!( matches!( loopback_rx.try_recv(), Ok( Command::Next ) ) );
    }


    #[test]
    fn test_consecutive_failures_cap_at_playlist_length() {
        let ( mut control, mut loopback_rx, mut event_rx ) =
            control_loop( vec![ song( "/nonexistent/only.mp3" ) ] );

        control.advance( Direction::Forward );

        assert!( matches!( event_rx.try_recv(), Ok( PlayerEvent::Error { .. } ) ) );
        // With every song failing, the loop parks rather than retrying
        assert!( matches!( loopback_rx.try_recv(), Ok( Command::Pause ) ) );
    }


    #[test]
    fn test_unsupported_extension_stays_silent() {
        let ( mut control, mut loopback_rx, mut event_rx ) =
            control_loop( vec![ song( "/music/notes.txt" ) ] );

        control.advance( Direction::Forward );

        assert!( loopback_rx.try_recv().is_err() );
        assert!( event_rx.try_recv().is_err() );
        assert!( !control.session.is_active() );
    }


    #[test]
    fn test_mode_toggles_emit_events() {
        let ( mut control, _loopback_rx, mut event_rx ) =
            control_loop( vec![ song( "/music/a.mp3" ) ] );

        assert!( control.handle_command( Command::Shuffle ) );
        assert!( matches!(
            event_rx.try_recv(),
            Ok( PlayerEvent::ModeChanged { shuffle: true, repeat: true } )
        ));

        assert!( control.handle_command( Command::Repeat ) );
        assert!( matches!(
            event_rx.try_recv(),
            Ok( PlayerEvent::ModeChanged { shuffle: true, repeat: false } )
        ));
    }


    #[test]
    fn test_pause_emits_no_events() {
        let ( mut control, mut loopback_rx, mut event_rx ) =
            control_loop( vec![ song( "/music/a.mp3" ) ] );

        assert!( control.handle_command( Command::Pause ) );
        assert!( control.handle_command( Command::Pause ) );

        assert!( event_rx.try_recv().is_err() );
        assert!( loopback_rx.try_recv().is_err() );
    }


    #[test]
    fn test_quit_stops_the_loop() {
        let ( mut control, _loopback_rx, _event_rx ) =
            control_loop( vec![ song( "/music/a.mp3" ) ] );

        assert!( control.handle_command( Command::Pause ) );
        assert!( !control.handle_command( Command::Quit ) );
    }


    #[test]
    fn test_finished_with_no_session_is_ignored() {
        let ( mut control, mut loopback_rx, mut event_rx ) = control_loop( Vec::new() );

        control.on_finished();

        assert!( loopback_rx.try_recv().is_err() );
        assert!( event_rx.try_recv().is_err() );
    }
}
