//! Cassette CLI - terminal music player

mod cli;
mod input;
mod settings;

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::{ Arc, Mutex };
use std::time::{ Duration, Instant };

use anyhow::{ bail, Result };
use clap::Parser;
use crossterm::{
    event::{ self, Event, KeyCode, KeyEventKind },
    terminal::{ disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen },
    ExecutableCommand,
};
use ratatui::{
    prelude::*,
    widgets::{ Block, Borders, List, ListItem, ListState, Paragraph },
};
use tokio::sync::mpsc;
use tracing::Level;

use cli::Args;
use input::{ InputBuffer, InputMode };
use settings::Settings;

use cassette_core::{
    library::{ self, LibraryScanner },
    Command, ControlLoop, PlayerEvent, Playlist, Song,
};


/// Application state.
struct App {
    /// Registry copy for display; the coordination loop owns the live
    /// playlist
    songs: Vec<Arc<Song>>,
    commands: mpsc::UnboundedSender<Command>,
    should_quit: bool,

    // Playback state mirrored from the coordination loop
    current: Option<Arc<Song>>,
    position: Duration,
    length: Duration,
    shuffle: bool,
    repeat: bool,
    paused: bool,
    volume: f32,

    // Input state
    input_mode: InputMode,
    input_buffer: InputBuffer,

    // List scroll/highlight state
    list_state: ListState,

    // Status message (shown in status bar)
    status_message: Option<String>,
    status_clear_at: Option<Instant>,
}


impl App {
    fn new(
        songs: Vec<Arc<Song>>,
        shuffle: bool,
        repeat: bool,
        volume: f32,
        commands: mpsc::UnboundedSender<Command>,
    ) -> Self {
        Self {
            songs,
            commands,
            should_quit: false,
            current: None,
            position: Duration::ZERO,
            length: Duration::ZERO,
            shuffle,
            repeat,
            paused: false,
            volume,
            input_mode: InputMode::Normal,
            input_buffer: InputBuffer::new(),
            list_state: ListState::default(),
            status_message: None,
            status_clear_at: None,
        }
    }


    /// Sets a status message that auto-clears after a delay.
    fn set_status( &mut self, msg: impl Into<String> ) {
        self.status_message = Some( msg.into() );
        self.status_clear_at = Some( Instant::now() + Duration::from_secs( 3 ) );
    }


    /// Clears expired status messages.
    fn tick( &mut self ) {
        if let Some( clear_at ) = self.status_clear_at {
            if Instant::now() >= clear_at {
                self.status_message = None;
                self.status_clear_at = None;
            }
        }
    }


    /// Folds one state-change event from the coordination loop into the
    /// view state.
    fn apply_event( &mut self, event: PlayerEvent ) {
        match event {
            PlayerEvent::SongChanged { song } => {
                let index = self.songs.iter().position( |s| Arc::ptr_eq( s, &song ) );
                self.list_state.select( index );
                self.current = Some( song );
                self.position = Duration::ZERO;
                self.paused = false;
            }
            PlayerEvent::PositionUpdated { position, length } => {
                self.position = position;
                self.length = length;
            }
            PlayerEvent::ModeChanged { shuffle, repeat } => {
                self.shuffle = shuffle;
                self.repeat = repeat;
            }
            PlayerEvent::Error { message } => {
                self.set_status( format!( "Error: {}", message ) );
            }
        }
    }


    fn send( &mut self, command: Command ) {
        if self.commands.send( command ).is_err() {
            // The coordination loop is gone; nothing left to control
            self.should_quit = true;
        }
    }


    fn handle_key( &mut self, code: KeyCode ) {
        match self.input_mode {
            InputMode::Normal => self.handle_normal_key( code ),
            InputMode::Command => self.handle_command_key( code ),
        }
    }


    fn handle_normal_key( &mut self, code: KeyCode ) {
        match code {
            KeyCode::Char( 'q' ) => {
                self.send( Command::Quit );
                self.should_quit = true;
            }
            KeyCode::Char( ' ' ) => {
                // Mirrored optimistically; the loop owns the real flag
                if self.current.is_some() {
                    self.paused = !self.paused;
                }
                self.send( Command::Pause );
            }
            KeyCode::Char( 'n' ) => self.send( Command::Next ),
            KeyCode::Char( 'b' ) => self.send( Command::Back ),
            KeyCode::Char( 's' ) => self.send( Command::Shuffle ),
            KeyCode::Char( 'r' ) => self.send( Command::Repeat ),
            KeyCode::Char( '+' ) | KeyCode::Char( '=' ) => self.adjust_volume( 5 ),
            KeyCode::Char( '-' ) => self.adjust_volume( -5 ),
            KeyCode::Char( '/' ) => {
                self.input_mode = InputMode::Command;
                self.input_buffer.clear();
            }
            _ => {}
        }
    }


    fn handle_command_key( &mut self, code: KeyCode ) {
        match code {
            KeyCode::Enter => {
                let input = self.input_buffer.content().to_string();
                self.execute_command( &input );
                self.input_mode = InputMode::Normal;
                self.input_buffer.clear();
            }
            KeyCode::Esc => {
                self.input_mode = InputMode::Normal;
                self.input_buffer.clear();
            }
            KeyCode::Backspace => {
                if self.input_buffer.is_empty() {
                    self.input_mode = InputMode::Normal;
                } else {
                    self.input_buffer.backspace();
                }
            }
            KeyCode::Delete => {
                self.input_buffer.delete();
            }
            KeyCode::Left => {
                self.input_buffer.move_left();
            }
            KeyCode::Right => {
                self.input_buffer.move_right();
            }
            KeyCode::Home => {
                self.input_buffer.move_home();
            }
            KeyCode::End => {
                self.input_buffer.move_end();
            }
            KeyCode::Char( c ) => {
                self.input_buffer.insert( c );
            }
            _ => {}
        }
    }


    fn execute_command( &mut self, input: &str ) {
        match Command::parse( input ) {
            Ok( command ) => {
                match &command {
                    Command::Quit => self.should_quit = true,
                    Command::Volume { level } => {
                        self.volume = *level as f32 / 100.0;
                        self.set_status( format!( "Volume: {}%", level ) );
                    }
                    Command::Pause if self.current.is_some() => {
                        self.paused = !self.paused;
                    }
                    _ => {}
                }
                self.send( command );
            }
            Err( e ) => {
                self.set_status( format!( "{}", e ) );
            }
        }
    }


    fn adjust_volume( &mut self, delta: i32 ) {
        let level = (( self.volume * 100.0 ).round() as i32 + delta ).clamp( 0, 100 ) as u32;
        self.volume = level as f32 / 100.0;
        self.send( Command::Volume { level } );
        self.set_status( format!( "Volume: {}%", level ) );
    }
}


fn main() -> Result<()> {
    let args = Args::parse();

    init_logging();

    let saved = Settings::load();
    let shuffle = args.shuffle || saved.shuffle;
    let repeat = saved.repeat && !args.no_repeat;
    let volume = saved.volume.clamp( 0.0, 1.0 );

    let paths = collect_files( &args.files )?;
    if paths.is_empty() {
        bail!( "no playable files (.mp3/.wav) found" );
    }

    let playlist = Playlist::initialize( &paths, shuffle, repeat );
    if playlist.is_empty() {
        bail!( "none of the {} discovered files could be opened", paths.len() );
    }
    let songs = playlist.songs().to_vec();

    // The coordination loop runs on the tokio runtime and owns the
    // playlist and the session; the UI talks to it over channels only
    let ( command_tx, command_rx ) = mpsc::unbounded_channel();
    let ( event_tx, event_rx ) = mpsc::unbounded_channel();

    let runtime = tokio::runtime::Runtime::new()?;
    let control = ControlLoop::new( playlist, command_rx, command_tx.clone(), event_tx );
    let control_task = runtime.spawn( control.run() );

    if volume < 1.0 {
        let _ = command_tx.send( Command::Volume {
            level: ( volume * 100.0 ).round() as u32,
        });
    }

    // Setup terminal
    enable_raw_mode()?;
    io::stdout().execute( EnterAlternateScreen )?;

    let mut terminal = Terminal::new( CrosstermBackend::new( io::stdout() ) )?;

    let mut app = App::new( songs, shuffle, repeat, volume, command_tx );
    let mut events = event_rx;

    // Main loop
    loop {
        app.tick();

        while let Ok( event ) = events.try_recv() {
            app.apply_event( event );
        }

        terminal.draw( |frame| draw_ui( frame, &mut app ) )?;

        // Handle input with timeout
        if event::poll( Duration::from_millis( 100 ) )? {
            if let Event::Key( key ) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    app.handle_key( key.code );
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    // Cleanup
    disable_raw_mode()?;
    io::stdout().execute( LeaveAlternateScreen )?;

    Settings {
        shuffle: app.shuffle,
        repeat: app.repeat,
        volume: app.volume,
    }
    .save();

    // Quit has been sent; wait for the loop to wind down
    let _ = runtime.block_on( control_task );

    Ok(())
}


/// Expands the command-line arguments into an ordered list of playable
/// files. Directories are scanned recursively; bare files pass through
/// the same extension filter.
fn collect_files( args: &[PathBuf] ) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for path in args {
        if path.is_dir() {
            let mut scanner = LibraryScanner::new();
            scanner.add_root( path.clone() );
            files.extend( scanner.scan()? );
        } else if library::is_audio_file( path ) {
            files.push( path.clone() );
        } else {
            tracing::warn!( "Ignoring {:?}: not a playable file", path );
        }
    }

    Ok( files )
}


/// Sends logs to a file; stdout belongs to the TUI.
fn init_logging() {
    let Some( dir ) = dirs::data_local_dir().map( |d| d.join( "cassette" ) ) else {
        return;
    };
    if fs::create_dir_all( &dir ).is_err() {
        return;
    }
    let Ok( file ) = fs::File::create( dir.join( "cassette.log" ) ) else {
        return;
    };

    tracing_subscriber::fmt()
        .with_writer( Mutex::new( file ) )
        .with_ansi( false )
        .with_max_level( Level::INFO )
        .init();
}


/// Draws the main UI.
fn draw_ui( frame: &mut Frame, app: &mut App ) {
    let area = frame.area();

    let chunks = Layout::default()
        .direction( Direction::Vertical )
        .constraints([
            Constraint::Length( 2 ),  // Header
            Constraint::Min( 0 ),     // Song list
            Constraint::Length( 5 ),  // Now playing
            Constraint::Length( 1 ),  // Status bar
        ])
        .split( area );

    let header = Paragraph::new( "  CASSETTE" )
        .style( Style::default().fg( Color::Cyan ).bold() )
        .block( Block::default().borders( Borders::BOTTOM ) );
    frame.render_widget( header, chunks[0] );

    draw_song_list( frame, app, chunks[1] );
    draw_now_playing( frame, app, chunks[2] );
    draw_status_bar( frame, app, chunks[3] );
}


fn draw_song_list( frame: &mut Frame, app: &mut App, area: Rect ) {
    let playing = app.list_state.selected();

    let items: Vec<ListItem> = app.songs
        .iter()
        .enumerate()
        .map( |( i, song )| {
            let prefix = if Some( i ) == playing { " > " } else { "   " };
            ListItem::new( format!( "{}{} - {}", prefix, song.artist, song.title ) )
        })
        .collect();

    let title = format!(
        " Playlist ({}) {}{} ",
        app.songs.len(),
        if app.shuffle { "[shuffle] " } else { "" },
        if app.repeat { "[repeat]" } else { "" },
    );

    let list = List::new( items )
        .block( Block::default().title( title ).borders( Borders::ALL ) )
        .highlight_style( Style::default().bg( Color::DarkGray ) );

    frame.render_stateful_widget( list, area, &mut app.list_state );
}


fn draw_now_playing( frame: &mut Frame, app: &App, area: Rect ) {
    let state_str = if app.current.is_none() {
        "-"
    } else if app.paused {
        "||"
    } else {
        ">"
    };

    let title = app.current
        .as_ref()
        .map( |song| song.title.clone() )
        .unwrap_or_else( || "No song".to_string() );
    let artist_album = app.current
        .as_ref()
        .map( |song| format!( "{} - {}", song.artist, song.album ) )
        .unwrap_or_default();

    // Progress bar over whatever length is known so far
    let progress_width = 20;
    let progress = if app.length.as_secs() > 0 {
        ( app.position.as_secs_f64() / app.length.as_secs_f64() ).min( 1.0 )
    } else {
        0.0
    };
    let filled = ( progress * progress_width as f64 ).round() as usize;
    let bar = format!(
        "[{}{}]",
        "#".repeat( filled ),
        "-".repeat( progress_width - filled )
    );

    let vol_pct = ( app.volume * 100.0 ).round() as i32;

    let lines = vec![
        Line::from( Span::styled(
            format!( " {} {} ", state_str, title ),
            Style::default().bold(),
        )),
        Line::from( Span::styled(
            format!( "   {} ", artist_album ),
            Style::default().fg( Color::Gray ),
        )),
        Line::from( format!(
            " {} {} / {}  vol {}% ",
            bar,
            format_time( app.position ),
            format_time( app.length ),
            vol_pct
        )),
    ];

    let now_playing = Paragraph::new( lines )
        .block( Block::default().title( " Now Playing " ).borders( Borders::ALL ) );

    frame.render_widget( now_playing, area );
}


fn draw_status_bar( frame: &mut Frame, app: &App, area: Rect ) {
    let ( text, style ) = match app.input_mode {
        InputMode::Command => {
            ( format!( "/{}", app.input_buffer.content() ), Style::default().fg( Color::Yellow ) )
        }
        InputMode::Normal => {
            if let Some( ref message ) = app.status_message {
                ( message.clone(), Style::default().fg( Color::Green ) )
            } else {
                let hint = " [Space]Pause [n]Next [b]Back [s]Shuffle [r]Repeat [+/-]Vol [/]Cmd [q]Quit ";
                ( hint.to_string(), Style::default().fg( Color::DarkGray ) )
            }
        }
    };

    let status = Paragraph::new( text ).style( style );
    frame.render_widget( status, area );

    // Show cursor in command mode
    if app.input_mode != InputMode::Normal {
        let cursor_x = area.x + 1 + app.input_buffer.cursor_char_pos() as u16;
        frame.set_cursor_position(( cursor_x, area.y ));
    }
}


/// Formats a duration as M:SS.
fn format_time( d: Duration ) -> String {
    let secs = d.as_secs();
    format!( "{}:{:02}", secs / 60, secs % 60 )
}
