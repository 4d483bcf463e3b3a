//! Playlist traversal
//!
//! Owns the fixed song registry plus the upcoming and history stacks,
//! and implements next/previous/shuffle/repeat.

use std::path::PathBuf;
use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::song::Song;


/// The playlist engine.
///
/// The registry is fixed at construction; traversal state lives in two
/// LIFO stacks plus the current song. Between them the stacks and the
/// current song always hold the registry's full multiset, except right
/// after a repeat refill, which reloads the entire registry regardless
/// of what history still holds.
#[derive( Debug )]
pub struct Playlist {
    songs: Vec<Arc<Song>>,
    next_up: Vec<Arc<Song>>,
    history: Vec<Arc<Song>>,
    current: Option<Arc<Song>>,
    shuffle: bool,
    repeat: bool,
}


impl Playlist {
    /// Builds a playlist over already-constructed songs and queues all
    /// of them, shuffled when `shuffle` starts enabled.
    pub fn new( songs: Vec<Song>, shuffle: bool, repeat: bool ) -> Self {
        let mut playlist = Self {
            songs: songs.into_iter().map( Arc::new ).collect(),
            next_up: Vec::new(),
            history: Vec::new(),
            current: None,
            shuffle,
            repeat,
        };
        playlist.refill_next_up();
        playlist
    }


    /// Builds the registry from `paths`, in order.
    ///
    /// A file that cannot be opened is skipped entirely rather than kept
    /// as an unplayable placeholder; initialization itself never fails,
    /// and rejecting an all-skipped result is the caller's job.
    pub fn initialize( paths: &[PathBuf], shuffle: bool, repeat: bool ) -> Self {
        let songs = paths.iter().filter_map( |path| Song::read( path ) ).collect();
        Self::new( songs, shuffle, repeat )
    }


    /// Advances to the next song and returns it.
    ///
    /// With the upcoming stack exhausted and repeat on, the stack is
    /// refilled from the full registry first. None means end of
    /// playback: repeat is off or the registry is empty.
    pub fn next( &mut self ) -> Option<Arc<Song>> {
        if let Some( current ) = self.current.take() {
            self.history.push( current );
        }

        let mut song = self.next_up.pop();
        if song.is_none() && self.repeat {
            self.refill_next_up();
            song = self.next_up.pop();
        }

        self.current = song.clone();
        song
    }


    /// Steps back to the previously played song and returns it.
    ///
    /// The current song goes back on top of the upcoming stack, so going
    /// forward again replays it. Returns None, leaving no current song,
    /// when there is nothing playing or no history to return to.
    pub fn previous( &mut self ) -> Option<Arc<Song>> {
        let current = self.current.take()?;
        self.next_up.push( current );

        let song = self.history.pop();
        self.current = song.clone();
        song
    }


    /// Flips shuffle mode and returns the new value.
    ///
    /// Turning shuffle on permutes the remaining upcoming stack in
    /// place; history and the current song are never reordered.
    pub fn toggle_shuffle( &mut self ) -> bool {
        self.shuffle = !self.shuffle;
        if self.shuffle {
            self.next_up.shuffle( &mut rand::thread_rng() );
        }
        self.shuffle
    }


    /// Flips repeat mode and returns the new value. Takes effect the
    /// next time the upcoming stack runs out.
    pub fn toggle_repeat( &mut self ) -> bool {
        self.repeat = !self.repeat;
        self.repeat
    }


    /// Gets shuffle mode.
    pub fn shuffle( &self ) -> bool {
        self.shuffle
    }


    /// Gets repeat mode.
    pub fn repeat( &self ) -> bool {
        self.repeat
    }


    /// Gets the full registry, in playlist order.
    pub fn songs( &self ) -> &[Arc<Song>] {
        &self.songs
    }


    /// Gets the current song.
    pub fn current( &self ) -> Option<&Arc<Song>> {
        self.current.as_ref()
    }


    /// Gets the number of songs in the registry.
    pub fn len( &self ) -> usize {
        self.songs.len()
    }


    /// Returns true if the registry is empty.
    pub fn is_empty( &self ) -> bool {
        self.songs.is_empty()
    }


    /// Reloads the upcoming stack with the full registry, first song on
    /// top, shuffled when shuffle mode is on.
    fn refill_next_up( &mut self ) {
        self.next_up.extend( self.songs.iter().rev().cloned() );
        if self.shuffle {
            self.next_up.shuffle( &mut rand::thread_rng() );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    fn songs( names: &[&str] ) -> Vec<Song> {
        names
            .iter()
            .map( |name| Song {
                path: PathBuf::from( format!( "{}.mp3", name ) ),
                title: name.to_string(),
                artist: "No Data".to_string(),
                album: "No Data".to_string(),
            })
            .collect()
    }


    /// Sorted multiset of every song title the playlist currently holds
    /// across the stacks and the current slot.
    fn held_titles( playlist: &Playlist ) -> Vec<String> {
        let mut titles: Vec<String> = playlist
            .next_up
            .iter()
            .chain( playlist.history.iter() )
            .chain( playlist.current.iter() )
            .map( |song| song.title.clone() )
            .collect();
        titles.sort();
        titles
    }


    #[test]
    fn test_next_visits_in_playlist_order() {
        let mut playlist = Playlist::new( songs( &[ "a", "b", "c", "d" ] ), false, false );

        let visited: Vec<String> = ( 0..4 )
            .filter_map( |_| playlist.next().map( |song| song.title.clone() ) )
            .collect();

        assert_eq!( visited, [ "a", "b", "c", "d" ] );
    }


    #[test]
    fn test_exhaustion_with_repeat_off() {
        let mut playlist = Playlist::new( songs( &[ "a", "b" ] ), false, false );

        assert!( playlist.next().is_some() );
        assert!( playlist.next().is_some() );
        assert!( playlist.next().is_none() );
        assert!( playlist.current().is_none() );
        assert!( playlist.next().is_none() );
    }


    #[test]
    fn test_repeat_wraps_in_order() {
        let mut playlist = Playlist::new( songs( &[ "a", "b", "c", "d" ] ), false, true );

        let visited: Vec<String> = ( 0..5 )
            .filter_map( |_| playlist.next().map( |song| song.title.clone() ) )
            .collect();

        assert_eq!( visited, [ "a", "b", "c", "d", "a" ] );
    }


    #[test]
    fn test_empty_playlist_never_yields() {
        let mut playlist = Playlist::new( Vec::new(), false, true );

        assert!( playlist.next().is_none() );
        assert!( playlist.next().is_none() );
        assert!( playlist.previous().is_none() );
    }


    #[test]
    fn test_next_then_previous_restores_prior_state() {
        let mut playlist = Playlist::new( songs( &[ "a", "b", "c" ] ), false, true );
        playlist.next();

        let current_before = playlist.current().cloned();
        let next_up_before = playlist.next_up.len();
        let history_before = playlist.history.len();

        playlist.next();
        let restored = playlist.previous();

        assert_eq!( restored.unwrap().title, "a" );
        assert_eq!( playlist.current().cloned(), current_before );
        assert_eq!( playlist.next_up.len(), next_up_before );
        assert_eq!( playlist.history.len(), history_before );
    }


    #[test]
    fn test_previous_replays_pushed_back_song() {
        let mut playlist = Playlist::new( songs( &[ "a", "b", "c" ] ), false, true );

        assert_eq!( playlist.next().unwrap().title, "a" );
        assert_eq!( playlist.next().unwrap().title, "b" );
        assert_eq!( playlist.previous().unwrap().title, "a" );
        // b went back on top of the upcoming stack
        assert_eq!( playlist.next().unwrap().title, "b" );
    }


    #[test]
    fn test_previous_with_no_current_is_a_noop() {
        let mut playlist = Playlist::new( songs( &[ "a", "b" ] ), false, true );
        let next_up_before = playlist.next_up.len();

        assert!( playlist.previous().is_none() );
        assert_eq!( playlist.next_up.len(), next_up_before );
        assert_eq!( playlist.next().unwrap().title, "a" );
    }


    #[test]
    fn test_previous_at_earliest_song_empties_current() {
        let mut playlist = Playlist::new( songs( &[ "a", "b" ] ), false, true );
        playlist.next();

        assert!( playlist.previous().is_none() );
        assert!( playlist.current().is_none() );
        // The song that was playing replays on the way forward
        assert_eq!( playlist.next().unwrap().title, "a" );
    }


    #[test]
    fn test_toggle_shuffle_preserves_upcoming_set() {
        let mut playlist = Playlist::new(
            songs( &[ "a", "b", "c", "d", "e", "f", "g", "h" ] ),
            false,
            true,
        );
        playlist.next();
        playlist.next();

        let mut upcoming_before: Vec<String> =
            playlist.next_up.iter().map( |song| song.title.clone() ).collect();
        upcoming_before.sort();
        let history_before: Vec<String> =
            playlist.history.iter().map( |song| song.title.clone() ).collect();
        let current_before = playlist.current().cloned();

        assert!( playlist.toggle_shuffle() );

        let mut upcoming_after: Vec<String> =
            playlist.next_up.iter().map( |song| song.title.clone() ).collect();
        upcoming_after.sort();
        let history_after: Vec<String> =
            playlist.history.iter().map( |song| song.title.clone() ).collect();

        assert_eq!( upcoming_after, upcoming_before );
        assert_eq!( history_after, history_before );
        assert_eq!( playlist.current().cloned(), current_before );
    }


    #[test]
    fn test_toggle_shuffle_off_keeps_order() {
        let mut playlist = Playlist::new( songs( &[ "a", "b", "c" ] ), false, true );
        playlist.shuffle = true;

        let order_before: Vec<String> =
            playlist.next_up.iter().map( |song| song.title.clone() ).collect();

        // Toggling off permutes nothing
        assert!( !playlist.toggle_shuffle() );

        let order_after: Vec<String> =
            playlist.next_up.iter().map( |song| song.title.clone() ).collect();
        assert_eq!( order_after, order_before );
    }


    #[test]
    fn test_toggle_repeat_has_no_stack_effect() {
        let mut playlist = Playlist::new( songs( &[ "a", "b", "c" ] ), false, true );
        let order_before: Vec<String> =
            playlist.next_up.iter().map( |song| song.title.clone() ).collect();

        assert!( !playlist.toggle_repeat() );
        assert!( playlist.toggle_repeat() );

        let order_after: Vec<String> =
            playlist.next_up.iter().map( |song| song.title.clone() ).collect();
        assert_eq!( order_after, order_before );
    }


    #[test]
    fn test_shuffle_on_init_queues_whole_registry() {
        let playlist = Playlist::new( songs( &[ "a", "b", "c", "d", "e", "f" ] ), true, true );

        assert_eq!( held_titles( &playlist ), [ "a", "b", "c", "d", "e", "f" ] );
    }


    #[test]
    fn test_repeat_refill_reloads_full_registry() {
        let mut playlist = Playlist::new( songs( &[ "a", "b", "c" ] ), false, true );
        playlist.next();
        playlist.next();
        playlist.next();

        // The refill pushes all three songs again; history keeps its own
        // references on top of that
        assert_eq!( playlist.next().unwrap().title, "a" );
        assert_eq!( playlist.history.len(), 3 );
        assert_eq!( playlist.next_up.len(), 2 );
        assert_eq!( held_titles( &playlist ).len(), 6 );
    }


    #[test]
    fn test_multiset_invariant_during_traversal() {
        let mut playlist = Playlist::new( songs( &[ "a", "b", "c", "d" ] ), false, false );
        let registry = [ "a", "b", "c", "d" ];

        for _ in 0..4 {
            playlist.next();
            assert_eq!( held_titles( &playlist ), registry );
        }
        for _ in 0..2 {
            playlist.previous();
            assert_eq!( held_titles( &playlist ), registry );
        }
    }


    #[test]
    fn test_initialize_skips_unreadable_paths() {
        let paths = vec![
            PathBuf::from( "/nonexistent/one.mp3" ),
            PathBuf::from( "/nonexistent/two.wav" ),
        ];

        let mut playlist = Playlist::initialize( &paths, false, true );
        assert!( playlist.is_empty() );
        assert!( playlist.next().is_none() );
    }


    #[test]
    fn test_initialize_reads_openable_files_with_fallbacks() {
        // Not valid audio, but openable: metadata extraction falls back
        // instead of dropping the entry
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join( "garbage.mp3" );
        std::fs::write( &path, b"not really audio" ).unwrap();

        let playlist = Playlist::initialize( &[ path ], false, true );
        assert_eq!( playlist.len(), 1 );
        assert_eq!( playlist.songs()[ 0 ].title, "garbage.mp3" );
        assert_eq!( playlist.songs()[ 0 ].artist, "No Data" );
    }
}
