//! Music file discovery
//!
//! Recursive scanning of the directories named on the command line,
//! filtered down to the formats the player handles.

use std::path::{ Path, PathBuf };

use thiserror::Error;


/// Playable extensions; everything else is filtered out before the
/// playlist ever sees it.
const SUPPORTED_EXTENSIONS: &[&str] = &[ "mp3", "wav" ];


/// Errors that can occur during discovery.
#[derive( Debug, Error )]
pub enum LibraryError {
    #[error( "IO error: {0}" )]
    Io( #[from] std::io::Error ),

    #[error( "path not found: {0}" )]
    NotFound( PathBuf ),
}


/// Recursive scanner over one or more root directories.
pub struct LibraryScanner {
    roots: Vec<PathBuf>,
}


impl LibraryScanner {
    /// Creates a new scanner with no root directories.
    pub fn new() -> Self {
        Self { roots: Vec::new() }
    }


    /// Adds a root directory to scan.
    pub fn add_root( &mut self, path: PathBuf ) {
        if !self.roots.contains( &path ) {
            self.roots.push( path );
        }
    }


    /// Scans every root and returns the playable files found.
    ///
    /// Entries are visited in name order so the resulting playlist
    /// order is deterministic across platforms. Inaccessible subtrees
    /// are skipped; a missing root is an error.
    pub fn scan( &self ) -> Result<Vec<PathBuf>, LibraryError> {
        let mut files = Vec::new();

        for root in &self.roots {
            tracing::info!( "Scanning: {:?}", root );
            scan_recursive( root, &mut files )?;
        }

        tracing::info!( "Found {} playable files", files.len() );
        Ok( files )
    }
}


impl Default for LibraryScanner {
    fn default() -> Self {
        Self::new()
    }
}


fn scan_recursive( dir: &Path, files: &mut Vec<PathBuf> ) -> Result<(), LibraryError> {
    let entries = match std::fs::read_dir( dir ) {
        Ok( entries ) => entries,
        Err( e ) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            tracing::warn!( "Access denied: {:?}", dir );
            return Ok(()); // Skip inaccessible directories
        }
        Err( e ) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err( LibraryError::NotFound( dir.to_path_buf() ) );
        }
        Err( e ) => return Err( LibraryError::Io( e ) ),
    };

    let mut paths: Vec<PathBuf> = entries.flatten().map( |entry| entry.path() ).collect();
    paths.sort();

    for path in paths {
        if path.is_dir() {
            scan_recursive( &path, files )?;
        } else if is_audio_file( &path ) {
            files.push( path );
        }
    }

    Ok(())
}


/// Checks for a playable file extension, case-insensitively.
pub fn is_audio_file( path: &Path ) -> bool {
    path.extension()
        .and_then( |e| e.to_str() )
        .map( |e| SUPPORTED_EXTENSIONS.contains( &e.to_lowercase().as_str() ) )
        .unwrap_or( false )
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_is_audio_file() {
        assert!( is_audio_file( Path::new( "song.mp3" ) ) );
        assert!( is_audio_file( Path::new( "Song.MP3" ) ) );
        assert!( is_audio_file( Path::new( "drums.wav" ) ) );
        assert!( !is_audio_file( Path::new( "cover.png" ) ) );
        assert!( !is_audio_file( Path::new( "album.ogg" ) ) );
        assert!( !is_audio_file( Path::new( "README" ) ) );
    }


    #[test]
    fn test_scan_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join( "sub" );
        std::fs::create_dir( &sub ).unwrap();

        std::fs::write( dir.path().join( "b.mp3" ), b"" ).unwrap();
        std::fs::write( dir.path().join( "a.wav" ), b"" ).unwrap();
        std::fs::write( dir.path().join( "notes.txt" ), b"" ).unwrap();
        std::fs::write( sub.join( "c.mp3" ), b"" ).unwrap();

        let mut scanner = LibraryScanner::new();
        scanner.add_root( dir.path().to_path_buf() );
        let files = scanner.scan().unwrap();

        let names: Vec<_> = files
            .iter()
            .map( |p| p.file_name().unwrap().to_string_lossy().to_string() )
            .collect();
        assert_eq!( names, [ "a.wav", "b.mp3", "c.mp3" ] );
    }


    #[test]
    fn test_scan_missing_root_is_an_error() {
        let mut scanner = LibraryScanner::new();
        scanner.add_root( PathBuf::from( "/nonexistent/music" ) );
        assert!( matches!( scanner.scan(), Err( LibraryError::NotFound( _ ) ) ) );
    }
}
