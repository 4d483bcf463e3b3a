//! Song records and metadata extraction.

use std::fs::File;
use std::path::{ Path, PathBuf };

use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::{ MetadataOptions, StandardTagKey, Tag };
use symphonia::core::probe::Hint;


/// Fallback shown when a tag is missing or empty.
const NO_DATA: &str = "No Data";


/// One entry in the song registry.
///
/// Built once during playlist initialization and never mutated afterward;
/// the playlist stacks share entries via `Arc<Song>`.
#[derive( Debug, Clone, PartialEq, Eq )]
pub struct Song {
    pub path: PathBuf,
    pub title: String,
    pub artist: String,
    pub album: String,
}


impl Song {
    /// Reads the song at `path`, extracting title/artist/album tags.
    ///
    /// Returns None when the file cannot be opened at all; such paths are
    /// dropped from the playlist rather than kept as unplayable
    /// placeholders. A file that opens but yields no usable tags gets the
    /// fallback values: the file basename for the title, "No Data" for
    /// artist and album.
    pub fn read( path: &Path ) -> Option<Self> {
        let file = match File::open( path ) {
            Ok( file ) => file,
            Err( e ) => {
                tracing::warn!( "Skipping {:?}: {}", path, e );
                return None;
            }
        };

        let mss = MediaSourceStream::new( Box::new( file ), Default::default() );

        let mut hint = Hint::new();
        if let Some( ext ) = path.extension().and_then( |e| e.to_str() ) {
            hint.with_extension( ext );
        }

        let mut title = None;
        let mut artist = None;
        let mut album = None;

        match symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        ) {
            Ok( mut probed ) => {
                // ID3 and similar side-channel tags come from the probe;
                // in-container tags from the format reader.
                if let Some( metadata ) = probed.metadata.get() {
                    if let Some( revision ) = metadata.current() {
                        collect_tags( revision.tags(), &mut title, &mut artist, &mut album );
                    }
                }
                if let Some( revision ) = probed.format.metadata().current() {
                    collect_tags( revision.tags(), &mut title, &mut artist, &mut album );
                }
            }
            Err( e ) => {
                tracing::debug!( "No metadata for {:?}: {}", path, e );
            }
        }

        Some( Self::with_fallbacks( path, title, artist, album ) )
    }


    /// Applies the documented fallbacks to optional tag values.
    fn with_fallbacks(
        path: &Path,
        title: Option<String>,
        artist: Option<String>,
        album: Option<String>,
    ) -> Self {
        let basename = || {
            path.file_name()
                .map( |n| n.to_string_lossy().to_string() )
                .unwrap_or_else( || path.to_string_lossy().to_string() )
        };

        Self {
            path: path.to_path_buf(),
            title: title.filter( |t| !t.is_empty() ).unwrap_or_else( basename ),
            artist: artist.filter( |a| !a.is_empty() ).unwrap_or_else( || NO_DATA.to_string() ),
            album: album.filter( |a| !a.is_empty() ).unwrap_or_else( || NO_DATA.to_string() ),
        }
    }
}


fn collect_tags(
    tags: &[Tag],
    title: &mut Option<String>,
    artist: &mut Option<String>,
    album: &mut Option<String>,
) {
    for tag in tags {
        if let Some( key ) = tag.std_key {
            let value = tag.value.to_string();
            match key {
                StandardTagKey::TrackTitle if title.is_none() => *title = Some( value ),
                StandardTagKey::Artist if artist.is_none() => *artist = Some( value ),
                StandardTagKey::Album if album.is_none() => *album = Some( value ),
                _ => {}
            }
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_fallbacks_for_missing_tags() {
        let song = Song::with_fallbacks( Path::new( "/music/futuristic.wav" ), None, None, None );
        assert_eq!( song.title, "futuristic.wav" );
        assert_eq!( song.artist, "No Data" );
        assert_eq!( song.album, "No Data" );
    }


    #[test]
    fn test_fallbacks_for_empty_tags() {
        let song = Song::with_fallbacks(
            Path::new( "/music/track.mp3" ),
            Some( String::new() ),
            Some( String::new() ),
            Some( String::new() ),
        );
        assert_eq!( song.title, "track.mp3" );
        assert_eq!( song.artist, "No Data" );
        assert_eq!( song.album, "No Data" );
    }


    #[test]
    fn test_present_tags_kept() {
        let song = Song::with_fallbacks(
            Path::new( "/music/01 Tautou.mp3" ),
            Some( "Tautou".to_string() ),
            Some( "Brand New".to_string() ),
            Some( "Deja Entendu".to_string() ),
        );
        assert_eq!( song.title, "Tautou" );
        assert_eq!( song.artist, "Brand New" );
        assert_eq!( song.album, "Deja Entendu" );
    }


    #[test]
    fn test_read_skips_missing_file() {
        assert!( Song::read( Path::new( "/nonexistent/missing.mp3" ) ).is_none() );
    }
}
