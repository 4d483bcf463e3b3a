//! Audio decoding via Symphonia
//!
//! One decoder per playing song. The format reader is chosen by file
//! extension rather than content probing: the player only handles mp3
//! and wav, and anything else never reaches a decoder.

use std::fs::File;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{ Decoder as SymphoniaDecoder, DecoderOptions, CODEC_TYPE_NULL };
use symphonia::core::formats::{ FormatOptions, FormatReader };
use symphonia::core::io::MediaSourceStream;
use symphonia::default::formats::{ MpaReader, WavReader };
use thiserror::Error;


/// Playable formats, keyed by file extension.
#[derive( Debug, Clone, Copy, PartialEq, Eq )]
pub enum SongFormat {
    Mp3,
    Wav,
}


impl SongFormat {
    /// Maps a file extension to its format, or None for anything the
    /// player does not handle.
    pub fn from_path( path: &Path ) -> Option<Self> {
        match path
            .extension()
            .and_then( |e| e.to_str() )
            .map( |e| e.to_lowercase() )
            .as_deref()
        {
            Some( "mp3" ) => Some( SongFormat::Mp3 ),
            Some( "wav" ) => Some( SongFormat::Wav ),
            _ => None,
        }
    }
}


/// Errors that can occur while opening or decoding a stream.
#[derive( Debug, Error )]
pub enum DecoderError {
    #[error( "failed to open file: {0}" )]
    FileOpen( #[from] std::io::Error ),

    #[error( "unreadable stream: {0}" )]
    Format( String ),

    #[error( "no audio track found" )]
    NoAudioTrack,

    #[error( "decoder creation failed: {0}" )]
    DecoderCreation( String ),

    #[error( "decode error: {0}" )]
    Decode( String ),
}


/// Decoder for a single audio file.
pub struct Decoder {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn SymphoniaDecoder>,
    track_id: u32,
    sample_rate: u32,
    channels: usize,
    total_frames: Option<u64>,
    sample_buf: Option<SampleBuffer<f32>>,
}


impl Decoder {
    /// Opens `path` with the reader for `format`.
    pub fn open( path: &Path, format: SongFormat ) -> Result<Self, DecoderError> {
        let file = File::open( path )?;
        let mss = MediaSourceStream::new( Box::new( file ), Default::default() );

        let format_opts = FormatOptions::default();
        let format_reader: Box<dyn FormatReader> = match format {
            SongFormat::Mp3 => Box::new(
                MpaReader::try_new( mss, &format_opts )
                    .map_err( |e| DecoderError::Format( e.to_string() ) )?,
            ),
            SongFormat::Wav => Box::new(
                WavReader::try_new( mss, &format_opts )
                    .map_err( |e| DecoderError::Format( e.to_string() ) )?,
            ),
        };

        // Find the first audio track
        let track = format_reader
            .tracks()
            .iter()
            .find( |t| t.codec_params.codec != CODEC_TYPE_NULL )
            .ok_or( DecoderError::NoAudioTrack )?;

        let track_id = track.id;
        let codec_params = &track.codec_params;

        let sample_rate = codec_params.sample_rate.unwrap_or( 44100 );
        let channels = codec_params.channels.map( |c| c.count() ).unwrap_or( 2 );
        let total_frames = codec_params.n_frames;

        tracing::info!(
            "Opened {:?} audio: {} Hz, {} channels, {:?} total frames",
            format,
            sample_rate,
            channels,
            total_frames
        );

        let decoder = symphonia::default::get_codecs()
            .make( codec_params, &DecoderOptions::default() )
            .map_err( |e| DecoderError::DecoderCreation( e.to_string() ) )?;

        Ok( Self {
            format_reader,
            decoder,
            track_id,
            sample_rate,
            channels,
            total_frames,
            sample_buf: None,
        })
    }


    /// Returns the sample rate of the audio.
    pub fn sample_rate( &self ) -> u32 {
        self.sample_rate
    }


    /// Returns the number of channels.
    pub fn channels( &self ) -> usize {
        self.channels
    }


    /// Returns the stream length in frames, when the container knows it.
    pub fn total_frames( &self ) -> Option<u64> {
        self.total_frames
    }


    /// Decodes the next packet and returns interleaved f32 samples.
    ///
    /// Returns None when the end of the stream is reached.
    pub fn decode_next( &mut self ) -> Result<Option<Vec<f32>>, DecoderError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok( packet ) => packet,
                Err( symphonia::core::errors::Error::IoError( ref e ) )
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    return Ok( None ); // EOF
                }
                Err( e ) => {
                    return Err( DecoderError::Decode( e.to_string() ) );
                }
            };

            // Skip packets not for our track
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode( &packet ) {
                Ok( decoded ) => decoded,
                Err( symphonia::core::errors::Error::DecodeError( _ ) ) => {
                    // Per-packet corruption is recoverable, skip it
                    continue;
                }
                Err( e ) => {
                    return Err( DecoderError::Decode( e.to_string() ) );
                }
            };

            let spec = *decoded.spec();

            if self.sample_buf.is_none() {
                self.sample_buf = Some( SampleBuffer::new( decoded.capacity() as u64, spec ) );
            }

            let sample_buf = self.sample_buf.as_mut().unwrap();
            sample_buf.copy_interleaved_ref( decoded );

            return Ok( Some( sample_buf.samples().to_vec() ) );
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_format_from_extension() {
        assert_eq!( SongFormat::from_path( Path::new( "a.mp3" ) ), Some( SongFormat::Mp3 ) );
        assert_eq!( SongFormat::from_path( Path::new( "b.wav" ) ), Some( SongFormat::Wav ) );
        assert_eq!( SongFormat::from_path( Path::new( "loud.WAV" ) ), Some( SongFormat::Wav ) );
    }


    #[test]
    fn test_unhandled_extensions_rejected() {
        assert_eq!( SongFormat::from_path( Path::new( "c.ogg" ) ), None );
        assert_eq!( SongFormat::from_path( Path::new( "notes.txt" ) ), None );
        assert_eq!( SongFormat::from_path( Path::new( "no_extension" ) ), None );
    }
}
