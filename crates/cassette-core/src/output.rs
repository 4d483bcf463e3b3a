//! Audio output via cpal
//!
//! The output device is opened once per process and reused; each song
//! gets its own stream on that device, fed from a shared sample buffer.

use std::collections::VecDeque;
use std::sync::atomic::{ AtomicBool, AtomicU32, Ordering };
use std::sync::{ Arc, Mutex };

use cpal::traits::{ DeviceTrait, HostTrait, StreamTrait };
use thiserror::Error;


/// Errors that can occur with audio output.
#[derive( Debug, Error )]
pub enum OutputError {
    #[error( "no output device available" )]
    NoDevice,

    #[error( "failed to get stream config: {0}" )]
    StreamConfig( String ),

    #[error( "unsupported channel count: {0}" )]
    UnsupportedChannels( u16 ),

    #[error( "failed to build output stream: {0}" )]
    BuildStream( String ),

    #[error( "failed to start stream: {0}" )]
    PlayStream( String ),
}


/// Sample queue shared between the decode thread and the audio callback.
///
/// Carries the pause flag and volume as well: this is the only state the
/// coordination loop shares with the audio side, and every access goes
/// through the internal mutex or an atomic.
pub struct SharedBuffer {
    queue: Mutex<VecDeque<f32>>,
    capacity: usize,
    paused: AtomicBool,
    /// Volume level stored as f32 bits
    volume: AtomicU32,
    source_channels: u16,
    output_channels: u16,
}


impl SharedBuffer {
    fn new( capacity: usize, source_channels: u16, output_channels: u16 ) -> Self {
        Self {
            queue: Mutex::new( VecDeque::with_capacity( capacity ) ),
            capacity,
            paused: AtomicBool::new( false ),
            volume: AtomicU32::new( 1.0_f32.to_bits() ),
            source_channels,
            output_channels,
        }
    }


    /// Pushes samples to the queue. Returns the number actually pushed.
    pub fn push( &self, samples: &[f32] ) -> usize {
        let mut queue = self.queue.lock().unwrap();
        let available = self.capacity.saturating_sub( queue.len() );
        let to_push = samples.len().min( available );
        queue.extend( samples[ ..to_push ].iter().copied() );
        to_push
    }


    /// Fills `output` from the queue, converting channel layout and
    /// applying volume. Pops nothing and outputs silence while paused.
    pub fn pop( &self, output: &mut [f32] ) {
        output.fill( 0.0 );

        if self.paused.load( Ordering::Relaxed ) {
            return;
        }

        let volume = f32::from_bits( self.volume.load( Ordering::Relaxed ) );
        let mut queue = self.queue.lock().unwrap();
        let src = self.source_channels as usize;
        let out = self.output_channels as usize;

        let frames = ( output.len() / out ).min( queue.len() / src );

        for frame in 0..frames {
            match ( src, out ) {
                // Mono to stereo: duplicate each sample
                ( 1, 2 ) => {
                    let sample = queue.pop_front().unwrap() * volume;
                    output[ frame * 2 ] = sample;
                    output[ frame * 2 + 1 ] = sample;
                }
                // Stereo to mono: mix down
                ( 2, 1 ) => {
                    let left = queue.pop_front().unwrap();
                    let right = queue.pop_front().unwrap();
                    output[ frame ] = ( left + right ) * 0.5 * volume;
                }
                // Same count either way; anything else was refused at
                // stream setup
                _ => {
                    for ch in 0..out {
                        output[ frame * out + ch ] = queue.pop_front().unwrap() * volume;
                    }
                }
            }
        }
    }


    /// Returns the number of samples currently queued.
    pub fn len( &self ) -> usize {
        self.queue.lock().unwrap().len()
    }


    /// Returns true if the queue is empty.
    pub fn is_empty( &self ) -> bool {
        self.queue.lock().unwrap().is_empty()
    }


    /// Clears the queue.
    pub fn clear( &self ) {
        self.queue.lock().unwrap().clear();
    }


    /// Flips the pause flag, returning the new state.
    pub fn toggle_paused( &self ) -> bool {
        !self.paused.fetch_xor( true, Ordering::Relaxed )
    }


    /// Gets the pause flag.
    pub fn is_paused( &self ) -> bool {
        self.paused.load( Ordering::Relaxed )
    }


    /// Sets the volume level (0.0 = mute, 1.0 = normal).
    pub fn set_volume( &self, volume: f32 ) {
        self.volume.store( volume.to_bits(), Ordering::Relaxed );
    }
}


/// Handle to the system output device.
///
/// Opened once per process; every stream is built on the same device.
pub struct AudioDevice {
    device: cpal::Device,
}


impl AudioDevice {
    /// Opens the default output device.
    pub fn open() -> Result<Self, OutputError> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or( OutputError::NoDevice )?;

        tracing::info!( "Using output device: {:?}", device.name() );

        Ok( Self { device } )
    }


    /// Builds a stream for one song.
    ///
    /// Returns the stream and the shared buffer the decode thread should
    /// feed. Only mono and stereo sources are accepted; the buffer
    /// handles conversion when the device side differs.
    pub fn open_stream(
        &self,
        source_sample_rate: u32,
        source_channels: u16,
    ) -> Result<( OutputStream, Arc<SharedBuffer> ), OutputError> {
        if source_channels == 0 || source_channels > 2 {
            return Err( OutputError::UnsupportedChannels( source_channels ) );
        }

        let supported: Vec<_> = self.device
            .supported_output_configs()
            .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?
            .filter( |c| c.channels() == 1 || c.channels() == 2 )
            .collect();

        // Prefer an exact match, then any mono/stereo config at the
        // source rate, then the device default. The default may not run
        // at the source rate, which shifts playback speed, so warn.
        let config = if let Some( supported_config ) = supported.iter().find( |c| {
            c.channels() == source_channels
                && c.min_sample_rate().0 <= source_sample_rate
                && c.max_sample_rate().0 >= source_sample_rate
        }) {
            supported_config.clone()
                .with_sample_rate( cpal::SampleRate( source_sample_rate ) )
                .config()
        } else if let Some( supported_config ) = supported.iter().find( |c| {
            c.min_sample_rate().0 <= source_sample_rate
                && c.max_sample_rate().0 >= source_sample_rate
        }) {
            tracing::info!(
                "Channel conversion: file has {} channels, device using {}",
                source_channels,
                supported_config.channels()
            );
            supported_config.clone()
                .with_sample_rate( cpal::SampleRate( source_sample_rate ) )
                .config()
        } else {
            let default_config = self.device
                .default_output_config()
                .map_err( |e| OutputError::StreamConfig( e.to_string() ) )?;
            tracing::warn!(
                "No {} Hz output config; device default is {} Hz, playback speed may be off",
                source_sample_rate,
                default_config.sample_rate().0
            );
            default_config.config()
        };

        if config.channels == 0 || config.channels > 2 {
            return Err( OutputError::UnsupportedChannels( config.channels ) );
        }

        tracing::info!(
            "Audio output config: {} Hz, {} channels",
            config.sample_rate.0,
            config.channels
        );

        // ~500ms of headroom between decoding and playback
        let capacity = ( source_sample_rate as usize ) * ( source_channels as usize ) / 2;
        let buffer = Arc::new( SharedBuffer::new( capacity, source_channels, config.channels ) );
        let callback_buffer = Arc::clone( &buffer );

        let stream = self.device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback_buffer.pop( data );
                },
                |err| {
                    tracing::error!( "Audio output error: {}", err );
                },
                None,
            )
            .map_err( |e| OutputError::BuildStream( e.to_string() ) )?;

        Ok(( OutputStream { stream }, buffer ))
    }
}


/// One song's output stream.
///
/// Note: NOT Send/Sync due to cpal::Stream. The playback session wraps
/// it accordingly and is the only component that touches it after
/// creation.
pub struct OutputStream {
    stream: cpal::Stream,
}


impl OutputStream {
    /// Starts audio output.
    pub fn play( &self ) -> Result<(), OutputError> {
        self.stream
            .play()
            .map_err( |e| OutputError::PlayStream( e.to_string() ) )
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_push_respects_capacity() {
        let buffer = SharedBuffer::new( 4, 2, 2 );
        assert_eq!( buffer.push( &[ 0.1, 0.2, 0.3 ] ), 3 );
        assert_eq!( buffer.push( &[ 0.4, 0.5 ] ), 1 );
        assert_eq!( buffer.len(), 4 );
    }


    #[test]
    fn test_pop_passthrough_applies_volume() {
        let buffer = SharedBuffer::new( 8, 2, 2 );
        buffer.set_volume( 0.5 );
        buffer.push( &[ 1.0, 1.0, 1.0, 1.0 ] );

        let mut out = [ 0.0; 4 ];
        buffer.pop( &mut out );
        assert_eq!( out, [ 0.5, 0.5, 0.5, 0.5 ] );
        assert!( buffer.is_empty() );
    }


    #[test]
    fn test_pop_mono_to_stereo() {
        let buffer = SharedBuffer::new( 8, 1, 2 );
        buffer.push( &[ 0.25, 0.75 ] );

        let mut out = [ 0.0; 4 ];
        buffer.pop( &mut out );
        assert_eq!( out, [ 0.25, 0.25, 0.75, 0.75 ] );
    }


    #[test]
    fn test_pop_stereo_to_mono_mixes() {
        let buffer = SharedBuffer::new( 8, 2, 1 );
        buffer.push( &[ 0.2, 0.4, 1.0, 0.0 ] );

        let mut out = [ 0.0; 2 ];
        buffer.pop( &mut out );
        assert!(( out[ 0 ] - 0.3 ).abs() < f32::EPSILON );
        assert!(( out[ 1 ] - 0.5 ).abs() < f32::EPSILON );
    }


    #[test]
    fn test_paused_outputs_silence_without_draining() {
        let buffer = SharedBuffer::new( 8, 2, 2 );
        buffer.push( &[ 1.0, 1.0 ] );
        assert!( buffer.toggle_paused() );

        let mut out = [ 0.5; 2 ];
        buffer.pop( &mut out );
        assert_eq!( out, [ 0.0, 0.0 ] );
        assert_eq!( buffer.len(), 2 );

        // Toggling twice restores the original state
        assert!( !buffer.toggle_paused() );
        buffer.pop( &mut out );
        assert_eq!( out, [ 1.0, 1.0 ] );
    }
}
