//! Player commands
//!
//! The token set accepted by the coordination loop, plus text parsing
//! for the TUI command line.

use thiserror::Error;


/// Errors that can occur during command parsing.
#[derive( Debug, Error )]
pub enum CommandError {
    #[error( "unknown command: {0}" )]
    Unknown( String ),

    #[error( "invalid argument: {0}" )]
    InvalidArgument( String ),

    #[error( "missing argument: {0}" )]
    MissingArgument( String ),
}


/// A command for the coordination loop.
#[derive( Debug, Clone, PartialEq, Eq )]
pub enum Command {
    /// Toggle pause on the active session.
    Pause,

    /// Close the current song and advance.
    Next,

    /// Close the current song and step back through history.
    Back,

    /// Toggle shuffle mode.
    Shuffle,

    /// Toggle repeat mode.
    Repeat,

    /// Set the volume, 0-100.
    Volume { level: u32 },

    /// Stop the coordination loop.
    Quit,
}


impl Command {
    /// Parses a command string (without the leading `/`).
    pub fn parse( input: &str ) -> Result<Self, CommandError> {
        let input = input.trim();
        let mut parts = input.splitn( 2, ' ' );
        let cmd = parts.next().unwrap_or( "" ).to_lowercase();
        let args = parts.next().map( |s| s.trim() );

        match cmd.as_str() {
            "pause" | "p" => Ok( Command::Pause ),
            "next" | "n" => Ok( Command::Next ),
            "back" | "b" | "prev" => Ok( Command::Back ),
            "shuffle" | "sh" => Ok( Command::Shuffle ),
            "repeat" | "rep" => Ok( Command::Repeat ),
            "vol" | "volume" => {
                let arg = args
                    .ok_or_else( || CommandError::MissingArgument( "volume level".into() ) )?;
                let level: u32 = arg.parse()
                    .map_err( |_| CommandError::InvalidArgument( format!( "invalid volume: {}", arg ) ) )?;
                if level > 100 {
                    return Err( CommandError::InvalidArgument(
                        format!( "volume out of range: {}", level )
                    ));
                }
                Ok( Command::Volume { level } )
            }
            "quit" | "q" | "exit" => Ok( Command::Quit ),

            "" => Err( CommandError::Unknown( "empty command".into() ) ),
            other => Err( CommandError::Unknown( other.to_string() ) ),
        }
    }
}


#[cfg( test )]
mod tests {
    use super::*;


    #[test]
    fn test_parse_playback_commands() {
        assert_eq!( Command::parse( "pause" ).unwrap(), Command::Pause );
        assert_eq!( Command::parse( "next" ).unwrap(), Command::Next );
        assert_eq!( Command::parse( "back" ).unwrap(), Command::Back );
        assert_eq!( Command::parse( "quit" ).unwrap(), Command::Quit );
    }


    #[test]
    fn test_parse_aliases() {
        assert_eq!( Command::parse( "p" ).unwrap(), Command::Pause );
        assert_eq!( Command::parse( "n" ).unwrap(), Command::Next );
        assert_eq!( Command::parse( "prev" ).unwrap(), Command::Back );
        assert_eq!( Command::parse( "sh" ).unwrap(), Command::Shuffle );
        assert_eq!( Command::parse( "rep" ).unwrap(), Command::Repeat );
        assert_eq!( Command::parse( "exit" ).unwrap(), Command::Quit );
    }


    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!( Command::parse( "PAUSE" ).unwrap(), Command::Pause );
        assert_eq!( Command::parse( "Shuffle" ).unwrap(), Command::Shuffle );
    }


    #[test]
    fn test_parse_volume() {
        assert_eq!( Command::parse( "vol 50" ).unwrap(), Command::Volume { level: 50 } );
        assert_eq!( Command::parse( "volume 100" ).unwrap(), Command::Volume { level: 100 } );
    }


    #[test]
    fn test_parse_volume_missing_level() {
        let result = Command::parse( "vol" );
        assert!( matches!( result, Err( CommandError::MissingArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_volume_out_of_range() {
        let result = Command::parse( "vol 150" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_volume_not_a_number() {
        let result = Command::parse( "vol loud" );
        assert!( matches!( result, Err( CommandError::InvalidArgument( _ ) ) ) );
    }


    #[test]
    fn test_parse_unknown() {
        let result = Command::parse( "foobar" );
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
    }


    #[test]
    fn test_parse_empty() {
        let result = Command::parse( "  " );
        assert!( matches!( result, Err( CommandError::Unknown( _ ) ) ) );
    }
}
