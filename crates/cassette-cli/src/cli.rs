//! Command-line argument parsing for Cassette.

use std::path::PathBuf;

use clap::Parser;


/// Cassette - a terminal music player.
#[derive( Parser, Debug )]
#[command( name = "cassette" )]
#[command( version, about, long_about = None )]
pub struct Args {
    /// Start with shuffle enabled.
    #[arg( short, long )]
    pub shuffle: bool,

    /// Start with repeat disabled.
    #[arg( long )]
    pub no_repeat: bool,

    /// Files and directories to play.
    #[arg( trailing_var_arg = true, required = true )]
    pub files: Vec<PathBuf>,
}
