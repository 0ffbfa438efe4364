use clap::Parser;

/// One command: `-t/--type` selects the stage this process drives,
/// `-f/--file` feeds seed links from a file (may be repeated), and any
/// positional arguments are seed links too.
#[derive(Parser, Debug)]
#[command(name = "darc", about = "Distributed darkweb work-queue & fetch engine")]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(short = 'c', long = "config", default_value = "config/default.toml")]
    pub config: String,

    /// Which stage this process drives: `crawler` (hostname + requests
    /// queues) or `loader` (selenium queue).
    #[arg(short = 't', long = "type")]
    pub r#type: String,

    /// A file of seed links, one per line. May be given multiple times.
    #[arg(short = 'f', long = "file")]
    pub file: Vec<String>,

    /// Seed links given directly on the command line.
    pub links: Vec<String>,
}
