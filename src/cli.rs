use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version, about = "Manage proxy share links and subscriptions", long_about = None)]
pub struct Args {
    #[arg(short, long, help = "Config file path", default_value = "sublink.toml")]
    pub config: PathBuf,

    #[arg(short, long, help = "Emit debug log")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    #[command(about = "Import share links from a file or stdin")]
    Import {
        #[arg(help = "File with one share link per line; stdin when omitted")]
        input: Option<PathBuf>,
    },

    #[command(about = "Print the stored list as share links")]
    Export {
        #[arg(long, help = "Emit legacy base64-JSON links")]
        legacy: bool,

        #[arg(long, help = "Emit one base64 bundle instead of plain lines")]
        bundle: bool,
    },

    #[command(about = "Fetch and ingest subscription sources")]
    Refresh {
        #[arg(long, help = "Only refresh sources flagged for auto update")]
        auto_only: bool,
    },

    #[command(about = "List stored servers")]
    List,

    #[command(about = "Print subscription sources as doaySub:// lines")]
    ExportSources,

    #[command(about = "Import doaySub:// lines from a file or stdin")]
    ImportSources {
        #[arg(help = "File with one doaySub:// line per line; stdin when omitted")]
        input: Option<PathBuf>,
    },

    #[command(about = "Add a subscription source")]
    AddSource {
        #[arg(help = "Display name")]
        name: String,

        #[arg(help = "Endpoint URL")]
        url: String,

        #[arg(long, help = "Free-form note stored with the source")]
        note: Option<String>,

        #[arg(long, help = "Endpoint serves HTML instead of a JSON feed")]
        html: bool,

        #[arg(long, help = "Fetch through the configured proxy")]
        proxy: bool,

        #[arg(long, help = "Include in auto-update refreshes")]
        auto: bool,
    },
}
