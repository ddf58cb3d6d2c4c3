use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "schat-server", about = "Schat messaging server")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config/schat.toml")]
    pub config: String,

    /// Address to listen on (overrides config)
    #[arg(long)]
    pub bind: Option<String>,
}
