//! # paygate CLI Entry Point
//!
//! Assembles subcommands and dispatches to handler modules.

use clap::Parser;
use paygate_cli::GlobalArgs;

/// Gateway API CLI: sign in and issue authenticated requests.
#[derive(Parser, Debug)]
#[command(name = "paygate", version, about)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Sign in and store the session.
    Login(paygate_cli::session::LoginArgs),
    /// Destroy the stored session.
    Logout,
    /// Show the signed-in user.
    Whoami,
    /// Send a request through the authenticated client.
    Request(paygate_cli::request::RequestArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity level.
    tracing_subscriber::fmt()
        .with_env_filter(paygate_cli::log_filter(cli.global.verbose))
        .with_writer(std::io::stderr)
        .init();
    let client = paygate_cli::connect(&cli.global)?;

    match cli.command {
        Commands::Login(args) => paygate_cli::session::login(&client, args).await,
        Commands::Logout => paygate_cli::session::logout(&client),
        Commands::Whoami => paygate_cli::session::whoami(&client),
        Commands::Request(args) => paygate_cli::request::run(&client, args).await,
    }
}
