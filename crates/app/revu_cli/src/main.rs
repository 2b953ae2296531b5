// Import and re-export the `error` module
pub use self::error::{Error, Result};
mod error;

use clap::Parser;
use cli::{Cli, Commands, SessionCommands};

mod cli;
mod commands;
mod logging;

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = run().await {
        log::error!("{}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    logging::init()?;

    let args = Cli::parse();

    if let Commands::Version = &args.command {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let ctx = commands::Context::open(args.api_url.as_deref(), args.data_dir.as_deref())?;

    match args.command {
        Commands::Version => {}
        Commands::Login {
            username,
            password,
            register,
        } => {
            commands::login(
                &ctx,
                username.unwrap_or_default(),
                password.unwrap_or_default(),
                register,
            )
            .await?
        }
        Commands::Logout => commands::logout(&ctx),
        Commands::Whoami => commands::whoami(&ctx),
        Commands::Status => commands::status(&ctx),
        Commands::Refresh => commands::refresh(&ctx).await?,
        Commands::Watch { interval_secs } => commands::watch(&ctx, interval_secs).await?,
        Commands::Sessions(SessionCommands::List) => commands::list_sessions(&ctx).await,
        Commands::Sessions(SessionCommands::Revoke { id }) => {
            commands::revoke_session(&ctx, &id).await?
        }
        Commands::Sessions(SessionCommands::RevokeOthers) => {
            commands::revoke_other_sessions(&ctx).await?
        }
    }

    Ok(())
}
