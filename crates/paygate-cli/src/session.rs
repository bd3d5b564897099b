//! # Session Subcommands
//!
//! `login`, `logout`, and `whoami`.

use clap::Args;
use paygate_client::auth::LoginRequest;
use paygate_client::{ApiClient, AuthOutcome};

/// Arguments for the login subcommand.
#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Account email.
    #[arg(long)]
    pub email: String,

    /// Account password.
    #[arg(long, env = "PAYGATE_PASSWORD", hide_env_values = true)]
    pub password: String,
}

pub async fn login(client: &ApiClient, args: LoginArgs) -> anyhow::Result<()> {
    let outcome = client
        .auth()
        .login(&LoginRequest {
            email: args.email,
            password: args.password,
        })
        .await?;

    match outcome {
        AuthOutcome::SignedIn { user } => {
            let who = user.map(|u| u.email).unwrap_or_else(|| "unknown user".into());
            println!("signed in as {who}");
        }
        AuthOutcome::Acknowledged(ack) => {
            println!(
                "login accepted without a session: {}",
                ack.message.as_deref().unwrap_or("no message")
            );
        }
    }
    Ok(())
}

pub fn logout(client: &ApiClient) -> anyhow::Result<()> {
    client.logout()?;
    println!("signed out");
    Ok(())
}

pub fn whoami(client: &ApiClient) -> anyhow::Result<()> {
    if !client.is_authenticated() {
        anyhow::bail!("not signed in");
    }
    match client.current_user() {
        Some(user) => println!("{}", serde_json::to_string_pretty(&user)?),
        None => println!("signed in (no cached profile)"),
    }
    Ok(())
}
