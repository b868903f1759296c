//! Login, logout, status and keepalive.

use std::io::{self, BufRead, Write};

use anyhow::{bail, Context as _, Result};
use clap::Args;
use oncovision_core::auth::AuthEvent;
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use super::{Context, LOGIN_HINT};

/// Environment variable supplying the username
const ENV_USERNAME: &str = "ONCOVISION_USERNAME";

/// Environment variable supplying the password (for scripted logins)
const ENV_PASSWORD: &str = "ONCOVISION_PASSWORD";

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Username (default: last used)
    #[arg(short, long, env = ENV_USERNAME)]
    pub username: Option<String>,
}

pub async fn login(args: LoginArgs, ctx: &mut Context) -> Result<()> {
    let username = match args.username.or_else(|| ctx.config.last_username.clone()) {
        Some(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => prompt_username()?,
    };
    let password = match std::env::var(ENV_PASSWORD) {
        Ok(password) if !password.is_empty() => password,
        _ => rpassword::prompt_password(format!("Password for {}: ", username))
            .context("Failed to read password")?,
    };

    ctx.session.login(&username, &password).await?;

    if ctx.config.last_username.as_deref() != Some(username.as_str()) {
        ctx.config.last_username = Some(username.clone());
        if let Err(e) = ctx.config.save() {
            warn!(error = %e, "Failed to remember username");
        }
    }

    println!("Signed in as {}.", username);
    Ok(())
}

fn prompt_username() -> Result<String> {
    print!("Username: ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    let input = input.trim();
    if input.is_empty() {
        bail!("No username given");
    }
    Ok(input.to_string())
}

pub fn logout(ctx: &Context) -> Result<()> {
    let was = ctx.session.username();
    ctx.session.logout();
    match was {
        Some(name) => println!("Signed out {}.", name),
        None => println!("No session to sign out of."),
    }
    Ok(())
}

pub fn status(ctx: &Context) -> Result<()> {
    let session = ctx.session.session();
    let interval = ctx.session.renewal_interval().as_secs();

    let report = json!({
        "api_base_url": ctx.api.client().base_url().as_str(),
        "signed_in": ctx.session.is_authenticated(),
        "username": ctx.session.username(),
        "has_refresh_token": session.refresh_token.is_some(),
        "credential_store": ctx.session.store_backend(),
        "renewal_interval_secs": interval,
    });
    if ctx.print_json(&report)? {
        return Ok(());
    }

    println!("API:         {}", ctx.api.client().base_url());
    println!("Store:       {}", ctx.session.store_backend());
    match ctx.session.username() {
        Some(name) => {
            println!("Signed in:   {}", name);
            println!("Renewal:     every {}s while a command runs", interval);
            if !session.is_consistent() {
                println!("Warning:     stored session is incomplete; renewal will fail. {}", LOGIN_HINT);
            }
        }
        None => println!("Signed in:   no ({})", LOGIN_HINT),
    }
    Ok(())
}

/// Keep the session alive until Ctrl-C or until the session is ended.
pub async fn keepalive(ctx: &Context) -> Result<()> {
    ctx.require_session()?;
    let mut events = ctx.session.subscribe();

    println!(
        "Keeping the session for {} alive (renewing every {}s). Press Ctrl-C to stop.",
        ctx.session.username().unwrap_or_default(),
        ctx.session.renewal_interval().as_secs()
    );

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Keepalive interrupted");
                println!("Stopped. The session stays stored.");
                return Ok(());
            }
            event = events.recv() => match event {
                Ok(AuthEvent::TokenRenewed) => {
                    info!("Access token renewed");
                    if let Some(at) = ctx.session.last_renewal() {
                        println!("Renewed at {}", at.format("%H:%M:%S"));
                    }
                }
                // The reason is reported once the command returns
                Ok(AuthEvent::LoginRequired { .. }) => bail!("Session ended"),
                Ok(AuthEvent::LoggedOut) => bail!("Signed out elsewhere"),
                Ok(AuthEvent::LoggedIn { .. }) => {}
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed session events"),
                Err(RecvError::Closed) => return Ok(()),
            }
        }
    }
}
