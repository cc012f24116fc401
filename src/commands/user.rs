use anyhow::{Context as _, Result};
use fleetkit::{Client, FileSessionStore};

use crate::Context;
use crate::cli::UserArgs;
use crate::ui;

/// Log in (keeping the session for later runs) or log out.
pub fn run(ctx: &Context, args: &UserArgs) -> Result<i32> {
    let config = super::load_config(ctx)?;
    let api_url = &config.config.server.api_url;

    if args.login {
        // no release(): the saved session is reused by later runs
        let client = super::connect(&config)?;
        if !ctx.quiet {
            ui::success(&format!(
                "Logged in to {api_url} as {}",
                client.username().unwrap_or("unknown")
            ));
        }
        return Ok(0);
    }

    let store = FileSessionStore::new(config.session_file());
    let mut client = Client::new(&config.config.http_settings(), Box::new(store));
    client
        .logout()
        .with_context(|| format!("Could not log out from {api_url}"))?;
    if !ctx.quiet {
        ui::success(&format!("Logged out from {api_url}"));
    }
    Ok(0)
}
