// Scheduling commands (patch, migrate, upgrade, utils)
pub mod schedule;

// Ledger reconciliation
pub mod validate;

// Session management
pub mod user;

use anyhow::{Context as _, Result};
use fleetkit::{Client, FileSessionStore};

use crate::Context;
use crate::config::LoadedConfig;

/// Build a client for the configured server, resuming the saved session
/// when the server still accepts it and logging in otherwise.
pub fn connect(config: &LoadedConfig) -> Result<Client> {
    let store = FileSessionStore::new(config.session_file());
    let mut client = Client::new(&config.config.http_settings(), Box::new(store));

    let resumed = client
        .resume()
        .with_context(|| format!("Could not reach {}", config.config.server.api_url))?;
    if !resumed {
        let credentials = config.config.credentials()?;
        client
            .login(&credentials)
            .with_context(|| format!("Could not log in to {}", config.config.server.api_url))?;
    }
    Ok(client)
}

/// Load the config named on the command line, or the default one.
pub fn load_config(ctx: &Context) -> Result<LoadedConfig> {
    LoadedConfig::load(ctx.config.as_deref())
}

/// What to try next when `error` comes from the fleet server client.
pub fn advice(error: &anyhow::Error) -> Option<&'static str> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<fleetkit::Error>())
        .map(|e| e.category().advice())
}
