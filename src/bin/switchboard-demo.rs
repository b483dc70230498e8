//! Command-line walk through the auth facade.
//!
//! ```text
//! switchboard-demo [provider] [username|email] [password]
//! ```
//!
//! Provider settings come from the environment (see `AuthConfig::from_env`).

use anyhow::Context;
use core_auth::{AuthFacade, LoginOptions, ProviderKind};
use core_runtime::config::{AuthConfig, HostBridges};
use core_runtime::logging::{init_logging, LoggingConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging(LoggingConfig::from_env()).context("failed to initialize logging")?;

    let mut args = std::env::args().skip(1);
    let provider = args.next();
    let identity = args.next();
    let password = args.next();

    let config = AuthConfig::from_env().context("invalid auth configuration")?;
    let bridges = HostBridges::builder()
        .build()
        .await
        .context("failed to set up platform bridges")?;
    let facade = AuthFacade::new(config, bridges);

    if let Some(provider) = provider.as_deref() {
        facade
            .set_provider(provider)
            .await
            .with_context(|| format!("cannot switch to provider '{}'", provider))?;
    }

    facade.init_auth().await.context("init_auth failed")?;
    print_state(&facade);

    let identity_field = match facade.current_provider() {
        ProviderKind::Backend => "email",
        _ => "username",
    };
    let mut options = LoginOptions::new();
    if let Some(identity) = identity {
        options = options.with(identity_field, identity);
    }
    if let Some(password) = password {
        options = options.with("password", password);
    }

    let success = facade.login(options).await.context("login failed")?;
    info!(success, "Login finished");
    print_state(&facade);

    Ok(())
}

fn print_state(facade: &AuthFacade) {
    let state = facade.state();
    println!(
        "provider={} ({}) authenticated={} loading={} error={}",
        state.provider,
        state.provider.display_name(),
        state.is_authenticated,
        state.loading,
        state.error.as_deref().unwrap_or("-")
    );
}
