//! API reachability and wallet balance.

use stampdesk_postage::{CheckoutApi, InternetmarkeClient, PostageConfig};

use crate::error::CliError;

/// Check the API, log in and print the wallet balance.
#[allow(clippy::print_stdout)]
pub async fn show() -> Result<(), CliError> {
    let config = PostageConfig::from_env()?;
    let client = InternetmarkeClient::new(config.internetmarke.clone(), &config.sender);

    let reachable = client.check_api().await;
    println!(
        "API:      {} ({})",
        if reachable { "reachable" } else { "unreachable" },
        config.internetmarke.base_url()
    );
    if !reachable {
        return Ok(());
    }

    let session = client.authenticate().await?;
    println!(
        "Account:  {}",
        session
            .authenticated_user
            .as_deref()
            .unwrap_or(config.internetmarke.username.as_str())
    );
    println!("Wallet:   {}", session.wallet_balance);
    println!("Cache:    {}", config.marks_dir.display());
    Ok(())
}
