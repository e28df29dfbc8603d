//! Force a credential renewal

use super::common::Context;
use anyhow::{Context as _, Result};
use arealink_session::RenewalError;

/// Boot, then renew regardless of the current expiry
pub async fn run(context: &Context) -> Result<()> {
    let verifier = context.verifier();
    verifier
        .boot()
        .await
        .context("no usable session; pair first")?;
    let session = verifier
        .session()
        .context("session ended during boot")?;

    match session.upkeeper().renew().await {
        Ok(credentials) => {
            println!("Renewed, expires at {}", credentials.expires_at);
            Ok(())
        }
        Err(RenewalError::Rejected(reason)) => {
            println!("Area refused the refresh token ({reason}); logged out.");
            Ok(())
        }
        Err(error) => Err(error.into()),
    }
}
