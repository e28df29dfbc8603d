//! End the session

use super::common::Context;
use anyhow::Result;

/// Tear down whatever session is stored and clear it from disk
pub async fn run(context: &Context) -> Result<()> {
    let verifier = context.verifier();
    if verifier.boot().await.is_err() {
        tracing::debug!("No usable session to restore before logout");
    }
    verifier.logout().await?;
    println!("Logged out");
    Ok(())
}
