//! Show the restored session

use super::common::Context;
use anyhow::Result;
use arealink_session::BootError;

/// Boot from storage and print what was restored
pub async fn run(context: &Context) -> Result<()> {
    let verifier = context.verifier();

    match verifier.boot().await {
        Ok(authorization) => {
            println!("=== Session ===");
            println!("Role: {}", authorization.role());
            let capabilities: Vec<&str> =
                authorization.capabilities().iter().map(String::as_str).collect();
            println!("Capabilities: {}", capabilities.join(", "));
            for specialty in authorization.specialties() {
                println!("Specialty: {} ({})", specialty.name, specialty.id);
            }
            if let Some(binding) = verifier.binding() {
                println!("Area: {} at {}", binding.area_name, binding.endpoint);
            }
            if let Some(session) = verifier.session() {
                if let Some(expires_at) = session.service().expires_at() {
                    let now = context.time.physical_time().await?;
                    let state = if expires_at <= now { "expired" } else { "valid" };
                    println!("Access token: {state}, expires at {expires_at}");
                }
            }
            Ok(())
        }
        Err(BootError::MissingEntry) => {
            println!("Not paired. Run `arealink pair <area-code>`.");
            Ok(())
        }
        Err(error) => {
            println!("Stored session unusable ({error}); pair again.");
            Ok(())
        }
    }
}
