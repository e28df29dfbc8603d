//! Pair this device with an Area
//!
//! Resumes a pending application when one is stored, otherwise fetches the
//! Area's entry form and submits the given answers. Then polls for a verdict
//! and, once granted, establishes the session.

use super::common::Context;
use anyhow::{anyhow, bail, Result};
use arealink_core::{AreaCode, DomainError};
use arealink_session::{AreaBinding, OnboardingError, OnboardingNotice, PairingFlow};
use clap::Args;
use std::collections::BTreeMap;
use tracing::{info, warn};

/// Pairing arguments
#[derive(Args)]
pub struct PairCommand {
    /// Area code, as printed on the Area's pairing sign
    pub area_code: String,

    /// Answer to an entry form field, as key=value (repeatable)
    #[arg(short, long = "answer", value_parser = parse_answer)]
    pub answers: Vec<(String, String)>,

    /// Seconds between verdict checks
    #[arg(long, default_value = "5")]
    pub poll_secs: u64,

    /// Give up waiting after this many checks; the application stays pending
    #[arg(long, default_value = "60")]
    pub max_polls: u32,
}

fn parse_answer(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.trim().is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.trim().to_string(), value.to_string()))
}

/// Run the pairing handshake to a verdict
pub async fn run(context: &Context, cmd: PairCommand) -> Result<()> {
    let flow = context.pairing_flow();
    let area = AreaCode::new(cmd.area_code.clone());

    let cancel = flow.cancel_handle();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });
    let mut notices = flow.notices();
    let notice_printer = tokio::spawn(async move {
        while let Ok(OnboardingNotice::OfferCancel { operation }) = notices.recv().await {
            println!("Still waiting on {operation}. Press Ctrl+C to stop.");
        }
    });

    let outcome = pair(context, &flow, &area, cmd).await;
    interrupt.abort();
    notice_printer.abort();
    outcome
}

async fn pair(
    context: &Context,
    flow: &PairingFlow,
    area: &AreaCode,
    cmd: PairCommand,
) -> Result<()> {
    match flow.resume_pending().await? {
        Some(application) => {
            println!(
                "Resuming application {} to {}",
                application.application_id, application.area_name
            );
        }
        None => {
            let form = flow.fetch_entry_form(area).await?;
            println!("Applying to {}", form.area_name);
            let answers: BTreeMap<String, String> = cmd.answers.into_iter().collect();
            match flow.submit_entry_form(area, &form, answers).await {
                Ok(application) => {
                    info!(application_id = %application.application_id, "Entry application submitted");
                }
                Err(OnboardingError::InvalidAnswers { missing }) => {
                    let labels: Vec<String> = form
                        .fields
                        .iter()
                        .filter(|field| missing.contains(&field.key))
                        .map(|field| format!("{} ({})", field.key, field.label))
                        .collect();
                    bail!("missing answers: {}", labels.join(", "));
                }
                Err(other) => return Err(other.into()),
            }
        }
    }

    for _ in 0..cmd.max_polls {
        match flow.check_for_entry_verdict().await {
            Ok(paired) => {
                let binding = AreaBinding {
                    area_name: paired.area_name,
                    endpoint: context.config.service.endpoint.clone(),
                };
                let authorization = context
                    .verifier()
                    .establish(paired.identity, binding)
                    .await?;
                println!("Paired as {}", authorization.role());
                return Ok(());
            }
            Err(OnboardingError::Domain(DomainError::UndecidedApplication { .. })) => {
                context
                    .time
                    .sleep_ms(cmd.poll_secs.saturating_mul(1_000))
                    .await?;
            }
            Err(OnboardingError::Cancelled) => {
                warn!("Pairing interrupted");
                println!("Stopped. The application stays pending; rerun to resume.");
                return Ok(());
            }
            Err(other) => return Err(anyhow!(other)),
        }
    }

    println!("Still undecided. Rerun `arealink pair` to keep waiting.");
    Ok(())
}
