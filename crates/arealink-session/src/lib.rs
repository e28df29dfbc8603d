//! arealink Session - identity bootstrap, persistence and renewal
//!
//! Runtime layer over the effect interfaces in `arealink-core`:
//!
//! - `memento`: captures a snapshotable target into the secure text store and
//!   restores it
//! - `identity`: the session identity service and its state machine
//! - `upkeeper`: credential renewal with a single in-flight refresh, bounded
//!   retry and a 401-replaying caller
//! - `onboarding`: the pairing handshake that produces a first identity
//! - `bootstrap`: process-start restore, role appropriation and logout
//!
//! Every component takes its effects as `Arc<dyn Trait>` so the same code
//! runs against the filesystem store, system clock and HTTP client in
//! production and against `arealink-testkit` doubles in tests.

#![forbid(unsafe_code)]

pub mod bootstrap;
pub mod errors;
pub mod identity;
pub mod memento;
pub mod onboarding;
pub mod upkeeper;

pub use bootstrap::{AreaBinding, BootstrapVerifier, BootstrapVerifierBuilder, SessionHandle, SessionPhase};
pub use errors::{AreaError, BootError, MementoError, OnboardingError, RenewalError, Result};
pub use identity::{CredentialLease, SessionIdentityService, SessionStatus};
pub use memento::MementoAgent;
pub use onboarding::{OnboardingNotice, PairedIdentity, PairingCancel, PairingFlow, PendingApplication};
pub use upkeeper::{AuthorizedCaller, SessionEvent, Upkeeper};
