//! Hashing and identifier helpers.

use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

/// Length of generated identifiers, in hex characters.
pub const ID_LEN: usize = 16;

/// SHA-256 of a string, hex-encoded.
pub fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Identifier of a workspace run.
///
/// Pure function of its inputs. `attempt` is 0 for the first derivation and is
/// bumped by the store when the id is already taken.
pub fn deployment_id(
    workspace: &str,
    source: &str,
    timestamp: &DateTime<Utc>,
    attempt: u32,
) -> String {
    let mut input = format!(
        "{}|{}|{}",
        workspace,
        source,
        timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
    );
    if attempt > 0 {
        input.push_str(&format!("|{}", attempt));
    }
    truncate(sha256_hex(&input))
}

/// Identifier of a phase record within a run.
pub fn phase_deployment_id(
    run_id: &str,
    phase: &str,
    execution_order: u32,
    attempt: u32,
) -> String {
    let mut input = format!("{}|{}|{}", run_id, phase, execution_order);
    if attempt > 0 {
        input.push_str(&format!("|{}", attempt));
    }
    truncate(sha256_hex(&input))
}

fn truncate(mut hex: String) -> String {
    hex.truncate(ID_LEN);
    hex
}
