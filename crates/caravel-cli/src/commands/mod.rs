pub mod cache;
pub mod completions;
pub mod destroy;
pub mod doctor;
pub mod images;
pub mod list;
pub mod man_pages;
pub mod new;
pub mod ssh;
pub mod status;
pub mod up;

use caravel_core::CoreError;
use caravel_fetch::FetchError;
use caravel_gateway::GatewayError;
use caravel_store::StoreError;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_DESCRIPTOR_ERROR: u8 = 2;
pub const EXIT_UNRESOLVED_IMAGE: u8 = 3;
pub const EXIT_FETCH_FAILED: u8 = 4;
pub const EXIT_INTEGRITY_MISMATCH: u8 = 5;
pub const EXIT_PROVISIONING_FAILED: u8 = 6;
pub const EXIT_UNREACHABLE: u8 = 7;
pub const EXIT_AUTH_FAILED: u8 = 8;

/// Map a typed engine error to its distinct exit code.
pub fn exit_code_for(err: &CoreError) -> u8 {
    match err {
        CoreError::Descriptor(_) => EXIT_DESCRIPTOR_ERROR,
        CoreError::Fetch(FetchError::UnresolvedImage(_)) => EXIT_UNRESOLVED_IMAGE,
        CoreError::Fetch(FetchError::IntegrityMismatch { .. })
        | CoreError::Store(StoreError::IntegrityMismatch { .. }) => EXIT_INTEGRITY_MISMATCH,
        CoreError::Fetch(FetchError::FetchFailed { .. } | FetchError::OfflineMiss(_)) => {
            EXIT_FETCH_FAILED
        }
        CoreError::ProvisioningFailed { .. } => EXIT_PROVISIONING_FAILED,
        CoreError::Gateway(GatewayError::EnvironmentUnreachable { .. }) => EXIT_UNREACHABLE,
        CoreError::Gateway(GatewayError::AuthenticationFailed { .. }) => EXIT_AUTH_FAILED,
        _ => EXIT_FAILURE,
    }
}

/// Print the error and return its exit code.
pub fn report_error(err: &CoreError) -> u8 {
    eprintln!("error: {err}");
    exit_code_for(err)
}

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

pub fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .expect("valid template")
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    pb.set_message(msg.to_owned());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

pub fn spin_ok(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✓ {msg}"));
}

pub fn spin_fail(pb: &ProgressBar, msg: &str) {
    pb.set_style(ProgressStyle::with_template("{msg}").expect("valid template"));
    pb.finish_with_message(format!("✗ {msg}"));
}

pub fn colorize_state(state: &str) -> String {
    use console::Style;
    match state {
        "ready" => Style::new().green().apply_to(state).to_string(),
        "resolving" | "fetching" | "provisioning" => {
            Style::new().cyan().apply_to(state).to_string()
        }
        "not started" => Style::new().yellow().apply_to(state).to_string(),
        "failed" => Style::new().red().bold().apply_to(state).to_string(),
        other => other.to_owned(),
    }
}

pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * KB;
    const GB: u64 = 1024 * MB;
    if bytes >= GB {
        format!("{:.1} GiB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MiB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KiB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}
