use super::{json_pretty, report_error, spin_fail, spin_ok, spinner, EXIT_SUCCESS};
use caravel_core::{Engine, UpOptions};
use std::path::Path;

pub fn run(
    engine: &Engine,
    descriptor: &Path,
    options: UpOptions,
    json: bool,
) -> Result<u8, String> {
    let pb = spinner("bringing environment up…");
    let report = match engine.up(descriptor, options) {
        Ok(report) => report,
        Err(e) => {
            spin_fail(&pb, "up failed");
            return Ok(report_error(&e));
        }
    };

    if report.already_ready {
        spin_ok(&pb, "environment already ready");
    } else {
        spin_ok(
            &pb,
            &format!(
                "environment ready ({} downloaded, {} cached, {} step(s) applied)",
                report.summary.downloaded, report.summary.cached, report.steps_applied
            ),
        );
    }

    if json {
        let payload = serde_json::json!({
            "env_id": report.identity.env_id,
            "short_id": report.identity.short_id,
            "state": report.state.to_string(),
            "downloaded": report.summary.downloaded,
            "cached": report.summary.cached,
            "steps_applied": report.steps_applied,
            "already_ready": report.already_ready,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{}", report.identity.short_id);
    }
    Ok(EXIT_SUCCESS)
}
