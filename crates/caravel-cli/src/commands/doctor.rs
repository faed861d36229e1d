use super::{json_pretty, EXIT_FAILURE, EXIT_SUCCESS};
use caravel_fetch::ImageRegistry;
use caravel_store::StoreLayout;
use std::path::Path;
use std::process::Command;

struct Check {
    name: &'static str,
    status: &'static str,
    detail: String,
}

impl Check {
    fn pass(name: &'static str, detail: &str) -> Self {
        Self {
            name,
            status: "pass",
            detail: detail.to_owned(),
        }
    }

    fn fail(name: &'static str, detail: &str) -> Self {
        Self {
            name,
            status: "fail",
            detail: detail.to_owned(),
        }
    }

    fn info(name: &'static str, detail: &str) -> Self {
        Self {
            name,
            status: "info",
            detail: detail.to_owned(),
        }
    }
}

pub fn run(cache_dir: &Path, json: bool) -> Result<u8, String> {
    let mut checks: Vec<Check> = Vec::new();
    let mut all_pass = true;

    // Session transport prerequisite.
    let ssh_ok = Command::new("ssh")
        .arg("-V")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if ssh_ok {
        checks.push(Check::pass("ssh_binary", "ssh client available"));
    } else {
        all_pass = false;
        checks.push(Check::fail(
            "ssh_binary",
            "ssh client not found (install openssh-client)",
        ));
    }

    // Store.
    let layout = StoreLayout::new(cache_dir);
    if cache_dir.join("cache").exists() {
        match layout.verify_version() {
            Ok(()) => checks.push(Check::pass("store_version", "store format version valid")),
            Err(e) => {
                all_pass = false;
                checks.push(Check::fail(
                    "store_version",
                    &format!("store version check failed: {e}"),
                ));
            }
        }
        match caravel_store::verify_store_integrity(&layout) {
            Ok(report) if report.is_clean() => checks.push(Check::pass(
                "store_integrity",
                &format!(
                    "store integrity OK ({} artifact(s) checked)",
                    report.artifacts_checked
                ),
            )),
            Ok(report) => {
                all_pass = false;
                checks.push(Check::fail(
                    "store_integrity",
                    &format!("{} integrity failure(s)", report.failed.len()),
                ));
            }
            Err(e) => {
                all_pass = false;
                checks.push(Check::fail(
                    "store_integrity",
                    &format!("integrity sweep failed: {e}"),
                ));
            }
        }
    } else {
        checks.push(Check::info(
            "store_exists",
            "store not initialized (created on first up)",
        ));
    }

    // Registry file, if present.
    match ImageRegistry::load_default() {
        Ok(registry) => checks.push(Check::pass(
            "image_registry",
            &format!("{} resolvable image(s)", registry.list().len()),
        )),
        Err(e) => {
            all_pass = false;
            checks.push(Check::fail(
                "image_registry",
                &format!("registry file invalid: {e}"),
            ));
        }
    }

    if json {
        let payload: Vec<_> = checks
            .iter()
            .map(|c| {
                serde_json::json!({"name": c.name, "status": c.status, "detail": c.detail})
            })
            .collect();
        println!("{}", json_pretty(&payload)?);
    } else {
        for check in &checks {
            let mark = match check.status {
                "pass" => "✓",
                "fail" => "✗",
                _ => "·",
            };
            println!("{mark} {}: {}", check.name, check.detail);
        }
    }

    Ok(if all_pass { EXIT_SUCCESS } else { EXIT_FAILURE })
}
