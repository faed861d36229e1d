use super::{format_size, json_pretty, spin_fail, spin_ok, spinner, EXIT_FAILURE, EXIT_SUCCESS};
use caravel_core::Engine;
use caravel_store::verify_store_integrity;

pub fn list(engine: &Engine, json: bool) -> Result<u8, String> {
    engine.layout().initialize().map_err(|e| e.to_string())?;
    let cache = engine.cache();
    let keys = cache.list().map_err(|e| e.to_string())?;

    if json {
        let entries: Vec<_> = keys
            .iter()
            .map(|key| {
                let size = std::fs::metadata(cache.path_for(key)).map(|m| m.len()).unwrap_or(0);
                serde_json::json!({"checksum": key, "size": size})
            })
            .collect();
        println!("{}", json_pretty(&entries)?);
        return Ok(EXIT_SUCCESS);
    }

    if keys.is_empty() {
        println!("cache is empty");
        return Ok(EXIT_SUCCESS);
    }
    for key in &keys {
        let size = std::fs::metadata(cache.path_for(key)).map(|m| m.len()).unwrap_or(0);
        println!("{key}  {}", format_size(size));
    }
    let total = cache.total_size().map_err(|e| e.to_string())?;
    println!("\n{} artifact(s), {} total", keys.len(), format_size(total));
    Ok(EXIT_SUCCESS)
}

pub fn verify(engine: &Engine, json: bool) -> Result<u8, String> {
    engine.layout().initialize().map_err(|e| e.to_string())?;
    let pb = spinner("verifying store…");
    let report = match verify_store_integrity(engine.layout()) {
        Ok(report) => report,
        Err(e) => {
            spin_fail(&pb, "verification failed");
            return Err(e.to_string());
        }
    };

    if report.is_clean() {
        spin_ok(
            &pb,
            &format!(
                "store clean ({} artifact(s), {} status record(s))",
                report.artifacts_checked, report.status_checked
            ),
        );
    } else {
        spin_fail(&pb, &format!("{} integrity failure(s)", report.failed.len()));
    }

    if json {
        let payload = serde_json::json!({
            "artifacts_checked": report.artifacts_checked,
            "artifacts_passed": report.artifacts_passed,
            "status_checked": report.status_checked,
            "status_passed": report.status_passed,
            "failures": report.failed.iter().map(|f| {
                serde_json::json!({"key": f.key, "reason": f.reason})
            }).collect::<Vec<_>>(),
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for failure in &report.failed {
            eprintln!("  {}: {}", failure.key, failure.reason);
        }
    }

    Ok(if report.is_clean() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}

pub fn remove(engine: &Engine, checksum: &str) -> Result<u8, String> {
    engine.layout().initialize().map_err(|e| e.to_string())?;
    let cache = engine.cache();
    if !cache.contains(checksum) {
        return Err(format!("artifact '{checksum}' not in cache"));
    }
    cache.remove(checksum).map_err(|e| e.to_string())?;
    println!("removed {checksum}");
    Ok(EXIT_SUCCESS)
}

pub fn clear(engine: &Engine) -> Result<u8, String> {
    engine.layout().initialize().map_err(|e| e.to_string())?;
    let removed = engine.cache().clear().map_err(|e| e.to_string())?;
    println!("removed {removed} artifact(s)");
    Ok(EXIT_SUCCESS)
}
