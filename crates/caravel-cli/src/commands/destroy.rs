use super::{report_error, EXIT_SUCCESS};
use caravel_core::Engine;

pub fn run(engine: &Engine, env: &str) -> Result<u8, String> {
    match engine.destroy(env) {
        Ok(record) => {
            println!(
                "forgot environment {} ({})",
                record.short_id,
                record.name.as_deref().unwrap_or("unnamed")
            );
            Ok(EXIT_SUCCESS)
        }
        Err(e) => Ok(report_error(&e)),
    }
}
