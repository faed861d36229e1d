use super::report_error;
use caravel_core::Engine;
use std::path::Path;

pub fn run(engine: &Engine, descriptor: &Path, command: &[String]) -> Result<u8, String> {
    let command = if command.is_empty() {
        None
    } else {
        Some(command.join(" "))
    };

    match engine.session(descriptor, command.as_deref()) {
        // The remote exit code passes through to the operator.
        Ok(code) => Ok(u8::try_from(code).unwrap_or(1)),
        Err(e) => Ok(report_error(&e)),
    }
}
