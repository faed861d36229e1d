use super::{colorize_state, json_pretty, report_error, EXIT_SUCCESS};
use caravel_core::Engine;
use std::path::Path;

pub fn run(engine: &Engine, descriptor: &Path, json: bool) -> Result<u8, String> {
    let record = match engine.status(descriptor) {
        Ok(record) => record,
        Err(e) => return Ok(report_error(&e)),
    };

    if json {
        println!("{}", json_pretty(&record)?);
    } else {
        println!(
            "environment {} ({})",
            record.short_id,
            record.name.as_deref().unwrap_or("unnamed")
        );
        println!("  image:    {}", record.image);
        println!("  state:    {}", colorize_state(&record.state.to_string()));
        if let Some(ref message) = record.message {
            println!("  cause:    {message}");
        }
        println!("  artifacts: {}", record.artifacts.len());
        println!("  updated:  {}", record.updated_at);
    }
    Ok(EXIT_SUCCESS)
}
