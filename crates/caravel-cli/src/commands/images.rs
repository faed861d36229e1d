use super::{json_pretty, EXIT_SUCCESS};
use caravel_fetch::ImageRegistry;

pub fn run(json: bool) -> Result<u8, String> {
    let registry = ImageRegistry::load_default().map_err(|e| e.to_string())?;
    let images = registry.list();

    if json {
        let payload: Vec<_> = images
            .iter()
            .map(|(id, url)| serde_json::json!({"id": id, "url": url}))
            .collect();
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("{:<16} URL", "ID");
        for (id, url) in &images {
            println!("{id:<16} {url}");
        }
    }
    Ok(EXIT_SUCCESS)
}
