use super::EXIT_SUCCESS;
use dialoguer::Confirm;
use std::io::{stderr, stdin, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const STARTER_DESCRIPTOR: &str = r#"descriptor_version = 1

[environment]
name = "dev-vm"

[image]
# Run `caravel images` for the resolvable identifiers, or pin a url + checksum.
id = "ubuntu-24.04"

[resources]
cpus = 2
memory_mb = 2048
disk_gb = 20

[session]
host = "127.0.0.1"
port = 2222
user = "ubuntu"

[[steps]]
name = "base packages"
kind = "install_package"
package = "build-essential"

[[steps]]
kind = "write_file"
path = "/etc/motd"
contents = "provisioned by caravel\n"
mode = "0644"
"#;

pub fn run(dest: &Path, force: bool) -> Result<u8, String> {
    let is_tty = stdin().is_terminal() && stderr().is_terminal();
    ensure_can_write(dest, force, is_tty)?;
    write_atomic(dest, STARTER_DESCRIPTOR)?;
    println!("wrote {}", dest.display());
    Ok(EXIT_SUCCESS)
}

fn ensure_can_write(dest: &Path, force: bool, is_tty: bool) -> Result<(), String> {
    if !dest.exists() || force {
        return Ok(());
    }
    if !is_tty {
        return Err(format!(
            "refusing to overwrite existing {} (pass --force)",
            dest.display()
        ));
    }
    let overwrite = Confirm::new()
        .with_prompt(format!("overwrite {}?", dest.display()))
        .default(false)
        .interact()
        .map_err(|e| format!("prompt failed: {e}"))?;
    if overwrite {
        Ok(())
    } else {
        Err("aborted".to_owned())
    }
}

fn write_atomic(dest: &Path, content: &str) -> Result<(), String> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
    let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| format!("write temp file: {e}"))?;
    tmp.write_all(content.as_bytes())
        .map_err(|e| format!("write temp file: {e}"))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| format!("fsync temp file: {e}"))?;
    tmp.persist(dest)
        .map_err(|e| format!("persist descriptor: {}", e.error))?;
    Ok(())
}
