/// `kiln init` command implementation
///
/// Writes starter kiln.toml, compat.toml, and an example variant
/// descriptor into a directory. The starter compatibility table only
/// lists pairings known to work upstream.
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::InitArgs;

const STARTER_CONFIG: &str = r#"# Kiln configuration

[ledger]
# dir = "/var/lib/kiln/ledgers"

[compat]
table = "compat.toml"

[provision]
# step_timeout_secs = 900

# Append custom steps to every generated plan:
# [[extra_steps]]
# id = "trust-internal-ca"
# program = "update-ca-certificates"
# idempotent = true
"#;

const STARTER_COMPAT: &str = r#"# Accelerator / framework / interpreter compatibility table.
# Versioned data: add new pairings here, not in engine code.
schema_version = 1

[[toolkit]]
accelerator = "cuda-11.2"
cudnn = "8.1"
channel = "nvidia"
packages = ["cudatoolkit=11.2", "cudnn=8.1"]

[[rule]]
accelerator = "none"
framework = "tensorflow"
versions = ["2.9.*", "2.10.*"]
python = ["3.9", "3.10"]
package = "tensorflow"

[[rule]]
accelerator = "cuda-11.2"
framework = "tensorflow"
versions = ["2.9.*"]
python = ["3.9"]
package = "tensorflow-gpu"

[[rule]]
accelerator = "none"
framework = "pytorch"
versions = ["2.*"]
python = ["3.9", "3.10", "3.11"]
package = "torch"

[[rule]]
accelerator = "cuda-11.2"
framework = "pytorch"
versions = ["2.*"]
python = ["3.9", "3.10"]
package = "torch"
"#;

const STARTER_VARIANT: &str = r#"# Example variant descriptor
base_image = "ubuntu:22.04"
accelerator = "none"
notebook_frontend = "lab"

[interpreter]
distribution = "mamba"
version = "3.9"

[frameworks]
tensorflow = "2.9.*"
"#;

pub fn run(args: InitArgs) -> Result<()> {
    let dir = Path::new(&args.dir);
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

    write_starter(dir, "kiln.toml", STARTER_CONFIG, args.force)?;
    write_starter(dir, "compat.toml", STARTER_COMPAT, args.force)?;
    write_starter(dir, "variant.example.toml", STARTER_VARIANT, args.force)?;

    println!("Next: edit variant.example.toml, then `kiln plan -d variant.example.toml`");
    Ok(())
}

fn write_starter(dir: &Path, name: &str, contents: &str, force: bool) -> Result<()> {
    let path = dir.join(name);
    if path.exists() && !force {
        println!("Skipping {name} (exists; use --force to overwrite)");
        return Ok(());
    }
    fs::write(&path, contents).with_context(|| format!("Failed to write: {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}
