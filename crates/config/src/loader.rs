use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{Error, PocketcallConfig, Result};

pub const CONFIG_FILE_NAME: &str = "pocketcall.toml";

const ENV_DIALECT: &str = "POCKETCALL_DIALECT";
const ENV_MAX_ITERATIONS: &str = "POCKETCALL_MAX_ITERATIONS";

/// Load configuration.
///
/// Uses `path` when given, otherwise `./pocketcall.toml` if it exists,
/// otherwise defaults. Environment overrides are applied last, then the
/// result is validated.
pub fn load_config(path: Option<&Path>) -> Result<PocketcallConfig> {
    let resolved = match path {
        Some(p) => Some(p.to_path_buf()),
        None => {
            let local = PathBuf::from(CONFIG_FILE_NAME);
            local.exists().then_some(local)
        },
    };

    let mut config = match resolved {
        Some(ref p) => {
            debug!(path = %p.display(), "loading config");
            let raw = std::fs::read_to_string(p)?;
            parse_config(&raw)?
        },
        None => PocketcallConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    config.validate()?;
    Ok(config)
}

/// Parse a TOML document without touching the environment.
pub fn parse_config(raw: &str) -> Result<PocketcallConfig> {
    Ok(toml::from_str(raw)?)
}

fn apply_env_overrides(
    config: &mut PocketcallConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<()> {
    if let Some(raw) = lookup(ENV_DIALECT) {
        config.dialect.kind = raw
            .parse()
            .map_err(|e: String| Error::invalid(format!("{ENV_DIALECT}: {e}")))?;
    }
    if let Some(raw) = lookup(ENV_MAX_ITERATIONS) {
        match raw.trim().parse::<usize>() {
            Ok(n) => config.driver.max_iterations = n,
            Err(_) => warn!(value = %raw, "ignoring non-numeric {ENV_MAX_ITERATIONS}"),
        }
    }
    Ok(())
}
