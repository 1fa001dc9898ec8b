use log::warn;

pub const FILE_MODE_ENV: &str = "FSTREE_FILE_MODE";
pub const DIR_MODE_ENV: &str = "FSTREE_DIR_MODE";

/// Permissions applied to newly created nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsConfig {
    pub file_permissions: u32,
    pub directory_permissions: u32,
}

impl Default for FsConfig {
    fn default() -> Self {
        Self {
            file_permissions: 0o644,
            directory_permissions: 0o755,
        }
    }
}

impl FsConfig {
    /// Defaults overridden by `FSTREE_FILE_MODE` / `FSTREE_DIR_MODE`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        if let Some(mode) = lookup(FILE_MODE_ENV).and_then(|raw| parse_mode_var(FILE_MODE_ENV, &raw)) {
            config.file_permissions = mode;
        }
        if let Some(mode) = lookup(DIR_MODE_ENV).and_then(|raw| parse_mode_var(DIR_MODE_ENV, &raw)) {
            config.directory_permissions = mode;
        }
        config
    }
}

fn parse_mode_var(name: &str, raw: &str) -> Option<u32> {
    match parse_mode(raw) {
        Some(mode) => Some(mode),
        None => {
            warn!("Ignoring {}={:?}: not an octal mode", name, raw);
            None
        }
    }
}

/// Parses an octal permission string such as `755` or `0o640`.
pub fn parse_mode(raw: &str) -> Option<u32> {
    let digits = raw.trim();
    let digits = digits.strip_prefix("0o").unwrap_or(digits);
    if digits.is_empty() {
        return None;
    }
    u32::from_str_radix(digits, 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
}
