//! Options loading from disk and environment.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::HostOptions;
use crate::config::validation::{validate_options, ValidationError};

/// Overrides `config_path`.
pub const CONFIG_ENV: &str = "PEERHOST_CONFIG";

/// Overrides `directory`.
pub const DIRECTORY_ENV: &str = "PEERHOST_DIRECTORY";

/// Error type for options loading.
#[derive(Debug)]
pub enum OptionsError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for OptionsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OptionsError::Io(e) => write!(f, "IO error: {}", e),
            OptionsError::Parse(e) => write!(f, "Parse error: {}", e),
            OptionsError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for OptionsError {}

/// Load options from an optional TOML file, apply env overrides, expand `~`,
/// and validate.
pub fn load_options(path: Option<&Path>) -> Result<HostOptions, OptionsError> {
    let options = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(OptionsError::Io)?;
            toml::from_str(&content).map_err(OptionsError::Parse)?
        }
        None => HostOptions::default(),
    };

    let options = apply_env(options, |name| std::env::var(name).ok());
    let options = resolve_paths(options);

    validate_options(&options).map_err(OptionsError::Validation)?;

    Ok(options)
}

/// Apply `PEERHOST_*` overrides using the given variable lookup.
pub fn apply_env(mut options: HostOptions, var: impl Fn(&str) -> Option<String>) -> HostOptions {
    if let Some(path) = var(CONFIG_ENV) {
        options.config_path = PathBuf::from(path);
    }
    if let Some(dir) = var(DIRECTORY_ENV) {
        options.directory = PathBuf::from(dir);
    }
    options
}

/// Expand a leading `~` in every path option.
pub fn resolve_paths(mut options: HostOptions) -> HostOptions {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    options.config_path = expand_tilde(&options.config_path, home.as_deref());
    options.directory = expand_tilde(&options.directory, home.as_deref());
    options.hosts.path = expand_tilde(&options.hosts.path, home.as_deref());
    options
}

/// `~/x` → `<home>/x`. Paths without a leading `~` are returned unchanged.
pub fn expand_tilde(path: &Path, home: Option<&Path>) -> PathBuf {
    let Some(home) = home else {
        return path.to_path_buf();
    };
    match path.strip_prefix("~") {
        Ok(rest) => home.join(rest),
        Err(_) => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_expand_tilde() {
        let home = Path::new("/home/op");
        assert_eq!(
            expand_tilde(Path::new("~/.peerhost"), Some(home)),
            PathBuf::from("/home/op/.peerhost")
        );
        assert_eq!(expand_tilde(Path::new("~"), Some(home)), PathBuf::from("/home/op"));
        assert_eq!(
            expand_tilde(Path::new("/srv/sites"), Some(home)),
            PathBuf::from("/srv/sites")
        );
        assert_eq!(
            expand_tilde(Path::new("~/x"), None),
            PathBuf::from("~/x")
        );
    }

    #[test]
    fn test_env_overrides() {
        let options = apply_env(HostOptions::default(), |name| match name {
            CONFIG_ENV => Some("/etc/peerhost.json".into()),
            _ => None,
        });
        assert_eq!(options.config_path, PathBuf::from("/etc/peerhost.json"));
        assert_eq!(options.directory, PathBuf::from("~/.peerhost"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
port = 8080
directory = "/srv/peerhost"

[network]
gateways = ["http://mirror.example/"]
timeout_secs = 5
"#
        )
        .unwrap();

        let options = load_options(Some(file.path())).unwrap();
        assert_eq!(options.port, 8080);
        assert_eq!(options.network.gateways.len(), 1);
        assert_eq!(options.network.timeout_secs, Some(5));
    }

    #[test]
    fn test_load_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_address = \"nowhere\"").unwrap();
        let err = load_options(Some(file.path())).unwrap_err();
        assert!(matches!(err, OptionsError::Validation(_)));
        assert!(err.to_string().contains("nowhere"));
    }
}
