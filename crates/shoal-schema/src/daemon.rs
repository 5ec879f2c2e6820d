use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use thiserror::Error;

const OPTS_VAR: &str = "DOCKER_OPTS";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DaemonConfigError {
    #[error("malformed daemon option '{0}', expected --name[=value]")]
    MalformedOption(String),
    #[error("daemon option value must not contain whitespace or quotes: {name}='{value}'")]
    UnrenderableValue { name: String, value: String },
}

/// One engine flag. `value == None` renders as a bare `--name` switch.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DaemonOption {
    pub name: String,
    pub value: Option<String>,
}

/// Ordered list of engine options. Duplicate names are allowed (several
/// `host` bindings, several `cluster-store-opt` entries).
///
/// Equality is order-insensitive but duplicate-preserving: two configs are
/// equal when they hold the same multiset of options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DaemonConfig {
    options: Vec<DaemonOption>,
}

impl DaemonConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, name: &str, value: impl Into<String>) -> &mut Self {
        self.options.push(DaemonOption {
            name: name.to_owned(),
            value: Some(value.into()),
        });
        self
    }

    pub fn add_flag(&mut self, name: &str) -> &mut Self {
        self.options.push(DaemonOption {
            name: name.to_owned(),
            value: None,
        });
        self
    }

    pub fn options(&self) -> &[DaemonOption] {
        &self.options
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.options.iter().any(|o| o.name == name)
    }

    /// All values bound to `name`, in insertion order.
    pub fn values(&self, name: &str) -> Vec<&str> {
        self.options
            .iter()
            .filter(|o| o.name == name)
            .filter_map(|o| o.value.as_deref())
            .collect()
    }

    fn sorted(&self) -> Vec<&DaemonOption> {
        let mut opts: Vec<&DaemonOption> = self.options.iter().collect();
        opts.sort();
        opts
    }

    /// Render as engine command-line arguments: `--host=tcp://... --tlsverify`.
    pub fn render_args(&self) -> Result<String, DaemonConfigError> {
        let mut out = String::new();
        for opt in &self.options {
            if !out.is_empty() {
                out.push(' ');
            }
            match &opt.value {
                Some(value) => {
                    if value.is_empty()
                        || value.chars().any(|c| c.is_whitespace() || c == '"' || c == '\'')
                    {
                        return Err(DaemonConfigError::UnrenderableValue {
                            name: opt.name.clone(),
                            value: value.clone(),
                        });
                    }
                    let _ = write!(out, "--{}={}", opt.name, value);
                }
                None => {
                    let _ = write!(out, "--{}", opt.name);
                }
            }
        }
        Ok(out)
    }

    /// Render the whole engine defaults file. The file is rewritten wholesale
    /// on every apply.
    pub fn render_defaults_file(&self) -> Result<String, DaemonConfigError> {
        let args = self.render_args()?;
        Ok(format!(
            "# Managed by shoal. Local edits are overwritten.\n{OPTS_VAR}=\"{args}\"\n"
        ))
    }

    pub fn parse_args(args: &str) -> Result<Self, DaemonConfigError> {
        let mut config = Self::new();
        for token in args.split_whitespace() {
            let Some(body) = token.strip_prefix("--") else {
                return Err(DaemonConfigError::MalformedOption(token.to_owned()));
            };
            match body.split_once('=') {
                Some((name, value)) if !name.is_empty() && !value.is_empty() => {
                    config.add(name, value);
                }
                None if !body.is_empty() => {
                    config.add_flag(body);
                }
                _ => return Err(DaemonConfigError::MalformedOption(token.to_owned())),
            }
        }
        Ok(config)
    }

    /// Parse an engine defaults file. A file without an options line yields an
    /// empty config (engine never configured by us).
    pub fn parse_defaults_file(content: &str) -> Result<Self, DaemonConfigError> {
        for line in content.lines() {
            let line = line.trim();
            if line.starts_with('#') {
                continue;
            }
            if let Some(rest) = line.strip_prefix(OPTS_VAR).and_then(|r| r.strip_prefix('=')) {
                let unquoted = rest.trim_matches('"');
                return Self::parse_args(unquoted);
            }
        }
        Ok(Self::new())
    }
}

impl PartialEq for DaemonConfig {
    fn eq(&self, other: &Self) -> bool {
        self.sorted() == other.sorted()
    }
}

impl Eq for DaemonConfig {}
