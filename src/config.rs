//! Configuration file handling.
//!
//! The configuration names the external commands drivermgr drives and can
//! override the catalog rule table. It is stored as JSON; a missing file at
//! the default location means "use the built-in defaults".

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::catalog::{CategoryRule, default_rules};

/// Location read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/drivermgr/config.json";

/// An external command: program plus fixed leading arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| (*a).to_string()).collect(),
        }
    }

    /// Command line as shown in logs and error messages.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// Commands used by the apt backend and the hardware probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// Lists every known package name, one per line
    pub package_index: CommandSpec,
    /// Prints the dpkg status of the package appended as last argument
    pub installed_query: CommandSpec,
    /// Installs the package appended as last argument
    pub install: CommandSpec,
    /// Removes the package appended as last argument
    pub remove: CommandSpec,
    /// Purges dependencies that are no longer needed
    pub autoremove: CommandSpec,
    /// Enumerates PCI devices, one descriptor per line
    pub hardware_probe: CommandSpec,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            package_index: CommandSpec::new("apt-cache", &["pkgnames"]),
            installed_query: CommandSpec::new("dpkg-query", &["-W", "-f=${Status}"]),
            install: CommandSpec::new("apt-get", &["install", "-y"]),
            remove: CommandSpec::new("apt-get", &["remove", "-y"]),
            autoremove: CommandSpec::new("apt-get", &["autoremove", "--purge", "-y"]),
            hardware_probe: CommandSpec::new("lspci", &["-nn"]),
        }
    }
}

/// Top-level drivermgr configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverManagerConfig {
    #[serde(default)]
    pub commands: CommandsConfig,
    /// Export `DEBIAN_FRONTEND=noninteractive` to mutating commands
    #[serde(default = "default_true")]
    pub noninteractive: bool,
    /// Replacement for the built-in catalog rules, in priority order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category_rules: Option<Vec<CategoryRule>>,
}

fn default_true() -> bool {
    true
}

impl Default for DriverManagerConfig {
    fn default() -> Self {
        Self {
            commands: CommandsConfig::default(),
            noninteractive: true,
            category_rules: None,
        }
    }
}

impl DriverManagerConfig {
    /// Save configuration to a JSON file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)
            .context("Failed to serialize configuration to JSON")?;
        fs::write(path.as_ref(), json)
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read configuration from {:?}", path.as_ref()))?;
        let config: Self =
            serde_json::from_str(&content).context("Failed to parse configuration JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, otherwise the default location when it exists,
    /// otherwise the built-in defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                info!("Loading configuration from {:?}", path);
                Self::load_from_file(path)
            }
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => {
                info!("Loading configuration from {}", DEFAULT_CONFIG_PATH);
                Self::load_from_file(DEFAULT_CONFIG_PATH)
            }
            None => {
                debug!("No configuration file, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let commands = [
            ("package_index", &self.commands.package_index),
            ("installed_query", &self.commands.installed_query),
            ("install", &self.commands.install),
            ("remove", &self.commands.remove),
            ("autoremove", &self.commands.autoremove),
            ("hardware_probe", &self.commands.hardware_probe),
        ];
        for (name, spec) in commands {
            if spec.program.trim().is_empty() {
                anyhow::bail!("Command '{}' has an empty program name", name);
            }
        }

        if let Some(rules) = &self.category_rules {
            if rules.is_empty() {
                anyhow::bail!("category_rules must not be empty when present");
            }
            for rule in rules {
                if rule.keywords.iter().all(|k| k.trim().is_empty()) {
                    anyhow::bail!("Rule for category {} has no keywords", rule.category);
                }
            }
        }

        Ok(())
    }

    /// Effective catalog rules: the override if present, else the built-in table.
    ///
    /// Keywords are lower-cased because names are lower-cased before matching.
    pub fn rules(&self) -> Vec<CategoryRule> {
        match &self.category_rules {
            Some(rules) => rules
                .iter()
                .map(|rule| CategoryRule {
                    category: rule.category,
                    keywords: rule
                        .keywords
                        .iter()
                        .map(|k| k.trim().to_lowercase())
                        .filter(|k| !k.is_empty())
                        .collect(),
                })
                .collect(),
            None => default_rules(),
        }
    }
}
