//! flotilla.toml configuration parser.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::TaskSpec;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FlotillaConfig {
    pub framework: FrameworkConfig,
    pub offers: OffersConfig,
    pub container: ContainerConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskConfig>,
}

/// Registration identity sent in the subscribe call.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FrameworkConfig {
    pub user: String,
    pub name: String,
    pub roles: Vec<String>,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            user: "root".to_string(),
            name: "flotilla".to_string(),
            roles: vec!["*".to_string()],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OffersConfig {
    /// How long declined resources are withheld from this framework.
    pub refuse_seconds: f64,
}

impl Default for OffersConfig {
    fn default() -> Self {
        Self { refuse_seconds: 1.0 }
    }
}

/// Docker container settings applied to every containerized launch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ContainerConfig {
    pub network: String,
    pub privileged: bool,
    /// Container port bound to the first allocated host port.
    pub primary_port: u16,
    /// Container port bound to the second host port of auxiliary tasks.
    pub auxiliary_port: u16,
    pub port_protocol: String,
    pub port_name: String,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            network: "BRIDGE".to_string(),
            privileged: true,
            primary_port: 4444,
            auxiliary_port: 5900,
            port_protocol: "tcp".to_string(),
            port_name: "http".to_string(),
        }
    }
}

/// A task submitted at startup.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskConfig {
    pub id: String,
    pub name: Option<String>,
    pub image: Option<String>,
    pub command: Option<String>,
    pub cpus: f64,
    pub mem: f64,
    #[serde(default)]
    pub auxiliary_port: bool,
}

impl TaskConfig {
    pub fn to_spec(&self) -> CoreResult<TaskSpec> {
        let mut spec = TaskSpec::new(self.id.as_str(), self.cpus, self.mem)
            .with_auxiliary_port(self.auxiliary_port);
        if let Some(name) = &self.name {
            spec = spec.with_name(name.clone());
        }
        if let Some(image) = &self.image {
            spec = spec.with_image(image.clone());
        }
        if let Some(command) = &self.command {
            spec = spec.with_command(command.clone());
        }
        spec.validate()?;
        Ok(spec)
    }
}

impl FlotillaConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&content)?)
    }

    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let config: FlotillaConfig =
            toml::from_str(content).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    fn validate(&self) -> CoreResult<()> {
        if !self.offers.refuse_seconds.is_finite() || self.offers.refuse_seconds < 0.0 {
            return Err(CoreError::Config(format!(
                "offers.refuse_seconds must be non-negative, got {}",
                self.offers.refuse_seconds
            )));
        }
        if self.container.primary_port == self.container.auxiliary_port {
            return Err(CoreError::Config(
                "container.primary_port and container.auxiliary_port must differ".to_string(),
            ));
        }
        Ok(())
    }

    /// Seed tasks as validated specs, in file order.
    pub fn task_specs(&self) -> CoreResult<Vec<TaskSpec>> {
        self.tasks.iter().map(TaskConfig::to_spec).collect()
    }
}
