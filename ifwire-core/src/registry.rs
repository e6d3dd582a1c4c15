//! Module type registry.

use std::collections::BTreeMap;

use crate::command::{CommandJob, Ipv4AddrCommand, RunCommand};
use crate::config::{CommandConfig, LineEventConfig};
use crate::error::ModuleError;
use crate::instance::Instance;
use crate::line_event::{LineEventModule, WPA_SUPPLICANT};
use crate::value::Value;

/// Builds an instance from its arguments.
pub type Constructor = fn(&Registry, &[Value]) -> Result<Instance, ModuleError>;

/// Table from module type name to constructor, built once at startup.
pub struct Registry {
    constructors: BTreeMap<&'static str, Constructor>,
    command: CommandConfig,
    line_event: LineEventConfig,
}

impl Registry {
    /// An empty registry.
    pub fn new(command: CommandConfig, line_event: LineEventConfig) -> Self {
        Self {
            constructors: BTreeMap::new(),
            command,
            line_event,
        }
    }

    /// Registry with the built-in module types and default configuration.
    pub fn builtin() -> Self {
        Self::with_config(CommandConfig::default(), LineEventConfig::default())
    }

    /// Registry with the built-in module types.
    pub fn with_config(command: CommandConfig, line_event: LineEventConfig) -> Self {
        let mut registry = Self::new(command, line_event);
        registry.register(RunCommand::TYPE, new_run);
        registry.register(Ipv4AddrCommand::TYPE, new_ipv4_addr);
        registry.register(WPA_SUPPLICANT, new_wpa_supplicant);
        registry
    }

    /// Add or replace a module type.
    pub fn register(&mut self, name: &'static str, constructor: Constructor) {
        if self.constructors.insert(name, constructor).is_some() {
            tracing::warn!(module = name, "module type registered twice");
        }
    }

    /// Registered type names, sorted.
    pub fn types(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.constructors.keys().copied()
    }

    pub fn command_config(&self) -> &CommandConfig {
        &self.command
    }

    pub fn line_event_config(&self) -> &LineEventConfig {
        &self.line_event
    }

    /// Create an instance, or the error that prevented it.
    pub fn try_instantiate(&self, type_name: &str, args: &[Value]) -> Result<Instance, ModuleError> {
        let constructor = self
            .constructors
            .get(type_name)
            .ok_or_else(|| ModuleError::config(type_name, "unknown module type"))?;
        constructor(self, args)
    }

    /// Create an instance. Failures yield [`Instance::Failed`], which reports
    /// `Dead { error: true }` without having started anything.
    pub fn instantiate(&self, type_name: &str, args: &[Value]) -> Instance {
        match self.try_instantiate(type_name, args) {
            Ok(instance) => {
                tracing::debug!(module = type_name, "instantiated");
                instance
            }
            Err(e) => Instance::failed(e),
        }
    }
}

fn new_run(_registry: &Registry, args: &[Value]) -> Result<Instance, ModuleError> {
    let builder = RunCommand::from_args(args)?;
    CommandJob::new(RunCommand::TYPE, builder).map(Instance::CommandJob)
}

fn new_ipv4_addr(registry: &Registry, args: &[Value]) -> Result<Instance, ModuleError> {
    let builder = Ipv4AddrCommand::from_args(args, registry.command_config())?;
    CommandJob::new(Ipv4AddrCommand::TYPE, builder).map(Instance::CommandJob)
}

fn new_wpa_supplicant(registry: &Registry, args: &[Value]) -> Result<Instance, ModuleError> {
    LineEventModule::wpa_supplicant(args, registry.line_event_config()).map(Instance::LineEvent)
}
