//! Built-in command builders.

use std::net::Ipv4Addr;

use super::{Cmdline, CommandBuilder};
use crate::config::CommandConfig;
use crate::error::ModuleError;
use crate::value::{Args, Value};

/// `run(list do_cmd, list undo_cmd)`: runs `do_cmd` to acquire and
/// `undo_cmd` to release. An empty `undo_cmd` means there is nothing to
/// release.
#[derive(Debug, Clone)]
pub struct RunCommand {
    acquire: Cmdline,
    release: Option<Cmdline>,
}

impl RunCommand {
    pub const TYPE: &'static str = "run";

    pub fn new(acquire: Cmdline, release: Option<Cmdline>) -> Result<Self, ModuleError> {
        if acquire.is_empty() {
            return Err(ModuleError::config(Self::TYPE, "empty acquire command"));
        }
        let release = release.filter(|cmd| !cmd.is_empty());
        Ok(Self { acquire, release })
    }

    pub fn from_args(values: &[Value]) -> Result<Self, ModuleError> {
        let mut args = Args::new(Self::TYPE, values, 2)?;
        let acquire = args.string_list("do_cmd")?;
        let release = args.string_list("undo_cmd")?;
        Self::new(to_owned(&acquire), Some(to_owned(&release)))
    }
}

impl CommandBuilder for RunCommand {
    fn build(&self, remove: bool) -> Result<Option<Cmdline>, ModuleError> {
        if remove {
            Ok(self.release.clone())
        } else {
            Ok(Some(self.acquire.clone()))
        }
    }
}

/// `net.ipv4.addr(string ifname, string addr, string prefix)`: assigns an
/// address with `ip addr add` and removes it with `ip addr del`.
#[derive(Debug, Clone)]
pub struct Ipv4AddrCommand {
    ip_path: String,
    ifname: String,
    addr: Ipv4Addr,
    prefix: u8,
}

impl Ipv4AddrCommand {
    pub const TYPE: &'static str = "net.ipv4.addr";

    pub fn from_args(values: &[Value], config: &CommandConfig) -> Result<Self, ModuleError> {
        let mut args = Args::new(Self::TYPE, values, 3)?;
        let ifname = args.string("ifname")?;
        let addr = args.string("addr")?;
        let prefix = args.string("prefix")?;

        if ifname.is_empty() {
            return Err(ModuleError::config(Self::TYPE, "empty interface name"));
        }
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|_| ModuleError::config(Self::TYPE, format!("bad address {addr:?}")))?;
        let prefix = prefix
            .parse::<u8>()
            .ok()
            .filter(|&p| p <= 32)
            .ok_or_else(|| ModuleError::config(Self::TYPE, format!("bad prefix {prefix:?}")))?;

        Ok(Self {
            ip_path: config.ip_path.to_string_lossy().into_owned(),
            ifname: ifname.to_string(),
            addr,
            prefix,
        })
    }
}

impl CommandBuilder for Ipv4AddrCommand {
    fn build(&self, remove: bool) -> Result<Option<Cmdline>, ModuleError> {
        let verb = if remove { "del" } else { "add" };
        Ok(Some(vec![
            self.ip_path.clone(),
            "addr".to_string(),
            verb.to_string(),
            format!("{}/{}", self.addr, self.prefix),
            "dev".to_string(),
            self.ifname.clone(),
        ]))
    }
}

fn to_owned(items: &[&str]) -> Cmdline {
    items.iter().map(|s| s.to_string()).collect()
}
