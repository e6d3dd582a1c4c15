//! CLI argument parsing.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use ifwire_core::Value;

/// Run one ifwire module, or encode a DHCP datagram.
#[derive(Parser, Debug)]
#[command(name = "ifwire", version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Instantiate a module and print its events until it dies
    Run(RunArgs),
    /// Wrap a payload in IPv4/UDP headers and print the datagram as hex
    Encode(EncodeArgs),
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Request termination after this many seconds
    #[arg(long, value_name = "SECS")]
    pub die_after: Option<u64>,

    /// Path of the iproute2 `ip` binary
    #[arg(long, value_name = "PATH", default_value = "/sbin/ip")]
    pub ip_path: PathBuf,

    /// Module type, e.g. `run` or `net.backend.wpa_supplicant`
    pub module_type: String,

    /// Module arguments; `[a b c]` is a list
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub values: Vec<String>,
}

impl RunArgs {
    /// Turn the positional tokens into argument values.
    ///
    /// A single token `[a b c]` is split on whitespace. A list can also span
    /// tokens, from one starting with `[` to one ending with `]`, each token
    /// being one item.
    pub fn parse_values(&self) -> Result<Vec<Value>> {
        let mut values = Vec::new();
        let mut open: Option<Vec<Value>> = None;

        for token in &self.values {
            open = match open {
                Some(mut items) => match token.strip_suffix(']') {
                    Some(last) => {
                        push_item(&mut items, last);
                        values.push(Value::List(items));
                        None
                    }
                    None => {
                        items.push(Value::from(token.as_str()));
                        Some(items)
                    }
                },
                None => match token.strip_prefix('[') {
                    Some(rest) => match rest.strip_suffix(']') {
                        Some(body) => {
                            values.push(Value::list(body.split_whitespace()));
                            None
                        }
                        None => {
                            let mut items = Vec::new();
                            push_item(&mut items, rest);
                            Some(items)
                        }
                    },
                    None => {
                        values.push(Value::from(token.as_str()));
                        None
                    }
                },
            };
        }

        if open.is_some() {
            bail!("unterminated list argument (missing `]`)");
        }
        Ok(values)
    }
}

fn push_item(items: &mut Vec<Value>, item: &str) {
    if !item.is_empty() {
        items.push(Value::from(item));
    }
}

#[derive(clap::Args, Debug)]
pub struct EncodeArgs {
    /// Read the payload from FILE instead of stdin
    #[arg(long, value_name = "FILE")]
    pub input: Option<PathBuf>,

    /// Largest payload accepted, in bytes
    #[arg(long, default_value = "548")]
    pub mtu: usize,
}
