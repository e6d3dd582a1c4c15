//! `ifwire run`: host one module instance until it dies.

use std::time::Duration;

use anyhow::{Context, Result};
use ifwire_core::{CommandConfig, LineEventConfig, ModuleEvent, Registry};
use tokio::signal::unix::{signal, SignalKind};

use crate::args::RunArgs;

enum Wake {
    Event(Option<ModuleEvent>),
    Interrupt,
    Terminate,
    Deadline,
}

/// Run the module named by `args`.
///
/// Returns the exit code to use: 0 after a clean death, 1 after an error,
/// 130 when a second interrupt forced teardown.
pub async fn run(args: RunArgs) -> Result<i32> {
    let values = args.parse_values()?;

    let command = CommandConfig {
        ip_path: args.ip_path.clone(),
    };
    let registry = Registry::with_config(command, LineEventConfig::default());

    let mut sigint = signal(SignalKind::interrupt()).context("failed to watch SIGINT")?;
    let mut sigterm = signal(SignalKind::terminate()).context("failed to watch SIGTERM")?;

    let deadline = tokio::time::sleep(Duration::from_secs(args.die_after.unwrap_or(0)));
    tokio::pin!(deadline);
    let mut deadline_armed = args.die_after.is_some();

    let mut instance = registry.instantiate(&args.module_type, &values);
    tracing::info!(module = %args.module_type, "instance started");

    let mut exit_code = 1;
    let mut interrupted = false;

    loop {
        let wake = tokio::select! {
            event = instance.next_event() => Wake::Event(event),
            _ = sigint.recv() => Wake::Interrupt,
            _ = sigterm.recv() => Wake::Terminate,
            _ = &mut deadline, if deadline_armed => Wake::Deadline,
        };

        match wake {
            Wake::Event(Some(event)) => {
                println!("{event}");
                if let ModuleEvent::Dead { error } = event {
                    exit_code = i32::from(error);
                }
            }
            Wake::Event(None) => break,
            Wake::Interrupt if interrupted => {
                tracing::warn!("interrupted again, killing");
                drop(instance);
                return Ok(130);
            }
            Wake::Interrupt => {
                tracing::info!("interrupted, requesting termination");
                interrupted = true;
                instance.die();
            }
            Wake::Terminate => {
                tracing::info!("terminated, requesting termination");
                instance.die();
            }
            Wake::Deadline => {
                tracing::info!("deadline reached, requesting termination");
                deadline_armed = false;
                instance.die();
            }
        }
    }

    Ok(exit_code)
}
