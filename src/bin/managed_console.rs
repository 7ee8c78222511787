//! Managed objects: a record registered under a name and driven by a
//! line-oriented management console on stdin.
//!
//! Run with: cargo run --bin managed_console

use std::io::{self, BufRead, Write};

use colored::Colorize;
use concurrency_primers::console::{Console, HELP};
use concurrency_primers::managed::{ManagedRecord, ObjectName, Registry};
use concurrency_primers::{logging, PrimersConfig};
use tracing::warn;

fn main() -> anyhow::Result<()> {
    let config = PrimersConfig::from_args()?;
    logging::init(&config.log);

    let name = ObjectName::parse(&config.managed.object_name)?;
    let mut registry = Registry::new();
    registry.register(
        name.clone(),
        Box::new(ManagedRecord::new(config.managed.label.clone(), config.managed.counter)),
    )?;
    let mut console = Console::new(registry);

    println!("{}", "=== Management Console ===".bold());
    println!("registered {}\n", name.to_string().cyan());
    println!("{}\n", HELP);

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    loop {
        print!("{} ", ">".green());
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        if matches!(line.trim(), "quit" | "exit") {
            break;
        }

        match console.execute(&line) {
            Ok(output) if output.is_empty() => {}
            Ok(output) => println!("{}", output),
            Err(err) => {
                warn!(%err, "command failed");
                println!("{} {}", "error:".red(), err);
            }
        }
    }

    println!("{} object(s) still registered", console.registry().len());
    Ok(())
}
