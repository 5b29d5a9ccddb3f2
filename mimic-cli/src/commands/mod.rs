//! CLI commands: thin wrappers over the mimic-core executor.

use anyhow::{Context, Result};
use colored::Colorize;
use mimic_core::{
    fleet, CommandDriver, LifecycleExecutor, LogAuditSink, OrchestrationResult, VmState,
};
use std::sync::Arc;
use tabled::{settings::Style, Table, Tabled};

fn build_executor(file: &str, driver_program: &str) -> Result<LifecycleExecutor> {
    let plan = fleet::load(file).with_context(|| format!("Failed to load fleet file {}", file))?;
    Ok(LifecycleExecutor::new(
        plan,
        Arc::new(CommandDriver::new(driver_program)),
        Arc::new(LogAuditSink),
    ))
}

/// Start VMs. Returns false iff any VM recorded an error.
pub async fn up(file: &str, driver: &str, names: &[String], parallel: bool) -> Result<bool> {
    let executor = build_executor(file, driver)?;

    let scope = if names.is_empty() {
        format!("{} VM(s)", executor.plan().vms.len())
    } else {
        names.join(", ")
    };
    println!("{} Starting {}", "→".cyan().bold(), scope);

    let result = executor.up(names, parallel).await?;
    print_result(&result);
    Ok(result.success)
}

/// Stop VMs in reverse dependency order.
pub async fn down(file: &str, driver: &str, names: &[String], force: bool) -> Result<bool> {
    let executor = build_executor(file, driver)?;

    let scope =
        if names.is_empty() { "all VMs".to_string() } else { names.join(", ") };
    println!("{} Stopping {}", "→".cyan().bold(), scope);

    let result = executor.down(names, force).await?;
    print_result(&result);
    Ok(result.success)
}

/// Stop then start; the start phase only runs after a clean stop.
pub async fn restart(file: &str, driver: &str, names: &[String], parallel: bool) -> Result<bool> {
    let executor = build_executor(file, driver)?;

    let result = executor.restart(names, parallel).await?;
    print_result(&result);
    Ok(result.success)
}

/// Show per-VM orchestration and live driver state.
pub async fn status(file: &str, driver: &str) -> Result<()> {
    let executor = build_executor(file, driver)?;
    let status = executor.status().await;

    #[derive(Tabled)]
    struct StatusRow {
        #[tabled(rename = "VM")]
        name: String,
        #[tabled(rename = "STATE")]
        state: String,
        #[tabled(rename = "DRIVER")]
        actual: String,
        #[tabled(rename = "IP")]
        ip: String,
        #[tabled(rename = "HEALTH")]
        health: String,
    }

    let mut rows: Vec<StatusRow> = status
        .into_iter()
        .map(|(name, info)| StatusRow {
            name,
            state: colorize_state(info.state),
            actual: info.actual_state,
            ip: info.ip.unwrap_or_else(|| "-".to_string()),
            health: if info.health_passed { "passed".green().to_string() } else { "-".to_string() },
        })
        .collect();
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{}", table);
    Ok(())
}

fn print_result(result: &OrchestrationResult) {
    let mut names: Vec<&String> = result.states.keys().collect();
    names.sort();

    for name in names {
        let state = result.states[name];
        let glyph = match state {
            VmState::Failed => "✗".red().bold(),
            VmState::Unhealthy => "!".yellow().bold(),
            _ => "✓".green().bold(),
        };
        println!("  {} {} {}", glyph, name.bold(), state.to_string().dimmed());
        if let Some(error) = result.errors.get(name) {
            println!("      {}", error.red());
        }
    }

    if result.success {
        println!(
            "{} Done in {:.1}s",
            "✓".green().bold(),
            result.duration.as_secs_f64()
        );
    } else {
        println!(
            "{} Completed with {} error(s) in {:.1}s",
            "✗".red().bold(),
            result.errors.len(),
            result.duration.as_secs_f64()
        );
    }
}

fn colorize_state(state: VmState) -> String {
    let rendered = state.to_string();
    match state {
        VmState::Running | VmState::Healthy => rendered.green().to_string(),
        VmState::Failed | VmState::Unhealthy => rendered.red().to_string(),
        VmState::Stopped | VmState::Pending => rendered.dimmed().to_string(),
        _ => rendered.yellow().to_string(),
    }
}
