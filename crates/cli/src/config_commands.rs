use std::path::Path;

use {anyhow::Result, clap::Subcommand};

use replywatch_config::{
    Severity, ValidationResult, find_config_file, validate, validate_file,
};

use crate::app;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Validate the configuration and report errors/warnings.
    Check,
    /// Print the effective configuration (file, then environment) as TOML.
    /// Secrets are redacted.
    Show,
}

pub fn handle_config(action: ConfigAction, config_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Check => check(config_path),
        ConfigAction::Show => show(config_path),
    }
}

/// ANSI color codes.
const RED: &str = "\x1b[31m";
const YELLOW: &str = "\x1b[33m";
const BOLD: &str = "\x1b[1m";
const RESET: &str = "\x1b[0m";

fn check(config_path: Option<&Path>) -> Result<()> {
    let path = config_path.map(Path::to_path_buf).or_else(find_config_file);
    let mut result = match path {
        Some(ref path) => validate_file(path),
        None => ValidationResult::default(),
    };

    // Environment-only settings (legacy variables, no file) still need the
    // semantic checks.
    if !result.has_errors() {
        let effective = app::load_config(path.as_deref())?;
        for d in validate(&effective).diagnostics {
            let duplicate = result
                .diagnostics
                .iter()
                .any(|known| known.path == d.path && known.message == d.message);
            if !duplicate {
                result.diagnostics.push(d);
            }
        }
    }

    if let Some(ref path) = path {
        eprintln!("Checking {}\n", path.display());
    } else {
        eprintln!("No config file found; checking defaults and environment.\n");
    }

    for d in &result.diagnostics {
        let (color, label) = match d.severity {
            Severity::Error => (RED, "error"),
            Severity::Warning => (YELLOW, "warning"),
        };

        if d.path.is_empty() {
            eprintln!("  {BOLD}{color}{label}{RESET} {}", d.message);
        } else {
            eprintln!("  {BOLD}{color}{label}{RESET} {}: {}", d.path, d.message);
        }
    }

    let errors = result.count(Severity::Error);
    let warnings = result.count(Severity::Warning);

    if !result.diagnostics.is_empty() {
        eprintln!();
    }

    if errors == 0 && warnings == 0 {
        eprintln!("No issues found.");
    } else {
        eprintln!("{errors} error(s), {warnings} warning(s)");
    }

    if errors > 0 {
        std::process::exit(1);
    }

    Ok(())
}

fn show(config_path: Option<&Path>) -> Result<()> {
    let config = app::load_config(config_path)?;
    print!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
