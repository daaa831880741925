//! Shell completion generation for scrollpump

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io::{self, Write};

use crate::cli::CliArgs;
use crate::error::{ConfigError, Result};

const BIN_NAME: &str = "scrollpump";

/// Generate a shell completion script on stdout
///
/// # Arguments
/// * `shell_name` - Shell type (bash, zsh, fish, powershell)
pub fn generate_completion(shell_name: &str) -> Result<()> {
    let shell = parse_shell(shell_name)?;
    let script = completion_script(shell);
    io::stdout().write_all(&script)?;
    Ok(())
}

/// Render the completion script for `shell`
fn completion_script(shell: Shell) -> Vec<u8> {
    let mut cmd = CliArgs::command();
    let mut buffer = Vec::new();
    generate(shell, &mut cmd, BIN_NAME, &mut buffer);
    buffer
}

/// Parse shell name string to Shell enum
fn parse_shell(shell_name: &str) -> Result<Shell> {
    match shell_name.to_lowercase().as_str() {
        "bash" => Ok(Shell::Bash),
        "zsh" => Ok(Shell::Zsh),
        "fish" => Ok(Shell::Fish),
        "powershell" | "pwsh" => Ok(Shell::PowerShell),
        _ => Err(ConfigError::InvalidValue {
            field: "shell".to_string(),
            value: format!("{shell_name} (supported: bash, zsh, fish, powershell)"),
        }
        .into()),
    }
}
