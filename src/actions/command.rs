//! # Shell command action.
//!
//! Runs a configured argv when a promotion dispatches. Arguments are
//! template-expanded (`{{ version }}` etc.) before the spawn; a non-zero exit
//! or an expired wall-clock budget counts as a failed attempt.

use std::time::Duration;

use log::debug;
use tokio::process::Command;

use crate::config::Config;
use crate::error::ActionError;
use crate::template::{render, TemplateVars};

/// One configured command of a service.
#[derive(Clone, Debug, Default)]
pub struct ShellCommand {
    /// Executable and arguments; element 0 is the program.
    pub argv: Vec<String>,
    /// Wait before the first attempt; `None` inherits zero.
    pub delay: Option<Duration>,
    /// Attempts allowed; `None` inherits the global default.
    pub max_tries: Option<u32>,
}

impl ShellCommand {
    /// Human-readable identifier: the argv joined by spaces.
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }

    /// Runs one attempt.
    ///
    /// The command budget comes from [`Config::command_timeout`]; expiry
    /// kills the process (and its children via `kill_on_drop`).
    pub async fn run_once(&self, vars: &TemplateVars, cfg: &Config) -> Result<(), String> {
        if self.argv.is_empty() {
            return Err(ActionError::ConfigInvalid {
                kind: "command",
                id: self.display(),
                reason: "empty argv".to_string(),
            }
            .to_string());
        }

        let mut expanded = Vec::with_capacity(self.argv.len());
        for arg in &self.argv {
            expanded.push(
                render(arg, vars)
                    .map_err(|e| format!("arg template: {e}"))?
                    .into_owned(),
            );
        }
        debug!("running command {:?}", expanded.join(" "));

        let mut cmd = Command::new(&expanded[0]);
        cmd.args(&expanded[1..]).kill_on_drop(true);
        // Own process group: a timeout kill cannot leave grandchildren
        // holding our stdio.
        #[cfg(unix)]
        cmd.process_group(0);

        let wait = cmd.status();
        let status = match cfg.command_timeout() {
            Some(t) => tokio::time::timeout(t, wait).await.map_err(|_| {
                ActionError::Timeout {
                    id: self.display(),
                    timeout: t,
                }
                .to_string()
            })?,
            None => wait.await,
        }
        .map_err(|e| format!("spawn {:?}: {e}", expanded[0]))?;

        if status.success() {
            Ok(())
        } else {
            Err(format!("exit status {:?}", status.code()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> TemplateVars {
        TemplateVars::new("svc", "", "", "1.2.3")
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        let cmd = ShellCommand {
            argv: vec!["true".into()],
            ..ShellCommand::default()
        };
        assert!(cmd.run_once(&vars(), &Config::default()).await.is_ok());
    }

    #[tokio::test]
    async fn nonzero_exit_is_failure() {
        let cmd = ShellCommand {
            argv: vec!["false".into()],
            ..ShellCommand::default()
        };
        let err = cmd.run_once(&vars(), &Config::default()).await.unwrap_err();
        assert!(err.contains("exit status"));
    }

    #[tokio::test]
    async fn argv_is_template_expanded() {
        let cmd = ShellCommand {
            argv: vec!["test".into(), "{{ version }}".into(), "=".into(), "1.2.3".into()],
            ..ShellCommand::default()
        };
        assert!(cmd.run_once(&vars(), &Config::default()).await.is_ok());
    }

    #[tokio::test]
    async fn timeout_kills_long_commands() {
        let mut cfg = Config::default();
        cfg.command_timeout = Duration::from_millis(50);
        let cmd = ShellCommand {
            argv: vec!["sleep".into(), "5".into()],
            ..ShellCommand::default()
        };
        let err = cmd.run_once(&vars(), &cfg).await.unwrap_err();
        assert!(err.contains("timed out"));
    }

    #[tokio::test]
    async fn empty_argv_fails_fast() {
        let cmd = ShellCommand::default();
        assert!(cmd.run_once(&vars(), &Config::default()).await.is_err());
    }
}
