// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Command-line surface.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use envgate_core::error::Result;
use envgate_core::types::Pin;

use crate::prompt;

/// envgate - PIN-signed approvals gating access to a local secrets file
#[derive(Debug, Parser)]
#[command(name = "envgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Project root holding the secure directory and ledger
    #[arg(long, env = "ENVGATE_ROOT", global = true)]
    pub root: Option<PathBuf>,

    /// Configuration file (default: <root>/envgate.json when present)
    #[arg(long, env = "ENVGATE_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Set or replace the PIN
    SetPin,

    /// Issue a signed approval
    Approve {
        /// What the approval is for
        #[arg(long, short)]
        message: String,
        #[command(flatten)]
        pin: PinArg,
    },

    /// List stored approvals
    List,

    /// Check an approval exists and is in the ledger
    Verify {
        approval_id: String,
    },

    /// Check an approval's signature under the PIN, then the ledger
    VerifyPin {
        approval_id: String,
        #[command(flatten)]
        pin: PinArg,
    },

    /// Show recent gate decisions
    Decisions {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// Make the secrets file read-only
    Lock,

    /// Make the secrets file writable under an approval
    Unlock {
        approval_id: String,
        #[command(flatten)]
        pin: PinArg,
    },

    /// List changed files in the working tree (strict approval)
    ChangedFiles {
        #[arg(long)]
        approval_id: Option<String>,
        #[command(flatten)]
        pin: PinArg,
    },

    /// Run a command under an approval
    Exec {
        #[arg(long)]
        approval_id: Option<String>,
        #[command(flatten)]
        pin: PinArg,
        /// Authorise only, do not run
        #[arg(long)]
        dry_run: bool,
        #[arg(last = true)]
        command: Vec<String>,
    },

    /// Stage a release bundle with manifest, build report and tar.gz archive
    Export {
        #[arg(long, short)]
        output: PathBuf,
        /// Add the secrets file (requires an approval)
        #[arg(long)]
        include_secrets: bool,
        #[arg(long)]
        approval_id: Option<String>,
        #[command(flatten)]
        pin: PinArg,
    },

    /// Take read-only copies of the secrets files under an approval
    Snapshot {
        #[arg(long, short)]
        output: PathBuf,
        #[arg(long)]
        approval_id: Option<String>,
        #[command(flatten)]
        pin: PinArg,
        /// Extra file to copy, relative to the root (repeatable)
        #[arg(long)]
        include: Vec<PathBuf>,
    },
}

/// `--pin <PIN>` supplies the PIN inline; a bare `--pin` prompts for it.
#[derive(Debug, Clone, Default, Args)]
pub struct PinArg {
    #[arg(long = "pin", value_name = "PIN", num_args = 0..=1)]
    pub pin: Option<Option<String>>,
}

impl PinArg {
    /// The PIN when one is needed. `required` prompts even without `--pin`.
    pub fn resolve(&self, required: bool) -> Result<Option<Pin>> {
        match &self.pin {
            Some(Some(inline)) => Ok(Some(Pin::new(inline.as_str()))),
            Some(None) => prompt::read_secret("PIN: ").map(Some),
            None if required => prompt::read_secret("PIN: ").map(Some),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("envgate").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn approve_with_inline_pin() {
        let cli = parse(&["approve", "-m", "rotate keys", "--pin", "1234"]);
        let Command::Approve { message, pin } = cli.command else {
            panic!("expected approve");
        };
        assert_eq!(message, "rotate keys");
        assert_eq!(pin.resolve(true).unwrap(), Some(Pin::new("1234")));
    }

    #[test]
    fn bare_pin_flag_means_prompt() {
        let cli = parse(&["unlock", "abc", "--pin"]);
        let Command::Unlock { pin, .. } = cli.command else {
            panic!("expected unlock");
        };
        assert_eq!(pin.pin, Some(None));
    }

    #[test]
    fn optional_pin_absent() {
        let cli = parse(&["unlock", "abc"]);
        let Command::Unlock { pin, .. } = cli.command else {
            panic!("expected unlock");
        };
        assert_eq!(pin.resolve(false).unwrap(), None);
    }

    #[test]
    fn exec_takes_trailing_command() {
        let cli = parse(&["exec", "--approval-id", "x", "--dry-run", "--", "make", "-j4"]);
        let Command::Exec {
            approval_id,
            dry_run,
            command,
            ..
        } = cli.command
        else {
            panic!("expected exec");
        };
        assert_eq!(approval_id.as_deref(), Some("x"));
        assert!(dry_run);
        assert_eq!(command, vec!["make", "-j4"]);
    }

    #[test]
    fn snapshot_collects_repeated_includes() {
        let cli = parse(&[
            "snapshot", "-o", "build", "--include", "a.env", "--include", "b.env",
        ]);
        let Command::Snapshot {
            output,
            approval_id,
            include,
            ..
        } = cli.command
        else {
            panic!("expected snapshot");
        };
        assert_eq!(output, PathBuf::from("build"));
        assert_eq!(approval_id, None);
        assert_eq!(include, vec![PathBuf::from("a.env"), PathBuf::from("b.env")]);
    }

    #[test]
    fn global_root_after_subcommand() {
        let cli = parse(&["list", "--root", "/tmp/project"]);
        assert_eq!(cli.root, Some(PathBuf::from("/tmp/project")));
    }
}
