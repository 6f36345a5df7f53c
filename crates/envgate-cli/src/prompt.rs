// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Interactive input. PINs are read without echo on a terminal and one line at
// a time from a pipe, so scripted use works.

use std::io::{self, BufRead, IsTerminal, Write};

use envgate_core::error::Result;
use envgate_core::types::Pin;

pub fn read_secret(prompt: &str) -> Result<Pin> {
    if io::stdin().is_terminal() {
        Ok(Pin::new(rpassword::prompt_password(prompt)?))
    } else {
        Ok(Pin::new(read_line()?))
    }
}

/// Typed `YES` confirmation. Anything else declines.
pub fn confirm(question: &str) -> Result<bool> {
    eprint!("{question} Type YES to continue: ");
    io::stderr().flush()?;
    Ok(read_line()? == "YES")
}

fn read_line() -> Result<String> {
    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim_end_matches(['\r', '\n']).to_owned())
}
