// Copyright 2025 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

//! Process-wide diagnostic log, drained via the `get_log`/`clear_log` C ABI pair.
//!
//! A single translation owns a local [`Log`] it logs into during parsing and
//! the semantic passes; the crate's `xmutil` front-end copies the finished
//! log into the process-wide buffer so that `get_log`/`clear_log` can expose
//! it across the FFI boundary, mirroring xmutil's process-wide `Log.cpp`.

use std::fmt::Write as _;
use std::sync::Mutex;

use crate::common::Diag;

/// An append-only collection of diagnostics produced by one translation.
#[derive(Debug, Default)]
pub struct Log {
    lines: Vec<String>,
    had_errors: bool,
}

impl Log {
    pub fn new() -> Self {
        Log::default()
    }

    pub fn push(&mut self, diag: &Diag) {
        self.had_errors = true;
        let mut line = format!("Error at {}", diag);
        // keep a trailing newline out of the stored line; callers join with "\n"
        if line.ends_with('\n') {
            line.pop();
        }
        self.lines.push(line);
    }

    pub fn note(&mut self, message: impl Into<String>) {
        self.lines.push(message.into());
    }

    pub fn had_errors(&self) -> bool {
        self.had_errors
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Render the accumulated lines, one per line, with a trailing newline on
    /// each — matching `log(fmt, args...)` appending "a formatted line with
    /// trailing newline" per §6.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            let _ = writeln!(out, "{line}");
        }
        out
    }
}

static PROCESS_LOG: Mutex<String> = Mutex::new(String::new());

/// Append `text` to the process-wide log buffer.
pub fn append_process_log(text: &str) {
    if text.is_empty() {
        return;
    }
    let mut guard = PROCESS_LOG.lock().unwrap();
    guard.push_str(text);
}

/// Snapshot the process-wide log buffer without clearing it.
pub fn read_process_log() -> String {
    PROCESS_LOG.lock().unwrap().clone()
}

/// Clear the process-wide log buffer.
pub fn clear_process_log() {
    PROCESS_LOG.lock().unwrap().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ErrorCode;

    #[test]
    fn render_joins_with_trailing_newlines() {
        let mut log = Log::new();
        log.push(&Diag {
            line: 3,
            column: 1,
            file: Some("model.mdl".to_string()),
            code: ErrorCode::UnrecognizedToken,
            message: "bad token".to_string(),
        });
        assert!(log.had_errors());
        assert_eq!(
            log.render(),
            "Error at 3:1 in model.mdl: bad token (unrecognized_token)\n"
        );
    }

    #[test]
    fn process_log_round_trips() {
        clear_process_log();
        append_process_log("hello\n");
        assert_eq!(read_process_log(), "hello\n");
        clear_process_log();
        assert_eq!(read_process_log(), "");
    }
}
