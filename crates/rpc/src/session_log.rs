#![forbid(unsafe_code)]

//! Bounded session record for debugging transport issues.
//!
//! One small key=value file per storage dir, rewritten in place on every
//! note. Never written to stdout/stderr (stdout is the protocol channel)
//! and never contains request bodies.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::support::{now_ms_i64, now_rfc3339, truncate};

const SESSION_FILE: &str = "gantry_last_session.txt";
const CRASH_FILE: &str = "gantry_last_crash.txt";

#[derive(Clone, Debug)]
pub struct SessionLog {
    path: PathBuf,
    start_rfc3339: String,
    pid: u32,
    args: Vec<String>,
    last_method: Option<String>,
    last_error: Option<String>,
    exit: Option<String>,
}

impl SessionLog {
    pub fn new(storage_dir: &Path) -> Self {
        let this = Self {
            path: storage_dir.join(SESSION_FILE),
            start_rfc3339: now_rfc3339(),
            pid: std::process::id(),
            args: std::env::args().collect(),
            last_method: None,
            last_error: None,
            exit: None,
        };
        this.flush();
        this
    }

    pub fn note_method(&mut self, method: &str) {
        let method = method.trim();
        if method.is_empty() {
            return;
        }
        self.last_method = Some(truncate(method, 96));
        self.flush();
    }

    pub fn note_error(&mut self, error: &str) {
        let error = error.trim();
        if error.is_empty() {
            return;
        }
        self.last_error = Some(truncate(error, 300));
        self.flush();
    }

    pub fn note_exit(&mut self, reason: &str) {
        self.exit = Some(truncate(reason.trim(), 120));
        self.flush();
    }

    fn flush(&self) {
        let mut out = String::new();
        let _ = writeln!(out, "start={}", self.start_rfc3339);
        let _ = writeln!(out, "pid={}", self.pid);
        let _ = writeln!(out, "args={:?}", self.args);
        if let Some(method) = &self.last_method {
            let _ = writeln!(out, "last_method={method}");
        }
        if let Some(error) = &self.last_error {
            let _ = writeln!(out, "last_error={error}");
        }
        if let Some(exit) = &self.exit {
            let _ = writeln!(out, "exit={exit}");
        }
        // Best-effort: a failed log write must never take the server down.
        let _ = std::fs::write(&self.path, out);
    }
}

/// Best-effort crash record; wired into the panic hook by the binary.
pub fn write_crash_record(storage_dir: &Path, kind: &str, detail: &str) {
    let _ = std::fs::create_dir_all(storage_dir);

    let mut out = String::new();
    let _ = writeln!(out, "ts_ms={}", now_ms_i64());
    let _ = writeln!(out, "pid={}", std::process::id());
    let _ = writeln!(out, "kind={kind}");
    let _ = writeln!(out, "args={:?}", std::env::args().collect::<Vec<_>>());
    let _ = writeln!(out, "detail={detail}");

    let _ = std::fs::write(storage_dir.join(CRASH_FILE), out);
}
