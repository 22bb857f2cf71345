#![forbid(unsafe_code)]

//! gantry server binary.
//!
//! Serves newline-delimited JSON envelopes on stdin/stdout: one request
//! line in, one response line out. The application schema comes from a
//! JSON file; every model is exposed through its generated CRUD actions,
//! plus a `ping` job so job dispatch is reachable from the wire.

use gantry_rpc::{
    Dispatcher, ExecutionContext, HandlerRegistry, SessionLog, load_app_schema,
    register_model_crud, write_crash_record,
};
use gantry_store::SqliteStore;
use serde_json::Value;
use std::io::{BufRead, Write as _};
use std::path::PathBuf;

const SERVER_NAME: &str = "gantry_rpc";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_STORAGE_DIR: &str = ".gantry";

fn usage() -> &'static str {
    "gantry_rpc — action/job execution core (stdio, newline JSON)\n\n\
USAGE:\n\
  gantry_rpc --schema FILE [--storage-dir DIR]\n\
\n\
FLAGS:\n\
  -h, --help       Print this help and exit\n\
  -V, --version    Print version and exit\n\
\n\
NOTES:\n\
  - Requests are one JSON object per line: {id, method, params, meta}\n\
  - meta.permissionState.status must be granted|pending|denied\n"
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = std::env::args().collect::<Vec<_>>();
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-h" | "--help"))
    {
        print!("{}", usage());
        return Ok(());
    }
    if args
        .iter()
        .any(|arg| matches!(arg.as_str(), "-V" | "--version"))
    {
        println!("{SERVER_NAME} {SERVER_VERSION}");
        return Ok(());
    }

    let Some(schema_path) = flag_value(&args, "--schema") else {
        eprint!("{}", usage());
        return Err("--schema FILE is required".into());
    };
    let storage_dir = flag_value(&args, "--storage-dir")
        .map_or_else(|| PathBuf::from(DEFAULT_STORAGE_DIR), PathBuf::from);

    std::fs::create_dir_all(&storage_dir)?;
    install_crash_reporter(storage_dir.clone());
    let mut session_log = SessionLog::new(&storage_dir);

    let app = load_app_schema(&PathBuf::from(schema_path))?;
    let store = SqliteStore::open(&storage_dir)?;
    store.install_schema(&app)?;

    let mut registry = HandlerRegistry::new();
    for model in &app.models {
        register_model_crud(&mut registry, model)?;
    }
    registry.register_job(
        "ping",
        |_ctx: &mut ExecutionContext<'_>, _params: &Value| Ok(None),
    )?;

    let mut dispatcher = Dispatcher::new(app, registry, store);
    run_stdio(&mut dispatcher, &mut session_log)
}

fn run_stdio(
    dispatcher: &mut Dispatcher,
    session_log: &mut SessionLog,
) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = std::io::stdin();
    let mut reader = stdin.lock();
    let mut stdout = std::io::stdout().lock();
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader.read_line(&mut line)?;
        if read == 0 {
            session_log.note_exit("stdin closed");
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<Value>(&line) {
            Ok(request) => {
                if let Some(method) = request.get("method").and_then(|v| v.as_str()) {
                    session_log.note_method(method);
                }
                dispatcher.dispatch(request)
            }
            // Not JSON at all; dispatch_line shapes the malformed-request error.
            Err(_) => dispatcher.dispatch_line(&line),
        };
        if let Some(error) = response.get("error")
            && !error.is_null()
        {
            let code = error.get("code").and_then(|v| v.as_str()).unwrap_or("");
            let message = error.get("message").and_then(|v| v.as_str()).unwrap_or("");
            session_log.note_error(&format!("{code}: {message}"));
        }

        writeln!(stdout, "{}", serde_json::to_string(&response)?)?;
        stdout.flush()?;
    }
}

fn flag_value(args: &[String], flag: &str) -> Option<String> {
    let index = args.iter().position(|arg| arg == flag)?;
    args.get(index + 1).cloned()
}

fn install_crash_reporter(storage_dir: PathBuf) {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        write_crash_record(&storage_dir, "panic", &info.to_string());
        default_hook(info);
    }));
}
