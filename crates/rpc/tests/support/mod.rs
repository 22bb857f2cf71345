#![forbid(unsafe_code)]
#![allow(dead_code)]

use gantry_core::schema::{AppSchema, BelongsTo, FieldDef, FieldType, ModelSchema};
use gantry_rpc::{Dispatcher, HandlerRegistry, register_model_crud};
use gantry_store::SqliteStore;
use serde_json::{Value, json};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

/// post/author/trackJob: enough surface for every contract scenario.
pub fn test_app() -> AppSchema {
    let mut author = ModelSchema::new("author", "author");
    author.push_field(FieldDef {
        name: "name".to_string(),
        column: "name".to_string(),
        ty: FieldType::Text,
        nullable: false,
        unique: false,
    });

    let mut post = ModelSchema::new("post", "post");
    post.push_field(FieldDef {
        name: "title".to_string(),
        column: "title".to_string(),
        ty: FieldType::Text,
        nullable: false,
        unique: true,
    });
    post.push_field(FieldDef {
        name: "views".to_string(),
        column: "views".to_string(),
        ty: FieldType::Number,
        nullable: false,
        unique: false,
    });
    post.push_field(FieldDef {
        name: "switchIsOn".to_string(),
        column: "switch_is_on".to_string(),
        ty: FieldType::Boolean,
        nullable: true,
        unique: false,
    });
    post.push_field(FieldDef {
        name: "authorId".to_string(),
        column: "author_id".to_string(),
        ty: FieldType::Text,
        nullable: true,
        unique: false,
    });
    post.push_belongs_to(BelongsTo {
        name: "author".to_string(),
        foreign_key_column: "author_id".to_string(),
        references: "author".to_string(),
    });

    let mut track_job = ModelSchema::new("trackJob", "track_job");
    track_job.push_field(FieldDef {
        name: "didJobRun".to_string(),
        column: "did_job_run".to_string(),
        ty: FieldType::Boolean,
        nullable: false,
        unique: false,
    });

    AppSchema::new(vec![author, post, track_job])
}

/// In-memory dispatcher with the generated CRUD actions for every model.
/// `customize` can add bespoke handlers before the dispatcher is built.
pub fn dispatcher_with(customize: impl FnOnce(&mut HandlerRegistry)) -> Dispatcher {
    let app = test_app();
    let store = SqliteStore::open_in_memory().expect("open store");
    store.install_schema(&app).expect("install schema");

    let mut registry = HandlerRegistry::new();
    for model in &app.models {
        register_model_crud(&mut registry, model).expect("register crud");
    }
    customize(&mut registry);

    Dispatcher::new(app, registry, store)
}

pub fn dispatcher() -> Dispatcher {
    dispatcher_with(|_| {})
}

pub fn request(method: &str, params: Value, status: &str) -> Value {
    json!({
        "id": 1,
        "method": method,
        "params": params,
        "meta": {
            "permissionState": { "status": status },
            "tracing": null,
        },
    })
}

pub fn granted(method: &str, params: Value) -> Value {
    request(method, params, "granted")
}

pub fn error_code(response: &Value) -> Option<&str> {
    response.get("error")?.get("code")?.as_str()
}

pub fn result_count(response: &Value) -> u64 {
    response
        .get("result")
        .and_then(|v| v.get("count"))
        .and_then(|v| v.as_u64())
        .expect("result.count")
}

/// Spawned server speaking newline JSON over stdio, one response line per
/// request line.
pub struct Server {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    dir: PathBuf,
}

impl Server {
    pub fn start(test_name: &str) -> Self {
        let dir = std::env::temp_dir().join(format!(
            "gantry_test_{test_name}_{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).expect("create test dir");

        let schema_path = dir.join("schema.json");
        std::fs::write(
            &schema_path,
            serde_json::to_string_pretty(&json!({
                "models": [
                    {
                        "name": "post",
                        "fields": [
                            { "name": "title", "type": "text", "unique": true },
                            { "name": "views", "type": "number" },
                        ],
                    },
                ]
            }))
            .expect("render schema"),
        )
        .expect("write schema");

        let mut child = Command::new(env!("CARGO_BIN_EXE_gantry_rpc"))
            .arg("--schema")
            .arg(&schema_path)
            .arg("--storage-dir")
            .arg(&dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn gantry_rpc");

        let stdin = child.stdin.take().expect("child stdin");
        let stdout = BufReader::new(child.stdout.take().expect("child stdout"));
        Self {
            child,
            stdin,
            stdout,
            dir,
        }
    }

    pub fn request(&mut self, body: Value) -> Value {
        let line = serde_json::to_string(&body).expect("encode request");
        self.request_raw(&line)
    }

    pub fn request_raw(&mut self, line: &str) -> Value {
        writeln!(self.stdin, "{line}").expect("write request");
        self.stdin.flush().expect("flush request");

        let mut response = String::new();
        self.stdout.read_line(&mut response).expect("read response");
        serde_json::from_str(&response).expect("decode response")
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}
