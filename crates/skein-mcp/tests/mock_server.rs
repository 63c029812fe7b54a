//! Minimal stdio MCP server used by the integration tests.
//!
//! Flags:
//! - `--framing newline|content-length`: output framing (default content-length)
//! - `--noise`: print a non-protocol banner on stdout before serving
//! - `--empty-tools`: answer `tools/list` with no tools
//! - `--ignore METHOD`: never answer requests for METHOD
//!
//! Tools: `echo`, `add`, `slow` (sleeps `ms`), `env` (reads variable `name`),
//! `crash` (exits the process).

use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use serde_json::{Value, json};
use skein_mcp::codec::{FrameDecoder, FramingMode, encode_frame};

struct Options {
    framing: FramingMode,
    noise: bool,
    empty_tools: bool,
    ignore: Vec<String>,
}

fn parse_args() -> Options {
    let mut options = Options {
        framing: FramingMode::ContentLength,
        noise: false,
        empty_tools: false,
        ignore: Vec::new(),
    };
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--framing" => {
                let value = args.next().unwrap_or_default();
                options.framing = value.parse().unwrap_or_else(|e: String| {
                    eprintln!("{e}");
                    std::process::exit(2);
                });
            }
            "--noise" => options.noise = true,
            "--empty-tools" => options.empty_tools = true,
            "--ignore" => options.ignore.extend(args.next()),
            other => {
                eprintln!("unknown flag: {other}");
                std::process::exit(2);
            }
        }
    }
    options
}

struct Server {
    options: Options,
    initialized: AtomicBool,
    stdout: Mutex<std::io::Stdout>,
}

impl Server {
    fn send(&self, message: &Value) {
        let frame = encode_frame(message, self.options.framing).expect("encode frame");
        let mut stdout = self.stdout.lock().expect("stdout lock");
        stdout.write_all(&frame).expect("write frame");
        stdout.flush().expect("flush");
    }

    fn respond(&self, id: Value, outcome: Result<Value, (i64, String)>) {
        let message = match outcome {
            Ok(result) => json!({"jsonrpc": "2.0", "id": id, "result": result}),
            Err((code, message)) => {
                json!({"jsonrpc": "2.0", "id": id, "error": {"code": code, "message": message}})
            }
        };
        self.send(&message);
    }

    fn tools(&self) -> Value {
        if self.options.empty_tools {
            return json!({"tools": []});
        }
        json!({
            "tools": [
                {"name": "echo", "description": "Echo the text back", "inputSchema": {"type": "object", "properties": {"text": {"type": "string"}}}},
                {"name": "add", "description": "Add two numbers", "inputSchema": {"type": "object"}},
                {"name": "slow", "description": "Sleep, then answer"},
                {"name": "env", "description": "Read an environment variable"},
                {"name": "crash", "description": "Exit the server"},
                {"name": "   ", "description": "Blank names are dropped by clients"}
            ]
        })
    }

    fn call_tool(&self, params: &Value) -> Result<Value, (i64, String)> {
        let name = params.get("name").and_then(Value::as_str).unwrap_or_default();
        let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));
        match name {
            "echo" => {
                let text = args
                    .get("text")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| args.to_string());
                Ok(json!({"content": [{"type": "text", "text": text}]}))
            }
            "add" => {
                let a = args.get("a").and_then(Value::as_f64).unwrap_or(0.0);
                let b = args.get("b").and_then(Value::as_f64).unwrap_or(0.0);
                Ok(json!({
                    "content": [{"type": "text", "text": (a + b).to_string()}],
                    "structuredContent": {"sum": a + b}
                }))
            }
            "slow" => {
                let ms = args.get("ms").and_then(Value::as_u64).unwrap_or(100);
                thread::sleep(Duration::from_millis(ms));
                Ok(json!({"content": [{"type": "text", "text": format!("slept {ms}ms")}]}))
            }
            "env" => {
                let var = args.get("name").and_then(Value::as_str).unwrap_or_default();
                let value = std::env::var(var).unwrap_or_default();
                Ok(json!({"content": [{"type": "text", "text": value}]}))
            }
            "crash" => {
                eprintln!("crashing on request");
                std::process::exit(1);
            }
            other => Ok(json!({
                "content": [{"type": "text", "text": format!("unknown tool: {other}")}],
                "isError": true
            })),
        }
    }

    fn handle(self: &Arc<Self>, message: Value) {
        let method = message.get("method").and_then(Value::as_str).unwrap_or_default().to_string();
        let Some(id) = message.get("id").cloned() else {
            if method == "notifications/initialized" {
                self.initialized.store(true, Ordering::SeqCst);
            }
            return;
        };
        if self.options.ignore.contains(&method) {
            eprintln!("ignoring {method}");
            return;
        }
        let params = message.get("params").cloned().unwrap_or(Value::Null);

        match method.as_str() {
            "initialize" => {
                let version = params
                    .get("protocolVersion")
                    .cloned()
                    .unwrap_or_else(|| json!("2024-11-05"));
                self.respond(
                    id,
                    Ok(json!({
                        "protocolVersion": version,
                        "capabilities": {"tools": {}},
                        "serverInfo": {"name": "mock-mcp-server", "version": "0.1.0"}
                    })),
                );
            }
            "tools/list" | "tools/call" if !self.initialized.load(Ordering::SeqCst) => {
                self.respond(id, Err((-32002, "server not initialized".to_string())));
            }
            "tools/list" => self.respond(id, Ok(self.tools())),
            "tools/call" => {
                let server = Arc::clone(self);
                thread::spawn(move || {
                    let outcome = server.call_tool(&params);
                    server.respond(id, outcome);
                });
            }
            other => self.respond(id, Err((-32601, format!("method not found: {other}")))),
        }
    }
}

fn main() {
    let options = parse_args();
    // A Content-Length decoder also reads newline input until it sees a header.
    let mut decoder = FrameDecoder::new(FramingMode::ContentLength);
    let server = Arc::new(Server {
        options,
        initialized: AtomicBool::new(false),
        stdout: Mutex::new(std::io::stdout()),
    });

    eprintln!("mock-mcp-server ready");
    if server.options.noise {
        let mut stdout = server.stdout.lock().expect("stdout lock");
        writeln!(stdout, "mock-mcp-server v0.1.0 starting (this line is not JSON)").expect("write");
        stdout.flush().expect("flush");
    }

    let mut stdin = std::io::stdin();
    let mut chunk = [0u8; 4096];
    loop {
        let n = match stdin.read(&mut chunk) {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        for message in decoder.push(&chunk[..n]) {
            server.handle(message);
        }
    }
}
