//! Launch a tool server as a child process
//!
//! The child's stdin is the parent's stdin. Its stdout and stderr are read by
//! two tasks that copy every chunk to the matching parent stream and every
//! complete line to the server's rotating log file.

use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::error::{MegatoolError, Result};
use crate::locator::BinaryLocator;
use crate::logs::{LogStore, RotatingWriter};
use crate::process::ProcessProbe;
use crate::registry::{AddOptions, Registry};

pub const ENV_SERVER_MODE: &str = "MCP_SERVER_MODE";
pub const ENV_SERVER_PORT: &str = "MCP_SERVER_PORT";
pub const ENV_SERVER_BASE_URL: &str = "MCP_SERVER_BASE_URL";
pub const ENV_HELP_MODE: &str = "MCP_HELP_MODE";

pub const DEFAULT_SSE_PORT: u16 = 8080;

const READINESS_ATTEMPTS: u32 = 50;
const READINESS_INTERVAL: Duration = Duration::from_millis(100);

/// Stream-transport settings handed to the child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseOptions {
    pub port: u16,
    pub base_url: String,
}

/// A parsed `run` invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    pub server: Option<String>,
    pub client: Option<String>,
    pub configure: bool,
    pub sse: Option<SseOptions>,
    /// Arguments forwarded to the child unchanged
    pub child_args: Vec<String>,
}

impl RunRequest {
    /// Split `run` arguments into supervisor flags and child arguments.
    ///
    /// The first bare word is the server name. Supervisor flags may appear
    /// anywhere before `--`; everything after `--` goes to the child.
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self> {
        let mut request = RunRequest::default();
        let mut sse = false;
        let mut port: Option<u16> = None;
        let mut base_url: Option<String> = None;

        let mut iter = args.iter().map(|a| a.as_ref());
        while let Some(arg) = iter.next() {
            if arg == "--" {
                for rest in iter.by_ref() {
                    if request.server.is_none() {
                        request.server = Some(rest.to_string());
                    } else {
                        request.child_args.push(rest.to_string());
                    }
                }
                break;
            }

            let (flag, inline) = match arg.split_once('=') {
                Some((flag, value)) if flag.starts_with("--") => (flag, Some(value)),
                _ => (arg, None),
            };

            match flag {
                "--sse" if inline.is_none() => sse = true,
                "--configure" if inline.is_none() => request.configure = true,
                "--client" => {
                    request.client = Some(flag_value(flag, inline, &mut iter)?);
                }
                "--port" => {
                    let value = flag_value(flag, inline, &mut iter)?;
                    port = Some(value.parse().map_err(|_| {
                        MegatoolError::user_with_hint(
                            format!("Invalid port '{}'", value),
                            "Run 'megatool run --help' for usage",
                        )
                    })?);
                }
                "--base-url" => {
                    let value = flag_value(flag, inline, &mut iter)?;
                    url::Url::parse(&value).map_err(|e| {
                        MegatoolError::user_with_hint(
                            format!("Invalid base URL '{}': {}", value, e),
                            "Run 'megatool run --help' for usage",
                        )
                    })?;
                    base_url = Some(value);
                }
                _ if request.server.is_none() && !arg.starts_with('-') => {
                    request.server = Some(arg.to_string());
                }
                _ => request.child_args.push(arg.to_string()),
            }
        }

        if sse {
            let port = port.unwrap_or(DEFAULT_SSE_PORT);
            request.sse = Some(SseOptions {
                port,
                base_url: base_url.unwrap_or_else(|| format!("http://localhost:{}", port)),
            });
        }
        Ok(request)
    }

    /// Whether the child was asked for its usage text
    pub fn help_requested(&self) -> bool {
        self.child_args.iter().any(|a| a == "--help" || a == "-h")
    }

    /// Environment variables set on the child
    pub fn child_env(&self) -> Vec<(&'static str, String)> {
        let mut env = Vec::new();
        if let Some(sse) = &self.sse {
            env.push((ENV_SERVER_MODE, "sse".to_string()));
            env.push((ENV_SERVER_PORT, sse.port.to_string()));
            env.push((ENV_SERVER_BASE_URL, sse.base_url.clone()));
        }
        if self.help_requested() {
            env.push((ENV_HELP_MODE, "true".to_string()));
        }
        env
    }
}

fn flag_value<'a>(
    flag: &str,
    inline: Option<&str>,
    rest: &mut impl Iterator<Item = &'a str>,
) -> Result<String> {
    inline
        .map(str::to_string)
        .or_else(|| rest.next().map(str::to_string))
        .ok_or_else(|| {
            MegatoolError::user_with_hint(
                format!("{} requires a value", flag),
                "Run 'megatool run --help' for usage",
            )
        })
}

/// Which child stream a line came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

impl Stream {
    fn as_str(self) -> &'static str {
        match self {
            Stream::Stdout => "stdout",
            Stream::Stderr => "stderr",
        }
    }
}

type SharedWriter = Arc<Mutex<RotatingWriter>>;

/// Spawns servers and records them in the registry and log store
pub struct Supervisor<'a> {
    pub locator: &'a BinaryLocator,
    pub store: &'a LogStore,
    pub registry: &'a Registry,
    pub probe: &'a dyn ProcessProbe,
}

impl Supervisor<'_> {
    /// Run the requested server to completion and return its exit code
    pub async fn run(&self, request: &RunRequest) -> Result<i32> {
        let server = request.server.as_deref().ok_or_else(|| {
            MegatoolError::user_with_hint("No server specified", "Run 'megatool ls'")
        })?;
        let binary = self.locator.locate(server)?;
        tracing::debug!("Launching {} from {:?}", server, binary);

        let mut cmd = Command::new(&binary);
        if request.configure {
            cmd.arg("--configure");
        }
        cmd.args(&request.child_args);
        for (key, value) in request.child_env() {
            cmd.env(key, value);
        }

        // Interactive sessions talk to the terminal directly
        if request.configure || request.help_requested() {
            let status = cmd
                .stdin(Stdio::inherit())
                .stdout(Stdio::inherit())
                .stderr(Stdio::inherit())
                .status()
                .await
                .map_err(|e| MegatoolError::io(format!("Failed to start {}", server), e))?;
            return Ok(exit_code(status));
        }

        cmd.stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| MegatoolError::io(format!("Failed to start {}", server), e))?;

        let writer = match child.id() {
            Some(pid) => self.register(server, pid, request.client.clone()),
            None => None,
        };

        let stdout = child.stdout.take().map(|out| {
            tokio::spawn(pump(out, tokio::io::stdout(), writer.clone(), Stream::Stdout))
        });
        let stderr = child.stderr.take().map(|err| {
            tokio::spawn(pump(err, tokio::io::stderr(), writer.clone(), Stream::Stderr))
        });

        let readiness = request
            .sse
            .clone()
            .map(|sse| tokio::spawn(wait_until_listening(server.to_string(), sse)));

        let status = child.wait().await;

        if let Some(readiness) = readiness {
            readiness.abort();
        }
        for pump in [stdout, stderr].into_iter().flatten() {
            join_pump(pump).await;
        }
        if let Some(writer) = writer {
            close_writer(writer);
        }

        let status = status
            .map_err(|e| MegatoolError::io(format!("Failed waiting for {}", server), e))?;
        Ok(exit_code(status))
    }

    /// Open the log file and add the registry record. Neither failure is fatal.
    fn register(&self, server: &str, pid: u32, client: Option<String>) -> Option<SharedWriter> {
        let writer = match self.store.open(server, pid) {
            Ok(writer) => Some(Arc::new(Mutex::new(writer))),
            Err(e) => {
                tracing::warn!("Logging disabled for {} (pid {}): {}", server, pid, e);
                None
            }
        };

        let opts = AddOptions {
            client,
            start_time: None,
        };
        if let Err(e) = self.registry.add(server, pid, opts, self.probe) {
            tracing::warn!("Failed to record {} (pid {}) in registry: {}", server, pid, e);
        }
        writer
    }
}

/// Copy `reader` to `console` chunk by chunk and to `log` line by line
async fn pump<R, W>(mut reader: R, mut console: W, mut log: Option<SharedWriter>, stream: Stream)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut chunk = vec![0u8; 8192];
    let mut pending: Vec<u8> = Vec::new();
    let mut console_open = true;

    loop {
        let n = match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Failed reading child {}: {}", stream.as_str(), e);
                break;
            }
        };

        // Keep draining after the console goes away so the child never blocks
        if console_open {
            let written = async {
                console.write_all(&chunk[..n]).await?;
                console.flush().await
            };
            if let Err(e) = written.await {
                tracing::debug!("Console {} closed: {}", stream.as_str(), e);
                console_open = false;
            }
        }

        if log.is_some() {
            pending.extend_from_slice(&chunk[..n]);
            while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = pending.drain(..=pos).collect();
                write_log_line(&mut log, &line[..pos], stream);
            }
        }
    }

    if !pending.is_empty() {
        write_log_line(&mut log, &pending, stream);
    }
}

fn write_log_line(log: &mut Option<SharedWriter>, line: &[u8], stream: Stream) {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    if line.is_empty() {
        return;
    }
    let Some(writer) = log.as_ref() else {
        return;
    };

    let record = log_record(line, stream);
    let result = match writer.lock() {
        Ok(mut writer) => writer.write_line(&record),
        Err(_) => Err(std::io::Error::other("log writer poisoned")),
    };
    if let Err(e) = result {
        tracing::warn!("Failed to write server log, disabling: {}", e);
        *log = None;
    }
}

/// Render one child line as a structured log record.
///
/// Lines that are already log records (JSON objects carrying a level) are
/// kept verbatim; anything else is wrapped with a timestamp and its stream.
fn log_record(line: &[u8], stream: Stream) -> Vec<u8> {
    if let Ok(Value::Object(map)) = serde_json::from_slice::<Value>(line) {
        if map.contains_key("level") {
            return line.to_vec();
        }
    }

    let level = match stream {
        Stream::Stdout => "debug",
        Stream::Stderr => "info",
    };
    let record = json!({
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
        "level": level,
        "message": String::from_utf8_lossy(line),
        "stream": stream.as_str(),
    });
    record.to_string().into_bytes()
}

async fn join_pump(handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        tracing::warn!("Output task failed: {}", e);
    }
}

fn close_writer(writer: SharedWriter) {
    match Arc::try_unwrap(writer) {
        Ok(mutex) => {
            let writer = mutex.into_inner().unwrap_or_else(|p| p.into_inner());
            if let Err(e) = writer.close() {
                tracing::warn!("Failed to close server log: {}", e);
            }
        }
        Err(_) => tracing::debug!("Server log still shared at exit"),
    }
}

/// Poll the stream-transport port until something accepts connections
async fn wait_until_listening(server: String, sse: SseOptions) {
    for _ in 0..READINESS_ATTEMPTS {
        if tokio::net::TcpStream::connect(("127.0.0.1", sse.port))
            .await
            .is_ok()
        {
            tracing::info!("{} ready at {}/sse", server, sse.base_url.trim_end_matches('/'));
            return;
        }
        tokio::time::sleep(READINESS_INTERVAL).await;
    }
    tracing::warn!(
        "{} is not accepting connections on port {} yet",
        server,
        sse.port
    );
}

/// Exit code to report for a finished child
pub fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogPolicy;
    use crate::registry::tests::FakeProbe;

    fn parse(args: &[&str]) -> RunRequest {
        RunRequest::parse(args).unwrap()
    }

    #[test]
    fn test_parse_plain_server() {
        let req = parse(&["calculator"]);
        assert_eq!(req.server.as_deref(), Some("calculator"));
        assert!(req.child_args.is_empty());
        assert!(req.sse.is_none());
        assert!(req.child_env().is_empty());
    }

    #[test]
    fn test_parse_strips_supervisor_flags() {
        let req = parse(&[
            "--client",
            "cursor",
            "github",
            "--verbose",
            "--sse",
            "--port=9000",
            "extra",
        ]);
        assert_eq!(req.server.as_deref(), Some("github"));
        assert_eq!(req.client.as_deref(), Some("cursor"));
        assert_eq!(req.child_args, ["--verbose", "extra"]);
        assert_eq!(
            req.sse,
            Some(SseOptions {
                port: 9000,
                base_url: "http://localhost:9000".to_string()
            })
        );
    }

    #[test]
    fn test_parse_sse_defaults_and_env() {
        let req = parse(&["calculator", "--sse"]);
        let env = req.child_env();
        assert!(env.contains(&(ENV_SERVER_MODE, "sse".to_string())));
        assert!(env.contains(&(ENV_SERVER_PORT, "8080".to_string())));
        assert!(env.contains(&(ENV_SERVER_BASE_URL, "http://localhost:8080".to_string())));
    }

    #[test]
    fn test_parse_base_url() {
        let req = parse(&["calculator", "--sse", "--base-url", "https://example.com/mcp"]);
        assert_eq!(req.sse.unwrap().base_url, "https://example.com/mcp");

        assert!(RunRequest::parse(&["calculator", "--sse", "--base-url", "not a url"]).is_err());
        assert!(RunRequest::parse(&["calculator", "--port", "http"]).is_err());
        assert!(RunRequest::parse(&["calculator", "--client"]).is_err());
    }

    #[test]
    fn test_parse_double_dash_forwards_everything() {
        let req = parse(&["calculator", "--", "--sse", "--client", "x"]);
        assert!(req.sse.is_none());
        assert!(req.client.is_none());
        assert_eq!(req.child_args, ["--sse", "--client", "x"]);
    }

    #[test]
    fn test_parse_help_mode() {
        let req = parse(&["calculator", "--help"]);
        assert!(req.help_requested());
        assert_eq!(req.child_env(), vec![(ENV_HELP_MODE, "true".to_string())]);

        let req = parse(&["calculator", "--", "-h"]);
        assert!(req.help_requested());
    }

    #[test]
    fn test_parse_configure() {
        let req = parse(&["--configure", "github"]);
        assert!(req.configure);
        assert_eq!(req.server.as_deref(), Some("github"));
    }

    #[test]
    fn test_parse_missing_server() {
        assert_eq!(parse(&[]).server, None);
        assert_eq!(parse(&["--sse"]).server, None);
    }

    #[test]
    fn test_log_record_keeps_structured_lines() {
        let line = br#"{"timestamp":"2026-01-01T00:00:00Z","level":"info","message":"hi"}"#;
        assert_eq!(log_record(line, Stream::Stderr), line.to_vec());
    }

    #[test]
    fn test_log_record_wraps_plain_text() {
        let record = log_record(b"plain text", Stream::Stderr);
        let value: Value = serde_json::from_slice(&record).unwrap();
        assert_eq!(value["message"], "plain text");
        assert_eq!(value["level"], "info");
        assert_eq!(value["stream"], "stderr");
        assert!(value["timestamp"].as_str().unwrap().ends_with('Z'));

        let record = log_record(br#"{"jsonrpc":"2.0","id":1}"#, Stream::Stdout);
        let value: Value = serde_json::from_slice(&record).unwrap();
        assert_eq!(value["stream"], "stdout");
        assert_eq!(value["message"], r#"{"jsonrpc":"2.0","id":1}"#);
    }

    #[tokio::test]
    async fn test_pump_splits_lines_for_log() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("server_1.log");
        let writer = Arc::new(Mutex::new(
            RotatingWriter::open(&path, LogPolicy::default()).unwrap(),
        ));

        let input: &[u8] = b"{\"level\":\"info\",\"message\":\"a\"}\npartial";
        let mut console = Vec::new();
        pump(input, &mut console, Some(writer.clone()), Stream::Stderr).await;
        close_writer(writer);

        assert_eq!(console, input);
        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], "{\"level\":\"info\",\"message\":\"a\"}");
        assert!(lines[1].contains("\"message\":\"partial\""));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_propagates_exit_code_and_registers() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let bin_dir = tmp.path().join("bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        let script = bin_dir.join("megatool-example");
        std::fs::write(&script, "#!/bin/sh\necho Hi\nexit 3\n").unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let locator = BinaryLocator::new(Some(bin_dir), Some(Default::default()));
        let store = LogStore::new(tmp.path().join("logs"), LogPolicy::default());
        let registry = Registry::new(tmp.path().join("config").join("running-servers.json"));
        let probe = FakeProbe::default();
        let supervisor = Supervisor {
            locator: &locator,
            store: &store,
            registry: &registry,
            probe: &probe,
        };

        let code = supervisor.run(&parse(&["example"])).await.unwrap();
        assert_eq!(code, 3);

        let records = registry.read().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "example");

        let log = std::fs::read_to_string(store.log_path("example", records[0].pid)).unwrap();
        assert!(log.contains("\"message\":\"Hi\""));
    }

    #[tokio::test]
    async fn test_run_without_server_is_user_error() {
        let tmp = tempfile::tempdir().unwrap();
        let locator = BinaryLocator::new(Some(tmp.path().to_path_buf()), None);
        let store = LogStore::new(tmp.path().join("logs"), LogPolicy::default());
        let registry = Registry::new(tmp.path().join("running-servers.json"));
        let probe = FakeProbe::default();
        let supervisor = Supervisor {
            locator: &locator,
            store: &store,
            registry: &registry,
            probe: &probe,
        };

        let err = supervisor.run(&RunRequest::default()).await.unwrap_err();
        assert!(matches!(err, MegatoolError::User { .. }));
    }
}
