//! Structured log viewer
//!
//! Parses JSON log lines into [`LogEntry`] values, orders them by timestamp,
//! and renders `<timestamp> <LEVEL> [<server>:<pid>] <message> <k=v ...>`.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::{Map, Value};

use crate::output::{colorize, BLUE, BOLD, CYAN, GRAY, GREEN, MAGENTA, RED, YELLOW};

use super::store::LogFile;

/// One parsed log line
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub timestamp: Option<DateTime<FixedOffset>>,
    /// Timestamp exactly as written in the line
    pub timestamp_raw: Option<String>,
    /// One of `debug|info|warn|error|fatal|panic`
    pub level: String,
    pub message: String,
    pub server: String,
    pub pid: Option<u32>,
    pub fields: BTreeMap<String, Value>,
    /// The line was not a JSON object
    pub raw: bool,
}

impl LogEntry {
    /// Parse one line from `file`. Non-JSON lines become raw entries.
    pub fn parse(line: &str, file: &LogFile) -> Self {
        let map = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(map)) => map,
            _ => return Self::raw(line, file),
        };
        Self::from_object(map, file)
    }

    fn raw(line: &str, file: &LogFile) -> Self {
        Self {
            timestamp: None,
            timestamp_raw: None,
            level: "info".to_string(),
            message: line.to_string(),
            server: file.server.clone(),
            pid: Some(file.pid),
            fields: BTreeMap::new(),
            raw: true,
        }
    }

    fn from_object(mut map: Map<String, Value>, file: &LogFile) -> Self {
        let timestamp_raw =
            take_string(&mut map, "timestamp").or_else(|| take_string(&mut map, "time"));
        let timestamp = timestamp_raw.as_deref().and_then(parse_timestamp);

        let level = take_string(&mut map, "level")
            .map(|l| normalize_level(&l))
            .unwrap_or_else(|| "info".to_string());

        let mut message =
            take_string(&mut map, "message").or_else(|| take_string(&mut map, "msg"));
        if message.is_none() {
            // tracing's JSON layer nests the message under "fields"
            if let Some(Value::Object(nested)) = map.get_mut("fields") {
                if let Some(Value::String(m)) = nested.remove("message") {
                    message = Some(m);
                }
                if nested.is_empty() {
                    map.remove("fields");
                }
            }
        }

        let server = take_string(&mut map, "server").unwrap_or_else(|| file.server.clone());
        let pid = match map.remove("pid") {
            Some(Value::Number(n)) => n.as_u64().and_then(|p| u32::try_from(p).ok()),
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
        .or(Some(file.pid));

        Self {
            timestamp,
            timestamp_raw,
            level,
            message: message.unwrap_or_default(),
            server,
            pid,
            fields: map.into_iter().collect(),
            raw: false,
        }
    }

    /// Re-emit as a JSON object
    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        if let Some(ts) = &self.timestamp_raw {
            map.insert("timestamp".to_string(), Value::String(ts.clone()));
        }
        map.insert("level".to_string(), Value::String(self.level.clone()));
        map.insert("message".to_string(), Value::String(self.message.clone()));
        map.insert("server".to_string(), Value::String(self.server.clone()));
        if let Some(pid) = self.pid {
            map.insert("pid".to_string(), Value::from(pid));
        }
        for (key, value) in &self.fields {
            map.insert(key.clone(), value.clone());
        }
        Value::Object(map)
    }
}

fn take_string(map: &mut Map<String, Value>, key: &str) -> Option<String> {
    match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        Some(other) => {
            // Keep non-string values out of the way rather than dropping them
            map.insert(key.to_string(), other);
            None
        }
        None => None,
    }
}

fn normalize_level(level: &str) -> String {
    match level.to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "trace" => "debug".to_string(),
        "critical" => "fatal".to_string(),
        other => other.to_string(),
    }
}

/// Parse RFC3339 (any precision) or a zone-less ISO-8601 timestamp (UTC)
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts);
    }
    const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];
    NAIVE_FORMATS.iter().find_map(|fmt| {
        NaiveDateTime::parse_from_str(raw, fmt)
            .ok()
            .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
    })
}

/// Parse every line of one file.
///
/// Raw lines borrow the timestamp of the previous entry in the same file so
/// they stay next to it after sorting.
pub fn parse_lines(lines: &[String], file: &LogFile) -> Vec<LogEntry> {
    let mut last_timestamp = None;
    lines
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| {
            let mut entry = LogEntry::parse(line, file);
            match entry.timestamp {
                Some(ts) => last_timestamp = Some(ts),
                None => entry.timestamp = last_timestamp,
            }
            entry
        })
        .collect()
}

/// Stable sort by timestamp; ties keep their input (file path) order
pub fn sort_entries(entries: &mut [LogEntry]) {
    entries.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
}

/// Fixed colours for well-known servers
const KNOWN_SERVERS: [(&str, &str); 4] = [
    ("calculator", CYAN),
    ("github", MAGENTA),
    ("version", YELLOW),
    ("example", BLUE),
];

/// Round-robin colours for everything else
const ROTATION: [&str; 6] = [GREEN, BLUE, MAGENTA, CYAN, YELLOW, RED];

/// Server and level colouring, stable for the lifetime of the viewer
#[derive(Debug)]
pub struct Palette {
    enabled: bool,
    assigned: HashMap<String, &'static str>,
    next: usize,
}

impl Palette {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            assigned: HashMap::new(),
            next: 0,
        }
    }

    /// Colour for `server`, assigned on first sight
    pub fn server_color(&mut self, server: &str) -> &'static str {
        if let Some(color) = self.assigned.get(server) {
            return *color;
        }
        let color = match KNOWN_SERVERS.iter().find(|(name, _)| *name == server) {
            Some((_, color)) => *color,
            None => {
                let color = ROTATION[self.next % ROTATION.len()];
                self.next += 1;
                color
            }
        };
        self.assigned.insert(server.to_string(), color);
        color
    }

    fn level_style(level: &str) -> &'static [&'static str] {
        match level {
            "debug" => &[GRAY],
            "info" => &[GREEN],
            "warn" => &[YELLOW],
            "error" => &[RED],
            "fatal" | "panic" => &[BOLD, RED],
            _ => &[],
        }
    }

    /// Render one entry on a single line
    pub fn format(&mut self, entry: &LogEntry) -> String {
        let timestamp = match (&entry.timestamp, &entry.timestamp_raw) {
            (Some(ts), _) => ts.to_rfc3339_opts(SecondsFormat::Millis, true),
            (None, Some(raw)) => raw.clone(),
            (None, None) => "-".to_string(),
        };
        let level = format!("{:<5}", entry.level.to_uppercase());
        let source = match entry.pid {
            Some(pid) => format!("[{}:{}]", entry.server, pid),
            None => format!("[{}]", entry.server),
        };

        let server_color = self.server_color(&entry.server);
        let mut line = format!(
            "{} {} {} {}",
            colorize(&[GRAY], &timestamp, self.enabled),
            colorize(Self::level_style(&entry.level), &level, self.enabled),
            colorize(&[server_color], &source, self.enabled),
            entry.message
        );

        for (key, value) in &entry.fields {
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            line.push(' ');
            line.push_str(&colorize(&[GRAY], &format!("{}=", key), self.enabled));
            line.push_str(&rendered);
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::path::PathBuf;

    fn file(server: &str, pid: u32) -> LogFile {
        LogFile {
            server: server.to_string(),
            pid,
            path: PathBuf::from(format!("/logs/{}/server_{}.log", server, pid)),
        }
    }

    #[test]
    fn test_parse_structured_line() {
        let line = r#"{"timestamp":"2026-01-02T03:04:05.123456789Z","level":"INFO","msg":"started","port":8080,"mode":"sse"}"#;
        let entry = LogEntry::parse(line, &file("calculator", 7));

        assert!(!entry.raw);
        assert_eq!(entry.level, "info");
        assert_eq!(entry.message, "started");
        assert_eq!(entry.server, "calculator");
        assert_eq!(entry.pid, Some(7));
        assert_eq!(entry.fields.get("port"), Some(&json!(8080)));
        assert_eq!(
            entry.timestamp.unwrap().timestamp_subsec_nanos(),
            123_456_789
        );
    }

    #[test]
    fn test_parse_keeps_explicit_server_and_pid() {
        let line = r#"{"timestamp":"2026-01-02T03:04:05Z","level":"warn","message":"x","server":"other","pid":"99"}"#;
        let entry = LogEntry::parse(line, &file("calculator", 7));
        assert_eq!(entry.server, "other");
        assert_eq!(entry.pid, Some(99));
    }

    #[test]
    fn test_parse_tracing_nested_message() {
        let line = r#"{"timestamp":"2026-01-02T03:04:05Z","level":"ERROR","fields":{"message":"boom"},"target":"calc"}"#;
        let entry = LogEntry::parse(line, &file("calculator", 7));
        assert_eq!(entry.message, "boom");
        assert_eq!(entry.level, "error");
        assert!(!entry.fields.contains_key("fields"));
        assert_eq!(entry.fields.get("target"), Some(&json!("calc")));
    }

    #[test]
    fn test_parse_raw_line() {
        let entry = LogEntry::parse("plain text output", &file("github", 3));
        assert!(entry.raw);
        assert_eq!(entry.message, "plain text output");
        assert_eq!(entry.pid, Some(3));

        // JSON that is not an object is still raw
        assert!(LogEntry::parse("[1,2,3]", &file("github", 3)).raw);
    }

    #[test]
    fn test_parse_timestamp_variants() {
        assert!(parse_timestamp("2026-01-02T03:04:05Z").is_some());
        assert!(parse_timestamp("2026-01-02T03:04:05.5+02:00").is_some());
        assert!(parse_timestamp("2026-01-02T03:04:05.123").is_some());
        assert!(parse_timestamp("2026-01-02 03:04:05").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_round_trip_preserves_content() {
        let line = r#"{"timestamp":"2026-01-02T03:04:05.000000001Z","level":"debug","message":"hi","a":1,"b":{"c":[true,null]}}"#;
        let f = file("example", 1);
        let entry = LogEntry::parse(line, &f);
        let again = LogEntry::parse(&entry.to_json().to_string(), &f);

        assert_eq!(again.timestamp, entry.timestamp);
        assert_eq!(again.timestamp_raw, entry.timestamp_raw);
        assert_eq!(again.level, entry.level);
        assert_eq!(again.message, entry.message);
        assert_eq!(again.fields, entry.fields);
    }

    #[test]
    fn test_raw_lines_inherit_previous_timestamp() {
        let lines = vec![
            r#"{"timestamp":"2026-01-02T03:04:05Z","level":"info","message":"a"}"#.to_string(),
            "stack frame".to_string(),
            String::new(),
        ];
        let entries = parse_lines(&lines, &file("example", 1));
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].timestamp, entries[0].timestamp);
    }

    #[test]
    fn test_sort_is_stable_by_timestamp() {
        let a = file("a", 1);
        let b = file("b", 2);
        let mut entries = vec![
            LogEntry::parse(r#"{"timestamp":"2026-01-01T00:00:03Z","message":"a3"}"#, &a),
            LogEntry::parse(r#"{"timestamp":"2026-01-01T00:00:01Z","message":"a1"}"#, &a),
            LogEntry::parse(r#"{"timestamp":"2026-01-01T00:00:01Z","message":"b1"}"#, &b),
            LogEntry::parse(r#"{"timestamp":"2026-01-01T00:00:02Z","message":"b2"}"#, &b),
        ];
        sort_entries(&mut entries);
        let order: Vec<&str> = entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(order, vec!["a1", "b1", "b2", "a3"]);
    }

    #[test]
    fn test_palette_assignment_is_stable() {
        let mut palette = Palette::new(true);
        assert_eq!(palette.server_color("calculator"), CYAN);
        let first = palette.server_color("alpha");
        let second = palette.server_color("beta");
        assert_eq!(first, ROTATION[0]);
        assert_eq!(second, ROTATION[1]);
        assert_eq!(palette.server_color("alpha"), first);
    }

    #[test]
    fn test_format_plain() {
        let mut palette = Palette::new(false);
        let entry = LogEntry::parse(
            r#"{"timestamp":"2026-01-02T03:04:05Z","level":"warn","message":"slow","ms":250,"tool":"add"}"#,
            &file("calculator", 42),
        );
        assert_eq!(
            palette.format(&entry),
            "2026-01-02T03:04:05.000Z WARN  [calculator:42] slow ms=250 tool=add"
        );
    }

    #[test]
    fn test_format_colored_wraps_source() {
        let mut palette = Palette::new(true);
        let entry = LogEntry::parse(
            r#"{"timestamp":"2026-01-02T03:04:05Z","level":"error","message":"x"}"#,
            &file("github", 5),
        );
        let rendered = palette.format(&entry);
        assert!(rendered.contains(&format!("{}[github:5]", MAGENTA)));
        assert!(rendered.contains(RED));
    }
}
