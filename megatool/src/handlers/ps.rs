//! ps command handler

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

use super::CommandContext;
use crate::cli::{PsField, PsFormat};
use crate::registry::{format_uptime, instance_number, ServerRecord};

/// Handle the `ps` command
pub fn run_ps(
    ctx: &CommandContext,
    format: PsFormat,
    fields: &[PsField],
    no_header: bool,
    client: Option<&str>,
) -> Result<()> {
    let servers = ctx
        .registry()
        .read_active(ctx.probe())
        .context("Failed to read running servers")?;

    if !servers.iter().any(|s| launched_by(s, client)) && format == PsFormat::Table {
        println!("No servers running.");
        return Ok(());
    }

    let fields = if fields.is_empty() {
        &PsField::DEFAULT[..]
    } else {
        fields
    };
    print!(
        "{}",
        render(&servers, client, format, fields, no_header, Utc::now())
    );
    Ok(())
}

fn launched_by(record: &ServerRecord, client: Option<&str>) -> bool {
    match client {
        Some(client) => record.client.as_deref() == Some(client),
        None => true,
    }
}

/// One display row, with instance numbering resolved
struct Row<'a> {
    record: &'a ServerRecord,
    instance: usize,
    instances: usize,
    uptime: String,
}

impl Row<'_> {
    fn display_name(&self) -> String {
        if self.instances > 1 {
            format!(
                "{} (instance {} of {})",
                self.record.name, self.instance, self.instances
            )
        } else {
            self.record.name.clone()
        }
    }

    fn cell(&self, field: PsField) -> String {
        match field {
            PsField::Name => self.display_name(),
            PsField::Pid => self.record.pid.to_string(),
            PsField::Uptime => self.uptime.clone(),
            PsField::Client => self.record.client.clone().unwrap_or_default(),
        }
    }
}

/// Render the process list in the requested format.
///
/// Instances are numbered across every running server, then rows not
/// launched by `client` are dropped.
pub fn render(
    servers: &[ServerRecord],
    client: Option<&str>,
    format: PsFormat,
    fields: &[PsField],
    no_header: bool,
    now: DateTime<Utc>,
) -> String {
    let mut sorted: Vec<&ServerRecord> = servers.iter().filter(|s| launched_by(s, client)).collect();
    sorted.sort_by(|a, b| {
        a.name
            .cmp(&b.name)
            .then(a.start_time.cmp(&b.start_time))
            .then(a.pid.cmp(&b.pid))
    });

    let rows: Vec<Row> = sorted
        .into_iter()
        .map(|record| {
            let (instance, instances) = instance_number(record, servers);
            Row {
                record,
                instance,
                instances,
                uptime: format_uptime(record.start_time, now),
            }
        })
        .collect();

    match format {
        PsFormat::Table => render_table(&rows, fields, no_header),
        PsFormat::Csv => render_csv(&rows, fields, no_header),
        PsFormat::Json => render_json(&rows, fields),
    }
}

fn render_table(rows: &[Row], fields: &[PsField], no_header: bool) -> String {
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| fields.iter().map(|f| row.cell(*f)).collect())
        .collect();

    let widths: Vec<usize> = fields
        .iter()
        .enumerate()
        .map(|(i, field)| {
            cells
                .iter()
                .map(|row| row[i].chars().count())
                .chain(std::iter::once(field.header().len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = String::new();
    if !no_header {
        let header: Vec<String> = fields
            .iter()
            .zip(&widths)
            .map(|(field, width)| format!("{:<width$}", field.header(), width = width))
            .collect();
        out.push_str(header.join("  ").trim_end());
        out.push('\n');
        let total = widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1);
        out.push_str(&"─".repeat(total));
        out.push('\n');
    }
    for row in cells {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect();
        out.push_str(line.join("  ").trim_end());
        out.push('\n');
    }
    out
}

fn render_csv(rows: &[Row], fields: &[PsField], no_header: bool) -> String {
    let mut out = String::new();
    if !no_header {
        let header: Vec<&str> = fields.iter().map(|f| f.key()).collect();
        out.push_str(&header.join(","));
        out.push('\n');
    }
    for row in rows {
        let line: Vec<String> = fields.iter().map(|f| csv_escape(&row.cell(*f))).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out
}

fn csv_escape(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn render_json(rows: &[Row], fields: &[PsField]) -> String {
    let items: Vec<Value> = rows
        .iter()
        .map(|row| {
            let mut item = Map::new();
            for field in fields {
                let value = match field {
                    PsField::Name => json!(row.record.name),
                    PsField::Pid => json!(row.record.pid),
                    PsField::Uptime => json!(row.uptime),
                    PsField::Client => json!(row.record.client),
                };
                item.insert(field.key().to_string(), value);
            }
            if fields.contains(&PsField::Name) {
                item.insert("instance".to_string(), json!(row.instance));
                item.insert("instances".to_string(), json!(row.instances));
            }
            item.insert("start_time".to_string(), json!(row.record.start_time));
            Value::Object(item)
        })
        .collect();

    let mut out = serde_json::to_string_pretty(&items).unwrap_or_else(|_| "[]".to_string());
    out.push('\n');
    out
}
