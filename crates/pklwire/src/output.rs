use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use pklwire_value::Value;

use crate::exit::{CliError, CliResult, INTERNAL};

#[derive(Clone, Debug, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
    Raw,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

pub fn print_value(value: &Value, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", to_json(value)?),
        OutputFormat::Pretty => println!("{}", to_json_pretty(value)?),
        OutputFormat::Table => println!("{}", value_table(value)?),
        // Raw results are written undecoded by the caller.
        OutputFormat::Raw => println!("{}", to_json(value)?),
    }
    Ok(())
}

pub fn print_files(files: &BTreeMap<String, String>, format: OutputFormat) -> CliResult<()> {
    match format {
        OutputFormat::Json => println!("{}", serialize(files, false)?),
        OutputFormat::Pretty => {
            for (name, text) in files {
                println!("--- {name} ---");
                print!("{text}");
                if !text.ends_with('\n') {
                    println!();
                }
            }
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FILE", "BYTES"]);
            for (name, text) in files {
                table.add_row(vec![name.clone(), text.len().to_string()]);
            }
            println!("{table}");
        }
        OutputFormat::Raw => {
            for text in files.values() {
                print_raw(text.as_bytes());
            }
        }
    }
    Ok(())
}

pub fn print_text(text: &str) {
    print_raw(text.as_bytes());
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn to_json(value: &Value) -> CliResult<String> {
    serialize(value, false)
}

fn to_json_pretty(value: &Value) -> CliResult<String> {
    serialize(value, true)
}

fn serialize<T: serde::Serialize + ?Sized>(value: &T, pretty: bool) -> CliResult<String> {
    let result = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    result.map_err(|e| CliError::new(INTERNAL, format!("failed to render JSON: {e}")))
}

/// One row per property, entry or element; scalars get a single row.
fn value_table(value: &Value) -> CliResult<Table> {
    let mut rows: Vec<(String, &Value)> = Vec::new();
    match value {
        Value::Object(object) => {
            rows.extend(object.properties.iter().map(|(n, v)| (n.to_string(), v)));
        }
        Value::Dynamic(dynamic) => {
            rows.extend(dynamic.properties.iter().map(|(n, v)| (n.to_string(), v)));
            rows.extend(dynamic.entries.iter().map(|(k, v)| (key_label(k), v)));
            rows.extend(
                dynamic
                    .elements
                    .iter()
                    .enumerate()
                    .map(|(i, v)| (format!("[{i}]"), v)),
            );
        }
        Value::Map(map) => rows.extend(map.iter().map(|(k, v)| (key_label(k), v))),
        Value::List(items) | Value::Set(items) => {
            rows.extend(items.iter().enumerate().map(|(i, v)| (format!("[{i}]"), v)));
        }
        scalar => rows.push((String::new(), scalar)),
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["NAME", "KIND", "VALUE"]);
    for (name, value) in rows {
        table.add_row(vec![name, value.kind().to_string(), cell(value)?]);
    }
    Ok(table)
}

fn key_label(key: &Value) -> String {
    match key {
        Value::String(s) => format!("[{s:?}]"),
        other => format!("[{}]", cell(other).unwrap_or_else(|_| other.kind().to_string())),
    }
}

fn cell(value: &Value) -> CliResult<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Duration(d) => Ok(d.to_string()),
        Value::DataSize(d) => Ok(d.to_string()),
        other => to_json(other),
    }
}
