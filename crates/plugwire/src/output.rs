use std::io::{IsTerminal, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use plugwire_client::{CompilerMessage, Payload};
use serde::Serialize;

const PREVIEW_LIMIT: usize = 120;

#[derive(Clone, Debug, Copy, ValueEnum)]
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

#[derive(Serialize)]
struct MessageOutput<'a> {
    id: u32,
    kind: &'a str,
    data_kind: Option<&'a str>,
    data_size: usize,
    data: Option<String>,
    extra_size: usize,
    files: Vec<&'a str>,
    peer: &'a str,
    timestamp: String,
}

pub fn print_message(message: &CompilerMessage, peer: &str, format: OutputFormat) {
    let data_preview = message.data.as_ref().map(payload_preview);
    match format {
        OutputFormat::Json => {
            let out = MessageOutput {
                id: message.id,
                kind: message.kind.as_str(),
                data_kind: message.data.as_ref().map(payload_kind),
                data_size: message.data.as_ref().map_or(0, Payload::len),
                data: data_preview,
                extra_size: message.extra_data.as_ref().map_or(0, Payload::len),
                files: message
                    .sources()
                    .map(|files| files.iter().map(|file| file.name.as_str()).collect())
                    .unwrap_or_default(),
                peer,
                timestamp: now_unix_seconds(),
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["ID", "KIND", "SIZE", "PEER", "DATA"])
                .add_row(vec![
                    message.id.to_string(),
                    message.kind.as_str().to_string(),
                    message.data.as_ref().map_or(0, Payload::len).to_string(),
                    peer.to_string(),
                    data_preview.unwrap_or_default(),
                ]);
            println!("{table}");
        }
        OutputFormat::Pretty => {
            println!(
                "id={} kind={} size={} peer={} data={}",
                message.id,
                message.kind.as_str(),
                message.data.as_ref().map_or(0, Payload::len),
                peer,
                data_preview.unwrap_or_default()
            );
        }
        OutputFormat::Raw => match &message.data {
            Some(Payload::Binary(bytes)) => print_raw(bytes),
            Some(Payload::Text(text)) => print_raw(text.as_bytes()),
            Some(Payload::Sources(files)) => {
                for file in files {
                    print_raw(&file.data);
                }
            }
            None => {}
        },
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn payload_kind(payload: &Payload) -> &'static str {
    match payload {
        Payload::Text(_) => "text",
        Payload::Binary(_) => "binary",
        Payload::Sources(_) => "sources",
    }
}

fn payload_preview(payload: &Payload) -> String {
    match payload {
        Payload::Text(text) => truncate(text),
        Payload::Binary(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => truncate(text),
            Err(_) => format!("<binary {} bytes>", bytes.len()),
        },
        Payload::Sources(files) => {
            let names: Vec<&str> = files.iter().map(|file| file.name.as_str()).collect();
            format!("<{} files: {}>", files.len(), names.join(", "))
        }
    }
}

fn truncate(text: &str) -> String {
    match text.char_indices().nth(PREVIEW_LIMIT) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

fn now_unix_seconds() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs().to_string())
        .unwrap_or_else(|_| "0".to_string())
}
