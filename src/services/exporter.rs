//! Catalog export as M3U playlist or JSON document

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Channel, ChannelStatus, ExportFormat, ExportQuery};
use crate::services::catalog::{channel_id, Catalog};

/// Serialized export ready to be served
pub struct Export {
    pub content_type: &'static str,
    pub filename: &'static str,
    pub body: Vec<u8>,
}

#[derive(Serialize)]
struct ExportedChannel<'a> {
    id: String,
    #[serde(flatten)]
    channel: &'a Channel,
}

#[derive(Serialize)]
struct JsonExport<'a> {
    exported_at: DateTime<Utc>,
    total_channels: usize,
    channels: Vec<ExportedChannel<'a>>,
}

/// Channels matching the filters, sorted by group then name
fn select<'a>(catalog: &'a Catalog, query: &ExportQuery) -> Vec<&'a Channel> {
    let group = query.group.as_deref().map(str::trim).filter(|g| !g.is_empty());

    let mut channels: Vec<&Channel> = catalog
        .channels()
        .iter()
        .filter(|c| group.map_or(true, |g| c.group() == g))
        .filter(|c| !query.only_online || c.status == ChannelStatus::Online)
        .collect();

    channels.sort_by(|a, b| {
        a.group()
            .cmp(b.group())
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
    });
    channels
}

/// Attribute values are always double-quoted, so inner quotes become single.
/// Lossy; groups go through `#EXTGRP` instead when they carry a quote.
fn escape_attr(value: &str) -> String {
    value.replace('"', "'")
}

fn to_m3u(channels: &[&Channel]) -> String {
    let mut out = String::from("#EXTM3U\n");

    for channel in channels {
        out.push_str("#EXTINF:-1");
        if let Some(tvg_id) = channel.tvg_id.as_deref().filter(|v| !v.is_empty()) {
            out.push_str(&format!(" tvg-id=\"{}\"", escape_attr(tvg_id)));
        }
        if let Some(logo) = channel.logo_url.as_deref().filter(|v| !v.is_empty()) {
            out.push_str(&format!(" tvg-logo=\"{}\"", escape_attr(logo)));
        }
        let group = channel.group();
        let quoted_group = group.contains('"');
        if !quoted_group {
            out.push_str(&format!(" group-title=\"{}\"", group));
        }
        out.push(',');
        out.push_str(&channel.name);
        out.push('\n');
        if quoted_group {
            out.push_str(&format!("#EXTGRP:{}\n", group));
        }
        out.push_str(&channel.url);
        out.push('\n');
    }

    out
}

fn to_json(channels: &[&Channel]) -> serde_json::Result<Vec<u8>> {
    let document = JsonExport {
        exported_at: Utc::now(),
        total_channels: channels.len(),
        channels: channels
            .iter()
            .map(|channel| ExportedChannel {
                id: channel_id(&channel.url),
                channel,
            })
            .collect(),
    };
    serde_json::to_vec_pretty(&document)
}

pub fn export(catalog: &Catalog, query: &ExportQuery) -> anyhow::Result<Export> {
    let channels = select(catalog, query);
    tracing::debug!("Exporting {} channels as {:?}", channels.len(), query.format);

    let export = match query.format {
        ExportFormat::M3u => Export {
            content_type: "audio/x-mpegurl; charset=utf-8",
            filename: "playlist.m3u",
            body: to_m3u(&channels).into_bytes(),
        },
        ExportFormat::Json => Export {
            content_type: "application/json",
            filename: "channels.json",
            body: to_json(&channels)?,
        },
    };

    Ok(export)
}
