//! Text and JSON rendering of per-file reports.

use std::path::Path;

use colored::Colorize;
use formatscope_core::{Classification, FormatId, Hit, HitType, IdentificationStatus, PathReport};
use serde::Serialize;

use crate::OutputFormat;

#[derive(Serialize)]
struct ClassificationEntry<'a> {
    path: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<IdentificationStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    hits: Option<&'a [Hit]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct DetectionEntry<'a> {
    path: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    layers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub(crate) fn print_classifications(
    reports: &[PathReport<Classification>],
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let entries: Vec<_> = reports
                .iter()
                .map(|report| match &report.result {
                    Ok(classification) => ClassificationEntry {
                        path: &report.path,
                        status: Some(classification.status),
                        hits: Some(&classification.hits),
                        error: None,
                    },
                    Err(e) => ClassificationEntry {
                        path: &report.path,
                        status: None,
                        hits: None,
                        error: Some(e.to_string()),
                    },
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Text => {
            for report in reports {
                let path = report.path.display().to_string();
                match &report.result {
                    Ok(classification) if classification.hits.is_empty() => {
                        println!("{}: {}", path.bold(), "unidentified".dimmed());
                    }
                    Ok(classification) => {
                        println!("{}:", path.bold());
                        for hit in &classification.hits {
                            println!("  {}", render_hit(hit));
                        }
                    }
                    Err(e) => println!("{}: {} {e}", path.bold(), "error:".red()),
                }
            }
        }
    }
    Ok(())
}

pub(crate) fn print_detections(
    reports: &[PathReport<Vec<FormatId>>],
    format: OutputFormat,
) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            let entries: Vec<_> = reports
                .iter()
                .map(|report| match &report.result {
                    Ok(layers) => DetectionEntry {
                        path: &report.path,
                        layers: Some(layers.iter().map(ToString::to_string).collect()),
                        error: None,
                    },
                    Err(e) => DetectionEntry {
                        path: &report.path,
                        layers: None,
                        error: Some(e.to_string()),
                    },
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&entries)?);
        }
        OutputFormat::Text => {
            for report in reports {
                let path = report.path.display().to_string();
                match &report.result {
                    Ok(layers) => println!("{}: {}", path.bold(), render_layers(layers)),
                    Err(e) => println!("{}: {} {e}", path.bold(), "error:".red()),
                }
            }
        }
    }
    Ok(())
}

fn render_hit(hit: &Hit) -> String {
    let label = match hit.hit_type {
        HitType::PositiveSpecific => hit.format_id.to_string().green().bold(),
        HitType::PositiveGeneric => hit.format_id.to_string().green(),
        HitType::Tentative => hit.format_id.to_string().yellow(),
    };
    let mut line = format!("{label} ({}", hit.name);
    if let Some(mime) = &hit.mime_type {
        line.push_str(", ");
        line.push_str(mime);
    }
    line.push_str(&format!(") [{}]", hit.hit_type));
    if let Some(warning) = hit.warning {
        line.push_str(&format!(" {}", format!("warning: {warning}").yellow()));
    }
    line
}

/// `base64 > zip`; an unknown innermost layer is shown as `?`.
fn render_layers(layers: &[FormatId]) -> String {
    if layers.iter().all(FormatId::is_unknown) {
        return "unidentified".dimmed().to_string();
    }
    layers
        .iter()
        .map(|id| {
            if id.is_unknown() {
                "?".dimmed().to_string()
            } else {
                id.to_string().cyan().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" > ")
}
