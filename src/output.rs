use std::io::{self, Write};

use serde::Serialize;

use crate::sample_types::SampleTypeReport;
use crate::sync::{ProgressEvent, ProgressSink, TransferReport};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_transfer(report: &TransferReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_sample_types(report: &SampleTypeReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Progress lines on stderr, summaries on stdout.
pub struct HumanOutput;

impl HumanOutput {
    pub fn print_transfer(report: &TransferReport) {
        let registered = &report.registered;
        println!(
            "{} {} ({})",
            report.source_kind, report.identifier, report.finished_at
        );
        if let Some(top) = &registered.top {
            let action = if top.created { "created" } else { "kept" };
            println!("  {action} {} {}", top.kind, top.url);
        }
        for sample in &registered.created_samples {
            println!("  created sample {} -> {}", sample.source, sample.url);
        }
        for asset in &registered.created_assets {
            println!("  created asset {} -> {}", asset.file.path, asset.url);
        }
        for url in &registered.updated {
            println!("  updated {url}");
        }
        if !registered.unchanged.is_empty() {
            println!("  {} resource(s) already up to date", registered.unchanged.len());
        }
        if let Some(transfer) = &report.transfer {
            println!("  uploaded {} file(s)", transfer.uploaded.len());
            for skipped in &transfer.skipped {
                println!(
                    "  skipped {}/{} ({} bytes)",
                    skipped.dataset, skipped.file_path, skipped.size
                );
            }
        }
        if report.link_back.unsupported {
            println!("  link-back skipped: LIMS has no link object type");
        } else {
            println!("  wrote {} link(s) into the LIMS", report.link_back.links.len());
        }
    }

    pub fn print_sample_types(report: &SampleTypeReport) {
        for created in &report.created {
            println!("created sample type {} -> {}", created.code, created.url);
        }
        for code in &report.existing {
            println!("sample type {code} already exists");
        }
        if !report.skipped_material.is_empty() {
            println!("skipped {} material type(s)", report.skipped_material.len());
        }
    }
}

impl ProgressSink for HumanOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => eprintln!("{}", event.message),
        }
    }
}
