use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;

use log::info;

use crate::error::Result;
use crate::report::Report;

pub const DEFAULT_JSON_OUTPUT: &str = "tw3trackerinfo.json";
pub const DEFAULT_CSV_OUTPUT: &str = "tw3savefile.csv";
pub const CSV_DELIMITER: &str = ";;";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
}

/// Where and how a report is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportConfig {
    pub format: OutputFormat,
    pub output: PathBuf,
}

impl ExportConfig {
    pub fn for_format(format: OutputFormat) -> Self {
        let output = match format {
            OutputFormat::Json => DEFAULT_JSON_OUTPUT,
            OutputFormat::Csv => DEFAULT_CSV_OUTPUT,
        };
        Self {
            format,
            output: PathBuf::from(output),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self::for_format(OutputFormat::default())
    }
}

pub fn to_json_string(report: &Report) -> Result<String> {
    Ok(serde_json::to_string(report)?)
}

pub fn report_from_json(s: &str) -> Result<Report> {
    Ok(serde_json::from_str(s)?)
}

/// One `<guid>;;<status>` line per quest, newline-terminated, no header.
pub fn to_csv_string(report: &Report) -> String {
    let mut out = String::new();
    for q in &report.quests {
        writeln!(&mut out, "{}{}{}", q.primary_guid, CSV_DELIMITER, q.status).ok();
    }
    out
}

pub fn render(report: &Report, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => to_json_string(report),
        OutputFormat::Csv => Ok(to_csv_string(report)),
    }
}

pub fn write_report(report: &Report, config: &ExportConfig) -> Result<()> {
    let data = render(report, config.format)?;
    fs::write(&config.output, data)?;
    info!(
        "wrote {} quests, {} map pin tags to {}",
        report.quests.len(),
        report.map_pin_tags.len(),
        config.output.display()
    );
    Ok(())
}
