use anyhow::Result;
use clap::ValueEnum;
use colored::Colorize;
use comfy_table::{Attribute, Cell, Color as TableColor, Table};
use serde::Serialize;
use std::io::Write;

use crate::theme::{ICONS, THEME};

/// Output format options for CLI commands
#[derive(Clone, Debug, ValueEnum, Default, PartialEq)]
pub enum OutputFormat {
    /// Formatted table output (default)
    #[default]
    Table,
    /// JSON output for scripting
    Json,
    /// Compact single-line output
    Compact,
}

/// Global CLI options that affect output and behavior
#[derive(Clone, Debug, Default)]
pub struct GlobalOptions {
    pub output_format: OutputFormat,
    pub quiet: bool,
    pub verbose: bool,
    pub no_color: bool,
}

/// Data that can be rendered as a table or a single line
pub trait TableDisplay {
    fn to_table(&self, output: &OutputManager) -> Table;
    fn to_compact(&self) -> String;
}

/// Formats and prints everything the CLI shows
pub struct OutputManager {
    pub options: GlobalOptions,
}

#[derive(Clone, Copy)]
enum Tone {
    Success,
    Error,
    Warning,
    Info,
}

impl Tone {
    fn icon_and_color(self) -> (&'static str, colored::Color) {
        match self {
            Tone::Success => (ICONS.success, THEME.success),
            Tone::Error => (ICONS.error, THEME.error),
            Tone::Warning => (ICONS.warning, THEME.warning),
            Tone::Info => (ICONS.info, THEME.info),
        }
    }
}

impl OutputManager {
    pub fn new(options: GlobalOptions) -> Self {
        if options.no_color {
            colored::control::set_override(false);
        }
        Self { options }
    }

    pub fn is_json(&self) -> bool {
        self.options.output_format == OutputFormat::Json
    }

    /// Nothing decorative is printed when quiet or when stdout carries JSON.
    fn decorates(&self) -> bool {
        !self.options.quiet && !self.is_json()
    }

    fn styled(&self, text: &str, color: colored::Color) -> String {
        if self.options.no_color {
            text.to_string()
        } else {
            text.color(color).to_string()
        }
    }

    /// Render `data` in the selected format.
    pub fn display<T>(&self, data: &T) -> Result<()>
    where
        T: Serialize + TableDisplay,
    {
        if self.options.quiet {
            return Ok(());
        }
        let rendered = match self.options.output_format {
            OutputFormat::Json => serde_json::to_string_pretty(data)?,
            OutputFormat::Table => data.to_table(self).to_string(),
            OutputFormat::Compact => data.to_compact(),
        };
        println!("{rendered}");
        Ok(())
    }

    /// Errors always print. Other tones respect --quiet and move to stderr
    /// in JSON mode.
    fn say(&self, tone: Tone, message: &str) {
        let (icon, color) = tone.icon_and_color();
        let line = format!("{} {}", self.styled(icon, color), self.styled(message, color));
        match tone {
            Tone::Error => eprintln!("{line}"),
            _ if self.options.quiet => {}
            _ if self.is_json() => eprintln!("{line}"),
            _ => println!("{line}"),
        }
    }

    pub fn success(&self, message: &str) {
        self.say(Tone::Success, message);
    }

    pub fn error(&self, message: &str) {
        self.say(Tone::Error, message);
    }

    pub fn warning(&self, message: &str) {
        self.say(Tone::Warning, message);
    }

    pub fn info(&self, message: &str) {
        self.say(Tone::Info, message);
    }

    /// Only with --verbose, on stderr.
    pub fn verbose(&self, message: &str) {
        if self.options.verbose && !self.options.quiet {
            eprintln!("{} {}", self.styled(ICONS.arrow, THEME.dim), self.styled(message, THEME.dim));
        }
    }

    pub fn heading(&self, text: &str) {
        if !self.decorates() {
            return;
        }
        if self.options.no_color {
            println!("\n{text}\n{}", "=".repeat(text.chars().count()));
        } else {
            println!("\n{}", text.color(THEME.heading).bold());
        }
    }

    pub fn key_value(&self, key: &str, value: &str) {
        if self.decorates() {
            println!("{}: {}", self.styled(key, THEME.key), self.styled(value, THEME.value));
        }
    }

    pub fn bullet(&self, text: &str) {
        if self.options.quiet {
            return;
        }
        let line = format!("  {} {text}", self.styled(ICONS.bullet, THEME.dim));
        if self.is_json() {
            eprintln!("{line}");
        } else {
            println!("{line}");
        }
    }

    pub fn create_table(&self) -> Table {
        let mut table = Table::new();
        table.load_preset(if self.options.no_color {
            comfy_table::presets::ASCII_FULL
        } else {
            comfy_table::presets::UTF8_FULL_CONDENSED
        });
        table
    }

    pub fn add_table_header(&self, table: &mut Table, headers: &[&str]) {
        table.set_header(
            headers
                .iter()
                .map(|header| self.cell(header, TableColor::Cyan).add_attribute(Attribute::Bold)),
        );
    }

    /// Colored cell, plain when colors are off
    pub fn cell(&self, text: impl ToString, color: TableColor) -> Cell {
        let cell = Cell::new(text.to_string());
        if self.options.no_color { cell } else { cell.fg(color) }
    }

    /// Transient status on the current line, replaced by the next output.
    pub fn progress(&self, message: &str) {
        if self.decorates() {
            print!("\r{} {}...", self.styled(ICONS.loading, THEME.accent), message);
            let _ = std::io::stdout().flush();
        }
    }

    pub fn clear_line(&self) {
        if self.decorates() {
            print!("\r\x1b[2K");
            let _ = std::io::stdout().flush();
        }
    }
}
