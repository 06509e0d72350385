mod commands;
mod context;
mod examples;
mod output;
mod theme;

use anyhow::Result;
use clap::{
    ColorChoice, Command, CommandFactory, FromArgMatches, Parser, Subcommand,
    builder::{Styles, styling::AnsiColor},
    error::ErrorKind,
};

use colored::{Color as ThemeColor, Colorize, control::ShouldColorize};
use std::fmt::Write;
use std::io::{self, Write as IoWrite};

use commands::{
    apply::{ApplyArgs, handle_apply},
    diff::{DiffArgs, handle_diff},
    init::{InitArgs, handle_init},
    snapshot::{SnapshotArgs, handle_snapshot},
};
use examples::{ExampleGroup, command_examples};
use output::{GlobalOptions, OutputFormat, OutputManager};
use theme::{ICONS, THEME};

const ENVIRONMENT_VARIABLES: &[(&str, &str)] = &[
    ("SCHEMAPLAN_STORE", "Development store file (overrides .schemaplan/store.json)"),
    ("RUST_LOG", "Log filter, e.g. schemaplan=debug for per-operation traces"),
];

#[derive(Parser)]
#[command(name = "schemaplan")]
#[command(version)]
#[command(
    about = "Capture, diff and apply collection/field/relation schemas",
    long_about = r#"Schema snapshot and reconciliation CLI that provides:

• Portable, versioned snapshots of the live schema
• Dependency-ordered diffs, including circular references
• Transactional apply, or a precise report of what stayed applied

Commands:
  init      Initialize schemaplan in a project
  snapshot  Capture the live schema to a file
  diff      Show what applying a snapshot would change
  apply     Reconcile the live schema with a snapshot
"#
)]
#[command(subcommand_required = true, arg_required_else_help = true)]
struct Cli {
    /// Output format
    #[arg(long, value_enum, default_value = "table", global = true)]
    output: OutputFormat,

    /// Suppress output (only errors will be shown)
    #[arg(short = 'q', long, global = true)]
    quiet: bool,

    /// Enable verbose output
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize schemaplan in the current directory
    Init(InitArgs),

    /// Capture the live schema into a snapshot file
    Snapshot(SnapshotArgs),

    /// Show the ordered changes between the live schema and a snapshot
    Diff(DiffArgs),

    /// Apply a snapshot to the live schema
    Apply(ApplyArgs),
}

impl Cli {
    fn parse_with_styles() -> Self {
        let command = build_cli_command();
        let matches = match command.styles(help_styles()).try_get_matches() {
            Ok(matches) => matches,
            Err(err) => exit_with_clap_error(err),
        };
        match Cli::from_arg_matches(&matches) {
            Ok(cli) => cli,
            Err(err) => exit_with_clap_error(err),
        }
    }
}

fn exit_with_clap_error(err: clap::error::Error) -> ! {
    let code = err.exit_code();
    let to_stdout = matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion);
    let printed = match err.kind() {
        ErrorKind::MissingSubcommand | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => {
            let mut stderr = io::stderr();
            let _ = pad(&mut stderr);
            build_cli_command().styles(help_styles()).write_long_help(&mut stderr)
        }
        _ => {
            let _ = if to_stdout { pad(&mut io::stdout()) } else { pad(&mut io::stderr()) };
            err.print()
        }
    };
    if let Err(print_err) = printed
        && print_err.kind() != io::ErrorKind::BrokenPipe
    {
        eprintln!("Failed to print usage: {print_err}");
    }
    let _ = if to_stdout { pad(&mut io::stdout()) } else { pad(&mut io::stderr()) };
    std::process::exit(code);
}

fn build_cli_command() -> Command {
    let use_color = ShouldColorize::from_env().should_colorize();
    let mut command = Cli::command()
        .after_long_help(render_top_level_appendix(use_color))
        .color(if use_color { ColorChoice::Auto } else { ColorChoice::Never });

    for example in command_examples() {
        if let Some(subcommand) = command.find_subcommand_mut(example.name) {
            let help_text = render_examples(example.groups, use_color);
            *subcommand = subcommand.clone().after_long_help(help_text);
        }
    }
    command
}

fn render_examples(groups: &[ExampleGroup], use_color: bool) -> String {
    let mut buffer = format!("{}\n", paint("Examples:", THEME.heading, true, use_color));
    let blocks: Vec<String> = groups
        .iter()
        .map(|group| {
            let mut block = format!("  {}\n", paint(group.title, THEME.accent, true, use_color));
            for command in group.commands {
                let _ = writeln!(
                    block,
                    "    {} {}",
                    paint(ICONS.arrow, THEME.dim, false, use_color),
                    paint(command, THEME.dim, false, use_color)
                );
            }
            block
        })
        .collect();
    buffer.push_str(&blocks.join("\n"));
    buffer
}

fn render_top_level_appendix(use_color: bool) -> String {
    let mut buffer = format!("{}\n", paint("Environment Variables:", THEME.heading, true, use_color));
    let width = ENVIRONMENT_VARIABLES.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    for (key, description) in ENVIRONMENT_VARIABLES {
        let _ = writeln!(
            buffer,
            "  {}  {}",
            paint(&format!("{key:<width$}"), THEME.key, true, use_color),
            paint(description, THEME.value, false, use_color)
        );
    }
    let _ = writeln!(
        buffer,
        "\n{} {}",
        paint("Tip:", THEME.heading, true, use_color),
        paint(
            "'schemaplan <command> --help' lists examples for that command.",
            THEME.dim,
            false,
            use_color
        )
    );
    buffer
}

fn pad(out: &mut impl IoWrite) -> io::Result<()> {
    writeln!(out)?;
    out.flush()
}

fn paint(text: &str, color: ThemeColor, bold: bool, use_color: bool) -> String {
    if !use_color {
        return text.to_string();
    }
    let colored = text.color(color);
    if bold { colored.bold().to_string() } else { colored.to_string() }
}

/// clap help colors, kept in step with [`THEME`].
fn help_styles() -> Styles {
    Styles::styled()
        .usage(AnsiColor::BrightBlue.on_default().bold())
        .header(AnsiColor::Cyan.on_default().bold())
        .literal(AnsiColor::Magenta.on_default())
        .placeholder(AnsiColor::BrightBlack.on_default())
        .valid(AnsiColor::Green.on_default())
        .invalid(AnsiColor::Yellow.on_default())
        .error(AnsiColor::Red.on_default().bold())
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let cli = Cli::parse_with_styles();

    match execute(cli).await {
        Ok(()) => {}
        Err(err) => {
            eprintln!("Error: {err:#}");
            std::process::exit(1);
        }
    }
}

async fn execute(cli: Cli) -> Result<()> {
    let output = OutputManager::new(GlobalOptions {
        output_format: cli.output,
        quiet: cli.quiet,
        verbose: cli.verbose,
        no_color: cli.no_color,
    });

    match cli.command {
        Commands::Init(args) => handle_init(args, &output).await,
        Commands::Snapshot(args) => handle_snapshot(args, &output).await,
        Commands::Diff(args) => handle_diff(args, &output).await,
        Commands::Apply(args) => handle_apply(args, &output).await,
    }
}
