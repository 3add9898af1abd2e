use anyhow::{Context, Result, anyhow, bail};
use clap::{ArgAction, Parser};
use serde::Serialize;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

#[cfg(feature = "server")]
use dagedit::serve::{ServeArgs, run_serve};
use dagedit::{
    ChainGraph, EditorConfig, ObjectCatalog, parse_chain, serialize, strip_line_ending,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputSource {
    Stdin,
    File(PathBuf),
}

#[derive(Debug, Clone)]
enum OutputDestination {
    Stdout,
    File(PathBuf),
}

#[derive(Debug, Parser)]
#[command(
    name = "dagedit",
    about = "Canonicalize and validate chain DAG strings such as 1>>[2,3]>>4."
)]
pub struct FormatArgs {
    /// Path to the chain file. Use '-' to read from stdin.
    #[arg(short = 'i', long = "input")]
    input: Option<String>,

    /// Path to the output file. Use '-' to write to stdout.
    #[arg(short = 'o', long = "output")]
    output: Option<String>,

    /// JSON object catalog used to size and label nodes.
    #[arg(long = "catalog")]
    catalog: Option<PathBuf>,

    /// Emit the laid-out graph as JSON instead of the canonical text.
    #[arg(long = "layout", action = ArgAction::SetTrue)]
    layout: bool,

    /// Editor configuration file.
    #[arg(long = "config")]
    config: Option<PathBuf>,

    /// Suppress informational output.
    #[arg(short = 'q', long = "quiet", action = ArgAction::SetTrue)]
    quiet: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LayoutDump<'a> {
    text: &'a str,
    #[serde(flatten)]
    graph: &'a ChainGraph,
    used_object_ids: &'a [String],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
}

fn run_format(cli: FormatArgs) -> Result<()> {
    let input_source = parse_input(cli.input.as_deref())?;
    let output_dest = parse_output(cli.output.as_deref())?;

    let config = EditorConfig::load(cli.config.as_deref())?;
    let catalog = match &cli.catalog {
        Some(path) => ObjectCatalog::load(path)?,
        None => ObjectCatalog::default(),
    };

    let contents = load_definition(&input_source)?;
    let definition = strip_line_ending(&contents);
    let graph = parse_chain(definition, &catalog, &config.layout);
    if graph.nodes.is_empty() && !definition.trim().is_empty() {
        bail!("failed to format chain: '{}' contains no steps", definition.trim());
    }

    let chain = serialize(&graph);
    if let Some(error) = chain.error {
        bail!("invalid chain: {error}");
    }
    let warnings: Vec<String> = chain.warnings.iter().map(ToString::to_string).collect();
    if !cli.quiet {
        for warning in &warnings {
            eprintln!("warning: {warning}");
        }
    }

    let mut output = if cli.layout {
        serde_json::to_string_pretty(&LayoutDump {
            text: &chain.text,
            graph: &graph,
            used_object_ids: &chain.used_object_ids,
            warnings,
        })
        .context("failed to encode chain layout")?
    } else {
        chain.text
    };
    output.push('\n');

    write_output(output_dest, output.as_bytes(), cli.quiet)
}

#[cfg(feature = "server")]
pub async fn dispatch() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("serve") => {
            let serve_args = ServeArgs::parse_from(
                std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
            );
            run_serve(serve_args).await
        }
        _ => dispatch_sync(),
    }
}

pub fn dispatch_sync() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("serve") => Err(anyhow!(
            "'serve' command requires the 'server' feature to be enabled"
        )),
        Some("format") => {
            let format_args = FormatArgs::parse_from(
                std::iter::once(args[0].clone()).chain(args.iter().skip(2).cloned()),
            );
            run_format(format_args)
        }
        _ => {
            let format_args = FormatArgs::parse_from(args);
            run_format(format_args)
        }
    }
}

fn parse_input(input: Option<&str>) -> Result<InputSource> {
    match input {
        Some("-") => Ok(InputSource::Stdin),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if !path.exists() {
                return Err(anyhow!("input file '{path_str}' does not exist"));
            }
            Ok(InputSource::File(path))
        }
        None => Ok(InputSource::Stdin),
    }
}

fn parse_output(output: Option<&str>) -> Result<OutputDestination> {
    match output {
        None | Some("-") => Ok(OutputDestination::Stdout),
        Some(path_str) => {
            let path = PathBuf::from(path_str);
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    return Err(anyhow!(
                        "output directory '{}' does not exist",
                        parent.display()
                    ));
                }
            }
            Ok(OutputDestination::File(path))
        }
    }
}

fn load_definition(source: &InputSource) -> Result<String> {
    match source {
        InputSource::Stdin => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("failed to read chain from stdin")?;
            Ok(buffer)
        }
        InputSource::File(path) => {
            fs::read_to_string(path).with_context(|| format!("failed to read '{}'", path.display()))
        }
    }
}

fn write_output(dest: OutputDestination, bytes: &[u8], quiet: bool) -> Result<()> {
    match dest {
        OutputDestination::Stdout => {
            let mut stdout = io::stdout();
            stdout.write_all(bytes)?;
            stdout.flush()?;
        }
        OutputDestination::File(path) => {
            fs::write(&path, bytes)
                .with_context(|| format!("failed to write '{}'", path.display()))?;
            if !quiet {
                println!("Formatted chain -> {}", path.display());
            }
        }
    }
    Ok(())
}
