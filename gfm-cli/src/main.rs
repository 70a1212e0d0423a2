// Command-line interface for gfm
//
// This binary is a development harness around the gfm-babel engine: it parses GitLab Flavored
// Markdown, shows the resulting tree, converts it and checks that it serializes back unchanged.
// Editors embed the library directly; nothing here is needed to use it.
//
// Usage:
//  gfm <input> --to <format> [--from <format>] [--output <file>]  - Convert between formats (default)
//  gfm convert <input> --to <format> [--from <format>] [--output <file>]  - Same as above (explicit)
//  gfm inspect <path> [<transform>]      - Show the parsed tree (defaults to "doc-treeviz")
//  gfm roundtrip <path> [--check]        - Parse and serialize against the pristine tree
//  gfm snapshot <examples.yml>           - Run an example corpus against its snapshots
//  gfm --list-formats                    - List available formats and transforms
//
// Configuration:
//
// Defaults are layered with ./gfm.toml (if present), the file given by --config and GFM_*
// environment variables, in that order. GFM_SERIALIZER__BULLET=- sets serializer.bullet.
//
// Extra Parameters:
//
// Format-specific parameters can be passed using --extra-<parameter-name> <value>.
// Parameters naming a configuration setting override it, the rest go to the format.
// Example:
//  gfm inspect file.md --extra-ast-full --extra-show-source
//  gfm roundtrip file.md --extra-passthrough false --extra-bullet -

mod transforms;

use clap::{Arg, ArgAction, Command, ValueHint};
use gfm_babel::formats::{HtmlFormat, HtmlOptions, MarkdownFormat};
use gfm_babel::snapshot::{self, ComrakRenderer, ExampleStatus};
use gfm_babel::{FormatRegistry, MarkdownParser, MarkdownSerializer, ParserOptions};
use gfm_config::{GfmConfig, Loader};
use std::collections::HashMap;
use std::fs;
use tracing_subscriber::EnvFilter;

/// Extra parameters that set a configuration key instead of reaching a format
const CONFIG_EXTRAS: &[(&str, &str, ExtraKind)] = &[
    ("ast-full", "inspect.treeviz.ast_full", ExtraKind::Bool),
    ("show-source", "inspect.treeviz.show_source", ExtraKind::Bool),
    ("standalone", "convert.html.standalone", ExtraKind::Bool),
    ("passthrough", "serializer.passthrough", ExtraKind::Bool),
    ("bullet", "serializer.bullet", ExtraKind::Text),
    ("emphasis", "serializer.emphasis", ExtraKind::Text),
    ("strong", "serializer.strong", ExtraKind::Text),
    ("fence", "serializer.fence", ExtraKind::Text),
    ("horizontal-rule", "serializer.horizontal_rule", ExtraKind::Text),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExtraKind {
    Bool,
    Text,
}

/// Parse extra-* arguments from command line args
/// Returns (cleaned_args_without_extras, extra_params_map)
///
/// Supports both:
/// - `--extra-<key> <value>` (explicit value)
/// - `--extra-<key>` (boolean flag, defaults to "true")
fn parse_extra_args(args: &[String]) -> (Vec<String>, HashMap<String, String>) {
    let mut cleaned_args = Vec::new();
    let mut extra_params = HashMap::new();
    let mut i = 0;

    while i < args.len() {
        let arg = &args[i];

        if let Some(key) = arg.strip_prefix("--extra-") {
            // A value never starts with a dash, except a lone "-" bullet
            let has_value = args
                .get(i + 1)
                .is_some_and(|next| next == "-" || !next.starts_with('-'));

            if has_value {
                extra_params.insert(key.to_string(), args[i + 1].clone());
                i += 2;
            } else {
                extra_params.insert(key.to_string(), "true".to_string());
                i += 1;
            }
            continue;
        }

        cleaned_args.push(arg.clone());
        i += 1;
    }

    (cleaned_args, extra_params)
}

fn build_cli() -> Command {
    Command::new("gfm")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A development harness for the gfm conversion engine")
        .long_about(
            "gfm parses GitLab Flavored Markdown into a document tree and writes it back,\n\
            copying unchanged nodes from their source.\n\n\
            Commands:\n  \
            - inspect:   View the parsed tree (treeviz, JSON, HTML)\n  \
            - convert:   Transform between formats (markdown, json, html, treeviz)\n  \
            - roundtrip: Serialize a file against its own tree\n  \
            - snapshot:  Run an example corpus against stored snapshots\n\n\
            Extra Parameters:\n  \
            Use --extra-<name> [value] to pass format-specific options.\n  \
            Boolean flags can omit the value (defaults to 'true').\n\n\
            Examples:\n  \
            gfm inspect README.md                      # View tree visualization\n  \
            gfm inspect README.md doc-json             # View canonical JSON\n  \
            gfm README.md --to html -o readme.html     # Convert to an HTML file\n  \
            gfm roundtrip README.md --check            # Fail if the file does not pass through",
        )
        .arg_required_else_help(true)
        .subcommand_required(false)
        .arg(
            Arg::new("list-formats")
                .long("list-formats")
                .help("List available formats and inspect transforms")
                .action(ArgAction::SetTrue)
                .global(true),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .value_name("PATH")
                .help("Path to a gfm.toml configuration file")
                .value_hint(ValueHint::FilePath)
                .global(true),
        )
        .subcommand(
            Command::new("inspect")
                .about("Inspect the document tree of a Markdown file")
                .long_about(
                    "View the tree the parser builds from a Markdown file.\n\n\
                    Transforms:\n  \
                    - doc-treeviz:  Tree visualization (default)\n  \
                    - doc-json:     Canonical JSON with source maps\n  \
                    - doc-html:     Rendered HTML\n\n\
                    Extra Parameters:\n  \
                    --extra-ast-full      List inline nodes and their marks\n  \
                    --extra-show-source   Show source map keys and byte ranges",
                )
                .arg(
                    Arg::new("path")
                        .help("Path to the Markdown file")
                        .required(true)
                        .index(1)
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("transform")
                        .help("Transform to apply. Defaults to 'doc-treeviz'")
                        .required(false)
                        .value_parser(clap::builder::PossibleValuesParser::new(
                            transforms::AVAILABLE_TRANSFORMS,
                        ))
                        .index(2)
                        .value_hint(ValueHint::Other),
                ),
        )
        .subcommand(
            Command::new("convert")
                .about("Convert between document formats (default command)")
                .long_about(
                    "Convert documents between formats.\n\n\
                    Supported formats:\n  \
                    - markdown: GitLab Flavored Markdown (.md)\n  \
                    - json:     Canonical JSON tree (.json)\n  \
                    - html:     HTML rendering, output only (.html)\n  \
                    - treeviz:  Tree visualization, output only\n\n\
                    The source format is auto-detected from the file extension.\n\
                    Output goes to stdout by default, or use -o to specify a file.",
                )
                .arg(
                    Arg::new("input")
                        .help("Input file path")
                        .required(true)
                        .index(1)
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("from")
                        .long("from")
                        .help("Source format (auto-detected from file extension if not specified)")
                        .value_hint(ValueHint::Other),
                )
                .arg(
                    Arg::new("to")
                        .long("to")
                        .help("Target format (required)")
                        .required(true)
                        .value_hint(ValueHint::Other),
                )
                .arg(
                    Arg::new("output")
                        .long("output")
                        .short('o')
                        .help("Output file path (defaults to stdout)")
                        .value_hint(ValueHint::FilePath),
                ),
        )
        .subcommand(
            Command::new("roundtrip")
                .about("Parse a Markdown file and serialize it against its own tree")
                .long_about(
                    "Parses the file and serializes the tree with the parsed tree as the\n\
                    pristine document. Unchanged content must come back byte for byte.\n\n\
                    With --check nothing is printed on success and the command fails\n\
                    when the output differs from the input.",
                )
                .arg(
                    Arg::new("path")
                        .help("Path to the Markdown file")
                        .required(true)
                        .index(1)
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("check")
                        .long("check")
                        .help("Fail if the output differs from the input")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("snapshot")
                .about("Run an example corpus against its stored snapshots")
                .arg(
                    Arg::new("examples")
                        .help("Path to the examples YAML file")
                        .required(true)
                        .index(1)
                        .value_hint(ValueHint::FilePath),
                )
                .arg(
                    Arg::new("filter")
                        .long("filter")
                        .value_name("TEXT")
                        .help("Only run examples whose name contains TEXT"),
                ),
        )
}

fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();

    // Parse extra-* arguments before clap processing
    let (cleaned_args, mut extra_params) = parse_extra_args(&args);

    let cli = build_cli();
    let matches = match cli.clone().try_get_matches_from(&cleaned_args) {
        Ok(m) => m,
        Err(e) => {
            // A file as first argument means the convert command
            if cleaned_args.len() > 1
                && !cleaned_args[1].starts_with('-')
                && !matches!(
                    cleaned_args[1].as_str(),
                    "inspect" | "convert" | "roundtrip" | "snapshot" | "help"
                )
            {
                let mut new_args = vec![cleaned_args[0].clone(), "convert".to_string()];
                new_args.extend_from_slice(&cleaned_args[1..]);

                match cli.try_get_matches_from(&new_args) {
                    Ok(m) => m,
                    Err(e2) => e2.exit(),
                }
            } else {
                e.exit();
            }
        }
    };

    if matches.get_flag("list-formats") {
        handle_list_formats_command();
        return;
    }

    let config = load_cli_config(
        matches.get_one::<String>("config").map(|s| s.as_str()),
        &mut extra_params,
    );

    match matches.subcommand() {
        Some(("inspect", sub_matches)) => {
            let path = required(sub_matches, "path");
            let transform = sub_matches
                .get_one::<String>("transform")
                .map(|s| s.as_str())
                .unwrap_or(transforms::DEFAULT_TRANSFORM);
            handle_inspect_command(path, transform, &extra_params, &config);
        }
        Some(("convert", sub_matches)) => {
            let input = required(sub_matches, "input");
            let to = required(sub_matches, "to");
            let registry = registry_from_config(&config);

            // Auto-detect --from if not provided
            let from = match sub_matches.get_one::<String>("from") {
                Some(f) => f.to_string(),
                None => match registry.detect_format_from_filename(input) {
                    Some(detected) => detected,
                    None => {
                        eprintln!("Error: Could not detect format from filename '{input}'");
                        eprintln!("Please specify --from explicitly");
                        std::process::exit(1);
                    }
                },
            };

            let output = sub_matches.get_one::<String>("output").map(|s| s.as_str());
            handle_convert_command(&registry, input, &from, to, output, &extra_params);
        }
        Some(("roundtrip", sub_matches)) => {
            let path = required(sub_matches, "path");
            handle_roundtrip_command(path, sub_matches.get_flag("check"), &config);
        }
        Some(("snapshot", sub_matches)) => {
            let examples = required(sub_matches, "examples");
            let filter = sub_matches.get_one::<String>("filter").map(|s| s.as_str());
            handle_snapshot_command(examples, filter);
        }
        _ => {
            eprintln!("Unknown subcommand. Use --help for usage information.");
            std::process::exit(1);
        }
    }
}

/// Log to stderr, filtered by RUST_LOG (warnings by default)
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn required<'a>(matches: &'a clap::ArgMatches, id: &str) -> &'a str {
    match matches.get_one::<String>(id) {
        Some(value) => value.as_str(),
        None => {
            eprintln!("Error: missing required argument '{id}'");
            std::process::exit(1);
        }
    }
}

fn read_source(path: &str) -> String {
    fs::read_to_string(path).unwrap_or_else(|e| {
        eprintln!("Error reading file '{path}': {e}");
        std::process::exit(1);
    })
}

/// Handle the inspect command
fn handle_inspect_command(
    path: &str,
    transform: &str,
    extra_params: &HashMap<String, String>,
    config: &GfmConfig,
) {
    let source = read_source(path);

    let mut params = config.inspect.treeviz.to_params();
    for (key, value) in extra_params {
        params.insert(key.clone(), value.clone());
    }

    let parser = ParserOptions::from(&config.parser);
    let output = transforms::execute_transform(&source, transform, &parser, &params)
        .unwrap_or_else(|e| {
            eprintln!("Execution error: {e}");
            std::process::exit(1);
        });

    println!("{}", output.trim_end());
}

/// Handle the convert command
fn handle_convert_command(
    registry: &FormatRegistry,
    input: &str,
    from: &str,
    to: &str,
    output: Option<&str>,
    extra_params: &HashMap<String, String>,
) {
    // Validate formats exist
    for name in [from, to] {
        if let Err(e) = registry.get(name) {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }

    let source = read_source(input);

    let doc = registry.parse(&source, from).unwrap_or_else(|e| {
        eprintln!("Parse error: {e}");
        std::process::exit(1);
    });
    tracing::debug!(blocks = doc.content.len(), from, to, "converting document");

    let result = registry
        .serialize_with_options(&doc, to, extra_params)
        .unwrap_or_else(|e| {
            eprintln!("Serialization error: {e}");
            std::process::exit(1);
        });

    match output {
        Some(path) => {
            fs::write(path, result).unwrap_or_else(|e| {
                eprintln!("Error writing file '{path}': {e}");
                std::process::exit(1);
            });
        }
        None => println!("{result}"),
    }
}

/// Handle the roundtrip command
fn handle_roundtrip_command(path: &str, check: bool, config: &GfmConfig) {
    let source = read_source(path);

    let doc = MarkdownParser::new((&config.parser).into())
        .parse(&source)
        .unwrap_or_else(|e| {
            eprintln!("Parse error: {e}");
            std::process::exit(1);
        });

    let output = MarkdownSerializer::new((&config.serializer).into())
        .serialize(&doc, Some(&doc))
        .unwrap_or_else(|e| {
            eprintln!("Serialization error: {e}");
            std::process::exit(1);
        });

    if !check {
        println!("{output}");
        return;
    }

    let expected = source.trim_end();
    if output == expected {
        return;
    }
    match first_difference(expected, &output) {
        Some((line, want, got)) => {
            eprintln!("{path}: output differs from input at line {line}");
            eprintln!("  input:  {want:?}");
            eprintln!("  output: {got:?}");
        }
        None => eprintln!("{path}: output differs from input"),
    }
    std::process::exit(1);
}

/// First line (1-based) at which two texts differ, with both versions
fn first_difference<'a>(expected: &'a str, actual: &'a str) -> Option<(usize, &'a str, &'a str)> {
    let mut want = expected.lines();
    let mut got = actual.lines();
    let mut line = 1;
    loop {
        match (want.next(), got.next()) {
            (None, None) => return None,
            (a, b) if a != b => return Some((line, a.unwrap_or(""), b.unwrap_or(""))),
            _ => line += 1,
        }
    }
}

/// Handle the snapshot command
fn handle_snapshot_command(path: &str, filter: Option<&str>) {
    let examples = snapshot::load_examples_from_file(path).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    let selected: Vec<_> = examples
        .into_iter()
        .filter(|example| filter.map_or(true, |text| example.name.contains(text)))
        .collect();

    let outcomes = snapshot::run_examples(&selected, &ComrakRenderer);
    let mut failed = 0;
    for outcome in &outcomes {
        match &outcome.status {
            ExampleStatus::Passed => println!("ok      {}", outcome.name),
            ExampleStatus::Failed(mismatches) => {
                failed += 1;
                let kinds: Vec<_> = mismatches.iter().map(|m| m.kind()).collect();
                println!("FAILED  {} ({})", outcome.name, kinds.join(", "));
            }
            ExampleStatus::ImplementationError(message) => {
                failed += 1;
                println!("ERROR   {}: {message}", outcome.name);
            }
        }
    }

    println!("\n{} passed, {failed} failed", outcomes.len() - failed);
    if failed > 0 {
        std::process::exit(1);
    }
}

/// Handle the list-formats command
fn handle_list_formats_command() {
    let registry = FormatRegistry::default();
    println!("Conversion formats:");
    for format_name in registry.list_formats() {
        let description = registry
            .get(&format_name)
            .map(|format| format.description().to_string())
            .unwrap_or_default();
        println!("  {format_name:<10} {description}");
    }

    println!("\nInspect transforms:");
    for transform_name in transforms::AVAILABLE_TRANSFORMS {
        println!("  {transform_name}");
    }
}

/// Registry whose Markdown and HTML formats follow the configuration
fn registry_from_config(config: &GfmConfig) -> FormatRegistry {
    let mut registry = FormatRegistry::default();
    registry.register(MarkdownFormat::new(
        (&config.parser).into(),
        (&config.serializer).into(),
    ));
    registry.register(HtmlFormat::new(HtmlOptions {
        standalone: config.convert.html.standalone,
        custom_css: None,
    }));
    registry
}

fn load_cli_config(
    explicit_path: Option<&str>,
    extra_params: &mut HashMap<String, String>,
) -> GfmConfig {
    let loader = Loader::new().with_optional_file("gfm.toml");
    let loader = match explicit_path {
        Some(path) => loader.with_file(path),
        None => loader,
    };
    let loader = apply_config_overrides(loader.with_env(), extra_params);

    loader.build().unwrap_or_else(|err| {
        eprintln!("Failed to load configuration: {err}");
        std::process::exit(1);
    })
}

/// Move extras that name a configuration setting onto the loader
fn apply_config_overrides(
    mut loader: Loader,
    extra_params: &mut HashMap<String, String>,
) -> Loader {
    for (flag, key, kind) in CONFIG_EXTRAS {
        let Some(raw) = extra_params.remove(*flag) else {
            continue;
        };
        let result = match kind {
            ExtraKind::Bool => loader.set_override(key, parse_bool_arg(flag, &raw)),
            ExtraKind::Text => loader.set_override(key, raw),
        };
        loader = result.unwrap_or_else(|err| {
            eprintln!("Invalid --extra-{flag}: {err}");
            std::process::exit(1);
        });
    }
    loader
}

fn parse_bool_arg(flag: &str, raw: &str) -> bool {
    match raw.to_lowercase().as_str() {
        "true" | "1" | "yes" | "y" => true,
        "false" | "0" | "no" | "n" => false,
        other => {
            eprintln!("Invalid boolean value '{other}' for --extra-{flag}");
            std::process::exit(1);
        }
    }
}
