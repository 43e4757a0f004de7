use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term;
use codespan_reporting::term::termcolor::{ColorChoice, StandardStream};
use tracing_subscriber::EnvFilter;

use renderer::{
    CacheStore, FailurePolicy, OutputFormat, RenderError, RenderOptions, ScriptEvaluator,
    assemble, render,
};

const SUBCOMMANDS: &[&str] = &["render", "check", "clean", "help"];

#[derive(Parser)]
#[command(name = "weave", version, about = "Literate document renderer")]
struct Cli {
    /// Disable colored error output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Render a literate document
    Render(RenderArgs),

    /// Parse a document and report errors without executing anything
    Check(CheckArgs),

    /// Clear a document's chunk cache, forcing a full re-render
    Clean(CleanArgs),
}

#[derive(clap::Args)]
struct RenderArgs {
    /// Literate source file to render
    file: String,

    /// Write the rendered document here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Target output format
    #[arg(long, value_enum, default_value_t = Format::Markdown)]
    format: Format,

    /// Language tag expected in chunk headers and inline markers
    #[arg(long, default_value = "r")]
    language: String,

    /// Cache root directory (a per-document subdirectory is used)
    #[arg(long, default_value = ".weave-cache")]
    cache_dir: PathBuf,

    /// Disable the chunk cache for this render
    #[arg(long)]
    no_cache: bool,

    /// Annotate failing chunks and keep rendering instead of aborting
    #[arg(long)]
    keep_going: bool,

    /// Discard bindings written by a chunk that then failed
    #[arg(long)]
    rollback_on_error: bool,

    /// Suppress the rendered output (just check for errors)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::Args)]
struct CheckArgs {
    /// Literate source file to check
    file: String,

    /// Language tag expected in chunk headers and inline markers
    #[arg(long, default_value = "r")]
    language: String,

    /// List chunk labels and their options
    #[arg(long)]
    chunks: bool,
}

#[derive(clap::Args)]
struct CleanArgs {
    /// Literate source file whose cache should be cleared
    file: String,

    /// Cache root directory
    #[arg(long, default_value = ".weave-cache")]
    cache_dir: PathBuf,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Markdown,
    Html,
}

impl From<Format> for OutputFormat {
    fn from(f: Format) -> Self {
        match f {
            Format::Markdown => OutputFormat::Markdown,
            Format::Html => OutputFormat::Html,
        }
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Backwards compatibility: if the first positional arg is not a known
    // subcommand, inject "render" so `weave file.Rmd` works like
    // `weave render file.Rmd`.
    let mut args: Vec<String> = std::env::args().collect();
    if let Some(first_pos) = args.iter().skip(1).find(|a| !a.starts_with('-')) {
        let first_pos = first_pos.clone();
        if !SUBCOMMANDS.contains(&first_pos.as_str()) {
            let pos = args.iter().position(|a| *a == first_pos).unwrap();
            args.insert(pos, "render".to_string());
        }
    }

    let cli = Cli::parse_from(&args);

    // Exit via a code, not process::exit from inside the subcommands,
    // so the cache store's Drop releases the render lock first.
    let code = match cli.command {
        Command::Render(render_args) => do_render(render_args, cli.no_color),
        Command::Check(check_args) => do_check(check_args, cli.no_color),
        Command::Clean(clean_args) => do_clean(clean_args),
    };
    process::exit(code);
}

fn do_render(args: RenderArgs, no_color: bool) -> i32 {
    let Some(doc) = parse_file(&args.file, &args.language, no_color) else {
        return 1;
    };

    let cache = if args.no_cache {
        None
    } else {
        match CacheStore::open(document_cache_dir(&args.cache_dir, &args.file)) {
            Ok(store) => Some(store),
            Err(e) => {
                eprintln!("error: {}", e);
                return 1;
            }
        }
    };

    let opts = RenderOptions {
        failure_policy: if args.keep_going {
            FailurePolicy::ContinueAndAnnotate
        } else {
            FailurePolicy::FailFast
        },
        rollback_failed_chunks: args.rollback_on_error,
        cache,
    };

    let mut evaluator = ScriptEvaluator::new();
    let rendered = match render(&doc, &mut evaluator, &opts) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {}", e);
            return 1;
        }
    };

    if args.quiet {
        return 0;
    }

    let output = assemble(&rendered, args.format.into());
    match &args.output {
        Some(path) => {
            if let Err(e) = std::fs::write(path, output) {
                eprintln!("error: cannot write '{}': {}", path.display(), e);
                return 1;
            }
        }
        None => print!("{}", output),
    }
    0
}

fn do_check(args: CheckArgs, no_color: bool) -> i32 {
    let Some(doc) = parse_file(&args.file, &args.language, no_color) else {
        return 1;
    };

    if args.chunks {
        for chunk in doc.chunks() {
            let mut flags = Vec::new();
            if !chunk.options.eval {
                flags.push("eval=false");
            }
            if !chunk.options.echo {
                flags.push("echo=false");
            }
            if chunk.options.cache {
                flags.push("cache=true");
            }
            println!("{} {}", chunk.label, flags.join(" "));
        }
        return 0;
    }

    eprintln!("ok: {} parsed successfully", args.file);
    0
}

fn do_clean(args: CleanArgs) -> i32 {
    let dir = document_cache_dir(&args.cache_dir, &args.file);
    if !dir.exists() {
        eprintln!("nothing to clean: {}", dir.display());
        return 0;
    }

    // clean is the manual recovery command: a lock found here is
    // treated as left over from a crashed render and removed.
    let store = match CacheStore::open(&dir) {
        Err(RenderError::CacheBusy(_)) => {
            eprintln!("removing stale render lock: {}", dir.display());
            CacheStore::break_lock(&dir).and_then(|()| CacheStore::open(&dir))
        }
        other => other,
    };

    if let Err(e) = store.and_then(|store| store.clear()) {
        eprintln!("error: {}", e);
        return 1;
    }
    eprintln!("cleared cache: {}", dir.display());
    0
}

/// Each document caches under its own subdirectory, so clearing one
/// document never touches another's entries.
fn document_cache_dir(cache_root: &Path, file: &str) -> PathBuf {
    let stem = Path::new(file)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    cache_root.join(stem)
}

/// Read and parse a source file, emitting codespan diagnostics on
/// failure. Returns None if the document cannot be rendered.
fn parse_file(file: &str, language: &str, no_color: bool) -> Option<weave::Document> {
    let color_choice = if no_color {
        ColorChoice::Never
    } else {
        ColorChoice::Auto
    };

    let source = match std::fs::read_to_string(file) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: cannot read '{}': {}", file, e);
            return None;
        }
    };

    let mut files = SimpleFiles::new();
    let file_id = files.add(file.to_string(), source.clone());

    let parser = weave::parser::Parser::new(source, file_id).with_language(language);
    match parser.parse() {
        Ok(doc) => Some(doc),
        Err(errors) => {
            let writer = StandardStream::stderr(color_choice);
            let config = term::Config::default();
            for error in &errors {
                let diagnostic = error.to_diagnostic();
                let _ =
                    term::emit_to_write_style(&mut writer.lock(), &config, &files, &diagnostic);
            }
            None
        }
    }
}
