use bgsite::{build, config, converter::ConverterRegistry, output, watch};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bgsite")]
#[command(about = "Static site generator driven by a directory tree")]
#[command(long_about = "\
Static site generator driven by a directory tree

The source tree is the site. Files starting with a '---' front matter block
are rendered through a layout; every other file is copied as-is.

Source structure:

  site/
  ├── .bg.yml                    # Directory config (cascades to children)
  ├── .template/                 # Layouts and partials (cascade to children)
  │   ├── default.html           # Layout for articles
  │   └── index.html             # Layout for auto-generated index pages
  ├── index.md                   # Index page → /
  ├── about.md                   # Article → /about.html
  ├── logo.png                   # Asset, copied unchanged
  └── blog/
      ├── .bg.yml                # autoindex: \"*.md\"  (synthesizes blog/index.html)
      └── first-post.md          # Article → /blog/first-post.html

Run 'bgsite --gen-config' to print a documented .bg.yml.")]
#[command(version)]
struct Cli {
    /// Source directory
    #[arg(default_value = ".")]
    source: PathBuf,

    /// Output directory
    #[arg(short, long, default_value = "./_site")]
    output: PathBuf,

    /// Rebuild whenever the source tree changes
    #[arg(short, long)]
    watch: bool,

    /// Render threads (defaults to all cores; never more than the core count)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Log build progress
    #[arg(short, long)]
    verbose: bool,

    /// Print a stock .bg.yml with all options documented
    #[arg(long)]
    gen_config: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.gen_config {
        print!("{}", config::stock_config_yaml());
        return Ok(());
    }

    init_thread_pool(cli.jobs);

    if !cli.watch {
        if !build_and_report(&cli.source, &cli.output)? {
            std::process::exit(1);
        }
        return Ok(());
    }

    let rebuild = || {
        if let Err(e) = build_and_report(&cli.source, &cli.output) {
            tracing::error!(error = %e, "build failed");
            eprintln!("Error: {e}");
        }
    };
    rebuild();
    let source = cli.source.canonicalize()?;
    watch::run(&cli.source, &cli.output, |changed| {
        output::print_rebuild(changed, &source);
        rebuild();
    })?;

    Ok(())
}

/// Run one full build and print its report. Returns `false` when any page
/// or subtree failed.
fn build_and_report(source: &Path, dest: &Path) -> Result<bool, build::BuildError> {
    let report = build::build(source, dest, ConverterRegistry::with_builtins())?;
    let source = source.canonicalize().unwrap_or_else(|_| source.to_path_buf());
    let dest = dest.canonicalize().unwrap_or_else(|_| dest.to_path_buf());
    output::print_report(&report, &source, &dest);
    Ok(!report.has_failures())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool.
///
/// Capped at the number of available cores; `--jobs` can only constrain down.
fn init_thread_pool(jobs: Option<usize>) {
    let threads = build::effective_threads(jobs);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
