//! Build, rebuild, or clean a project's runtime assets.
//!
//! Usage:
//!   build-assets                 # every stage, only stale artifacts
//!   build-assets webp png        # selected stages, always in build order
//!   build-assets clean           # remove everything a build would produce
//!   build-assets --show-tools    # where each converter was found

use anyhow::{Context, Result};
use assetbake::{
    BuildContext, BuildManifest, Pipeline, PipelineReport, StageKind, Target, ToolKind,
    find_project_root, resolver_from_arg,
};
use assetbake::imaging::MAX_TEXTURE_SIZE_LIMIT;
use clap::Parser;
use std::path::{self, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "build-assets")]
#[command(about = "Convert raw assets into runtime formats, rebuilding only stale artifacts")]
struct Cli {
    /// Targets to build: all, png, mesh, anim, flatbuffers (or schema), webp, clean.
    #[arg(default_value = "all")]
    targets: Vec<String>,
    /// Output directory for built assets.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Asset metadata file; defaults to the manifest's, inside the raw asset dir.
    #[arg(short, long)]
    meta: Option<PathBuf>,
    /// Project root; defaults to ASSETBAKE_ROOT, then an upward search.
    #[arg(long)]
    project_root: Option<PathBuf>,
    /// Extra dependency search root, TAG=DIR. Later roots win.
    #[arg(long = "search-root", value_name = "TAG=DIR")]
    search_roots: Vec<String>,
    #[arg(long)]
    flatc: Option<PathBuf>,
    #[arg(long)]
    cwebp: Option<PathBuf>,
    #[arg(long)]
    mesh_pipeline: Option<PathBuf>,
    #[arg(long)]
    anim_pipeline: Option<PathBuf>,
    /// Image conversion tool used by the png pre-pass.
    #[arg(long)]
    convert: Option<PathBuf>,
    /// Image size query tool.
    #[arg(long)]
    identify: Option<PathBuf>,
    /// Upper bound on texture dimensions, unless metadata overrides it.
    #[arg(
        long,
        value_parser = clap::value_parser!(u32).range(1..=i64::from(MAX_TEXTURE_SIZE_LIMIT))
    )]
    max_texture_size: Option<u32>,
    /// Log every conversion and skip.
    #[arg(short, long)]
    verbose: bool,
    /// Print where each converter resolves to and exit.
    #[arg(long)]
    show_tools: bool,
}

impl Cli {
    fn tool_overrides(&self) -> [(ToolKind, Option<&PathBuf>); 6] {
        [
            (ToolKind::Flatc, self.flatc.as_ref()),
            (ToolKind::Cwebp, self.cwebp.as_ref()),
            (ToolKind::MeshPipeline, self.mesh_pipeline.as_ref()),
            (ToolKind::AnimPipeline, self.anim_pipeline.as_ref()),
            (ToolKind::Convert, self.convert.as_ref()),
            (ToolKind::Identify, self.identify.as_ref()),
        ]
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let project_root = match &cli.project_root {
        Some(root) => path::absolute(root)
            .with_context(|| format!("resolving project root {}", root.display()))?,
        None => find_project_root()?,
    };
    let mut manifest = BuildManifest::load_or_default(&project_root)?;
    if let Some(output) = &cli.output {
        manifest.output = path::absolute(output)
            .with_context(|| format!("resolving output directory {}", output.display()))?;
    }
    if let Some(size) = cli.max_texture_size {
        manifest.max_texture_size = size;
    }

    let mut ctx = BuildContext::from_manifest(&project_root, &manifest, cli.meta.as_deref())?;
    for raw in &cli.search_roots {
        ctx.resolvers
            .add_resolver(resolver_from_arg(&project_root, raw)?);
    }
    for (kind, path) in cli.tool_overrides() {
        if let Some(path) = path {
            ctx.tools.set_override(kind, path);
        }
    }

    if cli.show_tools {
        show_tools(&ctx);
        return Ok(());
    }

    // Build selectors collect into one pass; `clean` runs on its own, after
    // whatever was selected before it.
    let pipeline = Pipeline::standard();
    let mut failed = false;
    let mut pending: Vec<StageKind> = Vec::new();
    for raw in &cli.targets {
        match Target::try_from(raw.as_str()) {
            Ok(Target::All) => pending.extend(pipeline.kinds()),
            Ok(Target::Stage(kind)) => pending.push(kind),
            Ok(Target::Clean) => {
                failed |= !build(&pipeline, &ctx, &mut pending);
                let report = pipeline.run(&ctx, Target::Clean);
                print_summary(&report);
                failed |= !report.succeeded();
            }
            Err(err) => eprintln!("{err}"),
        }
    }
    failed |= !build(&pipeline, &ctx, &mut pending);

    if failed {
        std::process::exit(1);
    }
    Ok(())
}

/// Run and report the pending stages, if any. Returns whether they all
/// succeeded.
fn build(pipeline: &Pipeline, ctx: &BuildContext, pending: &mut Vec<StageKind>) -> bool {
    if pending.is_empty() {
        return true;
    }
    let report = pipeline.run_stages(ctx, pending);
    pending.clear();
    print_summary(&report);
    report.succeeded()
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn show_tools(ctx: &BuildContext) {
    for kind in ToolKind::ALL {
        let (path, found) = ctx.tools.describe(kind, &ctx.resolvers);
        let marker = if found { "" } else { " (not found)" };
        println!("{:<14} {}{marker}", kind.as_str(), path.display());
    }
}

fn print_summary(report: &PipelineReport) {
    for stage in &report.stages {
        let name = stage.kind.as_str();
        for err in stage.errors() {
            eprintln!("{name}: {err}");
        }
        if stage.aborted.is_some() {
            println!("{name}: aborted");
        } else {
            println!(
                "{name}: {} converted, {} up to date, {} failed",
                stage.converted.len(),
                stage.up_to_date,
                stage.failures.len()
            );
        }
    }
    if let Some(clean) = &report.clean {
        for err in &clean.failures {
            eprintln!("clean: {err}");
        }
        println!("clean: {} removed", clean.removed.len());
    }
}
