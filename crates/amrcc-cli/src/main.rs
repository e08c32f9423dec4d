// crates/amrcc-cli/src/main.rs

#![forbid(unsafe_code)]
#![deny(
    rust_2018_idioms,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo
)]

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use amrcc_core::{engine, integral, io as tree_io, persistence, ComponentBlock};
use amrcc_runtime::Master;

#[derive(Parser, Debug)]
#[command(
    name = "amrcc",
    about = "Distributed connected components of AMR scalar fields",
    long_about = "Compute the triplet merge tree of a block-decomposed AMR scalar field,\n\
                  extract persistent components (halos), and integrate selected fields\n\
                  over each component.",
    version = env!("CARGO_PKG_VERSION"),
    disable_help_subcommand = true
)]
struct Cli {
    /// Input grid file (.json or .cbor)
    input: PathBuf,

    /// Output tree file; `none` skips it
    output: PathBuf,

    /// Optional persistence diagram prefix (one `{prefix}-b{gid}.dgm` per block)
    diagram_out: Option<PathBuf>,

    /// Optional integral file; also triggers the vertex-to-halo file
    integral_out: Option<PathBuf>,

    /// Iso threshold
    #[arg(short = 'i', long, default_value_t = 81.66)]
    rho: f64,

    /// Treat the threshold as an absolute value instead of a multiple of the mean
    #[arg(short = 'a', long)]
    absolute: bool,

    /// Sweep superlevel sets
    #[arg(short = 'n', long)]
    negate: bool,

    /// Minimal number of cells to output a halo
    #[arg(short = 'x', long, default_value_t = 10)]
    min_cells: u64,

    /// Fields to sum into the merge-tree function, comma-separated
    #[arg(short = 'f', long, default_value = "")]
    function_fields: String,

    /// Fields to integrate per component, comma-separated
    #[arg(long, default_value = "")]
    integral_fields: String,

    /// Number of level-0 blocks
    #[arg(short = 'b', long, default_value_t = 1)]
    blocks: usize,

    /// Maximum blocks to keep in memory (0 = all)
    #[arg(short = 'm', long, default_value_t = 0)]
    memory: usize,

    /// Spill storage directory
    #[arg(short = 's', long, default_value = "./amrcc-storage")]
    storage: PathBuf,

    /// Write one tree file per block
    #[arg(long)]
    split: bool,

    /// Periodic domain (not supported; rejected explicitly)
    #[arg(short = 'w', long)]
    wrap: bool,
}

fn main() -> Result<()> {
    init_tracing();
    // Usage problems and help exit with 1, like the rest of the fatal paths.
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(1);
    });
    run(cli)
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer().with_target(false).with_level(true).compact();
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}

fn split_names(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

fn run(cli: Cli) -> Result<()> {
    if cli.wrap {
        bail!("configuration error: periodic wrap is not supported");
    }

    let function_fields = split_names(&cli.function_fields);
    let integral_fields = split_names(&cli.integral_fields);

    info!(input = %cli.input.display(), blocks = cli.blocks, rho = cli.rho,
          absolute = cli.absolute, negate = cli.negate, "starting computation");

    let grid_file = amrcc_grid::read_grid_auto(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    let decomposition =
        amrcc_grid::decompose(&grid_file, cli.blocks, &function_fields, &integral_fields)
            .context("decomposing the grid")?;
    let domain = decomposition.domain;
    let cell_volume = decomposition.cell_volume;

    let mut master: Master<ComponentBlock> = Master::new();
    if cli.memory > 0 {
        master
            .set_storage(&cli.storage, cli.memory)
            .context("setting up spill storage")?;
    }
    engine::add_patches(
        &mut master,
        decomposition.patches,
        domain,
        cli.negate,
        cell_volume,
    )
    .context("constructing blocks")?;

    let absolute_rho = engine::resolve_threshold(&mut master, cli.rho, cli.absolute)
        .context("resolving the threshold")?;
    engine::init_blocks(&mut master, absolute_rho).context("initializing blocks")?;

    let rounds = engine::compute_tree(&mut master).context("merge-tree exchange")?;
    info!(rounds, "merge tree converged");

    if cli.output.as_os_str() != "none" {
        tree_io::write_tree_blocks(&mut master, &cli.output, cli.split)
            .with_context(|| format!("writing tree to {}", cli.output.display()))?;
    }

    if let Some(diagram_out) = &cli.diagram_out {
        if diagram_out.as_os_str() != "none" {
            let params = persistence::DiagramParams {
                threshold: absolute_rho,
                ignore_zero_persistence: true,
            };
            persistence::write_diagrams(&mut master, diagram_out, params)
                .with_context(|| format!("writing diagrams to {}", diagram_out.display()))?;
        }
    }

    if let Some(integral_out) = &cli.integral_out {
        if integral_out.as_os_str() != "none" {
            engine::finalize_components(&mut master).context("finalizing components")?;
            integral::write_integral(&mut master, integral_out, cli.min_cells)
                .with_context(|| format!("writing integral to {}", integral_out.display()))?;

            let v2h = vertex_to_halo_path(&cli.input, &function_fields, &grid_file);
            integral::write_vertex_to_halo(&mut master, &v2h, cli.min_cells)
                .with_context(|| format!("writing vertex-to-halo map to {}", v2h.display()))?;
            info!(v2h = %v2h.display(), "vertex-to-halo map written");
        }
    }

    Ok(())
}

/// `{input}_{field}_v2h.txt` with path separators flattened, next to the
/// working directory.
fn vertex_to_halo_path(
    input: &Path,
    function_fields: &[String],
    grid_file: &amrcc_grid::GridFile,
) -> PathBuf {
    let field = function_fields
        .first()
        .cloned()
        .or_else(|| grid_file.fields.first().map(|f| f.name.clone()))
        .unwrap_or_else(|| "field".into());
    let flat_input = input.to_string_lossy().replace(['/', '\\'], "_");
    let flat_field = field.replace(['/', '\\'], "_");
    PathBuf::from(format!("{flat_input}_{flat_field}_v2h.txt"))
}
