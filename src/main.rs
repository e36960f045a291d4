use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nif_export::nif::export::default_output_path;
use nif_export::{ExportConfig, ExportStatus, Game, HostScene, NifExport};

#[derive(Parser, Debug)]
#[command(author, version, about = "Writes a scene description as a NetImmerse/Gamebryo .nif")]
struct Args {
    /// Scene description (JSON).
    input: PathBuf,

    /// Output file. Defaults to the input path with a `.nif` extension.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Target game, e.g. `oblivion`, `fallout_3`, `skyrim`.
    #[arg(short, long, value_parser = parse_game)]
    game: Option<Game>,

    /// Scale correction applied to every exported translation.
    #[arg(long)]
    scale: Option<f32>,

    /// Also write the keyframe file.
    #[arg(long)]
    kf: bool,

    /// Reference `.dds` files whatever the source image format.
    #[arg(long)]
    force_dds: bool,

    /// Keep identical materials as separate blocks.
    #[arg(long)]
    no_optimize_materials: bool,
}

fn parse_game(name: &str) -> Result<Game, String> {
    name.parse().map_err(|err: nif_export::ExportError| err.to_string())
}

impl Args {
    /// Flags given on the command line win over the scene's stored settings.
    fn config(&self, stored: Option<ExportConfig>) -> ExportConfig {
        let mut config = stored.unwrap_or_default();
        if let Some(game) = self.game {
            config.game = game;
        }
        if let Some(scale) = self.scale {
            config.scale_correction = scale;
        }
        config.export_kf |= self.kf;
        config.force_dds |= self.force_dds;
        if self.no_optimize_materials {
            config.optimize_materials = false;
        }
        config
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let mut scene: HostScene = serde_json::from_str(&text)
        .with_context(|| format!("parsing scene description {}", args.input.display()))?;
    let config = args.config(scene.config.take());
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&args.input));
    info!("{} -> {}", args.input.display(), output.display());

    let mut export = NifExport::new(config).context("invalid export settings")?;
    Ok(match export.execute(&scene, &output) {
        ExportStatus::Finished => ExitCode::SUCCESS,
        ExportStatus::Cancelled => ExitCode::FAILURE,
    })
}
