//! Headless terrain generation demo
//!
//! Synthesizes a layered noise field (or loads a heightmap image) and turns
//! it into chunked or single-mesh geometry on the default GPU adapter.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use terrain_gen_core::{
    ChunkResolution, GeometryMesh, HeightField, NoiseLayerConfig, NoiseType, Result,
    TerrainGenerator, TerrainSettings, WgpuDevice,
};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "terrain-gen-demo")]
#[command(about = "GPU terrain generation demo", long_about = None)]
struct Args {
    /// Terrain settings JSON file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Noise field width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Noise field height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Seed for the first noise layer (random when neither a seed nor a config is given)
    #[arg(short, long)]
    seed: Option<u32>,

    /// Chunk resolution: 16, 32, 64, 128 or 256
    #[arg(short, long, value_parser = parse_resolution)]
    resolution: Option<ChunkResolution>,

    /// Horizontal scaling of the generated chunks
    #[arg(long)]
    scale: Option<f32>,

    /// Vertical multiplier applied to sampled heights
    #[arg(long)]
    height_modifier: Option<f32>,

    /// Mesh an existing heightmap image instead of synthesizing noise
    #[arg(long)]
    heightmap: Option<PathBuf>,

    /// Build one mesh for the whole field instead of a chunk grid
    #[arg(long)]
    single_mesh: bool,

    /// Average normals across chunk seams
    #[arg(long)]
    blend_seams: bool,
}

fn parse_resolution(value: &str) -> std::result::Result<ChunkResolution, String> {
    let dimension = value
        .split_once('x')
        .map_or(value, |(width, _)| width)
        .parse::<u32>()
        .map_err(|e| format!("invalid resolution '{value}': {e}"))?;
    ChunkResolution::try_from(dimension).map_err(|e| e.to_string())
}

fn build_settings(args: &Args) -> Result<TerrainSettings> {
    let mut settings = match &args.config {
        Some(path) => {
            info!("Loading settings from {}", path.display());
            TerrainSettings::load(path)?
        }
        None => TerrainSettings::default(),
    };

    if let Some(width) = args.width {
        settings.noise.width = width;
    }
    if let Some(height) = args.height {
        settings.noise.height = height;
    }

    let seed = match (args.seed, &args.config) {
        (Some(seed), _) => Some(seed),
        (None, None) => Some(rand::random::<u32>()),
        (None, Some(_)) => None,
    };
    if let Some(seed) = seed {
        match settings.noise.layers.layers_mut().first_mut() {
            Some(layer) => layer.seed = seed,
            None => {
                settings
                    .noise
                    .layers
                    .push(NoiseLayerConfig::new(NoiseType::default(), seed));
            }
        }
        info!("Base layer seed: {}", seed);
    }

    if let Some(resolution) = args.resolution {
        settings.mesh.resolution = resolution;
    }
    if let Some(scale) = args.scale {
        settings.mesh.scale = scale;
    }
    if let Some(height_modifier) = args.height_modifier {
        settings.mesh.height_modifier = height_modifier;
    }
    if args.blend_seams {
        settings.mesh.blend_seam_normals = true;
    }

    settings.validate()?;
    Ok(settings)
}

fn print_mesh_summary(label: &str, mesh: &GeometryMesh) {
    let bounds = mesh.bounds();
    println!(
        "{label}: {} vertices, {} triangles, bounds {:.1} x {:.2} x {:.1}",
        mesh.vertex_count(),
        mesh.triangle_count(),
        bounds.size().x,
        bounds.size().y,
        bounds.size().z
    );
}

fn run(args: &Args) -> Result<()> {
    let settings = build_settings(args)?;

    let mut generator = TerrainGenerator::with_default_device()?;
    let adapter = generator.device().context().adapter_info();
    println!("Adapter: {} ({:?})", adapter.name, adapter.backend);

    let start = Instant::now();
    let field = match &args.heightmap {
        Some(path) => {
            info!("Loading heightmap from {}", path.display());
            HeightField::open(path)?
        }
        None => {
            println!(
                "Noise: {}x{}, {} layer(s)",
                settings.noise.width,
                settings.noise.height,
                settings.noise.layers.len()
            );
            generator.generate_field(&settings.noise)?
        }
    };
    println!(
        "Field ready: {}x{} in {:.1}ms",
        field.width(),
        field.height(),
        start.elapsed().as_secs_f64() * 1000.0
    );

    let start = Instant::now();
    if args.single_mesh {
        let generated = generator.generate_mesh(&field, &settings.mesh)?;
        for advisory in &generated.advisories {
            warn!("{}", advisory);
        }
        print_mesh_summary("Mesh", &generated.value);
    } else {
        let grid = generator.generate_chunks(&field, &settings.mesh)?;
        println!(
            "Chunks: {}x{} at {}, scale {}, height modifier {}",
            grid.cols(),
            grid.rows(),
            settings.mesh.resolution,
            settings.mesh.scale,
            settings.mesh.height_modifier
        );
        for placement in TerrainGenerator::<WgpuDevice>::placements(&grid) {
            if let Some(mesh) = grid.mesh(placement.column, placement.row) {
                let label = format!(
                    "  [{:>2},{:>2}] at ({:>7.1}, {:>7.1})",
                    placement.column,
                    placement.row,
                    placement.position.x,
                    placement.position.z
                );
                print_mesh_summary(&label, mesh);
            }
        }
    }
    println!(
        "Meshing finished in {:.1}ms",
        start.elapsed().as_secs_f64() * 1000.0
    );

    let device = generator.device();
    if device.live_images() + device.live_buffers() > 0 {
        warn!(
            "{} image(s) and {} buffer(s) still live after generation",
            device.live_images(),
            device.live_buffers()
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Terrain generation failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
