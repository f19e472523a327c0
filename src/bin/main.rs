//! Brick Stepper CLI
//!
//! Inspect and render LDraw models against a local parts library.

use brick_stepper::library::resolver::PALETTE_FILE;
use brick_stepper::thumbnail::{render, RenderOptions};
use brick_stepper::{
    layer_steps, resolve, ArchiveFetcher, FileFetcher, Fetcher, HeadlessDevice, LayeredFetcher,
    PartReference, ResourceCache, SceneLoader, StepperConfig, ThemeCatalog, ThumbnailRenderer,
    ViewAngle, Viewer, ViewerStatus,
};
use clap::{Parser, Subcommand};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url::Url;

/// Base URL the library archive is served under.
const ARCHIVE_BASE: &str = "archive:/ldraw/";

#[derive(Parser)]
#[command(name = "brick-stepper")]
#[command(author, version, about = "Inspect and render LDraw brick models step by step", long_about = None)]
struct Cli {
    /// Path to the LDraw library (directory or complete.zip)
    #[arg(short, long, global = true)]
    library: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show where a part reference resolves to
    Resolve {
        /// Reference as written in a model (e.g. "s\3001s01.dat")
        reference: String,
    },

    /// List the build steps of a model
    Steps {
        /// Model file (.ldr or .mpd)
        model: PathBuf,

        /// Regroup the steps bottom-up by part height
        #[arg(long)]
        layered: bool,
    },

    /// Render a model, optionally at one build step
    Render {
        /// Model file (.ldr or .mpd)
        model: PathBuf,

        /// Output PNG path
        #[arg(short, long)]
        output: PathBuf,

        /// Step to show (0-based); renders the whole model when omitted
        #[arg(short, long)]
        step: Option<usize>,

        /// Image width
        #[arg(long, default_value = "800")]
        width: u32,

        /// Image height
        #[arg(long, default_value = "600")]
        height: u32,

        /// Theme catalog JSON
        #[arg(long, requires = "theme")]
        themes: Option<PathBuf>,

        /// Theme name from the catalog
        #[arg(long, requires = "themes")]
        theme: Option<String>,
    },

    /// Render thumbnails of a single part
    Thumbnail {
        /// Part reference (e.g. "3001.dat")
        part: String,

        /// LDraw colour code
        #[arg(long, default_value = "16")]
        colour: u32,

        /// Output PNG path; several views get a suffix per view
        #[arg(short, long)]
        output: PathBuf,

        /// Render iso, front, side and top views
        #[arg(long)]
        all_views: bool,

        /// Edge length in pixels
        #[arg(long)]
        size: Option<u32>,
    },

    /// List the colours of the library palette
    Palette,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => StepperConfig::load(path)?,
        None => StepperConfig::default(),
    };
    let fetcher = library_fetcher(cli.library.as_deref(), &mut config)?;
    config.validate()?;

    let cache = ResourceCache::new(fetcher, Arc::new(HeadlessDevice::new()));
    let loader = SceneLoader::new(cache, config);

    match cli.command {
        Commands::Resolve { reference } => {
            let ctx = loader.config().resolve_context()?;
            println!("{}", resolve(&PartReference::new(reference), &ctx));
        }
        Commands::Steps { model, layered: true } => {
            show_layers(&model)?;
        }
        Commands::Steps { model, layered: false } => {
            show_steps(loader, &model).await?;
        }
        Commands::Render {
            model,
            output,
            step,
            width,
            height,
            themes,
            theme,
        } => {
            render_model(loader, &model, &output, step, (width, height), themes, theme).await?;
        }
        Commands::Thumbnail {
            part,
            colour,
            output,
            all_views,
            size,
        } => {
            render_thumbnails(loader, &part, colour, &output, all_views, size).await?;
        }
        Commands::Palette => {
            show_palette(loader).await?;
        }
    }

    Ok(())
}

/// Byte source for the library, with the config's base pointed at it.
fn library_fetcher(
    library: Option<&Path>,
    config: &mut StepperConfig,
) -> Result<Arc<dyn Fetcher>, Box<dyn std::error::Error>> {
    let Some(path) = library else {
        return Ok(Arc::new(FileFetcher));
    };

    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("zip")) {
        println!("Loading parts library from {:?}...", path);
        let archive = ArchiveFetcher::open(path, Url::parse(ARCHIVE_BASE)?)?;
        println!("  Found {} library files", archive.len());
        config.library_base = ARCHIVE_BASE.to_string();
        Ok(Arc::new(LayeredFetcher::new(vec![
            Arc::new(archive),
            Arc::new(FileFetcher),
        ])))
    } else {
        let dir = fs::canonicalize(path)?;
        let base = Url::from_directory_path(&dir)
            .map_err(|_| format!("not a usable library directory: {:?}", dir))?;
        config.library_base = base.to_string();
        Ok(Arc::new(FileFetcher))
    }
}

fn model_url(path: &Path) -> Result<Url, Box<dyn std::error::Error>> {
    let path = fs::canonicalize(path)?;
    Ok(Url::from_file_path(&path).map_err(|_| format!("not a usable model path: {:?}", path))?)
}

async fn load_viewer(loader: SceneLoader, model: &Path) -> Result<Viewer, Box<dyn std::error::Error>> {
    let url = model_url(model)?;

    println!("Loading {:?}...", model);
    let mut viewer = Viewer::new(loader);
    viewer.load(&url).await;
    if let ViewerStatus::Failed { message } = viewer.status() {
        return Err(message.clone().into());
    }
    Ok(viewer)
}

async fn show_steps(loader: SceneLoader, model: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let viewer = load_viewer(loader, model).await?;
    let Some(scene) = viewer.scene() else {
        return Ok(());
    };
    let plan = brick_stepper::group_steps(scene);

    println!("\nModel Info:");
    println!("  Nodes: {}", scene.len());
    println!("  Triangles: {}", scene.triangle_count());
    println!("  Steps: {}", plan.step_count());

    for bucket in plan.buckets() {
        let names: Vec<&str> = bucket
            .nodes
            .iter()
            .map(|&id| scene.node(id).name.as_str())
            .collect();
        println!("  Step {}: {}", bucket.index + 1, names.join(", "));
    }

    let stats = viewer.loader().cache().stats();
    println!(
        "\nCache: {} fetches, {} documents, {} shared geometries",
        stats.fetches, stats.documents, stats.geometries
    );
    Ok(())
}

fn show_layers(model: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let layered = layer_steps(&fs::read_to_string(model)?);
    println!("Layers: {}", layered.layer_count());
    let mut previous = layered.texts.first().map_or(0, |t| t.lines().count());
    for (index, text) in layered.texts.iter().enumerate().skip(1) {
        let lines = text.lines().count();
        println!("  Layer {}: {} lines", index, lines.saturating_sub(previous));
        previous = lines;
    }
    if let Some(bounds) = layered.bounds {
        println!("  Placements span {:?} to {:?}", bounds.min, bounds.max);
    }
    Ok(())
}

async fn render_model(
    loader: SceneLoader,
    model: &Path,
    output: &Path,
    step: Option<usize>,
    (width, height): (u32, u32),
    themes: Option<PathBuf>,
    theme: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut viewer = load_viewer(loader, model).await?.with_aspect(width as f32 / height.max(1) as f32);

    if let (Some(path), Some(name)) = (themes, theme) {
        let catalog = ThemeCatalog::from_json(&fs::read_to_string(&path)?)?;
        let theme = catalog
            .find(&name)
            .cloned()
            .ok_or_else(|| format!("theme '{}' not in {:?}", name, path))?;
        viewer.apply_theme(theme);
    }

    match step {
        Some(index) => {
            viewer.set_step_mode(true);
            viewer.set_step_index(index);
            println!("Showing step {} of {}", viewer.step_index() + 1, viewer.step_count());
        }
        None => {
            viewer.request_refit();
        }
    }

    let Some(scene) = viewer.scene() else {
        return Ok(());
    };
    let options = RenderOptions::new(width, height)
        .with_background(brick_stepper::Color::WHITE)
        .with_edges(viewer.loader().config().draw_edges);
    let image = render(scene, viewer.camera(), &options);
    image.save(output)?;
    println!("Rendered {}x{} to {:?}", width, height, output);
    Ok(())
}

async fn render_thumbnails(
    loader: SceneLoader,
    part: &str,
    colour: u32,
    output: &Path,
    all_views: bool,
    size: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut renderer = ThumbnailRenderer::new(loader);
    if let Some(size) = size {
        renderer = renderer.with_size(size);
    }
    let part = PartReference::new(part);

    if !all_views {
        let thumb = renderer.render_thumbnail(&part, colour).await;
        fs::write(output, thumb.to_png()?)?;
        report_thumbnail(output, thumb.is_placeholder());
        return Ok(());
    }

    let angles = ViewAngle::standard();
    let thumbs = renderer.render_views(&part, colour, &angles).await;
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "thumbnail".to_string());
    for (angle, thumb) in angles.iter().zip(thumbs) {
        let path = output.with_file_name(format!("{}_{}.png", stem, angle.name));
        fs::write(&path, thumb.to_png()?)?;
        report_thumbnail(&path, thumb.is_placeholder());
    }
    Ok(())
}

fn report_thumbnail(path: &Path, placeholder: bool) {
    if placeholder {
        println!("Wrote placeholder to {:?} (part could not be rendered)", path);
    } else {
        println!("Wrote thumbnail to {:?}", path);
    }
}

async fn show_palette(loader: SceneLoader) -> Result<(), Box<dyn std::error::Error>> {
    let url = loader.config().palette_url()?;
    let palette = loader.cache().acquire_palette(&url).await;

    println!("Palette from {} ({} colours):", PALETTE_FILE, palette.len());
    for colour in palette.entries() {
        println!(
            "  {:>4}  {:<28} {}  edge {}  alpha {}",
            colour.code,
            colour.name,
            colour.value.to_hex(),
            colour.edge.to_hex(),
            colour.alpha
        );
    }
    loader.cache().release_palette(url.as_str());
    Ok(())
}
