use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use tessera_persist::{
    CURRENT_DOCUMENT_VERSION, DocumentMeta, DocumentStore, Format, MAGIC, UpgradeReport,
};
use tessera_prefab::PrefabLibrary;
use tessera_render::{PipelineConfig, RenderSystem};
use tessera_scene::{Document, LoadOptions, NodeId, Scheduler, SceneGraph, ThreadPolicy, TypeRegistry};

mod demo;

#[derive(Parser)]
#[command(name = "tessera-cli", about = "CLI tool for tessera scene documents")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print engine version and registered component types
    Info,
    /// Print the node tree and statistics of a document
    Inspect {
        file: PathBuf,
    },
    /// Upgrade a document to the current version in place
    Upgrade {
        file: PathBuf,
    },
    /// Re-encode a document
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Write the TSRA binary form
        #[arg(long)]
        binary: bool,
        /// Compress the binary payload (implies --binary)
        #[arg(long)]
        compress: bool,
        /// Load as a prefab and write it with its resource id injected
        #[arg(long)]
        prefab: bool,
    },
    /// Run the render pipeline against a scene and print frame statistics
    Render {
        /// Pipeline configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Cull on the rayon pool
        #[arg(long)]
        pool: bool,
        /// Scene document; the built-in demo scene when omitted
        #[arg(short, long)]
        scene: Option<PathBuf>,
        /// Number of frames to simulate
        #[arg(short, long, default_value = "1")]
        frames: u32,
        /// Print the recorded commands of the last frame
        #[arg(long)]
        dump: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let registry = Arc::new(TypeRegistry::with_builtins());

    match cli.command {
        Commands::Info => {
            println!("tessera-cli v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "document: v{CURRENT_DOCUMENT_VERSION}, binary magic {:?}",
                String::from_utf8_lossy(&MAGIC)
            );
            println!("components: {}", registry.type_names().join(", "));
        }
        Commands::Inspect { file } => {
            let loaded = DocumentStore::new().with_write_back(false).open(&file)?;
            let doc = &loaded.document;
            println!("{}", file.display());
            println!(
                "  format={:?} version={} (stored v{}{})",
                loaded.format,
                doc.version,
                loaded.upgrade.from,
                if loaded.upgrade.changed { ", needs upgrade" } else { "" }
            );
            println!(
                "  nodes={} components={}",
                doc.node_count(),
                doc.component_count()
            );
            if let Some(resource) = doc.root_record().and_then(|r| r.parent) {
                println!("  root parent: {resource}");
            }
            let mut histogram: BTreeMap<&str, usize> = BTreeMap::new();
            for record in doc.objects.iter().filter(|r| !r.is_node()) {
                *histogram.entry(record.type_name.as_str()).or_default() += 1;
            }
            for (type_name, count) in &histogram {
                println!("    {type_name}: {count}");
            }

            let mut graph = SceneGraph::new(registry);
            let out = graph.instantiate_document(
                doc,
                &LoadOptions {
                    keep_ids: true,
                    ..LoadOptions::default()
                },
            )?;
            if out.skipped > 0 || out.unresolved > 0 {
                println!(
                    "  skipped={} unresolved references={}",
                    out.skipped, out.unresolved
                );
            }
            for root in &out.roots {
                print_tree(&graph, *root, 1);
            }
        }
        Commands::Upgrade { file } => {
            let (report, written_back) = upgrade_file(&file)?;
            if written_back {
                println!(
                    "{}: upgraded v{} -> v{}",
                    file.display(),
                    report.from,
                    report.to
                );
            } else {
                println!("{}: already current (v{})", file.display(), report.to);
            }
        }
        Commands::Convert {
            input,
            output,
            binary,
            compress,
            prefab,
        } => {
            let format = if binary || compress {
                Format::binary(compress)
            } else {
                Format::Json
            };
            let meta = convert(registry, &input, &output, format, prefab)?;
            println!(
                "{} -> {} ({:?}, {} bytes, sha256 {})",
                input.display(),
                output.display(),
                meta.format,
                meta.bytes,
                &meta.sha256[..12]
            );
        }
        Commands::Render {
            config,
            pool,
            scene,
            frames,
            dump,
        } => {
            let mut cfg = match &config {
                Some(path) => PipelineConfig::load(path)?,
                None => PipelineConfig::default(),
            };
            if pool {
                cfg.thread_policy = ThreadPolicy::Pool;
            }
            render(registry, cfg, scene.as_deref(), frames, dump)?;
        }
    }

    Ok(())
}

fn print_tree(graph: &SceneGraph, node: NodeId, depth: usize) {
    let Some(data) = graph.node(node) else {
        return;
    };
    let components: Vec<&str> = graph
        .node_components(node)
        .iter()
        .filter_map(|c| graph.get_dyn(*c))
        .map(|c| c.type_name())
        .collect();
    println!(
        "{}- {} [{}]{}{}",
        "  ".repeat(depth),
        data.name(),
        node.short(),
        if data.is_enabled() { "" } else { " (disabled)" },
        if components.is_empty() {
            String::new()
        } else {
            format!(" {}", components.join(", "))
        }
    );
    for child in graph.children(node) {
        print_tree(graph, *child, depth + 1);
    }
}

/// Open `file` with write-back enabled. Returns the upgrade report and
/// whether the file was rewritten.
fn upgrade_file(file: &Path) -> anyhow::Result<(UpgradeReport, bool)> {
    let loaded = DocumentStore::new().open(file)?;
    if loaded.written_back {
        tracing::info!(file = %file.display(), from = loaded.upgrade.from, "document rewritten");
    }
    Ok((loaded.upgrade, loaded.written_back))
}

fn convert(
    registry: Arc<TypeRegistry>,
    input: &Path,
    output: &Path,
    format: Format,
    prefab: bool,
) -> anyhow::Result<DocumentMeta> {
    let store = DocumentStore::new().with_write_back(false);
    let mut doc = store.load(input)?;
    if prefab {
        doc = as_prefab(registry, &doc)?;
    }
    Ok(store.save(output, &doc, format)?)
}

fn as_prefab(registry: Arc<TypeRegistry>, doc: &Document) -> anyhow::Result<Document> {
    let mut library = PrefabLibrary::new(registry);
    let id = library.load_document(doc)?;
    let prefab = library
        .get(id)
        .ok_or_else(|| anyhow::anyhow!("prefab {id} missing after load"))?;
    Ok(prefab.to_document()?)
}

fn render(
    registry: Arc<TypeRegistry>,
    config: PipelineConfig,
    scene: Option<&Path>,
    frames: u32,
    dump: bool,
) -> anyhow::Result<()> {
    let mut graph = SceneGraph::new(registry.clone());
    match scene {
        Some(path) => {
            let doc = DocumentStore::new().with_write_back(false).load(path)?;
            let out = graph.instantiate_document(&doc, &LoadOptions::default())?;
            println!("scene: {} ({} roots)", path.display(), out.roots.len());
        }
        None => {
            let mut library = PrefabLibrary::new(registry);
            let demo = demo::build(&mut graph, &mut library)?;
            println!(
                "scene: demo ({} prefab instances, camera {})",
                demo.instances.len(),
                demo.camera.short()
            );
        }
    }

    println!(
        "pipeline: {}x{} culling={} policy={:?}",
        config.width, config.height, config.frustum_culling, config.thread_policy
    );
    let mut system = RenderSystem::new(config);
    {
        let mut scheduler = Scheduler::new();
        if !scheduler.add(Box::new(&mut system)) {
            anyhow::bail!("render system failed to initialise");
        }
        for _ in 0..frames {
            scheduler.tick(&mut graph, 1.0 / 60.0);
        }
    }

    let stats = system.last_frame();
    if stats.skipped_frame {
        println!("no active camera, nothing drawn");
        return Ok(());
    }
    println!(
        "frames={} renderables={} visible={} lights={} widgets={} passes={}",
        system.frames(),
        stats.renderables,
        stats.visible,
        stats.lights,
        stats.widgets,
        stats.passes
    );
    println!(
        "commands={} draw_calls={} instanced={} instances={} skipped={} missing_resources={}",
        stats.submit.commands,
        stats.submit.draw_calls,
        stats.submit.instanced_draws,
        stats.submit.instances,
        stats.submit.skipped,
        stats.missing_resources
    );
    let bound = system.pipeline().world_bound();
    if bound.is_valid() {
        println!("world bound: {:?} .. {:?}", bound.min, bound.max);
    }
    for (name, buffer) in system.pipeline().render_textures() {
        println!("  buffer {name}: {}x{}", buffer.width, buffer.height);
    }
    if dump {
        print!("{}", system.backend().describe());
    }
    Ok(())
}
