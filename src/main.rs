use clap::Parser;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use bottleqa::ocr::export_csv;
use bottleqa::{PdfRenderer, QaConfig, QaPipeline, ReportRenderer, SessionImages, View};

#[derive(Parser)]
#[command(name = "bottleqa")]
#[command(about = "Inspect six photographs of a bottled product and build its QA checklist")]
struct Cli {
    /// Top view image
    #[arg(long, value_name = "IMAGE")]
    top: Option<PathBuf>,

    /// Bottom view image
    #[arg(long, value_name = "IMAGE")]
    bottom: Option<PathBuf>,

    /// Left side image
    #[arg(long, value_name = "IMAGE")]
    left: Option<PathBuf>,

    /// Right side image
    #[arg(long, value_name = "IMAGE")]
    right: Option<PathBuf>,

    /// Front side image, also used to classify the product type
    #[arg(long, value_name = "IMAGE")]
    front: Option<PathBuf>,

    /// Back side image
    #[arg(long, value_name = "IMAGE")]
    back: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Directory to write QA-Checklist.pdf and the per-view overlays and label crops into
    #[arg(long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Write the raw OCR table as CSV
    #[arg(long, value_name = "FILE")]
    export_ocr: Option<PathBuf>,

    /// Print the session outcome as JSON instead of text
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn image_paths(&self) -> impl Iterator<Item = (View, &Path)> {
        [
            (View::Top, self.top.as_deref()),
            (View::Bottom, self.bottom.as_deref()),
            (View::Left, self.left.as_deref()),
            (View::Right, self.right.as_deref()),
            (View::Front, self.front.as_deref()),
            (View::Back, self.back.as_deref()),
        ]
        .into_iter()
        .filter_map(|(view, path)| path.map(|p| (view, p)))
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    init_tracing(args.verbose);

    let config = match &args.config {
        Some(path) => QaConfig::load(path)?,
        None => QaConfig::default(),
    };

    let images = SessionImages::load(args.image_paths());
    if args.verbose {
        for view in View::ALL {
            if let Some(img) = images.get(view) {
                println!("{view} image: {}x{}", img.width(), img.height());
            }
        }
    }

    let pipeline = QaPipeline::from_config(&config, reqwest::Client::new())?.with_verbose(args.verbose);
    let outcome = pipeline.run(images).await?;

    if let Some(path) = &args.export_ocr {
        export_csv(path, &outcome.raw_labels)?;
        if args.verbose {
            println!("OCR table written to {}", path.display());
        }
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome.summary())?);
    } else {
        println!("\n=== QA Checklist ({}) ===", outcome.session_id);
        for row in &outcome.table.rows {
            println!("  {:<22} {}", row.check, row.status);
        }

        if !outcome.ingredients.fields.is_empty() {
            println!("\n=== Label Information ===");
            for field in &outcome.ingredients.fields {
                println!("  {}: {}", field.label, field.value);
            }
        }

        if !outcome.ingredients.table.is_empty() {
            println!("\n=== Medicinal Ingredients ===");
            for (name, quantity) in &outcome.ingredients.table.rows {
                println!("  {:<30} {}", name, quantity);
            }
        }

        if !outcome.notices.is_empty() {
            println!("\nNotices:");
            for notice in &outcome.notices {
                println!("  {notice}");
            }
        }
    }

    if let Some(dir) = &args.out_dir {
        let saved = outcome.save_images(dir)?;
        println!("\n{} view images written to {}", saved.len(), dir.display());

        if outcome.export.enabled {
            let renderer = PdfRenderer;
            let bytes = renderer.render(&outcome.report, &outcome.meta())?;
            let path = dir.join(renderer.file_name());
            std::fs::write(&path, bytes)?;
            println!("Report written to {} ({})", path.display(), renderer.mime_type());
        } else {
            println!(
                "Report export disabled: {}",
                outcome.export.reason.as_deref().unwrap_or("incomplete session")
            );
        }
    }

    Ok(())
}
