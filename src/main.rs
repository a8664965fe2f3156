use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};

use areamark::geometry::ScreenPoint;
use areamark::region::Category;
use areamark::AnnotationApp;

#[derive(Parser)]
#[command(name = "areamark")]
#[command(about = "Mark blocked and waterway rectangles on a map image")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a project folder for an image
    New { image: PathBuf },
    /// Summarize the regions stored in a project
    Show { project: PathBuf },
    /// Write the prefixed and raw export files
    Export {
        project: PathBuf,
        /// Target file; `.txt` is appended when missing
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Print the raw export text
    Raw { project: PathBuf },
    /// Draw one rectangle between two screen points
    #[command(allow_negative_numbers = true)]
    Add {
        project: PathBuf,
        #[arg(short, long, default_value = "blocked")]
        category: Category,
        x1: i32,
        y1: i32,
        x2: i32,
        y2: i32,
    },
    /// Remove the most recently added rectangle
    RemoveLast { project: PathBuf },
    /// Remove every rectangle
    Clear { project: PathBuf },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut app = areamark::start();

    match cli.command {
        Commands::New { image } => {
            let opened = app
                .open_image(&image)
                .with_context(|| format!("failed to open image {}", image.display()))?;
            if let Some(err) = &opened.save_error {
                eprintln!("warning: project record not written: {err}");
            }
            match opened.folder {
                Some(folder) => println!("created project {}", folder.display()),
                None => anyhow::bail!("could not create a project folder for {}", image.display()),
            }
        }
        Commands::Show { project } => {
            let opened = open(&mut app, &project)?;
            println!("image: {}", opened.image_path.display());
            println!("session: {}", app.session());
            println!("next: {}", app.session().phase().hint());
            if !opened.record_found {
                println!("no project record yet");
            }
            for category in Category::ALL {
                let regions = app.session().store().regions(category);
                println!("{category}: {}", regions.len());
                for region in regions {
                    println!(
                        "    ({:.1}, {:.1}) - ({:.1}, {:.1})",
                        region.corner_a.x, region.corner_a.y, region.corner_b.x, region.corner_b.y
                    );
                }
            }
            for warning in &opened.warnings {
                println!("warning: {warning}");
            }
        }
        Commands::Export { project, output } => {
            open(&mut app, &project)?;
            let target = output.unwrap_or_else(|| project.join("exported_data.txt"));
            let written = app.export(&target).context("export failed")?;
            for path in written {
                println!("wrote {}", path.display());
            }
        }
        Commands::Raw { project } => {
            open(&mut app, &project)?;
            println!("{}", app.raw_export().context("export failed")?);
        }
        Commands::Add {
            project,
            category,
            x1,
            y1,
            x2,
            y2,
        } => {
            open(&mut app, &project)?;
            app.set_category(category);
            app.press(ScreenPoint::new(x1, y1))?;
            let outcome = app
                .press(ScreenPoint::new(x2, y2))
                .context("rectangle was not added")?;
            if let Some(mutation) = outcome.committed() {
                println!("{}", mutation.describe());
            }
        }
        Commands::RemoveLast { project } => {
            open(&mut app, &project)?;
            let outcome = app.remove_last().context("nothing to remove")?;
            if let Some(mutation) = outcome.committed() {
                println!("{}", mutation.describe());
            }
        }
        Commands::Clear { project } => {
            open(&mut app, &project)?;
            match app.clear()?.committed() {
                Some(mutation) => println!("{}", mutation.describe()),
                None => println!("no regions to clear"),
            }
        }
    }

    Ok(())
}

fn open(app: &mut AnnotationApp, project: &Path) -> anyhow::Result<areamark::OpenedProject> {
    app.open_project(project)
        .with_context(|| format!("failed to open project {}", project.display()))
}
