use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use unityfs::archive::{self, BundleSummary, OpenOptions, RecompressOptions, RecompressReport};
use unityfs::CompressionType;

#[derive(Parser)]
#[command(name = "unityfs", about = "Inspect and recompress UnityFS asset bundles")]
struct Cli {
    /// Log pipeline stages (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show header, quirk profile, blocks and directory entries
    Info {
        input: PathBuf,
        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
        /// 32-character key for encrypted bundles
        #[arg(short, long)]
        key: Option<String>,
    },
    /// List directory entries
    List {
        input: PathBuf,
        #[arg(short, long)]
        key: Option<String>,
    },
    /// Recompress one or more bundles
    Recompress {
        #[arg(required = true, num_args = 1..)]
        inputs: Vec<PathBuf>,
        /// Codec: none, lzma, lz4, lz4hc (default)
        #[arg(short, long, default_value = "lz4hc")]
        codec: String,
        /// Directory for the recompressed bundles
        #[arg(short = 'o', long, required_unless_present = "in_place", conflicts_with = "in_place")]
        output_dir: Option<PathBuf>,
        /// Overwrite each input
        #[arg(long)]
        in_place: bool,
        #[arg(short, long)]
        key: Option<String>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    match cli.command {

        // ── Info ─────────────────────────────────────────────────────────────
        Commands::Info { input, json, key } => {
            let bundle  = archive::open_file(&input, &OpenOptions { key })?;
            let summary = BundleSummary::from(&bundle);
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }

            let h = &summary.header;
            println!("── UnityFS Bundle ───────────────────────────────────────");
            println!("  Path            {}", input.display());
            println!("  Format version  {}", h.version);
            println!("  Player version  {}", h.unity_version);
            println!("  Engine revision {} ({})", h.unity_revision, summary.unity_version);
            println!("  Flags           {:#06x}", h.flags);
            println!("  Quirks          {:?} / header alignment {:?}",
                     summary.quirks.flag_layout, summary.quirks.header_alignment);
            println!("  Header aligned  {}", summary.header_aligned);
            println!("  Info at end     {}", summary.blocks_info_at_end);
            println!("  Block codec     {}", codec_label(summary.current_compression_type));
            println!("  Hash            {}", summary.hash);
            println!("  Payload         {} B", summary.payload_size);
            println!("  Blocks ({}):", summary.blocks.len());
            for (i, b) in summary.blocks.iter().enumerate() {
                println!("    #{:<4} {:>12} B", i, b.uncompressed_size);
            }
            println!("  Directories ({}):", summary.directories.len());
            for d in &summary.directories {
                println!("    {:<40} {:>12} B", d.path, d.size);
            }
        }

        // ── List ─────────────────────────────────────────────────────────────
        Commands::List { input, key } => {
            let bundle = archive::open_file(&input, &OpenOptions { key })?;
            println!("Bundle: {}", input.display());
            println!("{:<40} {:>12} {:>12} {:>6}", "Path", "Offset", "Size", "Flags");
            for d in bundle.directories() {
                println!("{:<40} {:>12} {:>12} {:>#6x}", d.path, d.offset, d.size, d.flags);
            }
        }

        // ── Recompress ───────────────────────────────────────────────────────
        Commands::Recompress { inputs, codec, output_dir, in_place, key } => {
            let codec = CompressionType::from_name(&codec)
                .ok_or_else(|| format!("unknown codec '{}' (expected none, lzma, lz4 or lz4hc)", codec))?;
            let opts = RecompressOptions { codec, key };

            let jobs: Vec<(PathBuf, PathBuf)> = inputs
                .into_iter()
                .map(|input| {
                    let output = destination(&input, output_dir.as_deref(), in_place)?;
                    Ok((input, output))
                })
                .collect::<Result<_, String>>()?;

            let results = run_jobs(&jobs, &opts);

            let mut failed = 0usize;
            for ((input, output), result) in jobs.iter().zip(results) {
                match result {
                    Ok(report) => println!(
                        "  {} → {}  {} B → {} B  ({} → {})",
                        input.display(), output.display(),
                        report.input_size, report.output_size,
                        codec_label(report.from), report.to,
                    ),
                    Err(e) => {
                        failed += 1;
                        eprintln!("  {}: {} [{:?}]", input.display(), e, e.kind());
                    }
                }
            }
            if failed > 0 {
                return Err(format!("{} of {} bundle(s) failed", failed, jobs.len()).into());
            }
        }
    }

    Ok(())
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn destination(input: &Path, output_dir: Option<&Path>, in_place: bool) -> Result<PathBuf, String> {
    if in_place {
        return Ok(input.to_path_buf());
    }
    let dir  = output_dir.ok_or("either --output-dir or --in-place is required")?;
    let name = input.file_name().ok_or_else(|| format!("'{}' has no file name", input.display()))?;
    Ok(dir.join(name))
}

#[cfg(feature = "parallel")]
fn run_jobs(jobs: &[(PathBuf, PathBuf)], opts: &RecompressOptions) -> Vec<unityfs::Result<RecompressReport>> {
    use rayon::prelude::*;
    jobs.par_iter()
        .map(|(input, output)| archive::recompress_file(input, output, opts))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn run_jobs(jobs: &[(PathBuf, PathBuf)], opts: &RecompressOptions) -> Vec<unityfs::Result<RecompressReport>> {
    jobs.iter()
        .map(|(input, output)| archive::recompress_file(input, output, opts))
        .collect()
}

fn codec_label(tag: u8) -> String {
    CompressionType::try_from(tag)
        .map(|c| c.name().to_string())
        .unwrap_or_else(|_| format!("tag {}", tag))
}
