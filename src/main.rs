use blockdedup::{create, restore, scan};

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Block size used when `--block-size` is not given
const DEFAULT_BLOCK_SIZE: usize = 4096;

#[derive(Parser)]
#[command(name = "blockdedup", about = "Rolling-checksum block deduplication")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Index the blocks of a reference file or directory
    Index {
        /// Reference file or directory
        #[arg(long)]
        reference: PathBuf,
        /// Output path for the index file
        #[arg(long, short)]
        output: PathBuf,
        /// Block size in bytes
        #[arg(long, default_value_t = DEFAULT_BLOCK_SIZE)]
        block_size: usize,
    },
    /// Deduplicate a file against an index
    Scan {
        /// Index file created by `index`
        #[arg(long)]
        index: PathBuf,
        /// File to deduplicate
        #[arg(long)]
        input: PathBuf,
        /// Output path for the delta file
        #[arg(long, short)]
        output: PathBuf,
        /// Verify matches byte-for-byte against this reference file or directory
        #[arg(long)]
        exact: Option<PathBuf>,
    },
    /// Rebuild a file from a delta and its reference data
    Restore {
        /// Reference file or directory the index was built from
        #[arg(long)]
        reference: PathBuf,
        /// Delta file created by `scan`
        #[arg(long)]
        delta: PathBuf,
        /// Output path for the restored file
        #[arg(long, short)]
        output: PathBuf,
    },
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Index {
            reference,
            output,
            block_size,
        } => {
            println!("Creating index...");
            println!("  Reference: {}", reference.display());
            println!("  Output: {}", output.display());
            println!("  Block size: {}", block_size);

            let start = Instant::now();
            let summary = create::create_index(&reference, &output, block_size).await?;
            let elapsed = start.elapsed();

            println!("\nIndex created successfully!");
            println!("  Files indexed: {}", summary.sources);
            println!("  Blocks: {}", summary.blocks);
            println!("  Bytes indexed: {}", summary.bytes_indexed);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
        Commands::Scan {
            index,
            input,
            output,
            exact,
        } => {
            println!("Scanning...");
            println!("  Index: {}", index.display());
            println!("  Input: {}", input.display());
            println!("  Output: {}", output.display());

            let start = Instant::now();
            let summary = scan::scan_file(&index, &input, &output, exact.as_deref()).await?;
            let elapsed = start.elapsed();

            println!("\nScan complete!");
            println!("  Input bytes: {}", summary.input_len);
            println!("  Reused bytes: {}", summary.bytes_reused);
            println!("  Literal bytes: {}", summary.bytes_literal);
            println!("  Blocks matched: {}", summary.blocks_matched);
            println!("  Segments: {}", summary.segments);
            println!("  Delta size: {}", summary.delta_len);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
        Commands::Restore {
            reference,
            delta,
            output,
        } => {
            println!("Restoring...");
            println!("  Reference: {}", reference.display());
            println!("  Delta: {}", delta.display());
            println!("  Output: {}", output.display());

            let start = Instant::now();
            let summary = restore::restore_file(&reference, &delta, &output).await?;
            let elapsed = start.elapsed();

            println!("\nFile restored successfully!");
            println!("  Bytes written: {}", summary.output_len);
            println!("  Bytes copied from reference: {}", summary.bytes_copied);
            println!("  Bytes inserted: {}", summary.bytes_inserted);
            println!("  Time elapsed: {:.3}s", elapsed.as_secs_f64());
        }
    }

    Ok(())
}
