use clap::Parser;
use std::path::PathBuf;

use disadiff::compare::first_mismatch;
use disadiff::dpfs::{read_lvl4, read_lvl4_uncached, Lvl2Cache};
use disadiff::reader::resolve;

#[derive(Parser)]
#[command(
    name = "diffext",
    version,
    about = "Extract the IVFC level 4 payload from a DISA/DIFF container"
)]
struct Cli {
    /// DISA/DIFF container file
    input: PathBuf,
    /// Extracted payload destination
    output: PathBuf,
    /// Reference capture to compare against; 0xDD bytes match anything
    compare: Option<PathBuf>,
    /// Read partition B (two-partition DISA containers only)
    #[arg(short = 'b', long)]
    partition_b: bool,
    /// Extract through the per-byte reference resolver instead of the
    /// cached run-scanning path
    #[arg(long)]
    reference: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Argument errors exit 1 like every other failure here.
    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        std::process::exit(1);
    });

    println!("diffext v{}\n", env!("CARGO_PKG_VERSION"));

    print!("Loading {}... ", cli.input.display());
    let data = std::fs::read(&cli.input)?;
    println!("{} kiB", data.len() / 1024);
    if data.is_empty() {
        return Err("input file is empty".into());
    }

    print!("Read DISA/DIFF container... ");
    let ctx = resolve(&data, cli.partition_b)?;
    println!("OK");

    println!(
        "DPFS lvl1: 0x{:08X} byte @ 0x{:08X} / presel: {}",
        ctx.lvl1.size, ctx.lvl1.offset, ctx.lvl1_selector as u8
    );
    println!(
        "DPFS lvl2: 0x{:08X} byte @ 0x{:08X} / blocks: {}",
        ctx.lvl2.size,
        ctx.lvl2.offset,
        1u64 << ctx.log_lvl2
    );
    println!(
        "DPFS lvl3: 0x{:08X} byte @ 0x{:08X} / blocks: {}",
        ctx.lvl3.size,
        ctx.lvl3.offset,
        1u64 << ctx.log_lvl3
    );
    println!(
        "IVFC lvl4: 0x{:08X} byte @ 0x{:08X} / {}ternal",
        ctx.lvl4_size,
        ctx.lvl4_offset,
        if ctx.lvl4_external { "ex" } else { "in" }
    );

    let cache = if ctx.lvl4_external || cli.reference {
        None
    } else {
        print!("Build DPFS lvl2 cache... ");
        let cache = Lvl2Cache::build(&ctx, &data)?;
        println!("OK");
        Some(cache)
    };

    print!("Read IVFC lvl4... ");
    let mut payload = vec![0u8; ctx.lvl4_size as usize];
    if cli.reference {
        read_lvl4_uncached(&mut payload, &data, &ctx, 0);
    } else {
        read_lvl4(&mut payload, &data, &ctx, cache.as_ref(), 0)?;
    }
    println!("{} kiB", payload.len() / 1024);

    print!("Writing {}... ", cli.output.display());
    std::fs::write(&cli.output, &payload)?;
    println!("{} kiB", payload.len() / 1024);

    if let Some(path) = &cli.compare {
        print!("Comparing {}... ", path.display());
        let expected = std::fs::read(path)?;
        if expected.len() < payload.len() {
            return Err(format!(
                "reference is {} bytes, payload is {} bytes",
                expected.len(),
                payload.len()
            )
            .into());
        }
        if let Some(i) = first_mismatch(&expected[..payload.len()], &payload) {
            return Err(format!("MISMATCH (0x{i:08X})").into());
        }
        println!("OK!");
    }

    Ok(())
}
