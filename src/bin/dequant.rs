//! dequant CLI - write, inspect and size quantization table sections.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;

use dequant_rs::{
    AcStrategy, BitReader, BitWriter, DctQuantWeightParams, DequantMatrices, QuantEncoding,
    QuantTable, bytes_per_row, vector_size,
};

/// Quantization table tool for block-transform codecs
#[derive(Parser)]
#[command(name = "dequant")]
#[command(version)]
#[command(about = "Write, inspect and size dequantization table sections", long_about = None)]
#[command(after_help = "EXAMPLES:
    dequant encode -o tables.bin --flat 400 --dc 2048,256,128
    dequant inspect -i tables.bin --strategy 0 --channel 1
    dequant stride --xsize 512 --element-size 4")]
struct Cli {
    /// Log decoding steps (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write an AC + DC table section
    ///
    /// Without options both sections are the one-bit defaults.
    #[command(visible_alias = "e")]
    Encode {
        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Use the same weight for every coefficient of every table
        #[arg(long)]
        flat: Option<f32>,

        /// DC quantizers for the three channels, larger is finer
        #[arg(long, value_delimiter = ',', num_args = 3)]
        dc: Option<Vec<f32>>,
    },

    /// Decode a table section and print what it contains
    #[command(visible_alias = "i")]
    Inspect {
        /// Input file path
        #[arg(short, long)]
        input: PathBuf,

        /// Also print the matrix of this strategy (0-17)
        #[arg(short, long)]
        strategy: Option<u8>,

        /// Channel of the printed matrix
        #[arg(short, long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..3))]
        channel: u8,
    },

    /// Print the row stride of a plane
    Stride {
        /// Row width in elements
        #[arg(short, long)]
        xsize: usize,

        /// Element size in bytes (1, 2, 4 or 8)
        #[arg(short, long, default_value_t = 4)]
        element_size: usize,
    },
}

fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::builder()
        .filter_module("dequant_rs", level)
        .parse_default_env()
        .init();

    let result = match cli.command {
        Commands::Encode { output, flat, dc } => encode_tables(&output, flat, dc.as_deref()),
        Commands::Inspect {
            input,
            strategy,
            channel,
        } => inspect_tables(&input, strategy, channel as usize),
        Commands::Stride {
            xsize,
            element_size,
        } => show_stride(xsize, element_size),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn encode_tables(
    output: &PathBuf,
    flat: Option<f32>,
    dc: Option<&[f32]>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut matrices = DequantMatrices::new();

    if let Some(weight) = flat {
        if !(weight.is_finite() && weight >= 1e-8) {
            return Err(format!("flat weight {weight} must be positive").into());
        }
        let params = DctQuantWeightParams::from_array(&[[weight], [weight], [weight]]);
        let encodings = vec![QuantEncoding::dct(params); QuantTable::NUM];
        matrices.set_custom(&encodings);
    }
    if let Some(dc) = dc {
        let dc: [f32; 3] = dc
            .try_into()
            .map_err(|_| "--dc takes exactly three values")?;
        if dc.iter().any(|v| !(v.is_finite() && *v >= 1e-8)) {
            return Err("DC quantizers must be positive".into());
        }
        matrices.set_custom_dc(&dc);
    }

    let mut writer = BitWriter::new();
    matrices.encode(&mut writer);
    matrices.encode_dc(&mut writer);
    let bits = writer.bits_written();
    let data = writer.finish();
    fs::write(output, &data)?;

    println!(
        "Wrote {} bits ({} bytes) to {}",
        bits,
        data.len(),
        output.display()
    );
    Ok(())
}

fn inspect_tables(
    input: &PathBuf,
    strategy: Option<u8>,
    channel: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = fs::read(input)?;
    let mut reader = BitReader::new(&data);
    let mut matrices = DequantMatrices::new();
    matrices.decode(&mut reader)?;
    matrices.decode_dc(&mut reader)?;
    reader.close()?;

    println!("File: {}", input.display());
    println!("Tables:");
    for (slot, encoding) in QuantTable::ALL.iter().zip(matrices.encodings()) {
        println!(
            "  {:<10} {:>2} block(s)  {:?}",
            format!("{slot:?}"),
            slot.required_size(),
            encoding.mode()
        );
    }
    println!(
        "DC quantizers: {} {} {}",
        matrices.inv_dc_quant(0),
        matrices.inv_dc_quant(1),
        matrices.inv_dc_quant(2)
    );

    if let Some(id) = strategy {
        let strategy = AcStrategy::try_from(id).map_err(|_| format!("no strategy {id}"))?;
        let matrix = matrices.matrix(strategy, channel);
        let width = 8 * strategy.covered_blocks_y().max(strategy.covered_blocks_x());
        println!("{strategy:?} channel {channel}:");
        for row in matrix.chunks(width) {
            let line: Vec<String> = row.iter().map(|v| format!("{v:.6}")).collect();
            println!("  {}", line.join(" "));
        }
    }
    Ok(())
}

fn show_stride(xsize: usize, element_size: usize) -> Result<(), Box<dyn std::error::Error>> {
    if !matches!(element_size, 1 | 2 | 4 | 8) {
        return Err(format!("unsupported element size {element_size}").into());
    }
    println!("Vector size:   {} bytes", vector_size());
    println!("Bytes per row: {}", bytes_per_row(xsize, element_size));
    Ok(())
}
