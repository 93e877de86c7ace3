use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result, bail};
use clap::Parser;
use clap::error::ErrorKind;
use hw_decode_yuv::{
    BackendError, Codec, DecodeConfig, DecoderCatalog, FfmpegBackend, HwDeviceType, decode_file,
};
use tracing::{Level, error};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "hw-decode-yuv")]
#[command(about = "Decode the first video stream of a file to raw YUV420, preferring hardware")]
#[command(version)]
struct Args {
    /// Input media file
    #[arg(required_unless_present = "list_hw_decoders")]
    input: Option<PathBuf>,

    /// Output raw YUV420 file
    #[arg(required_unless_present = "list_hw_decoders")]
    output: Option<PathBuf>,

    #[arg(long, default_value = "h264")]
    codec: String,

    /// Hardware device type (videotoolbox, cuda, vaapi, qsv, d3d11va, dxva2)
    #[arg(long)]
    hw_device: Option<String>,

    /// Hardware decoder name, overriding the one derived from codec and device
    #[arg(long)]
    hw_decoder: Option<String>,

    /// Skip hardware decoding entirely
    #[arg(long, default_value_t = false, conflicts_with = "require_hardware")]
    software: bool,

    /// Fail instead of falling back to software decoding
    #[arg(long, default_value_t = false)]
    require_hardware: bool,

    /// Print the hardware decoders FFmpeg was built with and exit
    #[arg(long, default_value_t = false)]
    list_hw_decoders: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => err.exit(),
            _ => {
                let _ = err.print();
                process::exit(-1);
            }
        },
    };

    init_logging(&args.log_level);

    if let Err(err) = run(args) {
        error!("{err:#}");
        let status = err
            .downcast_ref::<BackendError>()
            .map_or(-1, BackendError::status_code);
        process::exit(status);
    }
}

fn init_logging(level: &str) {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn run(args: Args) -> Result<()> {
    let backend = FfmpegBackend::new()?;

    if args.list_hw_decoders {
        for name in backend.hardware_decoders() {
            println!("{name}");
        }
        return Ok(());
    }

    let (Some(input), Some(output)) = (args.input, args.output) else {
        bail!("input and output paths are required");
    };
    let codec = parse_codec(&args.codec)?;

    let mut config = DecodeConfig::new(input, output, codec);
    if let Some(device) = args.hw_device.as_deref() {
        config.selector.device = parse_device(device)?;
    }
    config.selector.hw_decoder = args.hw_decoder;
    config.selector.software_only = args.software;
    config.selector.require_hardware = args.require_hardware;

    let summary = decode_file(&backend, &config)?;
    println!(
        "decoded_frames={}, packets={}, hw_transfers={}, bytes_written={}, output={}",
        summary.decoded_frames,
        summary.packets,
        summary.hw_transfers,
        summary.bytes_written,
        config.output.display()
    );
    Ok(())
}

fn parse_codec(raw: &str) -> Result<Codec> {
    Codec::parse(raw).with_context(|| format!("unsupported codec: {raw}"))
}

fn parse_device(raw: &str) -> Result<HwDeviceType> {
    HwDeviceType::parse(raw).with_context(|| format!("unsupported hardware device: {raw}"))
}
