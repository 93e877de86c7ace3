use tracing::{error, info};

mod contract;
#[cfg(feature = "backend-ffmpeg")]
mod ffmpeg_backend;
mod negotiate;
mod orchestrator;
mod selector;
mod writer;

pub use contract::{
    Backend, BackendError, Codec, CompressedPacket, DecodeConfig, DecodeSummary, DecoderCatalog,
    DecoderChoice, FrameDecoder, HostFrame, HwDeviceType, MediaBackend, PacketSource,
    PixelFormat, PlanarFrame, Received, SelectorConfig, StreamInfo,
};
#[cfg(feature = "backend-ffmpeg")]
pub use ffmpeg_backend::{FfmpegBackend, FfmpegDecoder, FfmpegFrame, FfmpegPacket, FfmpegSource};
pub use negotiate::negotiate;
pub use orchestrator::{DecodeOrchestrator, DecodeState};
pub use selector::select_decoder;
pub use writer::FrameWriter;

/// Decodes the first video stream of `config.input` into raw YUV420 frames
/// at `config.output`.
///
/// Resources are released in a fixed order on every path: decoder (with its
/// hardware device reference), input, output. Frames written before a failure
/// stay in the output file.
pub fn decode_file<B>(backend: &B, config: &DecodeConfig) -> Result<DecodeSummary, BackendError>
where
    B: MediaBackend,
{
    info!("{config}");
    let choice = select_decoder(backend, &config.selector)?;

    let mut source = backend.open_input(&config.input)?;
    let stream = source.video_stream().clone();
    info!("Input file: {}", config.input.display());
    info!("Video stream index: {}", stream.index);
    info!("Video dimensions: {}x{}", stream.width, stream.height);
    info!("Codec ID: {} ({})", stream.codec_id, stream.codec_name);
    info!("Bit rate: {}", stream.bit_rate);

    let decoder = backend.open_decoder(&choice, &source)?;
    let mut writer = FrameWriter::create(&config.output).inspect_err(|err| {
        error!(
            "Failed to open output file '{}': {err}",
            config.output.display()
        );
    })?;

    let mut orchestrator = DecodeOrchestrator::new(decoder, &choice, stream.index);
    let decoded = orchestrator.run(&mut source, &mut writer).map(|_| ());
    let summary = orchestrator.close();
    drop(source);
    let finished = writer.finish().map(drop);

    if let Err(err) = &decoded {
        error!(
            "Error during decoding after {} packets: {err}",
            summary.packets
        );
    }
    decoded.and(finished)?;
    info!("{summary}");
    Ok(summary)
}
