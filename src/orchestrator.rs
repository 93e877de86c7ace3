use std::io::Write;
use std::{fmt, fmt::Display};

use tracing::{debug, info, warn};

use crate::{
    BackendError, CompressedPacket, DecodeSummary, DecoderChoice, FrameDecoder, FrameWriter,
    PacketSource, PixelFormat, PlanarFrame, Received,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    Idle,
    Opened,
    Draining,
    Flushing,
    Closed,
}

impl Display for DecodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Opened => f.write_str("opened"),
            Self::Draining => f.write_str("draining"),
            Self::Flushing => f.write_str("flushing"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// Why a receive loop stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainStop {
    NeedsInput,
    EndOfStream,
}

/// Feeds packets of one video stream through an opened decoder and writes
/// every produced frame, transferring hardware surfaces to host memory first.
///
/// Frames are written in the order the decoder emits them. FFmpeg decoders
/// emit presentation order after reordering; nothing is reordered here.
pub struct DecodeOrchestrator<D> {
    decoder: D,
    hw_format: Option<PixelFormat>,
    stream_index: usize,
    state: DecodeState,
    summary: DecodeSummary,
}

impl<D> DecodeOrchestrator<D> {
    /// Wraps a decoder that `MediaBackend::open_decoder` already opened.
    pub fn new(decoder: D, choice: &DecoderChoice, stream_index: usize) -> Self {
        debug!("Decoder state {} -> {}", DecodeState::Idle, DecodeState::Opened);
        Self {
            decoder,
            hw_format: choice.hardware_pixel_format(),
            stream_index,
            state: DecodeState::Opened,
            summary: DecodeSummary::default(),
        }
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    pub fn summary(&self) -> &DecodeSummary {
        &self.summary
    }

    /// Releases the decoder (and with it the hardware device reference).
    pub fn close(mut self) -> DecodeSummary {
        self.transition(DecodeState::Closed);
        std::mem::take(&mut self.summary)
    }

    fn transition(&mut self, next: DecodeState) {
        if self.state != next {
            debug!("Decoder state {} -> {next}", self.state);
            self.state = next;
        }
    }
}

impl<D> DecodeOrchestrator<D> {
    /// Reads `source` to the end, decoding every packet of the selected
    /// stream, then flushes the decoder.
    ///
    /// A container read error ends the input like end of file does, so the
    /// frames the decoder still holds are flushed and written.
    pub fn run<S, W>(
        &mut self,
        source: &mut S,
        writer: &mut FrameWriter<W>,
    ) -> Result<&DecodeSummary, BackendError>
    where
        S: PacketSource,
        D: FrameDecoder<S::Packet>,
        W: Write,
    {
        info!("Starting decoding...");
        let decoded = self.decode_packets(source, writer);
        info!("Total packets processed: {}", self.summary.packets);
        decoded?;

        self.flush::<S::Packet, W>(writer)?;
        Ok(&self.summary)
    }

    fn decode_packets<S, W>(
        &mut self,
        source: &mut S,
        writer: &mut FrameWriter<W>,
    ) -> Result<(), BackendError>
    where
        S: PacketSource,
        D: FrameDecoder<S::Packet>,
        W: Write,
    {
        loop {
            let packet = match source.read_packet() {
                Ok(Some(packet)) => packet,
                Ok(None) => return Ok(()),
                Err(err) => {
                    warn!("Error reading packet, treating as end of input: {err}");
                    return Ok(());
                }
            };
            if packet.stream_index() != self.stream_index {
                continue;
            }
            if self.decode_packet(&packet, writer)? == DrainStop::EndOfStream {
                return Ok(());
            }
        }
    }

    fn decode_packet<P, W>(
        &mut self,
        packet: &P,
        writer: &mut FrameWriter<W>,
    ) -> Result<DrainStop, BackendError>
    where
        P: CompressedPacket,
        D: FrameDecoder<P>,
        W: Write,
    {
        self.transition(DecodeState::Draining);
        info!(
            "Processing packet {}, size: {} bytes",
            self.summary.packets,
            packet.size()
        );
        self.summary.packets += 1;
        self.decoder.send_packet(packet)?;
        self.drain::<P, W>(writer)
    }

    /// Signals end of stream and drains whatever the decoder still buffers.
    pub fn flush<P, W>(&mut self, writer: &mut FrameWriter<W>) -> Result<(), BackendError>
    where
        D: FrameDecoder<P>,
        W: Write,
    {
        self.transition(DecodeState::Flushing);
        self.decoder.send_eof()?;
        let stop = self.drain::<P, W>(writer)?;
        debug!("Flush finished ({stop:?})");
        Ok(())
    }

    fn drain<P, W>(&mut self, writer: &mut FrameWriter<W>) -> Result<DrainStop, BackendError>
    where
        D: FrameDecoder<P>,
        W: Write,
    {
        loop {
            let frame = match self.decoder.receive_frame()? {
                Received::Frame(frame) => frame,
                Received::NeedsInput => return Ok(DrainStop::NeedsInput),
                Received::EndOfStream => return Ok(DrainStop::EndOfStream),
            };
            info!(
                "Frame received: {}x{}, format: {}",
                frame.width(),
                frame.height(),
                frame.pixel_format()
            );

            if self.hw_format == Some(frame.pixel_format()) {
                let host = self.decoder.transfer_to_host(&frame)?;
                drop(frame);
                self.summary.hw_transfers += 1;
                self.write(&host, writer)?;
            } else {
                self.write(&frame, writer)?;
            }
        }
    }

    fn write<F, W>(&mut self, frame: &F, writer: &mut FrameWriter<W>) -> Result<(), BackendError>
    where
        F: PlanarFrame,
        W: Write,
    {
        self.summary.bytes_written += writer.write_frame(frame)?;
        self.summary.decoded_frames += 1;
        self.summary.width = Some(frame.width());
        self.summary.height = Some(frame.height());
        self.summary.pixel_format = Some(frame.pixel_format());
        Ok(())
    }
}
