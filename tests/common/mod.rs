#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use hw_decode_yuv::{
    BackendError, Codec, CompressedPacket, DecoderCatalog, DecoderChoice, FrameDecoder, HostFrame,
    HwDeviceType, MediaBackend, PacketSource, PixelFormat, Received, StreamInfo,
};

/// What the scripted container holds and how the scripted decoders behave.
#[derive(Debug, Clone)]
pub struct Script {
    pub width: usize,
    pub height: usize,
    /// Stream index of every packet in container order.
    pub packets: Vec<usize>,
    pub video_index: usize,
    /// Frames the decoder holds back until it is flushed.
    pub delay: usize,
    pub hardware_decoder: Option<&'static str>,
    pub software_decoder: Option<&'static str>,
    pub probe_ok: bool,
    /// Hardware context creation fails when the session opens, even if probing worked.
    pub session_device_fails: bool,
    /// Zero-based video packet the decoder rejects.
    pub fail_decode_at: Option<usize>,
    pub fail_transfer: bool,
    /// The container reports a read error instead of end of file.
    pub fail_read_at_end: bool,
    /// A hardware session hands out host frames, as with partial offload.
    pub hardware_emits_host_frames: bool,
    pub stride_padding: usize,
}

impl Script {
    pub fn video_only(frames: usize, width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            packets: vec![0; frames],
            video_index: 0,
            delay: 0,
            hardware_decoder: None,
            software_decoder: Some("h264"),
            probe_ok: true,
            session_device_fails: false,
            fail_decode_at: None,
            fail_transfer: false,
            fail_read_at_end: false,
            hardware_emits_host_frames: false,
            stride_padding: 0,
        }
    }

    pub fn with_hardware(mut self, name: &'static str, probe_ok: bool) -> Self {
        self.hardware_decoder = Some(name);
        self.probe_ok = probe_ok;
        self
    }
}

/// Live-resource probes shared by the backend and everything it opens.
#[derive(Debug, Clone, Default)]
pub struct Probes {
    pub sources_opened: Arc<AtomicUsize>,
    pub live_sources: Arc<AtomicUsize>,
    pub live_decoders: Arc<AtomicUsize>,
    pub device_probes: Arc<AtomicUsize>,
    pub releases: Arc<Mutex<Vec<&'static str>>>,
}

impl Probes {
    pub fn live_sources(&self) -> usize {
        self.live_sources.load(Ordering::SeqCst)
    }

    pub fn live_decoders(&self) -> usize {
        self.live_decoders.load(Ordering::SeqCst)
    }

    pub fn sources_opened(&self) -> usize {
        self.sources_opened.load(Ordering::SeqCst)
    }

    pub fn device_probes(&self) -> usize {
        self.device_probes.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> Vec<&'static str> {
        self.releases.lock().unwrap().clone()
    }
}

pub struct MockBackend {
    pub script: Script,
    pub probes: Probes,
}

impl MockBackend {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            probes: Probes::default(),
        }
    }
}

impl DecoderCatalog for MockBackend {
    fn find_decoder_by_name(&self, name: &str) -> Option<String> {
        self.script
            .hardware_decoder
            .filter(|hw| *hw == name)
            .map(str::to_string)
    }

    fn find_decoder(&self, _codec: Codec) -> Option<String> {
        self.script.software_decoder.map(str::to_string)
    }

    fn probe_hw_device(&self, device: HwDeviceType) -> Result<(), BackendError> {
        self.probes.device_probes.fetch_add(1, Ordering::SeqCst);
        if self.script.probe_ok {
            Ok(())
        } else {
            Err(BackendError::HardwareUnavailable { device, code: -5 })
        }
    }

    fn hardware_decoders(&self) -> Vec<String> {
        self.script
            .hardware_decoder
            .iter()
            .map(|name| name.to_string())
            .collect()
    }
}

impl MediaBackend for MockBackend {
    type Source = MockSource;
    type Decoder = MockDecoder;

    fn open_input(&self, path: &Path) -> Result<MockSource, BackendError> {
        if !path.exists() {
            return Err(BackendError::OpenInput {
                path: path.to_path_buf(),
                code: -2,
                message: "No such file or directory".to_string(),
            });
        }
        if !self.script.packets.contains(&self.script.video_index) {
            return Err(BackendError::NoVideoStream);
        }
        self.probes.sources_opened.fetch_add(1, Ordering::SeqCst);
        self.probes.live_sources.fetch_add(1, Ordering::SeqCst);
        Ok(MockSource {
            stream: StreamInfo {
                index: self.script.video_index,
                width: self.script.width as u32,
                height: self.script.height as u32,
                codec_id: 27,
                codec_name: "h264".to_string(),
                bit_rate: 0,
            },
            packets: self
                .script
                .packets
                .iter()
                .enumerate()
                .map(|(seq, &stream_index)| MockPacket { stream_index, seq })
                .collect(),
            fail_read_at_end: self.script.fail_read_at_end,
            probes: self.probes.clone(),
        })
    }

    fn open_decoder(
        &self,
        choice: &DecoderChoice,
        _source: &MockSource,
    ) -> Result<MockDecoder, BackendError> {
        if let Some(device) = choice.hardware_device() {
            if self.script.session_device_fails {
                return Err(BackendError::HardwareUnavailable { device, code: -5 });
            }
        }
        self.probes.live_decoders.fetch_add(1, Ordering::SeqCst);
        Ok(MockDecoder {
            script: self.script.clone(),
            output_format: choice
                .hardware_pixel_format()
                .filter(|_| !self.script.hardware_emits_host_frames)
                .unwrap_or(PixelFormat::Yuv420p),
            queued: VecDeque::new(),
            accepted: 0,
            eof: false,
            probes: self.probes.clone(),
        })
    }
}

#[derive(Debug)]
pub struct MockPacket {
    stream_index: usize,
    seq: usize,
}

impl CompressedPacket for MockPacket {
    fn stream_index(&self) -> usize {
        self.stream_index
    }

    fn size(&self) -> usize {
        512 + self.seq
    }
}

pub struct MockSource {
    stream: StreamInfo,
    packets: VecDeque<MockPacket>,
    fail_read_at_end: bool,
    probes: Probes,
}

impl PacketSource for MockSource {
    type Packet = MockPacket;

    fn video_stream(&self) -> &StreamInfo {
        &self.stream
    }

    fn read_packet(&mut self) -> Result<Option<MockPacket>, BackendError> {
        match self.packets.pop_front() {
            None if self.fail_read_at_end => Err(BackendError::Backend {
                context: "av_read_frame",
                code: -5,
                message: "Input/output error".to_string(),
            }),
            packet => Ok(packet),
        }
    }
}

impl Drop for MockSource {
    fn drop(&mut self) {
        self.probes.live_sources.fetch_sub(1, Ordering::SeqCst);
        self.probes.releases.lock().unwrap().push("source");
    }
}

/// One frame per video packet. Hardware frames carry no host planes.
pub struct MockDecoder {
    script: Script,
    output_format: PixelFormat,
    queued: VecDeque<HostFrame>,
    accepted: usize,
    eof: bool,
    probes: Probes,
}

impl MockDecoder {
    fn frame(&self, value: u8) -> HostFrame {
        let mut frame = HostFrame::yuv420p_filled(
            self.script.width,
            self.script.height,
            self.script.stride_padding,
            value,
        );
        if self.output_format.is_hardware() {
            frame.pixel_format = self.output_format;
            frame.planes.clear();
            frame.strides.clear();
        }
        frame
    }
}

impl FrameDecoder<MockPacket> for MockDecoder {
    type Frame = HostFrame;

    fn send_packet(&mut self, packet: &MockPacket) -> Result<(), BackendError> {
        if self.script.fail_decode_at == Some(self.accepted) {
            return Err(BackendError::Decode {
                code: -1094995529,
                message: format!("Error during sending packet {}", packet.seq),
            });
        }
        let frame = self.frame(self.accepted as u8);
        self.queued.push_back(frame);
        self.accepted += 1;
        Ok(())
    }

    fn send_eof(&mut self) -> Result<(), BackendError> {
        self.eof = true;
        Ok(())
    }

    fn receive_frame(&mut self) -> Result<Received<HostFrame>, BackendError> {
        if self.eof || self.queued.len() > self.script.delay {
            return Ok(match self.queued.pop_front() {
                Some(frame) => Received::Frame(frame),
                None => Received::EndOfStream,
            });
        }
        Ok(Received::NeedsInput)
    }

    fn transfer_to_host(&mut self, frame: &HostFrame) -> Result<HostFrame, BackendError> {
        if self.script.fail_transfer {
            return Err(BackendError::Transfer { code: -12 });
        }
        Ok(HostFrame::yuv420p_filled(
            frame.width,
            frame.height,
            self.script.stride_padding,
            0x80,
        ))
    }
}

impl Drop for MockDecoder {
    fn drop(&mut self) {
        self.probes.live_decoders.fetch_sub(1, Ordering::SeqCst);
        self.probes.releases.lock().unwrap().push("decoder");
    }
}

/// Captures formatted log output for assertions.
#[derive(Debug, Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

pub fn frame_bytes(width: usize, height: usize) -> u64 {
    (width * height + 2 * (width / 2) * (height / 2)) as u64
}
