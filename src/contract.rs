use std::io;
use std::path::{Path, PathBuf};
use std::{fmt, fmt::Display};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    H264,
    Hevc,
}

impl Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::H264 => f.write_str("h264"),
            Self::Hevc => f.write_str("hevc"),
        }
    }
}

impl Codec {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "h264" | "avc" => Some(Self::H264),
            "hevc" | "h265" => Some(Self::Hevc),
            _ => None,
        }
    }

    /// Name of the decoder implementation that drives `device` for this codec.
    ///
    /// Devices with a dedicated wrapper decoder (`h264_videotoolbox`,
    /// `h264_cuvid`, `h264_qsv`) resolve to it; hwaccel-only devices resolve
    /// to the native decoder, which picks up the attached device context.
    #[must_use]
    pub fn hardware_decoder_name(self, device: HwDeviceType) -> String {
        match device.decoder_suffix() {
            Some(suffix) => format!("{self}_{suffix}"),
            None => self.to_string(),
        }
    }
}

/// Pixel formats the pipeline cares about. Anything else is carried as the
/// backend's raw value so it can still be logged and compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Yuv420p,
    /// Full-range 4:2:0, same layout as `Yuv420p`.
    Yuvj420p,
    Nv12,
    VideoToolbox,
    Cuda,
    Vaapi,
    Qsv,
    D3d11,
    Dxva2,
    Other(i32),
}

impl PixelFormat {
    #[must_use]
    pub fn is_hardware(self) -> bool {
        matches!(
            self,
            Self::VideoToolbox | Self::Cuda | Self::Vaapi | Self::Qsv | Self::D3d11 | Self::Dxva2
        )
    }

    /// Host layouts the writer can emit as 8-bit planar 4:2:0.
    #[must_use]
    pub fn is_writable_yuv420(self) -> bool {
        matches!(self, Self::Yuv420p | Self::Yuvj420p | Self::Nv12)
    }
}

impl Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yuv420p => f.write_str("yuv420p"),
            Self::Yuvj420p => f.write_str("yuvj420p"),
            Self::Nv12 => f.write_str("nv12"),
            Self::VideoToolbox => f.write_str("videotoolbox_vld"),
            Self::Cuda => f.write_str("cuda"),
            Self::Vaapi => f.write_str("vaapi"),
            Self::Qsv => f.write_str("qsv"),
            Self::D3d11 => f.write_str("d3d11"),
            Self::Dxva2 => f.write_str("dxva2_vld"),
            Self::Other(raw) => write!(f, "pix_fmt({raw})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwDeviceType {
    VideoToolbox,
    Cuda,
    Vaapi,
    Qsv,
    D3d11va,
    Dxva2,
}

impl HwDeviceType {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "videotoolbox" | "vt" => Some(Self::VideoToolbox),
            "cuda" | "nvdec" | "cuvid" => Some(Self::Cuda),
            "vaapi" => Some(Self::Vaapi),
            "qsv" => Some(Self::Qsv),
            "d3d11va" | "d3d11" => Some(Self::D3d11va),
            "dxva2" => Some(Self::Dxva2),
            _ => None,
        }
    }

    #[must_use]
    pub fn os_default() -> Self {
        if cfg!(target_os = "macos") {
            Self::VideoToolbox
        } else if cfg!(target_os = "windows") {
            Self::D3d11va
        } else {
            Self::Vaapi
        }
    }

    /// Surface format frames carry while they still live in device memory.
    #[must_use]
    pub fn pixel_format(self) -> PixelFormat {
        match self {
            Self::VideoToolbox => PixelFormat::VideoToolbox,
            Self::Cuda => PixelFormat::Cuda,
            Self::Vaapi => PixelFormat::Vaapi,
            Self::Qsv => PixelFormat::Qsv,
            Self::D3d11va => PixelFormat::D3d11,
            Self::Dxva2 => PixelFormat::Dxva2,
        }
    }

    fn decoder_suffix(self) -> Option<&'static str> {
        match self {
            Self::VideoToolbox => Some("videotoolbox"),
            Self::Cuda => Some("cuvid"),
            Self::Qsv => Some("qsv"),
            Self::Vaapi | Self::D3d11va | Self::Dxva2 => None,
        }
    }
}

impl Display for HwDeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::VideoToolbox => f.write_str("videotoolbox"),
            Self::Cuda => f.write_str("cuda"),
            Self::Vaapi => f.write_str("vaapi"),
            Self::Qsv => f.write_str("qsv"),
            Self::D3d11va => f.write_str("d3d11va"),
            Self::Dxva2 => f.write_str("dxva2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Hardware {
        device: HwDeviceType,
        pixel_format: PixelFormat,
    },
    Software,
}

/// Outcome of decoder selection. Fixed for the lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoderChoice {
    pub decoder_name: String,
    pub backend: Backend,
}

impl DecoderChoice {
    #[must_use]
    pub fn hardware(decoder_name: impl Into<String>, device: HwDeviceType) -> Self {
        Self {
            decoder_name: decoder_name.into(),
            backend: Backend::Hardware {
                device,
                pixel_format: device.pixel_format(),
            },
        }
    }

    #[must_use]
    pub fn software(decoder_name: impl Into<String>) -> Self {
        Self {
            decoder_name: decoder_name.into(),
            backend: Backend::Software,
        }
    }

    #[must_use]
    pub fn is_hardware(&self) -> bool {
        matches!(self.backend, Backend::Hardware { .. })
    }

    #[must_use]
    pub fn hardware_pixel_format(&self) -> Option<PixelFormat> {
        match self.backend {
            Backend::Hardware { pixel_format, .. } => Some(pixel_format),
            Backend::Software => None,
        }
    }

    #[must_use]
    pub fn hardware_device(&self) -> Option<HwDeviceType> {
        match self.backend {
            Backend::Hardware { device, .. } => Some(device),
            Backend::Software => None,
        }
    }
}

impl Display for DecoderChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.backend {
            Backend::Hardware {
                device,
                pixel_format,
            } => write!(
                f,
                "DecoderChoice(decoder={}, hardware={device}, pixel_format={pixel_format})",
                self.decoder_name
            ),
            Backend::Software => {
                write!(f, "DecoderChoice(decoder={}, software)", self.decoder_name)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct SelectorConfig {
    pub codec: Codec,
    pub device: HwDeviceType,
    /// Overrides the decoder name derived from `codec` and `device`.
    pub hw_decoder: Option<String>,
    pub software_only: bool,
    pub require_hardware: bool,
}

impl SelectorConfig {
    #[must_use]
    pub fn new(codec: Codec) -> Self {
        Self {
            codec,
            device: HwDeviceType::os_default(),
            hw_decoder: None,
            software_only: false,
            require_hardware: false,
        }
    }

    #[must_use]
    pub fn hardware_decoder_name(&self) -> String {
        self.hw_decoder
            .clone()
            .unwrap_or_else(|| self.codec.hardware_decoder_name(self.device))
    }
}

impl Display for SelectorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SelectorConfig(codec={}, device={}, hw_decoder={}, software_only={}, require_hardware={})",
            self.codec,
            self.device,
            self.hardware_decoder_name(),
            self.software_only,
            self.require_hardware
        )
    }
}

#[derive(Debug, Clone)]
pub struct DecodeConfig {
    pub input: PathBuf,
    pub output: PathBuf,
    pub selector: SelectorConfig,
}

impl DecodeConfig {
    #[must_use]
    pub fn new(input: impl Into<PathBuf>, output: impl Into<PathBuf>, codec: Codec) -> Self {
        Self {
            input: input.into(),
            output: output.into(),
            selector: SelectorConfig::new(codec),
        }
    }
}

impl Display for DecodeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DecodeConfig(input={}, output={}, {})",
            self.input.display(),
            self.output.display(),
            self.selector
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub codec_id: i32,
    pub codec_name: String,
    pub bit_rate: i64,
}

impl Display for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StreamInfo(index={}, {}x{}, codec={} ({}), bit_rate={})",
            self.index, self.width, self.height, self.codec_name, self.codec_id, self.bit_rate
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeSummary {
    pub packets: usize,
    pub decoded_frames: usize,
    pub hw_transfers: usize,
    pub bytes_written: u64,
    pub width: Option<usize>,
    pub height: Option<usize>,
    pub pixel_format: Option<PixelFormat>,
}

impl Display for DecodeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "DecodeSummary(packets={}, decoded_frames={}, hw_transfers={}, bytes_written={}, width={:?}, height={:?}, pixel_format={:?})",
            self.packets,
            self.decoded_frames,
            self.hw_transfers,
            self.bytes_written,
            self.width,
            self.height,
            self.pixel_format
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("no {0} decoder available")]
    NoDecoder(Codec),
    #[error("hardware device {device} unavailable (status {code})")]
    HardwareUnavailable { device: HwDeviceType, code: i32 },
    #[error("cannot open input file {}: {message}", .path.display())]
    OpenInput {
        path: PathBuf,
        code: i32,
        message: String,
    },
    #[error("no video stream found")]
    NoVideoStream,
    #[error("{context} failed (status {code}): {message}")]
    Backend {
        context: &'static str,
        code: i32,
        message: String,
    },
    #[error("failed to get HW surface format: {wanted} not offered by decoder (offered: {offered})")]
    FormatNegotiation { wanted: PixelFormat, offered: String },
    #[error("decode error (status {code}): {message}")]
    Decode { code: i32, message: String },
    #[error("error transferring the data to system memory (status {code})")]
    Transfer { code: i32 },
    #[error("unsupported pixel format for yuv420p output: {0}")]
    UnsupportedPixelFormat(PixelFormat),
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
}

impl BackendError {
    /// Negative process status for this failure.
    #[must_use]
    pub fn status_code(&self) -> i32 {
        let code = match self {
            Self::HardwareUnavailable { code, .. }
            | Self::OpenInput { code, .. }
            | Self::Backend { code, .. }
            | Self::Decode { code, .. }
            | Self::Transfer { code } => *code,
            Self::Io(err) => err.raw_os_error().map_or(-1, |errno| -errno),
            Self::NoDecoder(_)
            | Self::NoVideoStream
            | Self::FormatNegotiation { .. }
            | Self::UnsupportedPixelFormat(_)
            | Self::InvalidFrame(_) => -1,
        };
        if code < 0 { code } else { -1 }
    }
}

pub trait CompressedPacket {
    fn stream_index(&self) -> usize;

    fn size(&self) -> usize;
}

/// A decoded picture whose planes may or may not be host readable.
pub trait PlanarFrame {
    fn width(&self) -> usize;

    fn height(&self) -> usize;

    fn pixel_format(&self) -> PixelFormat;

    fn plane_count(&self) -> usize;

    fn plane(&self, index: usize) -> &[u8];

    fn stride(&self, index: usize) -> usize;
}

#[derive(Debug)]
pub enum Received<F> {
    Frame(F),
    NeedsInput,
    EndOfStream,
}

pub trait PacketSource {
    type Packet: CompressedPacket;

    fn video_stream(&self) -> &StreamInfo;

    /// Next packet in container order, `None` once the container is exhausted.
    fn read_packet(&mut self) -> Result<Option<Self::Packet>, BackendError>;
}

pub trait FrameDecoder<P> {
    type Frame: PlanarFrame;

    fn send_packet(&mut self, packet: &P) -> Result<(), BackendError>;

    fn send_eof(&mut self) -> Result<(), BackendError>;

    fn receive_frame(&mut self) -> Result<Received<Self::Frame>, BackendError>;

    fn transfer_to_host(&mut self, frame: &Self::Frame) -> Result<Self::Frame, BackendError>;
}

pub trait DecoderCatalog {
    /// Canonical name of the decoder registered under `name`, if any.
    fn find_decoder_by_name(&self, name: &str) -> Option<String>;

    /// Canonical name of the default decoder for `codec`, if any.
    fn find_decoder(&self, codec: Codec) -> Option<String>;

    fn probe_hw_device(&self, device: HwDeviceType) -> Result<(), BackendError>;

    fn hardware_decoders(&self) -> Vec<String>;
}

pub trait MediaBackend: DecoderCatalog {
    type Source: PacketSource;
    type Decoder: FrameDecoder<<Self::Source as PacketSource>::Packet>;

    fn open_input(&self, path: &Path) -> Result<Self::Source, BackendError>;

    fn open_decoder(
        &self,
        choice: &DecoderChoice,
        source: &Self::Source,
    ) -> Result<Self::Decoder, BackendError>;
}

/// Owned host-resident frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFrame {
    pub width: usize,
    pub height: usize,
    pub pixel_format: PixelFormat,
    pub planes: Vec<Vec<u8>>,
    pub strides: Vec<usize>,
}

impl HostFrame {
    /// YUV420P frame with every plane padded by `stride_padding` bytes per row.
    #[must_use]
    pub fn yuv420p_filled(width: usize, height: usize, stride_padding: usize, value: u8) -> Self {
        let chroma_width = width / 2;
        let chroma_height = height / 2;
        let luma_stride = width + stride_padding;
        let chroma_stride = chroma_width + stride_padding;
        Self {
            width,
            height,
            pixel_format: PixelFormat::Yuv420p,
            planes: vec![
                vec![value; luma_stride * height],
                vec![value; chroma_stride * chroma_height],
                vec![value; chroma_stride * chroma_height],
            ],
            strides: vec![luma_stride, chroma_stride, chroma_stride],
        }
    }
}

impl PlanarFrame for HostFrame {
    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    fn plane_count(&self) -> usize {
        self.planes.len()
    }

    fn plane(&self, index: usize) -> &[u8] {
        self.planes.get(index).map_or(&[], Vec::as_slice)
    }

    fn stride(&self, index: usize) -> usize {
        self.strides.get(index).copied().unwrap_or(0)
    }
}
