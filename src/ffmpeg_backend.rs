use std::ffi::{CStr, c_void};
use std::path::Path;
use std::ptr;

use ffmpeg_next as ffmpeg;
use ffmpeg::ffi::{AVBufferRef, AVCodecContext, AVHWDeviceType, AVPixelFormat};
use ffmpeg::util::frame::video::Video as VideoFrame;
use tracing::{debug, error};

use crate::{
    Backend, BackendError, Codec, CompressedPacket, DecoderCatalog, DecoderChoice, FrameDecoder,
    HwDeviceType, MediaBackend, PacketSource, PixelFormat, PlanarFrame, Received, StreamInfo,
    negotiate,
};

// AVERROR(ENOMEM)
const OUT_OF_MEMORY: i32 = -12;

/// `MediaBackend` over libavformat/libavcodec.
#[derive(Debug)]
pub struct FfmpegBackend {
    _initialized: (),
}

impl FfmpegBackend {
    pub fn new() -> Result<Self, BackendError> {
        ffmpeg::init().map_err(|err| library_error("ffmpeg init", err))?;
        unsafe {
            ffmpeg::ffi::av_log_set_level(ffmpeg::ffi::AV_LOG_ERROR as i32);
        }
        debug!("FFmpeg initialized");
        Ok(Self { _initialized: () })
    }
}

impl DecoderCatalog for FfmpegBackend {
    fn find_decoder_by_name(&self, name: &str) -> Option<String> {
        ffmpeg::codec::decoder::find_by_name(name).map(|codec| codec.name().to_string())
    }

    fn find_decoder(&self, codec: Codec) -> Option<String> {
        ffmpeg::codec::decoder::find(codec_id(codec)).map(|codec| codec.name().to_string())
    }

    fn probe_hw_device(&self, device: HwDeviceType) -> Result<(), BackendError> {
        HwDeviceContext::create(device).map(drop)
    }

    fn hardware_decoders(&self) -> Vec<String> {
        let mut names = Vec::new();
        let mut opaque: *mut c_void = ptr::null_mut();
        loop {
            let codec = unsafe { ffmpeg::ffi::av_codec_iterate(&mut opaque) };
            if codec.is_null() {
                break;
            }
            unsafe {
                let hardware =
                    (*codec).capabilities & ffmpeg::ffi::AV_CODEC_CAP_HARDWARE as i32 != 0;
                if ffmpeg::ffi::av_codec_is_decoder(codec) != 0 && hardware {
                    names.push(CStr::from_ptr((*codec).name).to_string_lossy().into_owned());
                }
            }
        }
        names
    }
}

impl MediaBackend for FfmpegBackend {
    type Source = FfmpegSource;
    type Decoder = FfmpegDecoder;

    fn open_input(&self, path: &Path) -> Result<FfmpegSource, BackendError> {
        FfmpegSource::open(path)
    }

    fn open_decoder(
        &self,
        choice: &DecoderChoice,
        source: &FfmpegSource,
    ) -> Result<FfmpegDecoder, BackendError> {
        FfmpegDecoder::open(choice, source)
    }
}

/// Reference to an `AVHWDeviceContext`. The codec context holds its own
/// reference, so the device lives until both are released.
struct HwDeviceContext {
    buffer: *mut AVBufferRef,
    device: HwDeviceType,
}

impl HwDeviceContext {
    fn create(device: HwDeviceType) -> Result<Self, BackendError> {
        let mut buffer = ptr::null_mut();
        let code = unsafe {
            ffmpeg::ffi::av_hwdevice_ctx_create(
                &mut buffer,
                device_type(device),
                ptr::null(),
                ptr::null_mut(),
                0,
            )
        };
        if code < 0 || buffer.is_null() {
            return Err(BackendError::HardwareUnavailable {
                device,
                code: code.min(-1),
            });
        }
        Ok(Self { buffer, device })
    }

    fn new_ref(&self) -> Result<*mut AVBufferRef, BackendError> {
        let reference = unsafe { ffmpeg::ffi::av_buffer_ref(self.buffer) };
        if reference.is_null() {
            return Err(BackendError::Backend {
                context: "av_buffer_ref",
                code: OUT_OF_MEMORY,
                message: format!("cannot reference {} device context", self.device),
            });
        }
        Ok(reference)
    }
}

impl Drop for HwDeviceContext {
    fn drop(&mut self) {
        unsafe { ffmpeg::ffi::av_buffer_unref(&mut self.buffer) };
        debug!("Released {} device context", self.device);
    }
}

pub struct FfmpegPacket(ffmpeg::Packet);

impl CompressedPacket for FfmpegPacket {
    fn stream_index(&self) -> usize {
        self.0.stream()
    }

    fn size(&self) -> usize {
        self.0.size()
    }
}

pub struct FfmpegSource {
    input: ffmpeg::format::context::Input,
    stream: StreamInfo,
}

impl FfmpegSource {
    fn open(path: &Path) -> Result<Self, BackendError> {
        let input = ffmpeg::format::input(&path).map_err(|err| BackendError::OpenInput {
            path: path.to_path_buf(),
            code: err.into(),
            message: err.to_string(),
        })?;
        let stream = first_video_stream(&input)?;
        Ok(Self { input, stream })
    }

    fn parameters(&self) -> Option<ffmpeg::codec::Parameters> {
        self.input
            .stream(self.stream.index)
            .map(|stream| stream.parameters())
    }
}

impl PacketSource for FfmpegSource {
    type Packet = FfmpegPacket;

    fn video_stream(&self) -> &StreamInfo {
        &self.stream
    }

    fn read_packet(&mut self) -> Result<Option<FfmpegPacket>, BackendError> {
        let mut packet = ffmpeg::Packet::empty();
        match packet.read(&mut self.input) {
            Ok(()) => Ok(Some(FfmpegPacket(packet))),
            Err(ffmpeg::Error::Eof) => Ok(None),
            Err(err) => Err(library_error("av_read_frame", err)),
        }
    }
}

fn first_video_stream(
    input: &ffmpeg::format::context::Input,
) -> Result<StreamInfo, BackendError> {
    let stream = input
        .streams()
        .find(|stream| stream.parameters().medium() == ffmpeg::media::Type::Video)
        .ok_or(BackendError::NoVideoStream)?;
    let parameters = stream.parameters();
    let (width, height, codec_id, bit_rate) = unsafe {
        let raw = parameters.as_ptr();
        ((*raw).width, (*raw).height, (*raw).codec_id as i32, (*raw).bit_rate)
    };
    Ok(StreamInfo {
        index: stream.index(),
        width: u32::try_from(width).unwrap_or(0),
        height: u32::try_from(height).unwrap_or(0),
        codec_id,
        codec_name: parameters.id().name().to_string(),
        bit_rate,
    })
}

pub struct FfmpegDecoder {
    // Dropped first: frees the codec context and its device reference.
    decoder: ffmpeg::decoder::Video,
    hw_device: Option<HwDeviceContext>,
}

impl FfmpegDecoder {
    fn open(choice: &DecoderChoice, source: &FfmpegSource) -> Result<Self, BackendError> {
        let codec = ffmpeg::codec::decoder::find_by_name(&choice.decoder_name).ok_or_else(|| {
            BackendError::Backend {
                context: "avcodec_find_decoder_by_name",
                code: -1,
                message: format!("decoder {} not found", choice.decoder_name),
            }
        })?;
        let parameters = source.parameters().ok_or(BackendError::NoVideoStream)?;

        let mut context = ffmpeg::codec::context::Context::new_with_codec(codec);
        context
            .set_parameters(parameters)
            .map_err(|err| library_error("avcodec_parameters_to_context", err))?;

        let hw_device = match choice.backend {
            Backend::Hardware {
                device,
                pixel_format,
            } => {
                let device_ctx = HwDeviceContext::create(device).inspect_err(|err| {
                    error!("Failed to create hardware device context: {err}");
                })?;
                let reference = device_ctx.new_ref()?;
                unsafe {
                    let raw = context.as_mut_ptr();
                    (*raw).hw_device_ctx = reference;
                    (*raw).opaque = pixel_format_to_raw(pixel_format) as isize as *mut c_void;
                    (*raw).get_format = Some(negotiate_hw_format);
                }
                Some(device_ctx)
            }
            Backend::Software => None,
        };

        let decoder = context
            .decoder()
            .open_as(codec)
            .and_then(|opened| opened.video())
            .map_err(|err| library_error("avcodec_open2", err))?;
        let decoder = Self { decoder, hw_device };
        debug!(
            "Opened decoder {} (hardware context: {})",
            choice.decoder_name,
            decoder.is_hardware()
        );
        Ok(decoder)
    }

    pub fn is_hardware(&self) -> bool {
        self.hw_device.is_some()
    }
}

impl FrameDecoder<FfmpegPacket> for FfmpegDecoder {
    type Frame = FfmpegFrame;

    fn send_packet(&mut self, packet: &FfmpegPacket) -> Result<(), BackendError> {
        self.decoder
            .send_packet(&packet.0)
            .map_err(|err| decode_error("Error during sending packet", err))
    }

    fn send_eof(&mut self) -> Result<(), BackendError> {
        match self.decoder.send_eof() {
            Ok(()) | Err(ffmpeg::Error::Eof) => Ok(()),
            Err(err) => Err(decode_error("Error during flushing", err)),
        }
    }

    fn receive_frame(&mut self) -> Result<Received<FfmpegFrame>, BackendError> {
        let mut frame = VideoFrame::empty();
        match self.decoder.receive_frame(&mut frame) {
            Ok(()) => Ok(Received::Frame(FfmpegFrame(frame))),
            Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                Ok(Received::NeedsInput)
            }
            Err(ffmpeg::Error::Eof) => Ok(Received::EndOfStream),
            Err(err) => Err(decode_error("Error while receiving frame", err)),
        }
    }

    fn transfer_to_host(&mut self, frame: &FfmpegFrame) -> Result<FfmpegFrame, BackendError> {
        let mut host = VideoFrame::empty();
        transfer_status(unsafe {
            ffmpeg::ffi::av_hwframe_transfer_data(host.as_mut_ptr(), frame.0.as_ptr(), 0)
        })?;
        transfer_status(unsafe {
            ffmpeg::ffi::av_frame_copy_props(host.as_mut_ptr(), frame.0.as_ptr())
        })?;
        Ok(FfmpegFrame(host))
    }
}

pub struct FfmpegFrame(VideoFrame);

impl PlanarFrame for FfmpegFrame {
    fn width(&self) -> usize {
        self.0.width() as usize
    }

    fn height(&self) -> usize {
        self.0.height() as usize
    }

    fn pixel_format(&self) -> PixelFormat {
        pixel_format_from_raw(unsafe { (*self.0.as_ptr()).format })
    }

    fn plane_count(&self) -> usize {
        if self.pixel_format().is_hardware() {
            0
        } else {
            self.0.planes()
        }
    }

    fn plane(&self, index: usize) -> &[u8] {
        if index < self.plane_count() {
            self.0.data(index)
        } else {
            &[]
        }
    }

    fn stride(&self, index: usize) -> usize {
        if index < self.plane_count() {
            self.0.stride(index)
        } else {
            0
        }
    }
}

/// `get_format` callback. The wanted hardware format travels in the codec
/// context's `opaque` slot, set when the decoder is opened.
unsafe extern "C" fn negotiate_hw_format(
    ctx: *mut AVCodecContext,
    formats: *const AVPixelFormat,
) -> AVPixelFormat {
    let desired = pixel_format_from_raw(unsafe { (*ctx).opaque } as isize as i32);

    let mut offered = Vec::new();
    let mut cursor = formats;
    unsafe {
        while *cursor != AVPixelFormat::AV_PIX_FMT_NONE {
            offered.push(*cursor);
            cursor = cursor.add(1);
        }
    }
    let candidates = offered
        .iter()
        .map(|format| pixel_format_from_raw(*format as i32))
        .collect::<Vec<_>>();

    match negotiate(&candidates, desired) {
        Ok(chosen) => offered
            .iter()
            .zip(&candidates)
            .find(|(_, candidate)| **candidate == chosen)
            .map_or(AVPixelFormat::AV_PIX_FMT_NONE, |(raw, _)| *raw),
        Err(err) => {
            error!("{err}");
            AVPixelFormat::AV_PIX_FMT_NONE
        }
    }
}

fn codec_id(codec: Codec) -> ffmpeg::codec::Id {
    match codec {
        Codec::H264 => ffmpeg::codec::Id::H264,
        Codec::Hevc => ffmpeg::codec::Id::HEVC,
    }
}

fn device_type(device: HwDeviceType) -> AVHWDeviceType {
    match device {
        HwDeviceType::VideoToolbox => AVHWDeviceType::AV_HWDEVICE_TYPE_VIDEOTOOLBOX,
        HwDeviceType::Cuda => AVHWDeviceType::AV_HWDEVICE_TYPE_CUDA,
        HwDeviceType::Vaapi => AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI,
        HwDeviceType::Qsv => AVHWDeviceType::AV_HWDEVICE_TYPE_QSV,
        HwDeviceType::D3d11va => AVHWDeviceType::AV_HWDEVICE_TYPE_D3D11VA,
        HwDeviceType::Dxva2 => AVHWDeviceType::AV_HWDEVICE_TYPE_DXVA2,
    }
}

const KNOWN_FORMATS: [(AVPixelFormat, PixelFormat); 9] = [
    (AVPixelFormat::AV_PIX_FMT_YUV420P, PixelFormat::Yuv420p),
    (AVPixelFormat::AV_PIX_FMT_YUVJ420P, PixelFormat::Yuvj420p),
    (AVPixelFormat::AV_PIX_FMT_NV12, PixelFormat::Nv12),
    (AVPixelFormat::AV_PIX_FMT_VIDEOTOOLBOX, PixelFormat::VideoToolbox),
    (AVPixelFormat::AV_PIX_FMT_CUDA, PixelFormat::Cuda),
    (AVPixelFormat::AV_PIX_FMT_VAAPI, PixelFormat::Vaapi),
    (AVPixelFormat::AV_PIX_FMT_QSV, PixelFormat::Qsv),
    (AVPixelFormat::AV_PIX_FMT_D3D11, PixelFormat::D3d11),
    (AVPixelFormat::AV_PIX_FMT_DXVA2_VLD, PixelFormat::Dxva2),
];

fn pixel_format_from_raw(raw: i32) -> PixelFormat {
    KNOWN_FORMATS
        .iter()
        .find(|(av, _)| *av as i32 == raw)
        .map_or(PixelFormat::Other(raw), |(_, format)| *format)
}

fn pixel_format_to_raw(format: PixelFormat) -> i32 {
    match format {
        PixelFormat::Other(raw) => raw,
        known => KNOWN_FORMATS
            .iter()
            .find(|(_, format)| *format == known)
            .map_or(AVPixelFormat::AV_PIX_FMT_NONE as i32, |(av, _)| *av as i32),
    }
}

fn transfer_status(code: i32) -> Result<(), BackendError> {
    if code < 0 {
        return Err(BackendError::Transfer { code });
    }
    Ok(())
}

fn library_error(context: &'static str, err: ffmpeg::Error) -> BackendError {
    BackendError::Backend {
        context,
        code: err.into(),
        message: err.to_string(),
    }
}

fn decode_error(context: &str, err: ffmpeg::Error) -> BackendError {
    BackendError::Decode {
        code: err.into(),
        message: format!("{context}: {err}"),
    }
}
