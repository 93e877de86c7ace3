use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use tracing::debug;

use crate::{BackendError, PixelFormat, PlanarFrame};

/// Appends frames to a sink as headerless planar YUV 4:2:0.
///
/// Luma contributes `width * height` bytes per frame and each chroma plane
/// `(width / 2) * (height / 2)`; stride padding is never written.
#[derive(Debug)]
pub struct FrameWriter<W: Write> {
    sink: W,
    frames_written: usize,
    bytes_written: u64,
    chroma_scratch: Vec<u8>,
}

impl FrameWriter<BufWriter<File>> {
    pub fn create(path: &Path) -> Result<Self, BackendError> {
        let file = File::create(path)?;
        debug!("Opened output file {}", path.display());
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> FrameWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            frames_written: 0,
            bytes_written: 0,
            chroma_scratch: Vec::new(),
        }
    }

    pub fn frames_written(&self) -> usize {
        self.frames_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Writes one host-resident frame and returns the number of bytes it took.
    pub fn write_frame<F>(&mut self, frame: &F) -> Result<u64, BackendError>
    where
        F: PlanarFrame + ?Sized,
    {
        let format = frame.pixel_format();
        if format.is_hardware() {
            return Err(BackendError::InvalidFrame(format!(
                "{format} frame is still in device memory"
            )));
        }

        let interleaved = format == PixelFormat::Nv12;
        let required_planes = if interleaved { 2 } else { 3 };
        if !format.is_writable_yuv420() || frame.plane_count() < required_planes {
            return Err(BackendError::UnsupportedPixelFormat(format));
        }

        let width = frame.width();
        let height = frame.height();
        let mut written = self.write_plane(frame, 0, width, height)?;
        if interleaved {
            written += self.write_interleaved_chroma(frame, width / 2, height / 2)?;
        } else {
            written += self.write_plane(frame, 1, width / 2, height / 2)?;
            written += self.write_plane(frame, 2, width / 2, height / 2)?;
        }

        self.frames_written += 1;
        self.bytes_written += written;
        Ok(written)
    }

    /// Flushes buffered data and hands back the sink.
    pub fn finish(mut self) -> Result<W, BackendError> {
        self.sink.flush()?;
        Ok(self.sink)
    }

    fn write_plane<F>(
        &mut self,
        frame: &F,
        index: usize,
        row_bytes: usize,
        rows: usize,
    ) -> Result<u64, BackendError>
    where
        F: PlanarFrame + ?Sized,
    {
        for row in 0..rows {
            let line = plane_row(frame, index, row, row_bytes)?;
            self.sink.write_all(line)?;
        }
        Ok((row_bytes * rows) as u64)
    }

    // NV12 keeps U and V interleaved in plane 1; split it so the output stays planar.
    fn write_interleaved_chroma<F>(
        &mut self,
        frame: &F,
        chroma_width: usize,
        chroma_height: usize,
    ) -> Result<u64, BackendError>
    where
        F: PlanarFrame + ?Sized,
    {
        let plane_size = chroma_width * chroma_height;
        self.chroma_scratch.clear();
        self.chroma_scratch.resize(plane_size * 2, 0);
        let (u_plane, v_plane) = self.chroma_scratch.split_at_mut(plane_size);

        for row in 0..chroma_height {
            let line = plane_row(frame, 1, row, chroma_width * 2)?;
            let out = row * chroma_width;
            for (col, pair) in line.chunks_exact(2).enumerate() {
                u_plane[out + col] = pair[0];
                v_plane[out + col] = pair[1];
            }
        }

        self.sink.write_all(&self.chroma_scratch)?;
        Ok((plane_size * 2) as u64)
    }
}

fn plane_row<F>(
    frame: &F,
    index: usize,
    row: usize,
    row_bytes: usize,
) -> Result<&[u8], BackendError>
where
    F: PlanarFrame + ?Sized,
{
    let start = row * frame.stride(index);
    frame
        .plane(index)
        .get(start..start + row_bytes)
        .ok_or_else(|| {
            BackendError::InvalidFrame(format!(
                "plane {index} too short for row {row} ({row_bytes} bytes at offset {start})"
            ))
        })
}
