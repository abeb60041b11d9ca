//! Frame compositor: plans each output tick and combines decoded layers.
//!
//! Planning maps an output frame index to the layers active at its
//! timestamp and the source time each one should show. Composition itself
//! is behind [`FrameCompositor`] so a GPU implementation can replace the
//! software one.

use framecut_common::clock::{ms_to_us, FrameClock};
use framecut_common::FramecutResult;
use framecut_media::VideoFrame;
use framecut_timeline::{ItemId, LayerRect, Timeline};

/// One layer's placement in a planned frame.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerPlan {
    pub item: ItemId,
    /// Source position to decode to.
    pub source_time_ms: u64,
    pub rect: LayerRect,
    pub layer_index: i32,
}

/// A single output frame's composition instructions.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameComposition {
    pub frame_index: u64,
    pub timestamp_ms: u64,
    pub pts_us: i64,
    /// Active layers, lowest `layer_index` first.
    pub layers: Vec<LayerPlan>,
}

/// Plan output frame `frame_index`.
pub fn plan_frame(timeline: &Timeline, clock: &FrameClock, frame_index: u64) -> FrameComposition {
    let timestamp_ms = clock.tick_time_ms(frame_index);
    let layers = timeline
        .video_layers_at(timestamp_ms)
        .into_iter()
        .map(|layer| LayerPlan {
            item: layer.id,
            source_time_ms: layer.interval.source_time_ms(timestamp_ms),
            rect: layer.rect,
            layer_index: layer.layer_index,
        })
        .collect();

    FrameComposition {
        frame_index,
        timestamp_ms,
        pts_us: clock.tick_time_us(frame_index),
        layers,
    }
}

/// What a layer draws.
#[derive(Debug, Clone, Copy)]
pub enum LayerContent<'a> {
    Frame(&'a VideoFrame),
    /// Generated content: a flat RGBA fill.
    Solid([u8; 4]),
}

#[derive(Debug, Clone, Copy)]
pub struct CompositeLayer<'a> {
    pub content: LayerContent<'a>,
    pub rect: LayerRect,
}

/// Combines ordered layers into one output frame.
pub trait FrameCompositor: Send {
    /// Draw `layers` in order, first at the bottom.
    fn composite(
        &mut self,
        layers: &[CompositeLayer<'_>],
        timestamp_ms: u64,
    ) -> FramecutResult<VideoFrame>;

    /// Compositor name.
    fn name(&self) -> &str;
}

/// CPU compositor with nearest-neighbour scaling and source-over alpha.
pub struct SoftwareCompositor {
    width: u32,
    height: u32,
    background: [u8; 4],
}

impl SoftwareCompositor {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            background: [0, 0, 0, 255],
        }
    }

    pub fn with_background(mut self, rgba: [u8; 4]) -> Self {
        self.background = rgba;
        self
    }

    fn blend(dst: &mut [u8], src: [u8; 4]) {
        let alpha = src[3] as u32;
        if alpha == 255 {
            dst.copy_from_slice(&src);
            return;
        }
        for c in 0..3 {
            dst[c] = ((src[c] as u32 * alpha + dst[c] as u32 * (255 - alpha)) / 255) as u8;
        }
        dst[3] = dst[3].max(src[3]);
    }

    fn draw(&self, canvas: &mut VideoFrame, layer: &CompositeLayer<'_>) {
        let rect = layer.rect;
        if rect.width == 0 || rect.height == 0 {
            return;
        }

        let x0 = rect.x.max(0) as u32;
        let y0 = rect.y.max(0) as u32;
        let x1 = (rect.x as i64 + rect.width as i64).clamp(0, self.width as i64) as u32;
        let y1 = (rect.y as i64 + rect.height as i64).clamp(0, self.height as i64) as u32;

        for y in y0..y1 {
            let ry = (y as i64 - rect.y as i64) as u64;
            for x in x0..x1 {
                let rx = (x as i64 - rect.x as i64) as u64;
                let src = match layer.content {
                    LayerContent::Solid(rgba) => rgba,
                    LayerContent::Frame(frame) => {
                        let sx = (rx * frame.width as u64 / rect.width as u64) as u32;
                        let sy = (ry * frame.height as u64 / rect.height as u64) as u32;
                        frame.pixel(sx, sy)
                    }
                };
                let offset = (y as usize * self.width as usize + x as usize) * 4;
                Self::blend(&mut canvas.data[offset..offset + 4], src);
            }
        }
    }
}

impl FrameCompositor for SoftwareCompositor {
    fn composite(
        &mut self,
        layers: &[CompositeLayer<'_>],
        timestamp_ms: u64,
    ) -> FramecutResult<VideoFrame> {
        let mut canvas =
            VideoFrame::filled(self.width, self.height, self.background, ms_to_us(timestamp_ms));
        for layer in layers {
            self.draw(&mut canvas, layer);
        }
        Ok(canvas)
    }

    fn name(&self) -> &str {
        "software"
    }
}
