use crate::geometry::{origin_transform_scaling, scale_corrected_vec, scaled_vec};
use pipedag_core::{Rect, Vec2, clamp_scale};
use serde::{Deserialize, Serialize};

/// Unit of a wheel event's `delta_y`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum WheelDeltaMode {
    #[default]
    Pixel,
    Line,
    Page,
}

impl WheelDeltaMode {
    /// Converts a raw delta to pixels.
    pub fn normalize(self, delta_y: f64, line_height: f64) -> f64 {
        match self {
            Self::Pixel => delta_y,
            Self::Line | Self::Page => delta_y * line_height,
        }
    }
}

/// Pan/zoom transform of the canvas.
///
/// A canvas point `p` is drawn at client position
/// `offset + translation + origin * (1 - scale) + p * scale`, where `origin`
/// is the transform origin in canvas units and `translation` accumulates the
/// compensation applied whenever the origin moves. The scale itself lives in
/// the editor store and is passed in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub origin: Vec2,
    pub offset: Vec2,
    pub translation: Vec2,
}

impl Viewport {
    pub fn new(initial_offset: Vec2) -> Self {
        Self {
            origin: Vec2::ZERO,
            offset: initial_offset,
            translation: Vec2::ZERO,
        }
    }

    /// Client position of the canvas origin (0, 0).
    pub fn holder_position(&self, scale: f64) -> Vec2 {
        self.offset + self.translation + self.origin * (1.0 - scale)
    }

    /// Client-space box of the transformed canvas holder.
    pub fn holder_bounds(&self, scale: f64, canvas_size: Vec2) -> Rect {
        Rect::from_pos_size(self.holder_position(scale), scaled_vec(canvas_size, scale))
    }

    pub fn client_to_canvas(&self, client: Vec2, scale: f64) -> Vec2 {
        scale_corrected_vec(client - self.holder_position(scale), scale)
    }

    pub fn canvas_to_client(&self, canvas: Vec2, scale: f64) -> Vec2 {
        self.holder_position(scale) + scaled_vec(canvas, scale)
    }

    pub fn canvas_rect_to_client(&self, rect: Rect, scale: f64) -> Rect {
        Rect::from_min_max(
            self.canvas_to_client(rect.min, scale),
            self.canvas_to_client(rect.max, scale),
        )
    }

    /// Moves the transform origin without visually moving the canvas.
    pub fn set_origin(&mut self, origin: Vec2, scale: f64) {
        self.translation += origin_transform_scaling(origin, scale)
            - origin_transform_scaling(self.origin, scale);
        self.origin = origin;
    }

    pub fn pan_by(&mut self, client_delta: Vec2) {
        self.offset += client_delta;
    }

    pub fn reset(&mut self, initial_offset: Vec2) {
        *self = Self::new(initial_offset);
    }

    /// Pivots the zoom around `client` and returns the clamped new scale.
    ///
    /// After this call the canvas point under `client` stays under it for any
    /// scale.
    pub fn zoom_about(&mut self, client: Vec2, scale: f64, new_scale: f64) -> f64 {
        let pivot = self.client_to_canvas(client, scale);
        if pivot != self.origin {
            self.set_origin(pivot, scale);
        }
        clamp_scale(new_scale)
    }

    /// Scale after a wheel event, `scale - delta / divisor`, clamped.
    pub fn wheel_scale(
        scale: f64,
        delta_y: f64,
        mode: WheelDeltaMode,
        line_height: f64,
        divisor: f64,
    ) -> f64 {
        clamp_scale(scale - mode.normalize(delta_y, line_height) / divisor)
    }
}

impl Default for Viewport {
    fn default() -> Self {
        Self::new(Vec2::ZERO)
    }
}
