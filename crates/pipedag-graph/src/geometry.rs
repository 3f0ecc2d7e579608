//! Conversions between client (screen) space and canvas space.
//!
//! The canvas is rendered under a uniform scale transform, so one canvas unit
//! covers `scale_factor` client pixels.

use pipedag_core::{Rect, Vec2};

/// Canvas-space length of a client-space length.
pub fn scale_corrected_position(client: f64, scale_factor: f64) -> f64 {
    client / scale_factor
}

/// Inverse of [`scale_corrected_position`].
pub fn scaled_position(canvas: f64, scale_factor: f64) -> f64 {
    canvas * scale_factor
}

pub fn scale_corrected_vec(client: Vec2, scale_factor: f64) -> Vec2 {
    Vec2::new(
        scale_corrected_position(client.x, scale_factor),
        scale_corrected_position(client.y, scale_factor),
    )
}

pub fn scaled_vec(canvas: Vec2, scale_factor: f64) -> Vec2 {
    Vec2::new(
        scaled_position(canvas.x, scale_factor),
        scaled_position(canvas.y, scale_factor),
    )
}

/// Center of a rendered step in canvas coordinates.
///
/// `node_bounds` and `container_bounds` are client-space boxes as reported by
/// the renderer; the container is the transformed element holding the steps.
pub fn node_center(node_bounds: Rect, container_bounds: Rect, scale_factor: f64) -> Vec2 {
    let top_left = scale_corrected_vec(node_bounds.min - container_bounds.min, scale_factor);
    let half_size = scale_corrected_vec(node_bounds.size(), scale_factor) / 2.0;
    top_left + half_size
}

/// Translation that compensates a transform-origin move at `scale_factor`.
///
/// Moving the origin from `a` to `b` shifts the rendered canvas by
/// `(b - a) * (1 - scale)`; adding the difference of these values to the pan
/// translation cancels that shift.
pub fn origin_transform_scaling(origin: Vec2, scale_factor: f64) -> Vec2 {
    origin * (scale_factor - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_corrected_position_divides_by_scale() {
        assert_eq!(scale_corrected_position(100.0, 2.0), 50.0);
        assert_eq!(scale_corrected_position(100.0, 0.5), 200.0);
        assert_eq!(scale_corrected_position(-30.0, 1.0), -30.0);
    }

    #[test]
    fn test_node_center_at_unit_scale() {
        let container = Rect::from_pos_size(Vec2::new(40.0, 60.0), Vec2::new(1000.0, 1000.0));
        let node = Rect::from_pos_size(Vec2::new(140.0, 160.0), Vec2::new(190.0, 105.0));
        assert_eq!(node_center(node, container, 1.0), Vec2::new(195.0, 152.5));
    }

    #[test]
    fn test_node_center_inverse_scales() {
        // A 190x105 step at canvas (100, 100) rendered at half size.
        let container = Rect::from_pos_size(Vec2::new(10.0, 10.0), Vec2::new(500.0, 500.0));
        let node = Rect::from_pos_size(Vec2::new(60.0, 60.0), Vec2::new(95.0, 52.5));
        assert_eq!(node_center(node, container, 0.5), Vec2::new(195.0, 152.5));
    }

    #[test]
    fn test_origin_transform_scaling_vanishes_at_unit_scale() {
        let origin = Vec2::new(300.0, 200.0);
        assert_eq!(origin_transform_scaling(origin, 1.0), Vec2::ZERO);
        assert_eq!(origin_transform_scaling(origin, 2.0), origin);
        assert_eq!(
            origin_transform_scaling(origin, 0.5),
            Vec2::new(-150.0, -100.0)
        );
    }
}
