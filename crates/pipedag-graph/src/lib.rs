pub mod geometry;
pub mod layout;
pub mod registry;
pub mod validation;
pub mod viewport;

pub use geometry::{
    node_center, origin_transform_scaling, scale_corrected_position, scale_corrected_vec,
    scaled_position, scaled_vec,
};
pub use layout::{AutoLayouter, LayoutConfig, Layouter};
pub use registry::{CubicBezier, HitResult, StepHandle, StepRegistry};
pub use validation::{
    PipelineValidation, find_cycle, incoming_errors, validate_pipeline, validate_steps,
};
pub use viewport::{Viewport, WheelDeltaMode};
