use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AnnotateSettings {
    /// Maximum undo entries; `0` keeps everything.
    #[serde(default = "default_undo_capacity")]
    pub undo_capacity: usize,
    #[serde(default = "default_drag_append_min_distance_px")]
    pub drag_append_min_distance_px: f32,
    #[serde(default = "default_nudge_step_pixels")]
    pub nudge_step_pixels: f32,
    #[serde(default = "default_nudge_shift_multiplier")]
    pub nudge_shift_multiplier: f32,
    /// Media, histology and chart step as a fraction of the content's larger side.
    #[serde(default = "default_content_nudge_fraction")]
    pub content_nudge_fraction: f32,
    #[serde(default = "default_stereotaxic_nudge_mm")]
    pub stereotaxic_nudge_mm: f32,
    /// Near-to-far distance of a new polyhedron.
    #[serde(default = "default_polyhedron_depth_mm")]
    pub polyhedron_depth_mm: f32,
    #[serde(default = "default_box_size_percent")]
    pub default_box_size_percent: f32,
    #[serde(default)]
    pub debug_logging: bool,
}

fn default_undo_capacity() -> usize {
    200
}

fn default_drag_append_min_distance_px() -> f32 {
    3.0
}

fn default_nudge_step_pixels() -> f32 {
    1.0
}

fn default_nudge_shift_multiplier() -> f32 {
    10.0
}

fn default_content_nudge_fraction() -> f32 {
    0.001
}

fn default_stereotaxic_nudge_mm() -> f32 {
    1.0
}

fn default_polyhedron_depth_mm() -> f32 {
    3.0
}

fn default_box_size_percent() -> f32 {
    10.0
}

impl Default for AnnotateSettings {
    fn default() -> Self {
        Self {
            undo_capacity: default_undo_capacity(),
            drag_append_min_distance_px: default_drag_append_min_distance_px(),
            nudge_step_pixels: default_nudge_step_pixels(),
            nudge_shift_multiplier: default_nudge_shift_multiplier(),
            content_nudge_fraction: default_content_nudge_fraction(),
            stereotaxic_nudge_mm: default_stereotaxic_nudge_mm(),
            polyhedron_depth_mm: default_polyhedron_depth_mm(),
            default_box_size_percent: default_box_size_percent(),
            debug_logging: false,
        }
    }
}

impl AnnotateSettings {
    /// Replaces non-finite or non-positive values with their defaults.
    /// Returns `true` when anything changed.
    pub fn sanitize(&mut self) -> bool {
        let defaults = Self::default();
        let mut changed = false;
        for (value, fallback) in [
            (
                &mut self.drag_append_min_distance_px,
                defaults.drag_append_min_distance_px,
            ),
            (&mut self.nudge_step_pixels, defaults.nudge_step_pixels),
            (&mut self.nudge_shift_multiplier, defaults.nudge_shift_multiplier),
            (&mut self.content_nudge_fraction, defaults.content_nudge_fraction),
            (&mut self.stereotaxic_nudge_mm, defaults.stereotaxic_nudge_mm),
            (&mut self.polyhedron_depth_mm, defaults.polyhedron_depth_mm),
        ] {
            if !value.is_finite() || *value <= 0.0 {
                *value = fallback;
                changed = true;
            }
        }
        let clamped = if self.default_box_size_percent.is_finite() {
            self.default_box_size_percent.clamp(1.0, 100.0)
        } else {
            defaults.default_box_size_percent
        };
        if clamped != self.default_box_size_percent {
            self.default_box_size_percent = clamped;
            changed = true;
        }
        changed
    }

    pub fn drag_append_min_distance_sq(&self) -> f32 {
        self.drag_append_min_distance_px * self.drag_append_min_distance_px
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let parsed: AnnotateSettings =
            serde_json::from_str(r#"{"undo_capacity": 5, "unknown": true}"#).expect("parse");
        assert_eq!(parsed.undo_capacity, 5);
        assert_eq!(parsed.polyhedron_depth_mm, 3.0);
        assert_eq!(parsed.nudge_shift_multiplier, 10.0);
        assert!(!parsed.debug_logging);
    }

    #[test]
    fn sanitize_repairs_bad_values() {
        let mut settings = AnnotateSettings {
            nudge_step_pixels: -2.0,
            polyhedron_depth_mm: f32::NAN,
            default_box_size_percent: 400.0,
            ..AnnotateSettings::default()
        };
        assert!(settings.sanitize());
        assert_eq!(settings.nudge_step_pixels, 1.0);
        assert_eq!(settings.polyhedron_depth_mm, 3.0);
        assert_eq!(settings.default_box_size_percent, 100.0);
        assert!(!settings.sanitize());
    }
}
