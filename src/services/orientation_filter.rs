// Orientation Filter Builder
// Maps source/destination orientation to a crop/scale video filter

use crate::models::Orientation;

/// Aspect ratios within this distance of 1.0 count as square
const SQUARE_TOLERANCE: f64 = 0.05;

/// Filter and output size needed to convert between orientations
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterSpec {
    /// FFmpeg video filter expression, `None` for identity
    pub filter: Option<String>,
    /// Output dimensions after the filter, `None` when unchanged
    pub dimensions: Option<(u32, u32)>,
}

impl FilterSpec {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn is_identity(&self) -> bool {
        self.filter.is_none()
    }
}

/// Classify source dimensions
pub fn detect_orientation(width: u32, height: u32) -> Orientation {
    if width == 0 || height == 0 {
        return Orientation::Horizontal;
    }
    let aspect = width as f64 / height as f64;
    if (aspect - 1.0).abs() < SQUARE_TOLERANCE {
        Orientation::Square
    } else if aspect < 1.0 {
        Orientation::Vertical
    } else {
        Orientation::Horizontal
    }
}

/// Default target size for an orientation
pub fn default_dimensions(orientation: Orientation) -> (u32, u32) {
    match orientation {
        Orientation::Horizontal => (1920, 1080),
        Orientation::Vertical => (1080, 1920),
        Orientation::Square => (1080, 1080),
    }
}

/// Filter for converting `source` to `dest` at the default target size
pub fn build_filter(source: Orientation, dest: Orientation) -> FilterSpec {
    let (width, height) = default_dimensions(dest);
    build_filter_sized(source, dest, width, height)
}

/// Filter for converting `source` to `dest` at an explicit target size
///
/// Zero dimensions fall back to the orientation's default size.
pub fn build_filter_sized(source: Orientation, dest: Orientation, width: u32, height: u32) -> FilterSpec {
    if source == dest {
        return FilterSpec::identity();
    }

    let (width, height) = if width == 0 || height == 0 {
        default_dimensions(dest)
    } else {
        (width, height)
    };

    let filter = match (source, dest) {
        // Center crop to 9:16, then scale
        (Orientation::Horizontal, Orientation::Vertical) => {
            format!("crop=ih*9/16:ih,scale={width}:{height}")
        }
        // Center crop to 16:9, then scale
        (Orientation::Vertical, Orientation::Horizontal) => {
            format!("crop=iw:iw*9/16,scale={width}:{height}")
        }
        (Orientation::Square, _) => format!("scale={width}:{height},setsar=1"),
        (Orientation::Horizontal, Orientation::Square) => {
            format!("crop=ih:ih,scale={width}:{height},setsar=1")
        }
        (Orientation::Vertical, Orientation::Square) => {
            format!("crop=iw:iw,scale={width}:{height},setsar=1")
        }
        _ => return FilterSpec::identity(),
    };

    FilterSpec {
        filter: Some(filter),
        dimensions: Some((width, height)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_orientation() {
        assert_eq!(detect_orientation(1920, 1080), Orientation::Horizontal);
        assert_eq!(detect_orientation(1080, 1920), Orientation::Vertical);
        assert_eq!(detect_orientation(1080, 1080), Orientation::Square);
        assert_eq!(detect_orientation(1040, 1080), Orientation::Square);
        assert_eq!(detect_orientation(0, 0), Orientation::Horizontal);
    }

    #[test]
    fn test_policy_table() {
        let spec = build_filter(Orientation::Horizontal, Orientation::Vertical);
        assert_eq!(spec.filter.as_deref(), Some("crop=ih*9/16:ih,scale=1080:1920"));
        assert_eq!(spec.dimensions, Some((1080, 1920)));

        let spec = build_filter(Orientation::Vertical, Orientation::Horizontal);
        assert_eq!(spec.filter.as_deref(), Some("crop=iw:iw*9/16,scale=1920:1080"));
        assert_eq!(spec.dimensions, Some((1920, 1080)));

        let spec = build_filter(Orientation::Square, Orientation::Horizontal);
        assert_eq!(spec.filter.as_deref(), Some("scale=1920:1080,setsar=1"));

        let spec = build_filter(Orientation::Square, Orientation::Vertical);
        assert_eq!(spec.filter.as_deref(), Some("scale=1080:1920,setsar=1"));

        let spec = build_filter(Orientation::Horizontal, Orientation::Square);
        assert_eq!(spec.filter.as_deref(), Some("crop=ih:ih,scale=1080:1080,setsar=1"));
    }

    #[test]
    fn test_same_orientation_is_identity() {
        for orientation in [Orientation::Horizontal, Orientation::Vertical, Orientation::Square] {
            let spec = build_filter(orientation, orientation);
            assert!(spec.is_identity());
            assert_eq!(spec.dimensions, None);
        }
    }

    #[test]
    fn test_sized_filter_uses_destination_size() {
        let spec = build_filter_sized(Orientation::Horizontal, Orientation::Vertical, 720, 1280);
        assert_eq!(spec.filter.as_deref(), Some("crop=ih*9/16:ih,scale=720:1280"));
        assert_eq!(spec.dimensions, Some((720, 1280)));

        let spec = build_filter_sized(Orientation::Horizontal, Orientation::Vertical, 0, 0);
        assert_eq!(spec.dimensions, Some((1080, 1920)));
    }
}
