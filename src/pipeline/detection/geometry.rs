//! Normalized image coordinates ↔ on-screen coordinates.
//!
//! Two fit policies:
//! - **Contain** (letterbox): `scale = min(cw/iw, ch/ih)`, image centered,
//!   padding offsets added.
//! - **Cover** (fill + crop): `scale = max(cw/iw, ch/ih)`, image centered,
//!   overflow offsets subtracted.
//!
//! Degenerate sizes yield the identity transform instead of dividing by zero.

use serde::{Deserialize, Serialize};

use super::types::{Detections, NormalizedBoundingBox, Point};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FitPolicy {
    Contain,
    Cover,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    fn is_degenerate(&self) -> bool {
        !(self.width.is_finite() && self.height.is_finite()) || self.width <= 0.0 || self.height <= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenPoint {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScreenRect {
    pub left: f32,
    pub top: f32,
    pub width: f32,
    pub height: f32,
}

/// Placement of a scaled image inside a container.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitTransform {
    pub policy: FitPolicy,
    pub scaled_width: f32,
    pub scaled_height: f32,
    /// Letterbox padding for Contain, crop overflow for Cover. Never negative.
    pub offset_x: f32,
    pub offset_y: f32,
    identity: bool,
}

impl FitTransform {
    /// `None` when either size is zero, negative or non-finite.
    pub fn try_new(image: Size, container: Size, policy: FitPolicy) -> Option<Self> {
        if image.is_degenerate() || container.is_degenerate() {
            return None;
        }

        let sx = container.width / image.width;
        let sy = container.height / image.height;
        let scale = match policy {
            FitPolicy::Contain => sx.min(sy),
            FitPolicy::Cover => sx.max(sy),
        };
        let scaled_width = image.width * scale;
        let scaled_height = image.height * scale;

        let (offset_x, offset_y) = match policy {
            FitPolicy::Contain => (
                (container.width - scaled_width) / 2.0,
                (container.height - scaled_height) / 2.0,
            ),
            FitPolicy::Cover => (
                (scaled_width - container.width) / 2.0,
                (scaled_height - container.height) / 2.0,
            ),
        };

        Some(Self {
            policy,
            scaled_width,
            scaled_height,
            offset_x: offset_x.max(0.0),
            offset_y: offset_y.max(0.0),
            identity: false,
        })
    }

    /// Like `try_new`, but degenerate input gives the identity transform.
    pub fn new(image: Size, container: Size, policy: FitPolicy) -> Self {
        Self::try_new(image, container, policy).unwrap_or_else(|| {
            tracing::debug!(?image, ?container, ?policy, "Degenerate fit geometry, using identity");
            Self::identity(policy)
        })
    }

    /// Maps normalized coordinates onto themselves.
    pub fn identity(policy: FitPolicy) -> Self {
        Self {
            policy,
            scaled_width: 1.0,
            scaled_height: 1.0,
            offset_x: 0.0,
            offset_y: 0.0,
            identity: true,
        }
    }

    pub fn is_identity(&self) -> bool {
        self.identity
    }

    /// Screen position of the normalized origin.
    fn origin(&self) -> (f32, f32) {
        match self.policy {
            FitPolicy::Contain => (self.offset_x, self.offset_y),
            FitPolicy::Cover => (-self.offset_x, -self.offset_y),
        }
    }

    pub fn point_to_screen(&self, p: Point) -> ScreenPoint {
        let (ox, oy) = self.origin();
        ScreenPoint {
            x: ox + p.x * self.scaled_width,
            y: oy + p.y * self.scaled_height,
        }
    }

    pub fn box_to_screen(&self, b: &NormalizedBoundingBox) -> ScreenRect {
        let top_left = self.point_to_screen(Point::new(b.left, b.top));
        ScreenRect {
            left: top_left.x,
            top: top_left.y,
            width: b.width() * self.scaled_width,
            height: b.height() * self.scaled_height,
        }
    }

    /// Inverse of `point_to_screen`. Not clamped: screen points outside the
    /// image map outside [0, 1].
    pub fn screen_to_point(&self, s: ScreenPoint) -> Point {
        let (ox, oy) = self.origin();
        Point::new((s.x - ox) / self.scaled_width, (s.y - oy) / self.scaled_height)
    }

    /// Inverse of `box_to_screen`.
    pub fn screen_to_box(&self, r: &ScreenRect) -> NormalizedBoundingBox {
        let tl = self.screen_to_point(ScreenPoint { x: r.left, y: r.top });
        let br = self.screen_to_point(ScreenPoint {
            x: r.left + r.width,
            y: r.top + r.height,
        });
        NormalizedBoundingBox::new(tl.x, tl.y, br.x, br.y)
    }
}

// ──────────────────────────────────────────────
// Overlays
// ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum OverlayShape {
    Rect(ScreenRect),
    Marker(ScreenPoint),
}

/// One labelled shape to draw over the image.
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    pub label: String,
    pub shape: OverlayShape,
}

/// Screen-space overlays for every detection in a report.
pub fn map_overlays(detections: &Detections, transform: &FitTransform) -> Vec<Overlay> {
    match detections {
        Detections::Boxes(found) => found
            .iter()
            .map(|d| Overlay {
                label: d.name.clone(),
                shape: OverlayShape::Rect(transform.box_to_screen(&d.bounding_box)),
            })
            .collect(),
        Detections::Points(found) => found
            .iter()
            .map(|d| Overlay {
                label: d.name.clone(),
                shape: OverlayShape::Marker(transform.point_to_screen(d.point)),
            })
            .collect(),
    }
}
