use crate::consts::{
    DEFAULT_BACKGROUND_COLOR, DEFAULT_BRIGHTNESS, DEFAULT_FONT_SIZE, DEFAULT_LINE_SPACING, DEFAULT_PADDING_HORIZONTAL,
    DEFAULT_PADDING_VERTICAL, DEFAULT_TEXT_COLOR,
};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Visual page-turn strategy selected by the reader.
///
/// The renderer owns the animation; the engine only cares whether the mode
/// scrolls vertically, since that changes how the page area is measured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(rename_all = "snake_case"))]
pub enum FlipEffect {
    #[default]
    Slide,
    Cover,
    Simulation,
    None,
    Vertical,
}
impl FlipEffect {
    pub fn is_vertical(&self) -> bool {
        matches!(self, Self::Vertical)
    }
}

/// Display settings chosen by the reader.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize), serde(default))]
pub struct ReaderSettings {
    /// Font size in scale-independent pixels.
    pub font_size: u16,
    /// Line height as a multiple of the font size.
    pub line_spacing: f32,
    /// Horizontal page padding in density-independent pixels (each side).
    pub padding_horizontal: f32,
    /// Vertical page padding in density-independent pixels (each side).
    pub padding_vertical: f32,
    /// Screen brightness, `0.0..=1.0`.
    pub brightness: f32,
    /// ARGB background colour.
    pub background_color: u32,
    /// ARGB text colour.
    pub text_color: u32,
    pub flip_effect: FlipEffect,
}
impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            line_spacing: DEFAULT_LINE_SPACING,
            padding_horizontal: DEFAULT_PADDING_HORIZONTAL,
            padding_vertical: DEFAULT_PADDING_VERTICAL,
            brightness: DEFAULT_BRIGHTNESS,
            background_color: DEFAULT_BACKGROUND_COLOR,
            text_color: DEFAULT_TEXT_COLOR,
            flip_effect: FlipEffect::default(),
        }
    }
}

/// Size of the page area in physical pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContainerSize {
    pub width: u32,
    pub height: u32,
}
impl ContainerSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// A container is only usable once it has been measured with a non-zero
    /// area. Before that, pagination is "not ready" rather than failed.
    pub fn is_valid(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Stable string form, used to key persisted page-count indexes.
    pub fn key(&self) -> String {
        self.to_string()
    }
}
impl Display for ContainerSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// The inputs that decide whether an existing pagination is still valid.
///
/// Page data and page-count indexes are only ever trusted for the exact key
/// they were built with; any mismatch means recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutKey {
    pub font_size: u16,
    pub container: ContainerSize,
}

/// Everything the page splitter needs to measure a page.
#[derive(Debug, Clone, PartialEq)]
pub struct Layout {
    pub container: ContainerSize,
    pub settings: ReaderSettings,
    /// Physical pixels per density-independent pixel.
    pub density: f32,
}
impl Layout {
    pub fn new(container: ContainerSize, settings: ReaderSettings, density: f32) -> Self {
        Self { container, settings, density }
    }

    pub fn is_ready(&self) -> bool {
        self.container.is_valid() && self.density.is_finite() && self.density > 0.0
    }

    pub fn key(&self) -> LayoutKey {
        LayoutKey {
            font_size: self.settings.font_size,
            container: self.container,
        }
    }
}
