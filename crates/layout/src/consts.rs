pub const DEFAULT_FONT_SIZE: u16 = 18;
pub const DEFAULT_LINE_SPACING: f32 = 1.5;
pub const DEFAULT_PADDING_HORIZONTAL: f32 = 16.0;
pub const DEFAULT_PADDING_VERTICAL: f32 = 24.0;
pub const DEFAULT_BRIGHTNESS: f32 = 0.5;
pub const DEFAULT_BACKGROUND_COLOR: u32 = 0xFFF5_EFDC;
pub const DEFAULT_TEXT_COLOR: u32 = 0xFF33_3333;

/// Glyph cells per em. Narrow (Latin) glyphs take one cell, wide (CJK)
/// glyphs take two.
pub(crate) const CELLS_PER_EM: f32 = 2.0;
