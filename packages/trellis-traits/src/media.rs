#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorScheme {
    #[default]
    Light,
    Dark,
}

/// External media state consumed by style-sheet media conditions.
///
/// The core never interprets this beyond handing it to each sheet's
/// applicability check; the embedder updates it when the window or
/// platform theme changes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MediaContext {
    /// Logical viewport width in CSS pixels
    pub width: f32,
    /// Logical viewport height in CSS pixels
    pub height: f32,
    /// HiDPI scale factor
    pub scale: f32,
    pub color_scheme: ColorScheme,
}

impl Default for MediaContext {
    fn default() -> Self {
        Self {
            width: 0.0,
            height: 0.0,
            scale: 1.0,
            color_scheme: ColorScheme::Light,
        }
    }
}

impl MediaContext {
    pub fn new(width: f32, height: f32, scale: f32, color_scheme: ColorScheme) -> Self {
        Self {
            width,
            height,
            scale,
            color_scheme,
        }
    }
}
