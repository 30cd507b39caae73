//! Tray icon rendering
//!
//! Draws the two indicator glyphs: a sun for "switch to light" and a moon for
//! "switch to dark". Rendered with 4x4 supersampling so edges stay smooth at
//! tray size.

use image::{ImageBuffer, Rgba, RgbaImage};

use crate::controller::IndicatorAction;

pub const ICON_SIZE: u32 = 32;

/// Samples per pixel along each axis
const SUPERSAMPLE: u32 = 4;

const SUN_COLOR: (u8, u8, u8) = (255, 193, 7);
const MOON_COLOR: (u8, u8, u8) = (205, 214, 232);

/// Render the glyph for the action the indicator offers
pub fn render_action_icon(action: IndicatorAction) -> RgbaImage {
    match action {
        IndicatorAction::ShowLightAction => render_sun(),
        IndicatorAction::ShowDarkAction => render_moon(),
    }
}

fn render_sun() -> RgbaImage {
    let c = ICON_SIZE as f32 / 2.0;
    draw_shape(SUN_COLOR, |x, y| {
        let (dx, dy) = (x - c, y - c);
        let r = (dx * dx + dy * dy).sqrt();
        if r <= 7.0 {
            return true;
        }
        // Eight rays between radius 10 and 14, 1.25px either side of the axis
        if !(10.0..=14.0).contains(&r) {
            return false;
        }
        (0..8).any(|k| {
            let angle = k as f32 * std::f32::consts::FRAC_PI_4;
            let (sin, cos) = angle.sin_cos();
            let along = dx * cos + dy * sin;
            let across = -dx * sin + dy * cos;
            along > 0.0 && across.abs() <= 1.25
        })
    })
}

fn render_moon() -> RgbaImage {
    let c = ICON_SIZE as f32 / 2.0;
    draw_shape(MOON_COLOR, |x, y| {
        let inside = |cx: f32, cy: f32, r: f32| (x - cx).powi(2) + (y - cy).powi(2) <= r * r;
        inside(c, c, 12.0) && !inside(c + 7.0, c - 5.0, 10.0)
    })
}

/// Fill every pixel by the fraction of its subsamples inside `shape`
fn draw_shape(color: (u8, u8, u8), shape: impl Fn(f32, f32) -> bool) -> RgbaImage {
    let mut img: RgbaImage = ImageBuffer::new(ICON_SIZE, ICON_SIZE);
    let step = 1.0 / SUPERSAMPLE as f32;
    let total = SUPERSAMPLE * SUPERSAMPLE;

    for (px, py, pixel) in img.enumerate_pixels_mut() {
        let mut hits = 0;
        for sy in 0..SUPERSAMPLE {
            for sx in 0..SUPERSAMPLE {
                let x = px as f32 + (sx as f32 + 0.5) * step;
                let y = py as f32 + (sy as f32 + 0.5) * step;
                if shape(x, y) {
                    hits += 1;
                }
            }
        }
        let alpha = (hits * 255 / total) as u8;
        *pixel = Rgba([color.0, color.1, color.2, alpha]);
    }
    img
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icon_dimensions() {
        for action in [IndicatorAction::ShowLightAction, IndicatorAction::ShowDarkAction] {
            let img = render_action_icon(action);
            assert_eq!(img.dimensions(), (ICON_SIZE, ICON_SIZE));
            assert_eq!(img.into_raw().len(), (ICON_SIZE * ICON_SIZE * 4) as usize);
        }
    }

    #[test]
    fn test_sun_has_solid_core_and_clear_corners() {
        let img = render_action_icon(IndicatorAction::ShowLightAction);
        assert_eq!(img.get_pixel(16, 16)[3], 255);
        assert_eq!(img.get_pixel(0, 0)[3], 0);
        assert_eq!(img.get_pixel(31, 31)[3], 0);
    }

    #[test]
    fn test_moon_has_bite_taken_out() {
        let img = render_action_icon(IndicatorAction::ShowDarkAction);
        // Left limb is lit, the bite towards the upper right is empty
        assert_eq!(img.get_pixel(8, 16)[3], 255);
        assert_eq!(img.get_pixel(22, 11)[3], 0);
    }

    #[test]
    fn test_glyphs_differ() {
        let sun = render_action_icon(IndicatorAction::ShowLightAction);
        let moon = render_action_icon(IndicatorAction::ShowDarkAction);
        assert_ne!(sun.into_raw(), moon.into_raw());
    }
}
