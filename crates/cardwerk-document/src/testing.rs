// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Synthetic photographs shared by the unit tests.

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point as PixelPoint;

pub const CANVAS_W: u32 = 800;
pub const CANVAS_H: u32 = 500;
pub const CARD_W: f32 = 600.0;
pub const CARD_H: f32 = 350.0;

const BACKGROUND: Rgb<u8> = Rgb([40, 40, 40]);
const CARD: Rgb<u8> = Rgb([250, 250, 250]);
const PHOTO: Rgb<u8> = Rgb([120, 120, 120]);
const INK: Rgb<u8> = Rgb([20, 20, 20]);

/// Maps card-local `(u, v)` onto the canvas: card centred, turned by
/// `degrees`.
fn card_to_canvas(u: f32, v: f32, degrees: f32) -> PixelPoint<i32> {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let (du, dv) = (u - CARD_W / 2.0, v - CARD_H / 2.0);
    let x = CANVAS_W as f32 / 2.0 + du * cos - dv * sin;
    let y = CANVAS_H as f32 / 2.0 + du * sin + dv * cos;
    PixelPoint::new(x.round() as i32, y.round() as i32)
}

fn fill_card_rect(
    canvas: &mut RgbImage,
    u0: f32,
    v0: f32,
    u1: f32,
    v1: f32,
    degrees: f32,
    colour: Rgb<u8>,
) {
    let corners = [
        card_to_canvas(u0, v0, degrees),
        card_to_canvas(u1, v0, degrees),
        card_to_canvas(u1, v1, degrees),
        card_to_canvas(u0, v1, degrees),
    ];
    draw_polygon_mut(canvas, &corners, colour);
}

/// A white 600x350 card turned 5 degrees on a dark 800x500 background,
/// with a grey photo column over its left 12% and two dark text lines.
pub fn card_photo() -> DynamicImage {
    let degrees = 5.0;
    let mut canvas = RgbImage::from_pixel(CANVAS_W, CANVAS_H, BACKGROUND);
    fill_card_rect(&mut canvas, 0.0, 0.0, CARD_W, CARD_H, degrees, CARD);
    fill_card_rect(&mut canvas, 0.0, 0.0, CARD_W * 0.12, CARD_H, degrees, PHOTO);
    fill_card_rect(&mut canvas, 230.0, 100.0, 380.0, 112.0, degrees, INK);
    fill_card_rect(&mut canvas, 230.0, 160.0, 380.0, 172.0, degrees, INK);
    DynamicImage::ImageRgb8(canvas)
}

/// An upright card already cropped to its boundary.
pub fn upright_card() -> DynamicImage {
    let mut card = RgbImage::from_pixel(CARD_W as u32, CARD_H as u32, CARD);
    for (u0, v0, u1, v1) in [(230, 100, 380, 112), (230, 160, 380, 172), (230, 60, 330, 72)] {
        for y in v0..v1 {
            for x in u0..u1 {
                card.put_pixel(x, y, INK);
            }
        }
    }
    DynamicImage::ImageRgb8(card)
}

/// A featureless grey frame.
pub fn uniform_photo() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(CANVAS_W, CANVAS_H, Rgb([128, 128, 128])))
}
