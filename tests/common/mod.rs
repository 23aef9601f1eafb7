//! Shared fixtures for integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use image::{GrayImage, ImageFormat, Luma};
use reposentry::{BotConfig, LiveState, Submission};
use std::io::Cursor;

/// Side of one grid cell in pixels.
const CELL: u32 = 8;

/// Renders an 8x8 grid of luminance blocks as a PNG.
///
/// Cell values come from a small LCG seeded with `seed`, quantized to steps
/// of 16 so that downscaling cannot flip neighbouring comparisons. Distinct
/// seeds give unrelated fingerprints.
pub fn grid_png(seed: u64) -> Vec<u8> {
    let mut state = seed.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
    let mut cells = [[0u8; 8]; 8];
    for row in &mut cells {
        for cell in row.iter_mut() {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            *cell = u8::try_from((state >> 60) * 16).unwrap();
        }
    }

    let img = GrayImage::from_fn(8 * CELL, 8 * CELL, |x, y| {
        Luma([cells[(y / CELL) as usize][(x / CELL) as usize]])
    });
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .unwrap();
    bytes
}

/// An image submission whose media URL is `https://i.redd.it/{id}.png`.
pub fn image_post(id: &str, community: &str, created_at: i64) -> Submission {
    let mut submission = Submission::builder(id, community);
    submission.url = format!("https://i.redd.it/{id}.png");
    submission.author = Some("poster".to_string());
    submission.title = format!("post {id}");
    submission.created_at = created_at;
    submission
}

/// Bot configuration for tests: default thresholds, no idle pause.
pub fn test_config() -> BotConfig {
    let mut config = BotConfig::default();
    config.scan.idle_pause_secs = 0;
    config
}

/// Live state of a visible submission.
pub fn active_state(id: &str) -> LiveState {
    LiveState {
        score: 12,
        removed: false,
        author: Some("original_poster".to_string()),
        title: format!("original {id}"),
        url: format!("https://i.redd.it/{id}.png"),
        permalink: format!("https://redd.it/{id}"),
    }
}
