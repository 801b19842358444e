use std::{hint::black_box, thread, time::Duration};

use image::{imageops, Rgb, RgbImage};
use tokio_util::sync::CancellationToken;

use crate::settings::VideoSettings;

use super::IterationCounter;

/// Renders and blurs one frame per pass, paced to the configured frame rate.
pub fn video_loop(settings: VideoSettings, cancel_token: CancellationToken, counter: IterationCounter) {
    let frame_interval = Duration::from_millis(settings.frame_interval_ms);
    let mut frame: u32 = 0;

    while !cancel_token.is_cancelled() {
        let shift = frame % 256;
        let source = RgbImage::from_fn(settings.width, settings.height, |x, y| {
            Rgb([
                ((x + shift) % 256) as u8,
                ((y + shift) % 256) as u8,
                ((x ^ y) % 256) as u8,
            ])
        });
        black_box(imageops::blur(&source, settings.blur_sigma));

        counter.bump();
        frame = frame.wrapping_add(1);
        thread::sleep(frame_interval);
    }
}
