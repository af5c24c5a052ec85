//! Frame views derived from extracted images.
//!
//! Nothing here is persisted: indices come from image file names and
//! timestamps from the sampling interval, recomputed on every listing.

use shared::{ExtraFrame, Frame};
use std::path::Path;

/// Extension of images written by the transcoder
pub const IMAGE_EXTENSION: &str = "jpg";

/// An image file whose base name is its frame number
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberedImage {
    pub number: u32,
    pub name: String,
}

/// List `<n>.jpg` files in a directory.
///
/// Entries that are not images or whose base name is not a number are
/// skipped; subdirectories holding extra frames are therefore ignored.
pub async fn list_images(dir: &Path) -> std::io::Result<Vec<NumberedImage>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut images = Vec::new();

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(IMAGE_EXTENSION) {
            continue;
        }
        let Some(number) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(|s| s.parse::<u32>().ok())
        else {
            continue;
        };
        images.push(NumberedImage {
            number,
            name: entry.file_name().to_string_lossy().into_owned(),
        });
    }

    images.sort_by_key(|image| image.number);
    Ok(images)
}

/// Center of coarse interval `index` (1-based): `index / fps - 1 / (2 * fps)`
pub fn coarse_timestamp(index: u32, spf: u32) -> f64 {
    let fps = 1.0 / f64::from(spf);
    f64::from(index) / fps - 1.0 / (2.0 * fps)
}

/// Start of coarse interval `index`, the left edge of its extra-frame window
pub fn window_start(index: u32, spf: u32) -> f64 {
    f64::from(spf) * (f64::from(index) - 1.0)
}

/// Build the coarse frame list, ascending by timestamp
pub fn coarse_frames(images: &[NumberedImage], spf: u32) -> Vec<Frame> {
    let mut frames: Vec<Frame> = images
        .iter()
        .map(|image| Frame {
            index: image.number,
            timestamp: coarse_timestamp(image.number, spf),
            image: image.name.clone(),
        })
        .collect();

    frames.sort_by(|a, b| a.timestamp.total_cmp(&b.timestamp));
    frames
}

/// Build the extra frames of coarse interval `index`, ascending by fine index.
///
/// The window is split evenly between the images found, so timestamps stay
/// inside `[spf * (index - 1), spf * index)`.
pub fn extra_frames(index: u32, spf: u32, images: &[NumberedImage]) -> Vec<ExtraFrame> {
    let Some(last) = images.iter().map(|image| image.number).max() else {
        return Vec::new();
    };

    // A gap in the numbering must not push the last frame past the window
    let slots = images.len().max(last as usize + 1);
    let frame_interval = f64::from(spf) / slots as f64;
    let start = window_start(index, spf);

    let mut frames: Vec<ExtraFrame> = images
        .iter()
        .map(|image| ExtraFrame {
            index,
            fine_index: image.number,
            timestamp: f64::from(image.number) * frame_interval + start,
            image: format!("{}/{}", index, image.name),
        })
        .collect();

    frames.sort_by_key(|frame| frame.fine_index);
    frames
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn images(numbers: &[u32]) -> Vec<NumberedImage> {
        numbers
            .iter()
            .map(|n| NumberedImage {
                number: *n,
                name: format!("{n}.jpg"),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_list_images_filters_and_sorts() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        for name in ["10.jpg", "2.jpg", "1.jpg", "cover.jpg", "3.png", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"")?;
        }
        std::fs::create_dir(dir.path().join("4"))?;

        let listed = list_images(dir.path()).await?;
        let numbers: Vec<_> = listed.iter().map(|i| i.number).collect();
        assert_eq!(numbers, vec![1, 2, 10]);
        assert_eq!(listed[2].name, "10.jpg");

        Ok(())
    }

    #[tokio::test]
    async fn test_list_images_missing_dir() {
        let dir = TempDir::new().unwrap();
        assert!(list_images(&dir.path().join("missing")).await.is_err());
    }

    #[test]
    fn test_coarse_timestamps_are_interval_centers() {
        let frames = coarse_frames(&images(&[3, 1, 2]), 2);
        let timestamps: Vec<_> = frames.iter().map(|f| f.timestamp).collect();
        assert_eq!(timestamps, vec![1.0, 3.0, 5.0]);
        assert_eq!(frames[0].index, 1);
        assert_eq!(frames[0].image, "1.jpg");
    }

    #[test]
    fn test_coarse_timestamps_strictly_increase_by_interval() {
        for spf in [1, 2, 5] {
            let frames = coarse_frames(&images(&(1..=20).collect::<Vec<_>>()), spf);
            for pair in frames.windows(2) {
                let gap = pair[1].timestamp - pair[0].timestamp;
                assert!((gap - f64::from(spf)).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_extra_frames_fill_the_window() {
        let frames = extra_frames(3, 2, &images(&[3, 0, 1, 2]));
        let timestamps: Vec<_> = frames.iter().map(|f| f.timestamp).collect();
        assert_eq!(timestamps, vec![4.0, 4.5, 5.0, 5.5]);
        assert_eq!(frames[1].image, "3/1.jpg");
        assert!(frames.iter().all(|f| f.index == 3));
    }

    #[test]
    fn test_extra_frames_stay_inside_window() {
        for (index, spf) in [(1, 1), (4, 2), (9, 5)] {
            let frames = extra_frames(index, spf, &images(&[0, 1, 2, 5, 7]));
            let start = f64::from(spf) * f64::from(index - 1);
            let end = f64::from(spf) * f64::from(index);
            assert!(frames
                .iter()
                .all(|f| f.timestamp >= start && f.timestamp < end));
        }
    }

    #[test]
    fn test_extra_frames_empty() {
        assert!(extra_frames(1, 2, &[]).is_empty());
    }
}
