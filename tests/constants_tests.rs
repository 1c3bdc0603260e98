// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for constants module

use crosscam::VideoQuality;
use crosscam::pipelines::video::EncoderSettings;

#[test]
fn test_quality_tiers() {
    // SD, HD, Full HD, 4K
    assert_eq!(VideoQuality::ALL.len(), 4);
    assert_eq!(VideoQuality::default(), VideoQuality::Fhd);
}

#[test]
fn test_quality_ordering() {
    // Tiers are ordered from lowest to highest quality
    let mut prev_bitrate = 0u32;
    let mut prev_pixels = 0u32;
    for quality in VideoQuality::ALL {
        let (width, height) = quality.resolution();
        assert!(
            quality.bitrate_kbps() > prev_bitrate,
            "Tiers should be ordered from lowest to highest"
        );
        assert!(width * height > prev_pixels);
        prev_bitrate = quality.bitrate_kbps();
        prev_pixels = width * height;
    }
}

#[test]
fn test_quality_display_names() {
    for quality in VideoQuality::ALL {
        let name = quality.display_name();
        assert!(
            !name.is_empty(),
            "Quality {:?} has empty display name",
            quality
        );
    }
}

#[test]
fn test_encoder_settings_use_tier_bitrate() {
    for quality in VideoQuality::ALL {
        let encoder = EncoderSettings::for_quality(quality, 30);
        assert_eq!(encoder.bitrate_kbps, quality.bitrate_kbps());
    }
}
