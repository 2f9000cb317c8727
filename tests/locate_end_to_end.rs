use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sealmatch::{
    Backend, LocalizationStatus, LocateConfig, MatchConfig, ScaleSet, SealCatalog, SealLocator,
    SealMatchError, SealOutcome, Strategy, TemplateStore,
};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Diamond pictogram with a seed-dependent interior on white.
fn seal_glyph(side: u32, seed: u32) -> GrayImage {
    GrayImage::from_fn(side, side, |x, y| {
        let c = side as i32 / 2;
        let d = (x as i32 - c).abs() + (y as i32 - c).abs();
        let outer = c - 2;
        let border = (side as i32 / 12).max(2);
        let value = if d > outer {
            255
        } else if d > outer - border {
            20
        } else if ((x * (seed + 2) / 9) + (y * (2 * seed + 3) / 11)) % 3 == 0 {
            40
        } else {
            245
        };
        Luma([value])
    })
}

fn background(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        Luma([200 + ((x * 7 + y * 3) % 23) as u8])
    })
}

fn paste(scene: &mut GrayImage, glyph: &GrayImage, x: u32, y: u32) {
    imageops::replace(scene, glyph, i64::from(x), i64::from(y));
}

fn png_bytes(img: &GrayImage) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).unwrap();
    out.into_inner()
}

fn write_template(dir: &Path, name: &str, glyph: &GrayImage) {
    glyph.save(dir.join(name)).unwrap();
}

fn locator(dir: &Path, pairs: &[(&str, &str)], cfg: LocateConfig) -> SealLocator {
    let catalog = SealCatalog::from_pairs(pairs.iter().copied()).unwrap();
    SealLocator::new(Arc::new(TemplateStore::new(dir, catalog)), cfg).unwrap()
}

#[test]
fn records_preserve_order_and_upper_case_ids() {
    let dir = tempfile::tempdir().unwrap();
    write_template(dir.path(), "a.png", &seal_glyph(60, 1));
    let locator = locator(dir.path(), &[("GHS01", "a.png")], LocateConfig::default());

    let scene = png_bytes(&background(400, 300));
    let records = locator
        .locate_seals(&scene, &["ghs99", "ghs01", "Ghs99"])
        .unwrap();

    let ids: Vec<&str> = records.iter().map(|r| r.seal_id.as_str()).collect();
    assert_eq!(ids, vec!["GHS99", "GHS01", "GHS99"]);
    for unknown in [&records[0], &records[2]] {
        assert_eq!(unknown.outcome, SealOutcome::UnknownSeal);
        assert!(!unknown.is_localized());
        assert_eq!(unknown.bounding_box(), None);
        assert_eq!(unknown.match_score(), 0.0);
    }
}

#[test]
fn exact_copy_localizes_at_its_position() {
    let dir = tempfile::tempdir().unwrap();
    // Shorter side 300 at factor 0.2 gives a 60 px template: no resampling.
    let glyph = seal_glyph(60, 1);
    write_template(dir.path(), "a.png", &glyph);
    let locator = locator(dir.path(), &[("GHS01", "a.png")], LocateConfig::default());

    let mut scene = background(400, 300);
    paste(&mut scene, &glyph, 130, 95);
    let records = locator
        .locate_seals(&png_bytes(&scene), &["GHS01"])
        .unwrap();

    let record = &records[0];
    assert!(record.is_localized(), "{:?}", record.outcome);
    assert!(record.match_score() >= 0.99);
    let bbox = record.bounding_box().unwrap();
    assert!((bbox.x - 130.0 / 400.0).abs() <= 1.0 / 400.0);
    assert!((bbox.y - 95.0 / 300.0).abs() <= 1.0 / 300.0);
    assert!((bbox.width - 60.0 / 400.0).abs() < 1e-6);
    assert!((bbox.height - 60.0 / 300.0).abs() < 1e-6);

    let scan = record.scan.as_ref().unwrap();
    let best = scan.best().unwrap();
    assert_eq!(best.strategy, Strategy::Gray);
    assert_eq!(best.side_px, 60);
    assert!(!sealmatch::requires_human_review(&records));
}

#[test]
fn noisy_copy_still_localizes() {
    let dir = tempfile::tempdir().unwrap();
    let glyph = seal_glyph(60, 2);
    write_template(dir.path(), "a.png", &glyph);
    let locator = locator(dir.path(), &[("GHS02", "a.png")], LocateConfig::default());

    let mut scene = background(400, 300);
    paste(&mut scene, &glyph, 60, 150);
    let mut rng = StdRng::seed_from_u64(17);
    for pixel in scene.pixels_mut() {
        let noisy = i16::from(pixel[0]) + rng.random_range(-25i16..=25);
        pixel[0] = noisy.clamp(0, 255) as u8;
    }

    let records = locator
        .locate_seals(&png_bytes(&scene), &["ghs02"])
        .unwrap();
    assert!(records[0].is_localized());
    assert!(records[0].match_score() > 0.5);
    let bbox = records[0].bounding_box().unwrap();
    assert!((bbox.x - 60.0 / 400.0).abs() <= 1.0 / 400.0);
    assert!((bbox.y - 150.0 / 300.0).abs() <= 1.0 / 300.0);
}

#[test]
fn uniform_image_localizes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_template(dir.path(), "a.png", &seal_glyph(60, 1));
    write_template(dir.path(), "b.png", &seal_glyph(60, 2));
    let locator = locator(
        dir.path(),
        &[("GHS01", "a.png"), ("GHS02", "b.png")],
        LocateConfig::default(),
    );

    let scene = GrayImage::from_pixel(400, 300, Luma([128]));
    let records = locator
        .locate_seals(&png_bytes(&scene), &["GHS01", "GHS02"])
        .unwrap();
    for record in &records {
        assert_eq!(record.outcome, SealOutcome::Unlocalized { best: None });
        assert_eq!(record.match_score(), 0.0);
        assert_eq!(record.status(), LocalizationStatus::BelowThreshold);
    }
    assert!(sealmatch::requires_human_review(&records));
}

#[test]
fn repeated_requests_are_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let glyph = seal_glyph(60, 3);
    write_template(dir.path(), "a.png", &glyph);
    write_template(dir.path(), "b.png", &seal_glyph(48, 4));
    let locator = locator(
        dir.path(),
        &[("GHS01", "a.png"), ("GHS02", "b.png")],
        LocateConfig::default(),
    );

    let mut scene = background(400, 300);
    paste(&mut scene, &glyph, 20, 200);
    let bytes = png_bytes(&scene);
    let first = locator.locate_seals(&bytes, &["GHS01", "GHS02"]).unwrap();
    let second = locator.locate_seals(&bytes, &["GHS01", "GHS02"]).unwrap();
    assert_eq!(first, second);
}

#[test]
fn base64_and_data_url_payloads_match_raw_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let glyph = seal_glyph(60, 1);
    write_template(dir.path(), "a.png", &glyph);
    let locator = locator(dir.path(), &[("GHS01", "a.png")], LocateConfig::default());

    let mut scene = background(400, 300);
    paste(&mut scene, &glyph, 200, 40);
    let bytes = png_bytes(&scene);
    let raw = locator.locate_seals(&bytes, &["GHS01"]).unwrap();

    let encoded = STANDARD.encode(&bytes);
    let bare = locator.locate_base64(&encoded, &["GHS01"]).unwrap();
    let url = format!("data:image/png;base64,{encoded}");
    let data_url = locator.locate_base64(&url, &["GHS01"]).unwrap();
    assert_eq!(raw, bare);
    assert_eq!(raw, data_url);
}

#[test]
fn undecodable_input_fails_the_request() {
    let dir = tempfile::tempdir().unwrap();
    let locator = locator(dir.path(), &[("GHS01", "a.png")], LocateConfig::default());
    let err = locator
        .locate_seals(b"definitely not an image", &["GHS01"])
        .unwrap_err();
    assert!(matches!(err, SealMatchError::Decode { .. }));

    let err = locator.locate_base64("%%%", &["GHS01"]).unwrap_err();
    assert!(matches!(err, SealMatchError::Base64 { .. }));
}

#[test]
fn corrupt_template_degrades_only_its_seal() {
    let dir = tempfile::tempdir().unwrap();
    let glyph = seal_glyph(60, 1);
    write_template(dir.path(), "a.png", &glyph);
    std::fs::write(dir.path().join("b.png"), b"not a png").unwrap();
    let locator = locator(
        dir.path(),
        &[("GHS01", "a.png"), ("GHS02", "b.png")],
        LocateConfig::default(),
    );

    let mut scene = background(400, 300);
    paste(&mut scene, &glyph, 300, 200);
    let records = locator
        .locate_seals(&png_bytes(&scene), &["GHS02", "GHS01"])
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status(), LocalizationStatus::Failed);
    assert_eq!(records[0].bounding_box(), None);
    assert_eq!(records[0].match_score(), 0.0);
    assert!(records[1].is_localized());
}

#[test]
fn ids_are_only_upper_cased() {
    let dir = tempfile::tempdir().unwrap();
    let glyph = seal_glyph(60, 1);
    write_template(dir.path(), "a.png", &glyph);
    write_template(dir.path(), "s.png", &seal_glyph(60, 4));
    let locator = locator(
        dir.path(),
        &[("GHS01", "a.png"), ("straße", "s.png")],
        LocateConfig::default(),
    );

    let mut scene = background(400, 300);
    paste(&mut scene, &glyph, 130, 95);
    let records = locator
        .locate_seals(&png_bytes(&scene), &[" ghs01 ", "ghsé", "Straße", "ghs01"])
        .unwrap();

    let ids: Vec<&str> = records.iter().map(|r| r.seal_id.as_str()).collect();
    assert_eq!(ids, vec![" GHS01 ", "GHSÉ", "STRASSE", "GHS01"]);
    assert_eq!(records[0].outcome, SealOutcome::UnknownSeal);
    assert_eq!(records[1].outcome, SealOutcome::UnknownSeal);
    assert_ne!(records[2].status(), LocalizationStatus::UnknownSeal);
    assert!(records[2].scan.is_some());
    assert!(records[3].is_localized());
}

#[test]
fn flat_template_fails_only_its_seal() {
    let dir = tempfile::tempdir().unwrap();
    let glyph = seal_glyph(60, 1);
    write_template(dir.path(), "a.png", &glyph);
    write_template(dir.path(), "blank.png", &GrayImage::from_pixel(60, 60, Luma([255])));
    let locator = locator(
        dir.path(),
        &[("GHS01", "a.png"), ("GHS02", "blank.png")],
        LocateConfig::default(),
    );

    let mut scene = background(400, 300);
    paste(&mut scene, &glyph, 130, 95);
    let records = locator
        .locate_seals(&png_bytes(&scene), &["GHS02", "GHS01"])
        .unwrap();

    assert_eq!(records.len(), 2);
    assert!(locator.store().is_cached("GHS02"));
    assert!(matches!(records[0].outcome, SealOutcome::Failed { .. }));
    assert_eq!(records[0].status(), LocalizationStatus::Failed);
    assert_eq!(records[0].bounding_box(), None);
    assert_eq!(records[0].match_score(), 0.0);
    assert_eq!(records[1].seal_id, "GHS01");
    assert_eq!(records[1].status(), LocalizationStatus::Localized);
    assert!(sealmatch::requires_human_review(&records));
}

#[test]
fn exhausted_budget_yields_timeout_records() {
    let dir = tempfile::tempdir().unwrap();
    write_template(dir.path(), "a.png", &seal_glyph(60, 1));
    let cfg = LocateConfig {
        time_budget: Some(Duration::ZERO),
        ..LocateConfig::default()
    };
    let locator = locator(dir.path(), &[("GHS01", "a.png")], cfg);

    let records = locator
        .locate_seals(&png_bytes(&background(400, 300)), &["GHS01", "GHS42"])
        .unwrap();
    assert_eq!(records[0].outcome, SealOutcome::TimedOut);
    assert_eq!(records[0].status().as_str(), "timed_out");
    assert_eq!(records[0].match_score(), 0.0);
    assert_eq!(records[1].outcome, SealOutcome::UnknownSeal);
}

#[test]
fn normalized_boxes_survive_the_working_downscale() {
    let dir = tempfile::tempdir().unwrap();
    let glyph = seal_glyph(180, 5);
    write_template(dir.path(), "a.png", &glyph);
    let cfg = LocateConfig {
        matching: MatchConfig {
            scales: ScaleSet::new(vec![0.17, 0.20, 0.24]).unwrap(),
            ..MatchConfig::default()
        },
        ..LocateConfig::default()
    };
    let locator = locator(dir.path(), &[("GHS01", "a.png")], cfg);

    // Both images exceed the 1000 px cap and map to a 1000x750 working image.
    let mut scene = background(1200, 900);
    paste(&mut scene, &glyph, 300, 420);
    let upscaled = imageops::resize(&scene, 2400, 1800, FilterType::Nearest);

    let small = locator
        .locate_image(&DynamicImage::ImageLuma8(scene), &["GHS01"])
        .unwrap();
    let large = locator
        .locate_image(&DynamicImage::ImageLuma8(upscaled), &["GHS01"])
        .unwrap();

    let a = small[0].bounding_box().unwrap();
    let b = large[0].bounding_box().unwrap();
    assert!(small[0].is_localized() && large[0].is_localized());
    assert!((a.x - b.x).abs() < 0.01);
    assert!((a.y - b.y).abs() < 0.01);
    assert!((a.width - b.width).abs() < 0.01);
    assert!((a.x - 0.25).abs() < 0.01);
    assert!((a.y - 420.0 / 900.0).abs() < 0.01);
}

#[test]
fn direct_and_fft_backends_agree() {
    let dir = tempfile::tempdir().unwrap();
    let glyph = seal_glyph(24, 2);
    write_template(dir.path(), "a.png", &glyph);
    let mut scene = background(160, 120);
    paste(&mut scene, &glyph, 70, 33);
    let bytes = png_bytes(&scene);

    let run = |backend: Backend| {
        let cfg = LocateConfig {
            matching: MatchConfig {
                scales: ScaleSet::new(vec![0.2, 0.3]).unwrap(),
                backend,
                ..MatchConfig::default()
            },
            ..LocateConfig::default()
        };
        locator(dir.path(), &[("GHS01", "a.png")], cfg)
            .locate_seals(&bytes, &["GHS01"])
            .unwrap()
    };
    let fft = run(Backend::Fft);
    let direct = run(Backend::Direct);

    assert!(fft[0].is_localized());
    assert_eq!(fft[0].bounding_box(), direct[0].bounding_box());
    assert!((fft[0].match_score() - direct[0].match_score()).abs() <= 0.01);
}
