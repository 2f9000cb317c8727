use criterion::{criterion_group, criterion_main, Criterion};
use image::{DynamicImage, GrayImage, Luma};
use sealmatch::lowlevel::{ImageSpectrum, Kernel, ScanParams, TemplatePlan, ZnccScalar};
use sealmatch::{
    match_seal, prepare, Backend, LocateConfig, MatchConfig, OwnedImage, PrepareConfig,
    SealCatalog, SealLocator, SearchSpace, TemplateStore,
};
use std::hint::black_box;
use std::sync::Arc;

fn make_image(width: usize, height: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(width * height);
    for y in 0..height {
        for x in 0..width {
            let value = ((x * 13) ^ (y * 7) ^ (x * y)) & 0xFF;
            data.push(value as u8);
        }
    }
    data
}

fn extract_patch(image: &[u8], img_width: usize, x0: usize, y0: usize, side: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(side * side);
    for y in 0..side {
        let row = (y0 + y) * img_width;
        out.extend_from_slice(&image[row + x0..row + x0 + side]);
    }
    out
}

fn encode_png(data: &[u8], width: usize, height: usize) -> Vec<u8> {
    let img = GrayImage::from_raw(width as u32, height as u32, data.to_vec()).unwrap();
    let mut out = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(img)
        .write_to(&mut out, image::ImageFormat::Png)
        .unwrap();
    out.into_inner()
}

fn bench_kernels(c: &mut Criterion) {
    let (img_width, img_height) = (512, 384);
    let image = make_image(img_width, img_height);
    let owned = OwnedImage::new(image.clone(), img_width, img_height).unwrap();
    let patch = extract_patch(&image, img_width, 120, 100, 64);
    let plan = TemplatePlan::from_view(OwnedImage::new(patch, 64, 64).unwrap().view()).unwrap();
    let params = ScanParams::default();

    c.bench_function("zncc_direct_64px", |b| {
        b.iter(|| black_box(ZnccScalar::scan_full(owned.view(), &plan, params).unwrap()));
    });

    let spectrum = ImageSpectrum::build(&owned).unwrap();
    c.bench_function("zncc_fft_64px", |b| {
        b.iter(|| black_box(spectrum.scan_full(&plan, params).unwrap()));
    });

    c.bench_function("image_spectrum_build", |b| {
        b.iter(|| black_box(ImageSpectrum::build(&owned).unwrap()));
    });
}

fn bench_match_seal(c: &mut Criterion) {
    let (img_width, img_height) = (800, 600);
    let image = make_image(img_width, img_height);
    let reference = OwnedImage::new(extract_patch(&image, img_width, 300, 200, 120), 120, 120)
        .unwrap();
    let bytes = encode_png(&image, img_width, img_height);
    let working = prepare(&bytes, &PrepareConfig::default()).unwrap();
    let cfg = MatchConfig::default();
    let space = SearchSpace::new(&working, Backend::Fft).unwrap();

    c.bench_function("match_seal_800x600", |b| {
        b.iter(|| black_box(match_seal(&space, &reference, &cfg, None).unwrap()));
    });

    c.bench_function("prepare_800x600", |b| {
        b.iter(|| black_box(prepare(&bytes, &PrepareConfig::default()).unwrap()));
    });

    let dir = tempfile::tempdir().unwrap();
    let mut pairs = Vec::new();
    for (idx, (x0, y0)) in [(40, 40), (300, 200), (600, 400)].into_iter().enumerate() {
        let file = format!("seal{idx}.png");
        let patch = extract_patch(&image, img_width, x0, y0, 120);
        GrayImage::from_raw(120, 120, patch)
            .unwrap()
            .save(dir.path().join(&file))
            .unwrap();
        pairs.push((format!("SEAL{idx}"), file));
    }
    let store = Arc::new(TemplateStore::new(
        dir.path(),
        SealCatalog::from_pairs(pairs).unwrap(),
    ));
    let ids = ["SEAL0", "SEAL1", "SEAL2"];

    let sequential = SealLocator::new(Arc::clone(&store), LocateConfig::default()).unwrap();
    sequential.preload();
    c.bench_function("locate_three_seals", |b| {
        b.iter(|| black_box(sequential.locate_seals(&bytes, &ids).unwrap()));
    });

    if cfg!(feature = "rayon") {
        let parallel = SealLocator::new(
            store,
            LocateConfig {
                parallel: true,
                ..LocateConfig::default()
            },
        )
        .unwrap();
        c.bench_function("locate_three_seals_parallel", |b| {
            b.iter(|| black_box(parallel.locate_seals(&bytes, &ids).unwrap()));
        });
    }
}

criterion_group!(benches, bench_kernels, bench_match_seal);
criterion_main!(benches);
