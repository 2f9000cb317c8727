use clap::{Parser, Subcommand};
use sealmatch::{
    requires_human_review, Backend, HazardCategory, LocateConfig, MatchConfig, PrepareConfig,
    ScaleSet, SealCatalog, SealLocalization, SealLocator, SealMatchError, SealScan, SealSpec,
    TemplateStore,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SCHEMA_JSON: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.schema.json"));
const EXAMPLE_JSON: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/config.example.json"));

#[derive(Parser, Debug)]
#[command(author, version, about = "GHS seal localization CLI (JSON config driven)")]
struct Cli {
    /// Path to the JSON configuration file; built-in defaults when omitted.
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    /// Print the JSON schema and exit.
    #[arg(long)]
    print_schema: bool,
    /// Print an example config and exit.
    #[arg(long)]
    print_example: bool,
    /// Enable tracing output for performance profiling.
    #[arg(long, global = true)]
    trace: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Localize seals in one image.
    Locate {
        /// Request JSON with `image` or `imagePath` and `sealIds`.
        #[arg(long, value_name = "FILE", conflicts_with = "image")]
        request: Option<PathBuf>,
        /// Image file to search.
        #[arg(long, value_name = "FILE")]
        image: Option<PathBuf>,
        /// Seal id to localize (repeatable).
        #[arg(long = "seal", value_name = "ID")]
        seals: Vec<String>,
        /// Include per-strategy scores in the output.
        #[arg(long)]
        diagnostics: bool,
    },
    /// Load every reference template and run the kernel self-check.
    Preload,
    /// List the configured seal catalog.
    Catalog,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum BackendConfig {
    Fft,
    Direct,
}

impl From<BackendConfig> for Backend {
    fn from(value: BackendConfig) -> Self {
        match value {
            BackendConfig::Fft => Backend::Fft,
            BackendConfig::Direct => Backend::Direct,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct PrepareConfigJson {
    max_image_dim: usize,
    canny_low: f32,
    canny_high: f32,
}

impl Default for PrepareConfigJson {
    fn default() -> Self {
        let cfg = PrepareConfig::default();
        Self {
            max_image_dim: cfg.max_image_dim,
            canny_low: cfg.canny_low,
            canny_high: cfg.canny_high,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct MatchConfigJson {
    scales: Vec<f32>,
    min_template_px: usize,
    max_template_px: Option<usize>,
    backend: BackendConfig,
    parallel_scan: bool,
    min_var_i: f64,
}

impl Default for MatchConfigJson {
    fn default() -> Self {
        let cfg = MatchConfig::default();
        Self {
            scales: cfg.scales.factors().to_vec(),
            min_template_px: cfg.min_template_px,
            max_template_px: cfg.max_template_px,
            backend: BackendConfig::Fft,
            parallel_scan: cfg.parallel_scan,
            min_var_i: cfg.min_var_i,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct LocateConfigJson {
    match_threshold: f32,
    nms_iou_threshold: f32,
    parallel: bool,
    time_budget_ms: Option<u64>,
}

impl Default for LocateConfigJson {
    fn default() -> Self {
        let cfg = LocateConfig::default();
        Self {
            match_threshold: cfg.match_threshold,
            nms_iou_threshold: cfg.nms_iou_threshold,
            parallel: cfg.parallel,
            time_budget_ms: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CatalogEntryJson {
    id: String,
    file: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct Config {
    templates_dir: String,
    catalog: Option<Vec<CatalogEntryJson>>,
    output_path: Option<String>,
    locate: LocateConfigJson,
    prepare: PrepareConfigJson,
    #[serde(rename = "match")]
    match_cfg: MatchConfigJson,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            templates_dir: "assets/seals".to_string(),
            catalog: None,
            output_path: None,
            locate: LocateConfigJson::default(),
            prepare: PrepareConfigJson::default(),
            match_cfg: MatchConfigJson::default(),
        }
    }
}

impl Config {
    fn seal_catalog(&self) -> Result<SealCatalog, Box<dyn std::error::Error>> {
        let Some(entries) = &self.catalog else {
            return Ok(SealCatalog::ghs());
        };
        let specs = entries
            .iter()
            .map(|entry| {
                let mut spec = SealSpec::new(&entry.id, &entry.file);
                if let Some(name) = &entry.name {
                    spec.name = name.clone();
                }
                if let Some(category) = &entry.category {
                    spec = spec.with_category(category.parse::<HazardCategory>()?);
                }
                Ok(spec)
            })
            .collect::<Result<Vec<_>, SealMatchError>>()?;
        Ok(SealCatalog::new(specs)?)
    }

    fn locate_config(self) -> Result<LocateConfig, Box<dyn std::error::Error>> {
        Ok(LocateConfig {
            prepare: PrepareConfig {
                max_image_dim: self.prepare.max_image_dim,
                canny_low: self.prepare.canny_low,
                canny_high: self.prepare.canny_high,
            },
            matching: MatchConfig {
                scales: ScaleSet::new(self.match_cfg.scales)?,
                min_template_px: self.match_cfg.min_template_px,
                max_template_px: self.match_cfg.max_template_px,
                backend: self.match_cfg.backend.into(),
                parallel_scan: self.match_cfg.parallel_scan,
                min_var_i: self.match_cfg.min_var_i,
            },
            match_threshold: self.locate.match_threshold,
            nms_iou_threshold: self.locate.nms_iou_threshold,
            parallel: self.locate.parallel,
            time_budget: self.locate.time_budget_ms.map(Duration::from_millis),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Request {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    image_path: Option<String>,
    seal_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct BoxRecord {
    x: f32,
    y: f32,
    width: f32,
    height: f32,
}

#[derive(Debug, Serialize)]
struct HitRecord {
    score: f32,
    scale: f32,
    side_px: usize,
}

#[derive(Debug, Serialize)]
struct Diagnostics {
    strategy: Option<&'static str>,
    gray: Option<HitRecord>,
    edge: Option<HitRecord>,
    scales_tried: usize,
}

impl From<&SealScan> for Diagnostics {
    fn from(scan: &SealScan) -> Self {
        let record = |hit: &sealmatch::MatchHit| HitRecord {
            score: hit.score,
            scale: hit.scale,
            side_px: hit.side_px,
        };
        Self {
            strategy: scan.best().map(|hit| hit.strategy.as_str()),
            gray: scan.gray.as_ref().map(record),
            edge: scan.edge.as_ref().map(record),
            scales_tried: scan.scales_tried,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SealRecord {
    seal_id: String,
    localized: bool,
    bounding_box: Option<BoxRecord>,
    match_score: f32,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    diagnostics: Option<Diagnostics>,
}

impl SealRecord {
    fn new(record: &SealLocalization, diagnostics: bool) -> Self {
        Self {
            seal_id: record.seal_id.clone(),
            localized: record.is_localized(),
            bounding_box: record.bounding_box().map(|b| BoxRecord {
                x: b.x,
                y: b.y,
                width: b.width,
                height: b.height,
            }),
            match_score: record.match_score(),
            status: record.status().as_str(),
            diagnostics: if diagnostics {
                record.scan.as_ref().map(Diagnostics::from)
            } else {
                None
            },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LocateOutput {
    results: Vec<SealRecord>,
    requires_human_review: bool,
}

#[derive(Debug, Serialize)]
struct PreloadOutput {
    loaded: Vec<String>,
    failed: Vec<(String, String)>,
    kernel_ok: bool,
}

#[derive(Debug, Serialize)]
struct CatalogRecord<'a> {
    id: &'a str,
    file: &'a str,
    name: &'a str,
    description: &'a str,
    category: Option<&'static str>,
}

fn write_output(json: String, output_path: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    match output_path {
        Some(path) => fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.trace {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive("sealmatch=info".parse()?))
            .with_target(false)
            .init();
    }

    if cli.print_schema {
        println!("{SCHEMA_JSON}");
        return Ok(());
    }
    if cli.print_example {
        println!("{EXAMPLE_JSON}");
        return Ok(());
    }

    let config: Config = match &cli.config {
        Some(path) => serde_json::from_str(&fs::read_to_string(path)?)?,
        None => Config::default(),
    };
    let output_path = config.output_path.clone();
    let catalog = config.seal_catalog()?;
    let store = Arc::new(TemplateStore::new(&config.templates_dir, catalog));
    let locator = SealLocator::new(Arc::clone(&store), config.locate_config()?)?;

    let Some(command) = cli.command else {
        return Err("a subcommand is required (locate, preload or catalog)".into());
    };

    let json = match command {
        Command::Locate {
            request,
            image,
            seals,
            diagnostics,
        } => {
            let (bytes, seal_ids) = match (request, image) {
                (Some(path), _) => {
                    let request: Request = serde_json::from_str(&fs::read_to_string(path)?)?;
                    let bytes = match (request.image, request.image_path) {
                        (Some(payload), _) => sealmatch::image::io::decode_base64_payload(&payload)?,
                        (None, Some(path)) => fs::read(path)?,
                        (None, None) => return Err("request needs `image` or `imagePath`".into()),
                    };
                    (bytes, request.seal_ids)
                }
                (None, Some(path)) => (fs::read(path)?, seals),
                (None, None) => return Err("locate needs --request or --image".into()),
            };

            let records = locator.locate_seals(&bytes, &seal_ids)?;
            let output = LocateOutput {
                requires_human_review: requires_human_review(&records),
                results: records
                    .iter()
                    .map(|record| SealRecord::new(record, diagnostics))
                    .collect(),
            };
            serde_json::to_string_pretty(&output)?
        }
        Command::Preload => {
            let report = locator.preload();
            tracing::info!(
                loaded = report.loaded.len(),
                failed = report.failed.len(),
                kernel_ok = report.kernel_ok,
                "preload finished"
            );
            let output = PreloadOutput {
                loaded: report.loaded,
                failed: report
                    .failed
                    .into_iter()
                    .map(|(id, err)| (id, err.to_string()))
                    .collect(),
                kernel_ok: report.kernel_ok,
            };
            serde_json::to_string_pretty(&output)?
        }
        Command::Catalog => {
            let records: Vec<CatalogRecord<'_>> = store
                .catalog()
                .iter()
                .map(|spec| CatalogRecord {
                    id: &spec.id,
                    file: &spec.file,
                    name: &spec.name,
                    description: &spec.description,
                    category: spec.category.map(HazardCategory::as_str),
                })
                .collect();
            serde_json::to_string_pretty(&records)?
        }
    };

    write_output(json, output_path.as_deref())
}
