//! Pipeline file loading and the single-pipeline runner.

use anyhow::{anyhow, Context as _};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use streamcv_core::{Context, Error as CoreError, Map, Registry, Tuple, Value};
use streamcv_opencv::plugin::{
    self, CAPTURE_FROM_DEVICE, CAPTURE_FROM_URI, CASCADE_CLASSIFIER, DETECT_MULTI_SCALE, DRAW_RECTS,
    MOUNT_IMAGE, SHARED_IMAGE,
};
use streamcv_opencv::{RawData, VisionBackend};
use tracing::{info, warn};

type Params = serde_json::Map<String, serde_json::Value>;

fn default_quality() -> u8 {
    90
}

/// A registered capability and the parameters it is created with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub kind: String,
    #[serde(default)]
    pub params: Params,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub params: Params,
}

/// Per-frame processing applied before a frame is written out.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessConfig {
    /// Classifier state used to detect objects in every frame.
    pub detect_with: Option<String>,
    /// Outline the detected objects.
    #[serde(default)]
    pub draw: bool,
    /// Shared image state mounted onto the detected objects.
    pub overlay: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub dir: PathBuf,
    #[serde(default = "default_quality")]
    pub jpeg_quality: u8,
    pub max_frames: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub source: SourceConfig,
    #[serde(default)]
    pub states: Vec<StateConfig>,
    #[serde(default)]
    pub process: ProcessConfig,
    pub output: OutputConfig,
}

fn to_params(params: &Params) -> Map {
    params
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(v.clone())))
        .collect()
}

impl PipelineConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read pipeline file: {}", path.display()))?;
        let config: PipelineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse pipeline file: {}", path.display()))?;
        config
            .validate()
            .map_err(|e| anyhow!("Invalid pipeline file {}: {}", path.display(), e))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.source.kind != CAPTURE_FROM_URI && self.source.kind != CAPTURE_FROM_DEVICE {
            return Err(format!("Unknown source kind '{}'", self.source.kind));
        }

        let mut kinds = HashMap::new();
        for state in &self.states {
            if state.name.is_empty() {
                return Err("State name must not be empty".to_string());
            }
            if state.kind != CASCADE_CLASSIFIER && state.kind != SHARED_IMAGE {
                return Err(format!("Unknown state kind '{}' for '{}'", state.kind, state.name));
            }
            if kinds.insert(state.name.as_str(), state.kind.as_str()).is_some() {
                return Err(format!("Duplicate state name '{}'", state.name));
            }
        }

        let process = &self.process;
        if let Some(name) = &process.detect_with {
            if kinds.get(name.as_str()) != Some(&CASCADE_CLASSIFIER) {
                return Err(format!("'detect_with' must name a {} state", CASCADE_CLASSIFIER));
            }
        }
        if let Some(name) = &process.overlay {
            if kinds.get(name.as_str()) != Some(&SHARED_IMAGE) {
                return Err(format!("'overlay' must name a {} state", SHARED_IMAGE));
            }
        }
        if (process.draw || process.overlay.is_some()) && process.detect_with.is_none() {
            return Err("'draw' and 'overlay' need 'detect_with'".to_string());
        }

        if self.output.dir.as_os_str().is_empty() {
            return Err("Output directory must not be empty".to_string());
        }
        if self.output.jpeg_quality == 0 || self.output.jpeg_quality > 100 {
            return Err("JPEG quality must be between 1 and 100".to_string());
        }
        if self.output.max_frames == Some(0) {
            return Err("max_frames must be positive".to_string());
        }
        Ok(())
    }
}

/// Applies detection, drawing and mounting to one frame record.
fn process_frame(
    registry: &Registry,
    ctx: &Context,
    process: &ProcessConfig,
    img: Map,
) -> streamcv_core::Result<Map> {
    let detector = match &process.detect_with {
        Some(name) => name,
        None => return Ok(img),
    };
    let rects = registry.call_udf(
        ctx,
        DETECT_MULTI_SCALE,
        &[Value::from(detector.as_str()), Value::Map(img.clone())],
    )?;

    let mut img = img;
    if process.draw {
        img = into_map(registry.call_udf(ctx, DRAW_RECTS, &[Value::Map(img), rects.clone()])?)?;
    }
    if let Some(overlay) = &process.overlay {
        img = into_map(registry.call_udf(
            ctx,
            MOUNT_IMAGE,
            &[Value::from(overlay.as_str()), Value::Map(img), rects],
        )?)?;
    }
    Ok(img)
}

fn into_map(value: Value) -> streamcv_core::Result<Map> {
    match value {
        Value::Map(map) => Ok(map),
        other => Err(CoreError::TypeCoercion {
            field: "image".to_string(),
            expected: "map",
            actual: other.type_name(),
        }),
    }
}

/// Runs `config` to completion and returns the number of frames written.
///
/// All shared states are terminated before returning, on success or failure.
pub fn run<B: VisionBackend>(
    config: &PipelineConfig,
    backend: Arc<B>,
    max_frames: Option<u64>,
) -> anyhow::Result<u64> {
    let ctx = Context::new();
    let mut registry = Registry::new();
    plugin::register(&mut registry, backend)?;

    let result = stream(config, &registry, &ctx, max_frames.or(config.output.max_frames));
    if let Err(e) = ctx.shared_states().terminate_all(&ctx) {
        warn!("Failed to terminate shared states: {}", e);
    }
    result
}

fn stream(
    config: &PipelineConfig,
    registry: &Registry,
    ctx: &Context,
    max_frames: Option<u64>,
) -> anyhow::Result<u64> {
    for state in &config.states {
        let created = registry
            .create_state(ctx, &state.kind, &to_params(&state.params))
            .with_context(|| format!("Failed to create state '{}'", state.name))?;
        ctx.shared_states().add(&state.name, created)?;
    }

    let source = registry
        .create_source(ctx, &config.source.kind, &to_params(&config.source.params))
        .with_context(|| format!("Failed to create source '{}'", config.source.kind))?;

    let out_dir = &config.output.dir;
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;

    let mut written: u64 = 0;
    let handle = source.clone();
    let mut writer = |ctx: &Context, tuple: Tuple| -> streamcv_core::Result<()> {
        let img = process_frame(registry, ctx, &config.process, tuple.data)?;
        let raw = RawData::from_map(&img)?;
        let jpeg = raw.to_jpeg(config.output.jpeg_quality)?;
        fs::write(out_dir.join(format!("frame_{:06}.jpg", written)), &*jpeg)?;
        written += 1;
        if max_frames == Some(written) {
            handle.stop(ctx)?;
        }
        Ok(())
    };

    info!(source = %config.source.kind, "Pipeline started");
    source
        .generate_stream(ctx, &mut writer)
        .with_context(|| format!("Source '{}' failed", config.source.kind))?;
    info!(frames = written, "Pipeline finished");
    Ok(written)
}
