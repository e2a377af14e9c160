//! Mesh to 3D Tiles: OBJ preparation, the engine fallback chain and the
//! single-tile descriptors.

use std::{
    fs,
    path::{Path, PathBuf},
};

use coordinate_transformer::{LocalMetersProjection, MeshPlacement};
use pcd_pipeline::ToolInvocation;
use serde_json::json;
use spatial_core::{BoundingVolume, CoordinateClassification, SourceFormat, SpatialProfile};
use spatial_parser::obj;
use tempfile::TempDir;
use tileset_exporter::{write_tileset, Tileset};

use crate::{
    analysis::{describe, resolve_format, Analyzer},
    artifact::PartialArtifact,
    exec::run_checked,
    orchestrator::{ConversionRequest, Context},
    ConversionResult, ConvertError,
};

/// Half size of the box used for meshes with no known placement.
const DEFAULT_HALF_EXTENT: f64 = 100.0;

fn default_volume() -> BoundingVolume {
    BoundingVolume::aligned_box([0.0; 3], [DEFAULT_HALF_EXTENT; 3])
}

fn source_stem(source: &Path) -> String {
    source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "model".to_string())
}

fn tiles_dir(ctx: &Context, source: &Path) -> Result<PartialArtifact, ConvertError> {
    let dir = ctx.config.output_dir.join(format!("{}_3dtiles", source_stem(source)));
    fs::create_dir_all(&dir)?;
    Ok(PartialArtifact::new(dir))
}

fn copy_into(file: &Path, dir: &Path) -> Result<PathBuf, ConvertError> {
    let name = file
        .file_name()
        .ok_or_else(|| ConvertError::Internal(format!("not a file: {file:?}")))?;
    let dest = dir.join(name);
    fs::copy(file, &dest)?;
    Ok(dest)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// glTF and GLB are already viewer formats: the model is copied next to a
/// one-tile descriptor.
pub(crate) fn model_to_3dtiles(
    ctx: &Context,
    request: &ConversionRequest,
) -> Result<ConversionResult, ConvertError> {
    let format = resolve_format(&request.source, &request.options, request.conversion_type)?;
    if !matches!(format, SourceFormat::Gltf | SourceFormat::Glb) {
        return Err(ConvertError::UnsupportedSourceFormat(format.to_string()));
    }
    ctx.progress.report(10);

    let profile = Analyzer {
        runner: ctx.runner,
        config: ctx.config,
    }
    .mesh(&request.source, format);
    let volume = match profile.usable_bbox() {
        Some(bbox) => BoundingVolume::aligned_box(bbox.center(), bbox.ranges().map(|r| r / 2.0)),
        None => spatial_core::volume::WORLD_REGION,
    };

    let out_dir = tiles_dir(ctx, &request.source)?;
    let model_name = match request.source.extension() {
        Some(_) => file_name(&request.source),
        None => format!("{}.{}", source_stem(&request.source), format.extension()),
    };
    let model = out_dir.path().join(&model_name);
    fs::copy(&request.source, &model)?;
    for sibling in &request.siblings {
        copy_into(sibling, out_dir.path())?;
    }
    ctx.progress.report(60);

    let tileset_path = write_tileset(out_dir.path(), &Tileset::single(&model_name, volume))?;
    ctx.progress.report(90);

    Ok(ConversionResult::succeeded(out_dir.keep())
        .with_metadata("tileset_path", tileset_path.to_string_lossy())
        .with_metadata("model_path", model.to_string_lossy())
        .with_metadata("format", "3dtiles")
        .with_spatial_info(&describe(&profile, request.options.epsg, true)))
}

/// OBJ plus its side files gathered in a private work directory, removed
/// on drop.
struct PreparedObj {
    obj: PathBuf,
    work_dir: Option<TempDir>,
}

impl PreparedObj {
    fn prepare(ctx: &Context, request: &ConversionRequest) -> Result<Self, ConvertError> {
        fs::create_dir_all(&ctx.config.temp_dir)?;
        let work_dir = tempfile::Builder::new()
            .prefix("obj_prep_")
            .tempdir_in(&ctx.config.temp_dir)?;

        let mut name = request
            .options
            .original_name
            .clone()
            .unwrap_or_else(|| file_name(&request.source));
        if !name.to_lowercase().ends_with(".obj") {
            name.push_str(".obj");
        }
        let obj = work_dir.path().join(&name);
        fs::copy(&request.source, &obj)?;
        for sibling in &request.siblings {
            copy_into(sibling, work_dir.path())?;
        }
        log::info!("prepared OBJ in {:?} with {} side files", work_dir.path(), request.siblings.len());

        check_references(&obj);
        Ok(Self {
            obj,
            work_dir: Some(work_dir),
        })
    }

    fn unprepared(source: &Path) -> Self {
        Self {
            obj: source.to_path_buf(),
            work_dir: None,
        }
    }

    /// Rewrites lon/lat/alt vertices into meters around the center, with
    /// heights centered on zero.
    fn localize(&self, profile: &SpatialProfile) -> Result<(), ConvertError> {
        let Some(work_dir) = &self.work_dir else {
            return Err(ConvertError::Internal("OBJ was not prepared".to_string()));
        };
        let projection = LocalMetersProjection::for_profile(profile)
            .map_err(|_| ConvertError::InvalidBounds)?;
        let center_z = profile
            .usable_bbox()
            .map(|b| b.center()[2])
            .ok_or(ConvertError::InvalidBounds)?;

        let localized = work_dir.path().join("localized.obj.tmp");
        obj::rewrite_vertices(&self.obj, &localized, |[lon, lat, alt]| {
            let [x, y, _] = projection.project(lon, lat, alt);
            [x, y, alt - center_z]
        })?;
        fs::rename(&localized, &self.obj)?;
        Ok(())
    }

    fn dir(&self) -> Option<&Path> {
        self.work_dir.as_ref().map(TempDir::path)
    }
}

impl Drop for PreparedObj {
    fn drop(&mut self) {
        if let Some(dir) = &self.work_dir {
            log::info!("cleaning OBJ work directory {:?}", dir.path());
        }
    }
}

/// Logs material and texture references, warning about the ones that were
/// not supplied.
fn check_references(obj_path: &Path) {
    let libraries = match obj::material_libraries(obj_path) {
        Ok(libraries) => libraries,
        Err(e) => {
            log::warn!("could not read mtllib records: {e}");
            return;
        }
    };
    log::info!("material libraries: {:?}", libraries);
    for library in libraries {
        if !library.exists() {
            log::warn!("material library not supplied: {:?}", library);
            continue;
        }
        match obj::texture_references(&library) {
            Ok(textures) => {
                log::info!("textures referenced by {:?}: {:?}", library, textures);
                for texture in textures.iter().filter(|t| !t.exists()) {
                    log::warn!("texture not supplied: {:?}", texture);
                }
            }
            Err(e) => log::warn!("could not read {:?}: {e}", library),
        }
    }
}

struct MeshJob<'a> {
    ctx: &'a Context<'a>,
    obj: &'a Path,
    out_dir: &'a Path,
    stem: String,
}

impl MeshJob<'_> {
    fn glb(&self, suffix: &str) -> PathBuf {
        self.out_dir.join(format!("{}{suffix}.glb", self.stem))
    }
}

type MeshStrategy = fn(&MeshJob) -> Result<PathBuf, ConvertError>;

/// Tried in order; the first GLB produced wins.
const MESH_ENGINES: [(&str, MeshStrategy); 2] = [("obj2gltf", primary_engine), ("gltfpack", secondary_engine)];

fn primary_engine(job: &MeshJob) -> Result<PathBuf, ConvertError> {
    let config = job.ctx.config;
    let uncompressed = PartialArtifact::new(job.glb("_uncompressed"));
    run_checked(
        job.ctx.runner,
        &ToolInvocation::obj2gltf(job.obj, uncompressed.path(), config.mesh_timeout),
    )?;

    let target = job.glb("");
    if config.compress_textures {
        match compress_textures(job, uncompressed.path(), &target) {
            Ok(()) => return Ok(target),
            Err(e) => log::warn!("texture compression failed, keeping uncompressed GLB: {e}"),
        }
    }
    fs::rename(uncompressed.keep(), &target)?;
    Ok(target)
}

fn compress_textures(job: &MeshJob, input: &Path, target: &Path) -> Result<(), ConvertError> {
    let config = job.ctx.config;
    let resized = PartialArtifact::new(job.glb("_resized"));
    let resize = ToolInvocation::texture_resize(input, resized.path(), config.max_texture_size, config.pack_timeout);
    let webp_input = match run_checked(job.ctx.runner, &resize) {
        Ok(_) => resized.path(),
        Err(e) => {
            log::warn!("texture resize failed: {e}");
            input
        }
    };

    let compressed = PartialArtifact::new(target);
    run_checked(
        job.ctx.runner,
        &ToolInvocation::texture_webp(webp_input, compressed.path(), config.mesh_timeout),
    )?;
    compressed.keep();
    log::info!("textures compressed: {:?}", target);
    Ok(())
}

fn secondary_engine(job: &MeshJob) -> Result<PathBuf, ConvertError> {
    let output = PartialArtifact::new(job.glb(""));
    run_checked(
        job.ctx.runner,
        &ToolInvocation::gltfpack(job.obj, output.path(), job.ctx.config.pack_timeout),
    )?;
    Ok(output.keep())
}

fn run_engines(job: &MeshJob) -> Option<PathBuf> {
    for (name, strategy) in MESH_ENGINES {
        match strategy(job) {
            Ok(glb) => {
                log::info!("{name} produced {:?}", glb);
                return Some(glb);
            }
            Err(e) if e.is_recoverable() => log::info!("{name} unavailable, trying next: {e}"),
            Err(e) => log::warn!("{name} failed, trying next: {e}"),
        }
        job.ctx.progress.report(50);
    }
    None
}

pub(crate) fn obj_to_3dtiles(
    ctx: &Context,
    request: &ConversionRequest,
) -> Result<ConversionResult, ConvertError> {
    let format = resolve_format(&request.source, &request.options, request.conversion_type)?;
    if format != SourceFormat::Obj {
        return Err(ConvertError::UnsupportedSourceFormat(format.to_string()));
    }
    ctx.progress.report(5);

    let prepared = PreparedObj::prepare(ctx, request).unwrap_or_else(|e| {
        log::warn!("OBJ preparation failed, using the source as is: {e}");
        PreparedObj::unprepared(&request.source)
    });

    let profile = Analyzer {
        runner: ctx.runner,
        config: ctx.config,
    }
    .mesh(&prepared.obj, SourceFormat::Obj);
    let placement = georeference(&prepared, &profile);
    ctx.progress.report(15);

    let out_dir = tiles_dir(ctx, &request.source)?;
    let job = MeshJob {
        ctx,
        obj: &prepared.obj,
        out_dir: out_dir.path(),
        stem: source_stem(&request.source),
    };
    let glb = run_engines(&job);
    ctx.progress.report(60);

    let (volume, transform) = match &placement {
        Some(p) => (p.bounding_volume, Some(p.transform.to_column_major())),
        None => (default_volume(), None),
    };

    let result = match glb {
        Some(glb) => {
            let mut tileset = Tileset::single(&file_name(&glb), volume);
            if let Some(transform) = transform {
                tileset = tileset.with_transform(transform);
            }
            let tileset_path = write_tileset(out_dir.path(), &tileset)?;
            ConversionResult::succeeded(out_dir.keep())
                .with_metadata("tileset_path", tileset_path.to_string_lossy())
                .with_metadata("glb_path", glb.to_string_lossy())
                .with_metadata("format", "3dtiles_glb")
        }
        None => {
            log::info!("no mesh engine succeeded, writing a raw OBJ tileset");
            let model = raw_passthrough(&prepared, request, out_dir.path())?;
            ctx.progress.report(70);
            let mut tileset = Tileset::single(&file_name(&model), volume).with_extras(json!({ "format": "obj" }));
            if let Some(transform) = transform {
                tileset = tileset.with_transform(transform);
            }
            let tileset_path = write_tileset(out_dir.path(), &tileset)?;
            ConversionResult::succeeded(out_dir.keep())
                .with_metadata("tileset_path", tileset_path.to_string_lossy())
                .with_metadata("model_path", model.to_string_lossy())
                .with_metadata("format", "obj_tileset")
        }
    };
    drop(prepared);
    ctx.progress.report(95);

    Ok(result.with_spatial_info(&describe(&profile, request.options.epsg, true)))
}

/// Placement for an OBJ authored in lon/lat/alt. On success the prepared
/// copy has been rewritten into centered local meters.
fn georeference(prepared: &PreparedObj, profile: &SpatialProfile) -> Option<MeshPlacement> {
    if profile.classification != CoordinateClassification::Geographic {
        return None;
    }
    let placement = match MeshPlacement::from_profile(profile) {
        Ok(placement) => placement,
        Err(e) => {
            log::warn!("cannot place mesh: {e}");
            return None;
        }
    };
    match prepared.localize(profile) {
        Ok(()) => Some(placement),
        Err(e) => {
            log::warn!("vertex localization failed, placing mesh without transform: {e}");
            None
        }
    }
}

/// Copies the prepared OBJ and its side files into `out_dir`; returns the
/// copied OBJ.
fn raw_passthrough(
    prepared: &PreparedObj,
    request: &ConversionRequest,
    out_dir: &Path,
) -> Result<PathBuf, ConvertError> {
    match prepared.dir() {
        Some(work_dir) => {
            for entry in fs::read_dir(work_dir)? {
                let path = entry?.path();
                if path.is_file() {
                    copy_into(&path, out_dir)?;
                }
            }
            Ok(out_dir.join(file_name(&prepared.obj)))
        }
        None => {
            for sibling in &request.siblings {
                copy_into(sibling, out_dir)?;
            }
            copy_into(&request.source, out_dir)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{exec::testing::*, ConversionOptions, ConverterConfig, Progress};
    use spatial_core::ConversionType;
    use tileset_exporter::TileBoundingVolume;

    const LOCAL_OBJ: &str = "mtllib model.mtl\nv 1000 1000 0\nv 1010 1000 0\nv 1010 1010 5\nf 1 2 3\n";
    const GEO_OBJ: &str = "v 127.000 37.000 10\nv 127.002 37.000 10\nv 127.002 37.002 30\nf 1 2 3\n";

    struct Fixture {
        _root: tempfile::TempDir,
        config: ConverterConfig,
        request: ConversionRequest,
    }

    fn fixture(obj: &str) -> Fixture {
        let root = tempfile::tempdir().unwrap();
        let config = ConverterConfig::default().with_dirs(root.path().join("out"), root.path().join("tmp"));
        config.ensure_dirs().unwrap();
        let uploads = root.path().join("uploads");
        fs::create_dir_all(&uploads).unwrap();
        let source = uploads.join("a1b2c3");
        fs::write(&source, obj).unwrap();
        let mtl = uploads.join("model.mtl");
        fs::write(&mtl, "newmtl wall\nmap_Kd wall.jpg\n").unwrap();
        let texture = uploads.join("wall.jpg");
        fs::write(&texture, b"jpeg").unwrap();
        let request = ConversionRequest {
            source,
            conversion_type: ConversionType::ObjTo3dtiles,
            options: ConversionOptions {
                original_format: Some("obj".into()),
                original_name: Some("building".into()),
                ..Default::default()
            },
            siblings: vec![mtl, texture],
        };
        Fixture {
            _root: root,
            config,
            request,
        }
    }

    fn read_tileset(result: &ConversionResult) -> serde_json::Value {
        let path = result.metadata["tileset_path"].as_str().unwrap();
        serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    fn convert(f: &Fixture, runner: &ScriptedRunner) -> Result<ConversionResult, ConvertError> {
        let progress = Progress::silent();
        let ctx = Context {
            config: &f.config,
            runner,
            progress: &progress,
        };
        obj_to_3dtiles(&ctx, &f.request)
    }

    fn out_files(result: &ConversionResult) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(result.output_path.as_ref().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn unavailable_primary_falls_back_to_secondary() {
        let f = fixture(LOCAL_OBJ);
        let runner = ScriptedRunner::new(|inv| match inv.program.as_str() {
            "obj2gltf" => missing(inv),
            "gltfpack" => {
                let obj = Path::new(&inv.args[1]);
                assert_eq!(obj.file_name().unwrap(), "building.obj");
                assert!(obj.with_file_name("model.mtl").exists());
                assert!(obj.with_file_name("wall.jpg").exists());
                succeed(inv)
            }
            _ => fail(inv),
        });

        let result = convert(&f, &runner).unwrap();
        assert_eq!(runner.programs(), vec!["obj2gltf", "gltfpack"]);
        assert_eq!(result.metadata["format"], "3dtiles_glb");
        assert_eq!(out_files(&result), vec!["a1b2c3.glb", "tileset.json"]);

        let tileset = read_tileset(&result);
        assert_eq!(tileset["root"]["content"]["uri"], "a1b2c3.glb");
        assert_eq!(tileset["root"]["boundingVolume"]["box"][3], 100.0);
        assert!(tileset["root"].get("transform").is_none());
        assert_eq!(fs::read_dir(&f.config.temp_dir).unwrap().count(), 0);
    }

    #[test]
    fn primary_success_never_reaches_passthrough() {
        let f = fixture(LOCAL_OBJ);
        let runner = ScriptedRunner::new(succeed);

        let result = convert(&f, &runner).unwrap();
        assert_eq!(runner.programs(), vec!["obj2gltf", "npx", "npx"]);
        assert_eq!(result.metadata["format"], "3dtiles_glb");
        // Intermediate GLBs are gone.
        assert_eq!(out_files(&result), vec!["a1b2c3.glb", "tileset.json"]);
    }

    #[test]
    fn failed_compression_keeps_uncompressed_glb() {
        let f = fixture(LOCAL_OBJ);
        let runner = ScriptedRunner::new(|inv| match inv.program.as_str() {
            "npx" if inv.args[1] == "webp" => {
                succeed(inv)?;
                fail(inv)
            }
            "npx" => fail(inv),
            _ => succeed(inv),
        });

        let result = convert(&f, &runner).unwrap();
        assert_eq!(runner.programs(), vec!["obj2gltf", "npx", "npx"]);
        let webp = &runner.calls()[2];
        assert!(webp.args[2].ends_with("a1b2c3_uncompressed.glb"));
        assert_eq!(out_files(&result), vec!["a1b2c3.glb", "tileset.json"]);
    }

    #[test]
    fn no_engine_means_raw_obj_tileset() {
        let f = fixture(LOCAL_OBJ);
        let runner = ScriptedRunner::new(|inv| match inv.program.as_str() {
            "obj2gltf" => {
                // Leaves a half-written file behind before failing.
                succeed(inv)?;
                fail(inv)
            }
            _ => missing(inv),
        });

        let result = convert(&f, &runner).unwrap();
        assert_eq!(runner.programs(), vec!["obj2gltf", "gltfpack"]);
        assert_eq!(result.metadata["format"], "obj_tileset");
        assert_eq!(
            out_files(&result),
            vec!["building.obj", "model.mtl", "tileset.json", "wall.jpg"]
        );
        let tileset = read_tileset(&result);
        assert_eq!(tileset["asset"]["extras"]["format"], "obj");
        assert_eq!(tileset["root"]["content"]["uri"], "building.obj");
        assert_eq!(
            result.spatial_info().unwrap().classification,
            CoordinateClassification::Unknown
        );
    }

    #[test]
    fn geographic_obj_is_localized_and_placed() {
        let f = fixture(GEO_OBJ);
        let runner = ScriptedRunner::new(|inv| match inv.program.as_str() {
            "obj2gltf" => {
                let text = fs::read_to_string(&inv.args[1]).unwrap();
                let heights: Vec<f64> = text
                    .lines()
                    .filter_map(spatial_parser::mesh::parse_obj_vertex)
                    .map(|[x, y, z]| {
                        assert!(x.abs() < 200.0 && y.abs() < 200.0, "{x} {y}");
                        z
                    })
                    .collect();
                assert_eq!(heights, vec![-10.0, -10.0, 10.0]);
                succeed(inv)
            }
            _ => fail(inv),
        });

        let result = convert(&f, &runner).unwrap();
        let tileset = read_tileset(&result);
        let transform = tileset["root"]["transform"].as_array().unwrap();
        assert_eq!(transform.len(), 16);
        assert_eq!(transform[15], 1.0);
        assert!(tileset["root"]["boundingVolume"]["box"].is_array());
        let info = result.spatial_info().unwrap();
        assert_eq!(info.classification, CoordinateClassification::Geographic);
        assert_eq!(info.vertex_count, Some(3));
    }

    #[test]
    fn engine_timeout_is_not_fatal() {
        let f = fixture(LOCAL_OBJ);
        let runner = ScriptedRunner::new(|inv| match inv.program.as_str() {
            "obj2gltf" => Err(ConvertError::Timeout {
                engine: "obj2gltf".into(),
                seconds: 600,
            }),
            _ => succeed(inv),
        });
        let result = convert(&f, &runner).unwrap();
        assert_eq!(runner.programs(), vec!["obj2gltf", "gltfpack"]);
        assert!(result.success);
    }

    #[test]
    fn glb_passthrough_uses_extracted_box() {
        let root = tempfile::tempdir().unwrap();
        let config = ConverterConfig::default().with_dirs(root.path().join("out"), root.path().join("tmp"));
        config.ensure_dirs().unwrap();
        let source = root.path().join("tower.gltf");
        fs::write(
            &source,
            r#"{"asset": {"version": "2.0"},
                "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
                "accessors": [{"count": 8, "min": [-1, 0, -2], "max": [1, 10, 2]}]}"#,
        )
        .unwrap();
        let runner = ScriptedRunner::new(fail);
        let progress = Progress::silent();
        let ctx = Context {
            config: &config,
            runner: &runner,
            progress: &progress,
        };
        let request = ConversionRequest {
            source,
            conversion_type: ConversionType::GltfTo3dtiles,
            options: ConversionOptions::default(),
            siblings: vec![],
        };

        let result = model_to_3dtiles(&ctx, &request).unwrap();
        assert_eq!(result.metadata["format"], "3dtiles");
        assert!(runner.calls().is_empty());
        let tileset: Tileset = serde_json::from_value(read_tileset(&result)).unwrap();
        assert_eq!(
            tileset.root.bounding_volume,
            TileBoundingVolume {
                bx: Some([0.0, 5.0, 0.0, 1.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 2.0]),
                region: None,
            }
        );
        assert_eq!(tileset.root.content.unwrap().uri, "tower.gltf");
    }

    #[test]
    fn unreadable_model_gets_world_region() {
        let root = tempfile::tempdir().unwrap();
        let config = ConverterConfig::default().with_dirs(root.path().join("out"), root.path().join("tmp"));
        let source = root.path().join("f00d");
        fs::write(&source, b"not a glb").unwrap();
        let runner = ScriptedRunner::new(fail);
        let progress = Progress::silent();
        let ctx = Context {
            config: &config,
            runner: &runner,
            progress: &progress,
        };
        let request = ConversionRequest {
            source,
            conversion_type: ConversionType::GlbTo3dtiles,
            options: ConversionOptions::default(),
            siblings: vec![],
        };

        let result = model_to_3dtiles(&ctx, &request).unwrap();
        let tileset = read_tileset(&result);
        assert_eq!(tileset["root"]["content"]["uri"], "f00d.glb");
        assert_eq!(tileset["root"]["boundingVolume"]["region"][5], 1000.0);
    }
}
