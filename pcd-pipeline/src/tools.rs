//! Command lines for the external engines.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use itertools::Itertools as _;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub timeout: Duration,
    /// Artifact that must exist after a successful run.
    pub output: Option<PathBuf>,
}

fn arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

impl ToolInvocation {
    fn new(program: &str, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.to_string(),
            args,
            cwd: None,
            timeout,
            output: None,
        }
    }

    fn producing(mut self, output: &Path) -> Self {
        self.output = Some(output.to_path_buf());
        self
    }

    fn in_dir(mut self, cwd: Option<&Path>) -> Self {
        self.cwd = cwd.map(Path::to_path_buf);
        self
    }

    pub fn display(&self) -> String {
        std::iter::once(&self.program).chain(&self.args).join(" ")
    }

    pub fn pdal_summary(source: &Path, timeout: Duration) -> Self {
        Self::new("pdal", vec!["info".into(), "--summary".into(), arg(source)], timeout)
    }

    pub fn pdal_stats(source: &Path, dimensions: &[&str], timeout: Duration) -> Self {
        Self::new(
            "pdal",
            vec![
                "info".into(),
                "--stats".into(),
                "--dimensions".into(),
                dimensions.join(","),
                arg(source),
            ],
            timeout,
        )
    }

    pub fn pdal_pipeline(pipeline_file: &Path, output: &Path, timeout: Duration) -> Self {
        Self::new("pdal", vec!["pipeline".into(), arg(pipeline_file)], timeout).producing(output)
    }

    /// Runs next to the OBJ so relative MTL and texture paths resolve.
    /// Input is treated as Z-up.
    pub fn obj2gltf(obj: &Path, output: &Path, timeout: Duration) -> Self {
        Self::new(
            "obj2gltf",
            vec![
                "-i".into(),
                arg(obj),
                "-o".into(),
                arg(output),
                "--binary".into(),
                "--inputUpAxis".into(),
                "Z".into(),
            ],
            timeout,
        )
        .in_dir(obj.parent())
        .producing(output)
    }

    /// Quantized, texture-compressed and simplified to half the triangles.
    pub fn gltfpack(obj: &Path, output: &Path, timeout: Duration) -> Self {
        Self::new(
            "gltfpack",
            vec![
                "-i".into(),
                arg(obj),
                "-o".into(),
                arg(output),
                "-cc".into(),
                "-tc".into(),
                "-si".into(),
                "0.5".into(),
            ],
            timeout,
        )
        .in_dir(obj.parent())
        .producing(output)
    }

    pub fn texture_resize(input: &Path, output: &Path, max_size: u32, timeout: Duration) -> Self {
        Self::new(
            "npx",
            vec![
                "gltf-transform".into(),
                "resize".into(),
                arg(input),
                arg(output),
                "--width".into(),
                max_size.to_string(),
                "--height".into(),
                max_size.to_string(),
            ],
            timeout,
        )
        .producing(output)
    }

    pub fn texture_webp(input: &Path, output: &Path, timeout: Duration) -> Self {
        Self::new(
            "npx",
            vec!["gltf-transform".into(), "webp".into(), arg(input), arg(output)],
            timeout,
        )
        .producing(output)
    }

    /// Point-cloud tiling into `out_dir`, which must hold a `tileset.json`
    /// afterwards.
    pub fn py3dtiles(source: &Path, out_dir: &Path, srs_in: Option<u32>, timeout: Duration) -> Self {
        let mut args = vec!["convert".into(), arg(source), "--out".into(), arg(out_dir)];
        if let Some(epsg) = srs_in {
            args.push("--srs_in".into());
            args.push(epsg.to_string());
        }
        Self::new("py3dtiles", args, timeout).producing(&out_dir.join("tileset.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(600);

    #[test]
    fn obj2gltf_runs_in_obj_directory() {
        let tool = ToolInvocation::obj2gltf(
            Path::new("/tmp/work/model.obj"),
            Path::new("/out/model_uncompressed.glb"),
            TIMEOUT,
        );
        assert_eq!(
            tool.display(),
            "obj2gltf -i /tmp/work/model.obj -o /out/model_uncompressed.glb --binary --inputUpAxis Z"
        );
        assert_eq!(tool.cwd.as_deref(), Some(Path::new("/tmp/work")));
        assert_eq!(tool.output.as_deref(), Some(Path::new("/out/model_uncompressed.glb")));
    }

    #[test]
    fn gltfpack_arguments() {
        let tool = ToolInvocation::gltfpack(Path::new("/w/m.obj"), Path::new("/o/m.glb"), TIMEOUT);
        assert_eq!(tool.args[4..], ["-cc", "-tc", "-si", "0.5"]);
    }

    #[test]
    fn resize_uses_square_limit() {
        let tool = ToolInvocation::texture_resize(Path::new("a.glb"), Path::new("b.glb"), 2048, TIMEOUT);
        assert_eq!(
            tool.display(),
            "npx gltf-transform resize a.glb b.glb --width 2048 --height 2048"
        );
    }

    #[test]
    fn py3dtiles_with_and_without_srs() {
        let plain = ToolInvocation::py3dtiles(Path::new("a.las"), Path::new("/o/a_3dtiles"), None, TIMEOUT);
        assert_eq!(plain.display(), "py3dtiles convert a.las --out /o/a_3dtiles");
        assert_eq!(plain.output.as_deref(), Some(Path::new("/o/a_3dtiles/tileset.json")));

        let with_srs =
            ToolInvocation::py3dtiles(Path::new("a.las"), Path::new("/o/a_3dtiles"), Some(5186), TIMEOUT);
        assert!(with_srs.display().ends_with("--srs_in 5186"));
    }

    #[test]
    fn info_commands_have_no_artifact() {
        let summary = ToolInvocation::pdal_summary(Path::new("x.e57"), TIMEOUT);
        assert_eq!(summary.display(), "pdal info --summary x.e57");
        assert!(summary.output.is_none());

        let stats = ToolInvocation::pdal_stats(Path::new("x.e57"), &["Red", "Green", "Blue"], TIMEOUT);
        assert_eq!(stats.display(), "pdal info --stats --dimensions Red,Green,Blue x.e57");
    }
}
