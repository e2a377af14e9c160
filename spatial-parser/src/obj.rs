//! OBJ side files and vertex rewriting.

use std::{
    fs,
    io::{BufWriter, Write as _},
    path::{Path, PathBuf},
};

use rayon::prelude::*;

use crate::{mesh::parse_obj_vertex, ParseError};

const TEXTURE_KEYWORDS: [&str; 5] = ["bump", "disp", "decal", "refl", "norm"];

/// Raw lines of a text file, each without its line terminator. Files are read
/// as bytes since names and comments are often not UTF-8.
fn raw_lines(bytes: &[u8]) -> impl Iterator<Item = &[u8]> {
    let empty = bytes.is_empty();
    let body = bytes.strip_suffix(b"\n").unwrap_or(bytes);
    body.split(|b| *b == b'\n')
        .filter(move |_| !empty)
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
}

fn lossy_lines(path: &Path) -> Result<Vec<String>, ParseError> {
    let bytes = fs::read(path)?;
    Ok(raw_lines(&bytes)
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect())
}

/// Material libraries named by `mtllib` records, resolved against the OBJ
/// directory.
pub fn material_libraries(obj_path: &Path) -> Result<Vec<PathBuf>, ParseError> {
    let lines = lossy_lines(obj_path)?;
    let base = obj_path.parent().unwrap_or_else(|| Path::new(""));
    let mut libraries = Vec::new();
    for line in &lines {
        let Some(rest) = line.trim_start().strip_prefix("mtllib") else {
            continue;
        };
        let name = rest.trim();
        if !name.is_empty() {
            libraries.push(base.join(name));
        }
    }
    Ok(libraries)
}

/// Texture files referenced by a material library. Option flags such as
/// `-s 1 1 1` before the file name are skipped.
pub fn texture_references(mtl_path: &Path) -> Result<Vec<PathBuf>, ParseError> {
    let lines = lossy_lines(mtl_path)?;
    let base = mtl_path.parent().unwrap_or_else(|| Path::new(""));
    let mut textures: Vec<PathBuf> = Vec::new();
    for line in &lines {
        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else {
            continue;
        };
        let keyword = keyword.to_lowercase();
        if !keyword.starts_with("map_") && !TEXTURE_KEYWORDS.contains(&keyword.as_str()) {
            continue;
        }
        if let Some(file) = tokens.last().filter(|t| !t.starts_with('-')) {
            let path = base.join(file.replace('\\', "/"));
            if !textures.contains(&path) {
                textures.push(path);
            }
        }
    }
    Ok(textures)
}

fn rewrite_vertex<F>(line: &[u8], transform: &F) -> Option<Vec<u8>>
where
    F: Fn([f64; 3]) -> [f64; 3],
{
    let text = std::str::from_utf8(line).ok()?.trim();
    let position = parse_obj_vertex(text)?;
    let [x, y, z] = transform(position);
    let mut out = format!("v {x:.6} {y:.6} {z:.6}");
    for extra in text.split_whitespace().skip(4) {
        out.push(' ');
        out.push_str(extra);
    }
    Some(out.into_bytes())
}

/// Writes `src` to `dst` with every vertex passed through `transform`.
/// Other records are copied byte for byte. Returns the number of rewritten
/// vertices.
pub fn rewrite_vertices<F>(src: &Path, dst: &Path, transform: F) -> Result<u64, ParseError>
where
    F: Fn([f64; 3]) -> [f64; 3] + Sync,
{
    let bytes = fs::read(src)?;
    let lines: Vec<&[u8]> = raw_lines(&bytes).collect();

    let rewritten: Vec<Option<Vec<u8>>> = lines
        .par_iter()
        .map(|line| rewrite_vertex(line, &transform))
        .collect();

    let mut writer = BufWriter::new(fs::File::create(dst)?);
    let mut count = 0u64;
    for (line, vertex) in lines.iter().zip(&rewritten) {
        match vertex {
            Some(vertex) => {
                writer.write_all(vertex)?;
                count += 1;
            }
            None => writer.write_all(line)?,
        }
        writer.write_all(b"\n")?;
    }
    writer.flush()?;

    log::info!("rewrote {count} OBJ vertices: {:?} -> {:?}", src, dst);
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_material_libraries() {
        let dir = tempfile::tempdir().unwrap();
        let obj = dir.path().join("model.obj");
        fs::write(&obj, "mtllib model.mtl\n  mtllib extra.mtl\nv 0 0 0\n").unwrap();

        let libraries = material_libraries(&obj).unwrap();
        assert_eq!(
            libraries,
            vec![dir.path().join("model.mtl"), dir.path().join("extra.mtl")]
        );
    }

    #[test]
    fn rewrite_keeps_non_utf8_records() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.obj");
        let dst = dir.path().join("out.obj");
        let mut obj = b"mtllib \xb0\xc7\xb9\xb0.mtl\r\n".to_vec();
        obj.extend_from_slice(b"v 1 2 3\r\nusemtl \xc5\xd8\xbd\xba\xc3\xb3\nf 1 1 1\n");
        fs::write(&src, &obj).unwrap();

        let count = rewrite_vertices(&src, &dst, |[x, y, z]| [x, y, z + 1.0]).unwrap();
        assert_eq!(count, 1);

        let mut expected = b"mtllib \xb0\xc7\xb9\xb0.mtl\n".to_vec();
        expected.extend_from_slice(b"v 1.000000 2.000000 4.000000\nusemtl \xc5\xd8\xbd\xba\xc3\xb3\nf 1 1 1\n");
        assert_eq!(fs::read(&dst).unwrap(), expected);

        let libraries = material_libraries(&src).unwrap();
        assert_eq!(libraries.len(), 1);
    }

    #[test]
    fn finds_textures_with_options() {
        let dir = tempfile::tempdir().unwrap();
        let mtl = dir.path().join("model.mtl");
        fs::write(
            &mtl,
            "newmtl wall\nKd 1 1 1\nmap_Kd textures\\wall.jpg\nmap_Bump -bm 0.5 normal.png\nbump normal.png\n",
        )
        .unwrap();

        let textures = texture_references(&mtl).unwrap();
        assert_eq!(
            textures,
            vec![
                dir.path().join("textures/wall.jpg"),
                dir.path().join("normal.png")
            ]
        );
    }

    #[test]
    fn rewrites_only_vertices() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("in.obj");
        let dst = dir.path().join("out.obj");
        fs::write(
            &src,
            "mtllib a.mtl\nv 1 2 3\nvt 0.5 0.5\nv 4 5 6 0.1 0.2 0.3\nf 1 2\n",
        )
        .unwrap();

        let count = rewrite_vertices(&src, &dst, |[x, y, z]| [x - 1.0, y * 2.0, z]).unwrap();
        assert_eq!(count, 2);

        let out = fs::read_to_string(&dst).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(
            lines,
            vec![
                "mtllib a.mtl",
                "v 0.000000 4.000000 3.000000",
                "vt 0.5 0.5",
                "v 3.000000 10.000000 6.000000 0.1 0.2 0.3",
                "f 1 2",
            ]
        );
    }
}
