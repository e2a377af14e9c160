//! Vertex extent and count of a mesh, read directly from the file so no
//! external tool is needed.

use std::{
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
};

use byteorder::{BigEndian, ByteOrder, LittleEndian, ReadBytesExt as _};
use serde::Deserialize;
use spatial_core::{BoundingBox, SourceFormat};

use crate::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub struct MeshSummary {
    /// `None` when the mesh has no vertices.
    pub bbox: Option<BoundingBox>,
    pub vertex_count: u64,
}

impl MeshSummary {
    fn from_accumulator(bbox: BoundingBox, vertex_count: u64) -> Self {
        Self {
            bbox: (vertex_count > 0).then_some(bbox),
            vertex_count,
        }
    }
}

pub fn extract(path: &Path, format: SourceFormat) -> Result<MeshSummary, ParseError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let summary = match format {
        SourceFormat::Obj => extract_obj(reader)?,
        SourceFormat::Ply => extract_ply(reader)?,
        SourceFormat::Gltf => extract_gltf(reader)?,
        SourceFormat::Glb => extract_glb(reader)?,
        other => {
            return Err(ParseError::format(format!(
                "{other} is not a mesh format"
            )))
        }
    };
    log::info!(
        "mesh extent extracted: path={:?} vertices={} bbox={:?}",
        path,
        summary.vertex_count,
        summary.bbox
    );
    Ok(summary)
}

/// Parses an OBJ `v` record into its coordinates. Trailing vertex colors or
/// weights are ignored.
pub fn parse_obj_vertex(line: &str) -> Option<[f64; 3]> {
    let rest = line.strip_prefix("v ").or_else(|| line.strip_prefix("v\t"))?;
    let mut fields = rest.split_whitespace().map(str::parse::<f64>);
    let x = fields.next()?.ok()?;
    let y = fields.next()?.ok()?;
    let z = fields.next()?.ok()?;
    Some([x, y, z])
}

/// Lines are decoded lossily: material names and comments are often in a
/// legacy encoding, and only `v` records matter here.
pub fn extract_obj<R: BufRead>(mut reader: R) -> Result<MeshSummary, ParseError> {
    let mut bbox = BoundingBox::empty();
    let mut count = 0u64;
    let mut buf = Vec::new();
    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        if let Some([x, y, z]) = parse_obj_vertex(line.trim()) {
            bbox.update(x, y, z);
            count += 1;
        }
    }
    Ok(MeshSummary::from_accumulator(bbox, count))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PlyEncoding {
    Ascii,
    BinaryLittleEndian,
    BinaryBigEndian,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PlyScalar {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    F32,
    F64,
}

impl PlyScalar {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "char" | "int8" => Some(Self::I8),
            "uchar" | "uint8" => Some(Self::U8),
            "short" | "int16" => Some(Self::I16),
            "ushort" | "uint16" => Some(Self::U16),
            "int" | "int32" => Some(Self::I32),
            "uint" | "uint32" => Some(Self::U32),
            "float" | "float32" => Some(Self::F32),
            "double" | "float64" => Some(Self::F64),
            _ => None,
        }
    }

    fn read<B: ByteOrder, R: Read>(&self, reader: &mut R) -> std::io::Result<f64> {
        Ok(match self {
            Self::I8 => reader.read_i8()? as f64,
            Self::U8 => reader.read_u8()? as f64,
            Self::I16 => reader.read_i16::<B>()? as f64,
            Self::U16 => reader.read_u16::<B>()? as f64,
            Self::I32 => reader.read_i32::<B>()? as f64,
            Self::U32 => reader.read_u32::<B>()? as f64,
            Self::F32 => reader.read_f32::<B>()? as f64,
            Self::F64 => reader.read_f64::<B>()?,
        })
    }
}

#[derive(Debug)]
struct PlyHeader {
    encoding: PlyEncoding,
    vertex_count: u64,
    vertex_properties: Vec<(String, PlyScalar)>,
    // Elements declared before `vertex` would have to be skipped first.
    vertex_is_first: bool,
}

fn read_ply_header<R: BufRead>(reader: &mut R) -> Result<PlyHeader, ParseError> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    if line.trim() != "ply" {
        return Err(ParseError::format("missing `ply` magic"));
    }

    let mut encoding = None;
    let mut vertex_count = None;
    let mut vertex_properties = Vec::new();
    let mut current_element = String::new();
    let mut elements_seen = 0usize;
    let mut vertex_is_first = false;

    loop {
        line.clear();
        if reader.read_line(&mut line)? == 0 {
            return Err(ParseError::format("unterminated PLY header"));
        }
        let tokens: Vec<&str> = line.split_whitespace().collect();
        match tokens.as_slice() {
            ["end_header"] => break,
            ["format", kind, _version] => {
                encoding = Some(match *kind {
                    "ascii" => PlyEncoding::Ascii,
                    "binary_little_endian" => PlyEncoding::BinaryLittleEndian,
                    "binary_big_endian" => PlyEncoding::BinaryBigEndian,
                    other => {
                        return Err(ParseError::format(format!("unknown PLY format {other}")))
                    }
                });
            }
            ["element", name, count] => {
                current_element = name.to_string();
                if *name == "vertex" {
                    vertex_is_first = elements_seen == 0;
                    vertex_count = Some(count.parse::<u64>().map_err(|_| {
                        ParseError::format(format!("bad vertex count {count}"))
                    })?);
                }
                elements_seen += 1;
            }
            ["property", "list", ..] if current_element == "vertex" => {
                return Err(ParseError::format("list properties on vertices are not supported"));
            }
            ["property", kind, name] if current_element == "vertex" => {
                let scalar = PlyScalar::parse(kind)
                    .ok_or_else(|| ParseError::format(format!("unknown PLY type {kind}")))?;
                vertex_properties.push((name.to_string(), scalar));
            }
            _ => {}
        }
    }

    Ok(PlyHeader {
        encoding: encoding.ok_or_else(|| ParseError::format("PLY header has no format"))?,
        vertex_count: vertex_count.unwrap_or(0),
        vertex_properties,
        vertex_is_first,
    })
}

pub fn extract_ply<R: BufRead>(mut reader: R) -> Result<MeshSummary, ParseError> {
    let header = read_ply_header(&mut reader)?;
    if header.vertex_count == 0 {
        return Ok(MeshSummary::from_accumulator(BoundingBox::empty(), 0));
    }
    if !header.vertex_is_first {
        return Err(ParseError::format("vertex element must come first"));
    }

    let position_of = |axis: &str| {
        header
            .vertex_properties
            .iter()
            .position(|(name, _)| name == axis)
            .ok_or_else(|| ParseError::format(format!("vertex has no `{axis}` property")))
    };
    let axes = [position_of("x")?, position_of("y")?, position_of("z")?];

    let mut bbox = BoundingBox::empty();
    let mut values = vec![0.0; header.vertex_properties.len()];

    for _ in 0..header.vertex_count {
        match header.encoding {
            PlyEncoding::Ascii => {
                let mut line = String::new();
                if reader.read_line(&mut line)? == 0 {
                    return Err(ParseError::format("PLY ends before all vertices"));
                }
                let tokens: Vec<&str> = line.split_whitespace().collect();
                if tokens.len() < values.len() {
                    return Err(ParseError::format(format!(
                        "PLY vertex row has {} values, expected {}",
                        tokens.len(),
                        values.len()
                    )));
                }
                for (slot, token) in values.iter_mut().zip(tokens) {
                    *slot = token
                        .parse()
                        .map_err(|_| ParseError::format(format!("bad PLY value {token}")))?;
                }
            }
            PlyEncoding::BinaryLittleEndian => {
                for (slot, (_, scalar)) in values.iter_mut().zip(&header.vertex_properties) {
                    *slot = scalar.read::<LittleEndian, _>(&mut reader)?;
                }
            }
            PlyEncoding::BinaryBigEndian => {
                for (slot, (_, scalar)) in values.iter_mut().zip(&header.vertex_properties) {
                    *slot = scalar.read::<BigEndian, _>(&mut reader)?;
                }
            }
        }
        bbox.update(values[axes[0]], values[axes[1]], values[axes[2]]);
    }

    Ok(MeshSummary::from_accumulator(bbox, header.vertex_count))
}

#[derive(Debug, Deserialize)]
struct GltfAccessor {
    count: u64,
    min: Option<Vec<f64>>,
    max: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
struct GltfPrimitive {
    attributes: std::collections::HashMap<String, usize>,
}

#[derive(Debug, Deserialize)]
struct GltfMesh {
    primitives: Vec<GltfPrimitive>,
}

#[derive(Debug, Deserialize)]
struct GltfDocument {
    #[serde(default)]
    accessors: Vec<GltfAccessor>,
    #[serde(default)]
    meshes: Vec<GltfMesh>,
}

// Node transforms are not applied: the extent is that of the raw positions.
fn summarize_gltf(document: &GltfDocument) -> Result<MeshSummary, ParseError> {
    let mut bbox = BoundingBox::empty();
    let mut count = 0u64;
    for primitive in document.meshes.iter().flat_map(|m| &m.primitives) {
        let Some(&index) = primitive.attributes.get("POSITION") else {
            continue;
        };
        let accessor = document
            .accessors
            .get(index)
            .ok_or_else(|| ParseError::format(format!("POSITION accessor {index} is missing")))?;
        if let (Some(min), Some(max)) = (&accessor.min, &accessor.max) {
            if min.len() >= 3 && max.len() >= 3 {
                bbox.update(min[0], min[1], min[2]);
                bbox.update(max[0], max[1], max[2]);
            }
        }
        count += accessor.count;
    }
    Ok(MeshSummary::from_accumulator(bbox, count))
}

pub fn extract_gltf<R: Read>(reader: R) -> Result<MeshSummary, ParseError> {
    let document: GltfDocument = serde_json::from_reader(reader)?;
    summarize_gltf(&document)
}

const GLB_MAGIC: u32 = 0x4654_6C67; // "glTF"
const GLB_CHUNK_JSON: u32 = 0x4E4F_534A; // "JSON"
const GLB_JSON_OFFSET: u64 = 20;

pub fn extract_glb<R: Read>(mut reader: R) -> Result<MeshSummary, ParseError> {
    let magic = reader.read_u32::<LittleEndian>()?;
    if magic != GLB_MAGIC {
        return Err(ParseError::format("missing glTF binary magic"));
    }
    let version = reader.read_u32::<LittleEndian>()?;
    if version != 2 {
        return Err(ParseError::format(format!("unsupported GLB version {version}")));
    }
    let total_length = reader.read_u32::<LittleEndian>()?;

    let chunk_length = reader.read_u32::<LittleEndian>()?;
    let chunk_type = reader.read_u32::<LittleEndian>()?;
    if chunk_type != GLB_CHUNK_JSON {
        return Err(ParseError::format("first GLB chunk is not JSON"));
    }
    // The chunk must fit after the 12-byte header and 8-byte chunk header.
    if u64::from(chunk_length) + GLB_JSON_OFFSET > u64::from(total_length) {
        return Err(ParseError::format(format!(
            "GLB JSON chunk of {chunk_length} bytes exceeds declared length {total_length}"
        )));
    }
    let mut json = Vec::new();
    reader
        .take(u64::from(chunk_length))
        .read_to_end(&mut json)?;
    if json.len() != chunk_length as usize {
        return Err(ParseError::format("GLB ends inside the JSON chunk"));
    }

    let document: GltfDocument = serde_json::from_slice(&json)?;
    summarize_gltf(&document)
}
