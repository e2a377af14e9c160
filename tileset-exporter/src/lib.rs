pub mod tileset;

pub use tileset::{write_tileset, Asset, Content, Refine, Tile, TileBoundingVolume, Tileset};
