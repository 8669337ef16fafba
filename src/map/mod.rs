//! Map rendering support.
//!
//! This module provides basemap tile fetching, caching, Web Mercator
//! projection and the pannable/zoomable camera.

pub mod tiles;
pub mod view;

pub use tiles::{TileManager, TILE_SIZE};
pub use view::{MapView, Projection};
