pub mod point;
pub mod bbox;
pub mod curves;
pub mod surfaces;
pub mod polygon;
pub mod oracle;

pub use oracle::{GeometryOracle, PlanarOracle};
