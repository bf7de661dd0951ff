pub mod brep;
pub mod builder;
pub mod primitives;
pub mod properties;
