pub mod links;
pub mod pois;
pub mod staging;
pub mod tiles;

pub use links::CropWorkItem;
