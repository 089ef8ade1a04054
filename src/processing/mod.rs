pub mod perspective;
pub mod transform;

pub use perspective::{CropEngine, PerspectiveCropper};
pub use transform::{ImageManipulator, LocalManipulator, Manipulated};
