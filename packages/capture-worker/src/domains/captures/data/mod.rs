pub mod capture;

pub use capture::CaptureData;
