pub mod config;
pub mod error;
pub mod helper;
pub mod modules;
pub mod pipeline;
pub mod server;
pub mod triton_client;
pub mod utils;

pub use error::{DetectionError, ErrorKind};
pub use pipeline::pipeline::{assemble_response, FaceLandmarkPipeline};
pub use utils::coordinate::{DetectionResponse, FaceLandmark, NormalizedFace, RawFace};
