pub mod detector;
pub mod face_detection_client;
pub mod face_mesh_client;
