//! # Storage
//!
//! Persisted artifact writers and the per-attempt output directory layout:
//!
//! ```text
//! <dataset>/<timestamp>_<town>_<attempt>/
//!   sensors.json            - copy of the sensor rig configuration
//!   timestamps.json         - per-tick timestamp table (image sensors)
//!   <sensor_id>/0000.png    - window-relative image sequence
//!   <sensor_id>.events.bin  - event stream container with ms_to_idx
//! ```

mod events_file;
mod images;
mod layout;
mod timestamps;

pub use events_file::{read_event_archive, write_event_archive, EventArchive};
pub use images::{renumber_images, sequence_image_path, tick_image_path, write_disparity_png};
pub use layout::{write_sensor_rig, AttemptLayout};
pub use timestamps::TimestampTable;
