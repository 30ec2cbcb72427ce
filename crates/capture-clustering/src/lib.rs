//! Capture-interval classification and session layout for photogram-sort.
//!
//! A photogrammetry turntable session leaves behind a flat directory of
//! photos whose consecutive capture times are separated by three
//! characteristic pauses: long ones while the operator re-angles the rig,
//! medium ones while the turntable advances a step, and short ones between
//! bracketed exposures. This crate extracts sub-second capture times,
//! classifies the inter-photo gaps, and rebuilds the session as an
//! `angle_<n>/rotation_<m>` directory hierarchy.

pub mod error;
pub mod exif;
pub mod hierarchy;
pub mod interval;
pub mod mixture;

pub use error::{Result, SessionError};
pub use exif::{exiftool_version, extract_all, CapturedPhoto, ExiftoolRunner};
pub use hierarchy::{assign_slots, build, PlaceMode, SessionLayout, Slot};
pub use interval::{classify, compute_gaps, IntervalGap, IntervalLabel, Strategy};
