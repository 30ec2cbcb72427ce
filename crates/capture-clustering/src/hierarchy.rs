//! Session layout construction: interval labels to directories.
//!
//! A pure assignment pass turns the label sequence into one
//! `(angle, rotation)` slot per photo, and a materialization pass creates
//! the directories and places the files. Splitting the two keeps the
//! counter state machine testable without touching a filesystem.

use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SessionError};
use crate::exif::CapturedPhoto;
use crate::interval::IntervalLabel;

/// Destination slot for one photo. Indices start at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub angle: u32,
    pub rotation: u32,
}

/// Whether placement keeps or consumes the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceMode {
    Copy,
    Move,
}

/// Summary of a built session tree, in placement order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionLayout {
    pub angles: Vec<AngleLayout>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AngleLayout {
    pub index: u32,
    pub rotations: Vec<RotationLayout>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationLayout {
    pub index: u32,
    pub photos: Vec<String>,
}

impl SessionLayout {
    pub fn photo_count(&self) -> usize {
        self.angles
            .iter()
            .flat_map(|a| &a.rotations)
            .map(|r| r.photos.len())
            .sum()
    }

    pub fn rotation_count(&self) -> usize {
        self.angles.iter().map(|a| a.rotations.len()).sum()
    }
}

/// Counter state for the assignment pass. Both counters start at 1; the
/// rotation counter restarts whenever the angle advances.
struct HierarchyState {
    angle: u32,
    rotation: u32,
}

/// Turn the label sequence into one slot per photo.
///
/// The first photo always lands in `angle_1/rotation_1`; every later photo
/// follows from the label of the gap before it. Labels and photos must line
/// up exactly (one label per consecutive pair).
pub fn assign_slots(photo_count: usize, labels: &[IntervalLabel]) -> Result<Vec<Slot>> {
    if photo_count == 0 {
        return if labels.is_empty() {
            Ok(Vec::new())
        } else {
            Err(SessionError::LabelCount {
                photos: 0,
                labels: labels.len(),
            })
        };
    }
    if labels.len() != photo_count - 1 {
        return Err(SessionError::LabelCount {
            photos: photo_count,
            labels: labels.len(),
        });
    }

    let mut state = HierarchyState {
        angle: 1,
        rotation: 1,
    };
    let mut slots = Vec::with_capacity(photo_count);
    slots.push(Slot {
        angle: state.angle,
        rotation: state.rotation,
    });

    for label in labels {
        match label {
            IntervalLabel::AngleBoundary => {
                state.angle += 1;
                state.rotation = 1;
            }
            IntervalLabel::RotationBoundary => {
                state.rotation += 1;
            }
            IntervalLabel::BracketContinuation => {}
        }
        slots.push(Slot {
            angle: state.angle,
            rotation: state.rotation,
        });
    }

    Ok(slots)
}

/// Materialize the session tree under `output_root`.
///
/// The root itself may already exist. Every `angle_<n>/rotation_<m>`
/// directory underneath must not: slots are assigned by monotonically
/// increasing counters, so hitting an existing one means the output root
/// was stale or the photos were not in chronological order. Photos placed
/// before a failure stay placed; there is no rollback, so an interrupted
/// run in move mode leaves the session split between the two trees and is
/// not re-runnable as-is.
pub fn build(
    photos: &[CapturedPhoto],
    labels: &[IntervalLabel],
    output_root: &Path,
    mode: PlaceMode,
) -> Result<SessionLayout> {
    let slots = assign_slots(photos.len(), labels)?;
    let mut layout = SessionLayout { angles: Vec::new() };
    if photos.is_empty() {
        return Ok(layout);
    }

    fs::create_dir_all(output_root)?;

    let mut placed = 0usize;
    for (photo, slot) in photos.iter().zip(&slots) {
        let angle_dir = output_root.join(format!("angle_{}", slot.angle));
        if layout.angles.len() < slot.angle as usize {
            create_new_dir(&angle_dir)?;
            layout.angles.push(AngleLayout {
                index: slot.angle,
                rotations: Vec::new(),
            });
        }

        let rotation_dir = angle_dir.join(format!("rotation_{}", slot.rotation));
        let angle = &mut layout.angles[slot.angle as usize - 1];
        if angle.rotations.len() < slot.rotation as usize {
            create_new_dir(&rotation_dir)?;
            angle.rotations.push(RotationLayout {
                index: slot.rotation,
                photos: Vec::new(),
            });
        }

        let destination = rotation_dir.join(photo.file_name());
        place(&photo.path, &destination, mode)?;
        angle.rotations[slot.rotation as usize - 1]
            .photos
            .push(photo.file_name().to_string());

        placed += 1;
        debug!("placed {placed}/{}: {}", photos.len(), destination.display());
    }

    Ok(layout)
}

/// Create a directory that must not already exist.
fn create_new_dir(path: &Path) -> Result<()> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            Err(SessionError::DirectoryExists {
                path: path.to_path_buf(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

fn place(source: &Path, destination: &Path, mode: PlaceMode) -> Result<()> {
    if destination.exists() {
        return Err(SessionError::DestinationExists {
            path: destination.to_path_buf(),
        });
    }
    match mode {
        PlaceMode::Copy => {
            fs::copy(source, destination)?;
        }
        PlaceMode::Move => {
            // rename is atomic on one filesystem; fall back to copy+delete
            // when source and destination live on different devices
            if fs::rename(source, destination).is_err() {
                fs::copy(source, destination)?;
                fs::remove_file(source)?;
            }
        }
    }
    Ok(())
}
