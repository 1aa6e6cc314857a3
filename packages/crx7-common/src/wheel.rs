use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum WheelError {
    #[error("cannot resolve a winner from an empty candidate list")]
    NoCandidates,
}

/// Map a final wheel rotation (degrees) to the index of the winning
/// candidate.
///
/// The wheel is divided into `candidate_count` equal segments of
/// `360 / candidate_count` degrees, with candidate 0 at the top
/// reference point. The wheel rotates clockwise under a fixed pointer,
/// so the segment under the pointer moves opposite to increasing
/// rotation: `adjusted = (360 - normalized_rotation) mod 360`.
///
/// This mapping is deterministic — the same rotation and candidate
/// count always resolve to the same index — so draws can be replayed
/// and audited from the recorded rotation value alone.
pub fn winner_index(rotation_degrees: f64, candidate_count: usize) -> Result<usize, WheelError> {
    if candidate_count == 0 {
        return Err(WheelError::NoCandidates);
    }

    let segment_angle = 360.0 / candidate_count as f64;
    let normalized = rotation_degrees.rem_euclid(360.0);
    let adjusted = (360.0 - normalized).rem_euclid(360.0);
    let index = (adjusted / segment_angle).floor() as usize % candidate_count;

    Ok(index)
}
