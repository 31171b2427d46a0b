use crate::{common::*, error::DataError, index::VideoRecord, params::NUM_VAL_SEGMENTS};

/// Draws a training clip start, uniform over `[1, frame_count]` inclusive.
///
/// Every access re-rolls, so repeated epochs see different windows of the
/// same video. The RNG is passed in so training randomness stays a seedable
/// input instead of hidden dataset state.
pub fn sample_train_start<R>(rng: &mut R, record: &VideoRecord) -> i64
where
    R: Rng + ?Sized,
{
    rng.gen_range(1..=record.frame_count)
}

/// Computes the 19 deterministic validation clip starts for one video.
///
/// `interval = (frame_count - (clip_len - 1)) / 19` floored; offsets are
/// `k * interval + 1` for `k` in `0..19`, covering the usable range without
/// overlap bias. A non-positive interval would collapse every clip onto the
/// same start, so short videos are an error here rather than a silent
/// truncation.
pub fn validation_offsets(
    record: &VideoRecord,
    clip_len: i64,
) -> Result<[i64; NUM_VAL_SEGMENTS], DataError> {
    let usable = record.frame_count - (clip_len - 1);
    let interval = usable / NUM_VAL_SEGMENTS as i64;
    if interval <= 0 {
        return Err(DataError::InsufficientLength {
            video_id: record.video_id.clone(),
            frame_count: record.frame_count,
            required: clip_len + NUM_VAL_SEGMENTS as i64 - 1,
        });
    }

    let mut offsets = [0; NUM_VAL_SEGMENTS];
    for (segment, offset) in offsets.iter_mut().enumerate() {
        *offset = segment as i64 * interval + 1;
    }
    Ok(offsets)
}
