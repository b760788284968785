/// Snap `value` to the nearest onset timestamp.
///
/// Values beyond the final onset clamp to it. Otherwise the two onsets
/// bracketing `value` are compared and the nearer one wins; an exact tie
/// favors the earlier onset.
///
/// Panics if `onsets` is empty — callers guard degenerate input before
/// quantizing.
pub fn quantize_to_onset(onsets: &[f32], value: f32) -> f32 {
    let last = onsets[onsets.len() - 1];
    if value > last {
        return last;
    }

    // First index whose onset is >= value. In range because value <= last.
    let hi = onsets.partition_point(|&o| o < value);
    let after = onsets[hi];
    let before = if hi > 0 && after > value {
        onsets[hi - 1]
    } else {
        // Exact element, or value below the first onset: brackets coincide.
        after
    };

    let diff_before = value - before;
    let diff_after = after - value;
    if diff_before > diff_after { after } else { before }
}
