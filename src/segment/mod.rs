pub mod link;
pub mod quantize;

pub use link::link;
pub use quantize::quantize_to_onset;

use serde::Serialize;

/// One candidate playback segment.
///
/// `start`/`end` are quantized timestamps in seconds and always satisfy
/// `start <= end` after generation. `head`/`tail` are sample indices into the
/// full buffer: `head` marks the originating onset, `tail` the *next raw
/// onset* — deliberately not the quantized `end`, which may land on a
/// different onset. `prev`/`next` are indices into the owning `Vec<Loop>`,
/// filled in by [`link`]; until then they point at the loop itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Loop {
    /// Position in the generated order; the loop's identity for the feature
    /// pool.
    pub id: usize,
    pub start: f32,
    pub end: f32,
    pub head: usize,
    pub tail: usize,
    pub prev: usize,
    pub next: usize,
}

impl Loop {
    pub fn duration_secs(&self) -> f32 {
        self.end - self.start
    }
}

/// Generate loop candidates from a strictly ascending onset sequence.
///
/// One loop per onset index `i` with `onsets[i] + bar_size <= last_onset`,
/// in onset order. Each loop starts at its onset; its end is the onset
/// nearest to `start + bar_size`, with a corrective swap if quantization
/// picked an earlier onset than the start. An empty or single-element onset
/// sequence yields no loops.
pub fn generate(onsets: &[f32], sample_rate: u32, bar_size: f32) -> Vec<Loop> {
    let Some(&last_onset) = onsets.last() else {
        return Vec::new();
    };

    let mut loops = Vec::new();
    // windows(2) gives us the next raw onset for `tail` and caps iteration
    // one short of the end, matching the bar-size bound's guarantee.
    for pair in onsets.windows(2) {
        if pair[0] + bar_size > last_onset {
            continue;
        }
        let mut start = pair[0];
        let mut end = quantize_to_onset(onsets, pair[0] + bar_size);
        if start > end {
            std::mem::swap(&mut start, &mut end);
        }
        let head = (pair[0] as f64 * sample_rate as f64).round() as usize;
        let tail = (pair[1] as f64 * sample_rate as f64).round() as usize;
        let id = loops.len();
        loops.push(Loop {
            id,
            start,
            end,
            head,
            tail,
            prev: id,
            next: id,
        });
    }

    log::debug!(
        "Generated {} loops from {} onsets (bar size {:.2}s)",
        loops.len(),
        onsets.len(),
        bar_size
    );
    loops
}
