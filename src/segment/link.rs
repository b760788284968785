use super::Loop;

/// Fill in `prev`/`next` adjacency across the generated loop order.
///
/// Adjacency is index-based, so a later reallocation of the backing vec
/// cannot dangle, but the indices are only meaningful for the order they
/// were computed against: link once the collection has reached its final
/// size and don't insert afterward.
///
/// The two ends are self-referential on their outward side; a singleton
/// loop points at itself both ways.
pub fn link(loops: &mut [Loop]) {
    let n = loops.len();
    for i in 0..n {
        loops[i].prev = if i == 0 { 0 } else { i - 1 };
        loops[i].next = if i + 1 < n { i + 1 } else { i };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::generate;

    fn linked(onsets: &[f32]) -> Vec<Loop> {
        let mut loops = generate(onsets, 44100, 1.0);
        link(&mut loops);
        loops
    }

    #[test]
    fn interior_loops_point_at_neighbors() {
        let loops = linked(&[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!(loops.len() >= 3);
        for i in 1..loops.len() - 1 {
            assert_eq!(loops[i].prev, i - 1);
            assert_eq!(loops[i].next, i + 1);
        }
    }

    #[test]
    fn ends_are_self_referential_outward() {
        let loops = linked(&[0.0, 1.0, 2.0, 3.0, 4.0]);
        let n = loops.len();
        assert_eq!(loops[0].prev, 0);
        assert_eq!(loops[0].next, 1);
        assert_eq!(loops[n - 1].next, n - 1);
        assert_eq!(loops[n - 1].prev, n - 2);
    }

    #[test]
    fn singleton_points_at_itself() {
        let loops = linked(&[0.0, 0.5, 1.0]);
        assert_eq!(loops.len(), 1);
        assert_eq!(loops[0].prev, 0);
        assert_eq!(loops[0].next, 0);
    }

    #[test]
    fn empty_is_a_no_op() {
        let mut loops: Vec<Loop> = Vec::new();
        link(&mut loops);
        assert!(loops.is_empty());
    }

    #[test]
    fn link_does_not_touch_bounds() {
        // The origin normalized start/end a second time while linking, which
        // inverted correctly ordered loops. Linking must only set adjacency.
        let mut loops = generate(&[0.0, 1.0, 2.0, 3.0, 4.0], 44100, 1.0);
        let bounds: Vec<(f32, f32)> = loops.iter().map(|l| (l.start, l.end)).collect();
        link(&mut loops);
        let after: Vec<(f32, f32)> = loops.iter().map(|l| (l.start, l.end)).collect();
        assert_eq!(bounds, after);
        assert!(loops.iter().all(|l| l.start <= l.end));
    }

    #[test]
    fn relinking_is_idempotent() {
        let mut a = generate(&[0.0, 0.8, 1.7, 2.4, 3.3, 4.1], 44100, 1.0);
        link(&mut a);
        let mut b = a.clone();
        link(&mut b);
        assert_eq!(a, b);
    }
}
