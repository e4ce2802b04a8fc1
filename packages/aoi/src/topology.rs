//! Validity checks between the rings of one simplified polygon.
//!
//! Segments are addressed as `(ring, segment)`, where `segment` is the
//! index of the line in the ring's `lines()` iterator.

use std::collections::BTreeSet;

use geo::algorithm::line_intersection::{LineIntersection, line_intersection};
use geo::{BoundingRect, Contains, Coord, Line, LineString, Point, Polygon};
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree, RTreeObject};

/// A ring segment stored in the R-tree.
struct SegmentEntry {
    ring: usize,
    /// Position among the ring's non-degenerate segments.
    position: usize,
    /// Index among all of the ring's segments.
    index: usize,
    line: Line<f64>,
    envelope: AABB<[f64; 2]>,
}

impl SegmentEntry {
    fn new(ring: usize, position: usize, index: usize, line: Line<f64>) -> Self {
        let envelope = AABB::from_corners(
            [line.start.x, line.start.y],
            [line.end.x, line.end.y],
        );
        Self {
            ring,
            position,
            index,
            line,
            envelope,
        }
    }

    const fn key(&self) -> (usize, usize) {
        (self.ring, self.position)
    }
}

impl RTreeObject for SegmentEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

type VertexEntry = GeomWithData<[f64; 2], (usize, usize)>;

/// Finds segments that cross, touch or overlap another segment.
///
/// Both segments of every offending pair are returned. Consecutive
/// segments of a ring always share a vertex, so they only count when they
/// overlap along a stretch. Zero-length segments are ignored.
pub fn conflicting_segments(rings: &[LineString<f64>]) -> BTreeSet<(usize, usize)> {
    let mut segment_counts = Vec::with_capacity(rings.len());
    let mut entries = Vec::new();

    for (ring, line_string) in rings.iter().enumerate() {
        let before = entries.len();
        entries.extend(
            line_string
                .lines()
                .enumerate()
                .filter(|(_, line)| line.start != line.end)
                .enumerate()
                .map(|(position, (index, line))| SegmentEntry::new(ring, position, index, line)),
        );
        segment_counts.push(entries.len() - before);
    }

    let tree = RTree::bulk_load(entries);
    let mut conflicts = BTreeSet::new();

    for a in tree.iter() {
        for b in tree.locate_in_envelope_intersecting(&a.envelope) {
            if b.key() <= a.key() {
                continue;
            }
            let Some(hit) = line_intersection(a.line, b.line) else {
                continue;
            };

            let consecutive = a.ring == b.ring
                && are_consecutive(a.position, b.position, segment_counts[a.ring]);
            if !consecutive || matches!(hit, LineIntersection::Collinear { .. }) {
                conflicts.insert((a.ring, a.index));
                conflicts.insert((b.ring, b.index));
            }
        }
    }

    conflicts
}

/// Finds segments whose shortcut would sweep over another vertex.
///
/// `sections[r][s]` holds the input coordinates that segment `s` of ring
/// `r` replaces, endpoints included. A segment offends when some other
/// vertex of the polygon lies strictly inside the area between it and its
/// section, which would move that vertex to the wrong side of the ring.
pub fn swallowing_segments(
    rings: &[LineString<f64>],
    sections: &[Vec<&[Coord<f64>]>],
) -> BTreeSet<(usize, usize)> {
    let vertices: Vec<VertexEntry> = rings
        .iter()
        .enumerate()
        .flat_map(|(ring, line_string)| {
            distinct_vertices(line_string)
                .iter()
                .enumerate()
                .map(move |(index, c)| GeomWithData::new([c.x, c.y], (ring, index)))
        })
        .collect();
    let tree = RTree::bulk_load(vertices);

    let mut offending = BTreeSet::new();

    for (ring, ring_sections) in sections.iter().enumerate() {
        let vertex_count = distinct_vertices(&rings[ring]).len();

        for (segment, section) in ring_sections.iter().enumerate() {
            if section.len() < 3 {
                continue;
            }
            let swept = Polygon::new(LineString::from(section.to_vec()), Vec::new());
            let Some(rect) = swept.bounding_rect() else {
                continue;
            };
            let envelope = AABB::from_corners(
                [rect.min().x, rect.min().y],
                [rect.max().x, rect.max().y],
            );

            let endpoints = [(ring, segment), (ring, (segment + 1) % vertex_count.max(1))];
            let swallowed = tree.locate_in_envelope(&envelope).any(|vertex| {
                !endpoints.contains(&vertex.data) && {
                    let [x, y] = *vertex.geom();
                    swept.contains(&Point::new(x, y))
                }
            });

            if swallowed {
                offending.insert((ring, segment));
            }
        }
    }

    offending
}

/// The ring's coordinates without the closing repeat of the first one.
fn distinct_vertices(ring: &LineString<f64>) -> &[Coord<f64>] {
    match ring.0.split_last() {
        Some((last, rest)) if ring.is_closed() && !rest.is_empty() && rest[0] == *last => rest,
        _ => &ring.0,
    }
}

/// Whether segments `i < j` of a closed ring with `count` segments share a
/// vertex.
const fn are_consecutive(i: usize, j: usize, count: usize) -> bool {
    j == i + 1 || (i == 0 && j + 1 == count)
}

#[cfg(test)]
mod tests {
    use geo::line_string;

    use super::*;

    fn square(min: f64, max: f64) -> LineString<f64> {
        line_string![
            (x: min, y: min),
            (x: max, y: min),
            (x: max, y: max),
            (x: min, y: max),
            (x: min, y: min),
        ]
    }

    fn conflicting_rings(rings: &[LineString<f64>]) -> BTreeSet<usize> {
        conflicting_segments(rings)
            .into_iter()
            .map(|(ring, _)| ring)
            .collect()
    }

    #[test]
    fn simple_square_has_no_conflicts() {
        assert!(conflicting_segments(&[square(0.0, 10.0)]).is_empty());
    }

    #[test]
    fn nested_hole_has_no_conflicts() {
        assert!(conflicting_segments(&[square(0.0, 10.0), square(2.0, 8.0)]).is_empty());
    }

    #[test]
    fn bow_tie_conflicts_with_itself() {
        let bow_tie = line_string![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 10.0, y: 0.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ];
        assert_eq!(
            conflicting_segments(&[bow_tie]),
            BTreeSet::from([(0, 0), (0, 2)])
        );
    }

    #[test]
    fn hole_crossing_shell_reports_both_segments() {
        let rings = [square(0.0, 10.0), square(5.0, 15.0)];
        let conflicts = conflicting_segments(&rings);

        assert_eq!(conflicting_rings(&rings), BTreeSet::from([0, 1]));
        // The shell's right and top edges are cut by the hole's bottom and left edges.
        assert!(conflicts.contains(&(0, 1)));
        assert!(conflicts.contains(&(0, 2)));
        assert!(conflicts.contains(&(1, 0)));
        assert!(conflicts.contains(&(1, 3)));
        assert!(!conflicts.contains(&(0, 0)));
    }

    #[test]
    fn spike_back_along_itself_conflicts() {
        let spike = line_string![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 5.0, y: 0.0),
            (x: 5.0, y: 5.0),
            (x: 0.0, y: 0.0),
        ];
        assert_eq!(conflicting_rings(&[spike]), BTreeSet::from([0]));
    }

    #[test]
    fn repeated_vertices_are_ignored() {
        let ring = line_string![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ];
        assert!(conflicting_segments(&[ring]).is_empty());
    }

    #[test]
    fn segment_indices_count_repeated_vertices() {
        let shell = line_string![
            (x: 0.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 0.0),
            (x: 10.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ];
        let hole = line_string![
            (x: 8.0, y: 4.0),
            (x: 12.0, y: 4.0),
            (x: 12.0, y: 6.0),
            (x: 8.0, y: 6.0),
            (x: 8.0, y: 4.0),
        ];
        let conflicts = conflicting_segments(&[shell, hole]);
        assert!(conflicts.contains(&(0, 2)), "{conflicts:?}");
        assert!(!conflicts.contains(&(0, 1)));
    }

    #[test]
    fn consecutive_segment_check_wraps_around() {
        assert!(are_consecutive(0, 1, 4));
        assert!(are_consecutive(0, 3, 4));
        assert!(!are_consecutive(0, 2, 4));
        assert!(!are_consecutive(1, 3, 4));
    }

    #[test]
    fn shortcut_over_a_hole_is_reported() {
        // The shell's top edge was shortcut from a roof peaking at y = 20;
        // the hole sits between the shortcut and the roof.
        let shell = line_string![
            (x: 0.0, y: 0.0),
            (x: 20.0, y: 0.0),
            (x: 20.0, y: 10.0),
            (x: 0.0, y: 10.0),
            (x: 0.0, y: 0.0),
        ];
        let roof = [
            Coord { x: 20.0, y: 10.0 },
            Coord { x: 10.0, y: 20.0 },
            Coord { x: 0.0, y: 10.0 },
        ];
        let hole = line_string![
            (x: 9.0, y: 12.0),
            (x: 11.0, y: 12.0),
            (x: 11.0, y: 14.0),
            (x: 9.0, y: 14.0),
            (x: 9.0, y: 12.0),
        ];
        let shell_sections: Vec<&[Coord<f64>]> = vec![
            &shell.0[0..=1],
            &shell.0[1..=2],
            &roof,
            &shell.0[3..=4],
        ];
        let hole_sections: Vec<&[Coord<f64>]> = hole.0.windows(2).collect();

        let rings = [shell.clone(), hole.clone()];
        assert!(conflicting_segments(&rings).is_empty());
        assert_eq!(
            swallowing_segments(&rings, &[shell_sections, hole_sections]),
            BTreeSet::from([(0, 2)])
        );
    }

    #[test]
    fn shortcut_clear_of_other_vertices_is_accepted() {
        let shell = square(0.0, 20.0);
        let dent = [
            Coord { x: 20.0, y: 0.0 },
            Coord { x: 19.0, y: 10.0 },
            Coord { x: 20.0, y: 20.0 },
        ];
        let hole = square(5.0, 10.0);
        let shell_sections: Vec<&[Coord<f64>]> = vec![
            &shell.0[0..=1],
            &dent,
            &shell.0[2..=3],
            &shell.0[3..=4],
        ];
        let hole_sections: Vec<&[Coord<f64>]> = hole.0.windows(2).collect();

        let rings = [shell.clone(), hole.clone()];
        assert!(swallowing_segments(&rings, &[shell_sections, hole_sections]).is_empty());
    }
}
