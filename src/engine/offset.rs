//! Curb-line derivation.
//!
//! A curb line is the centerline shifted sideways by a fixed distance. The work
//! is split in three steps so each concern stays in one place:
//!
//! ```text
//! centerline ── distinct_points ── parallel_offset ── orient_like ── check_offset ──▶ CurbGeometry
//!                 │ Degenerate        (primitive)     (direction)     │ Invalid
//!                 ▼                                                   ▼
//!              Err(GeometryError)                         raw centerline, degraded = true
//! ```
//!
//! `parallel_offset` is the only primitive, and its contract says nothing about
//! point order: a join strategy or a different primitive is free to emit one
//! side reversed. `orient_like` guards that contract and is the only place
//! that reasons about point order. It is anchored to the input's digitized
//! direction, never to the shape of the output, so the polyline handed to the
//! rest of the pipeline runs like the source centerline for both sides.
//!
//! Offsets are computed in raw coordinate space, so `distance` is in input
//! units. Interior vertices use a mitred join, falling back to a bevel when the
//! turn is too sharp for the miter to stay bounded. Validity (finite points,
//! self-intersection) is checked with `geo` predicates.

use super::planar::{is_finite, self_intersects};
use crate::{GeometryError, Side};
use geo::{Coord, LineString};

/// Minimum cosine between the miter direction and a segment normal.
/// Below it the miter length would exceed `distance / MITER_LIMIT`, so bevel instead.
const MITER_LIMIT: f64 = 0.25;

/// Derived curb line for one side of a centerline.
#[derive(Debug, Clone, PartialEq)]
pub struct CurbGeometry {
    pub line: LineString<f64>,
    /// The offset failed validity checks; `line` is the unmodified centerline.
    pub degraded: bool,
    /// Why the offset was rejected, when `degraded`.
    pub reason: Option<&'static str>,
}

/// Output of the offset primitive.
///
/// `spans[i]` holds the indices in `points` where source segment `i` starts and
/// ends; joins may insert extra points between spans.
#[derive(Debug, Clone)]
struct OffsetLine {
    points: Vec<Coord<f64>>,
    spans: Vec<(usize, usize)>,
}

fn dot(a: Coord<f64>, b: Coord<f64>) -> f64 {
    a.x * b.x + a.y * b.y
}

fn length(a: Coord<f64>) -> f64 {
    a.x.hypot(a.y)
}

fn unit(a: Coord<f64>) -> Option<Coord<f64>> {
    let len = length(a);
    (len > 0.0 && len.is_finite()).then(|| a / len)
}

/// Counter-clockwise perpendicular (points to the left of travel).
fn left_normal(a: Coord<f64>) -> Coord<f64> {
    Coord { x: -a.y, y: a.x }
}

/// Offset `line` towards `side` by `distance` coordinate units.
///
/// Fails only for degenerate input. An offset that comes out self-intersecting
/// or folded is replaced by the raw centerline with `degraded` set.
pub fn offset_curb(line: &LineString<f64>, side: Side, distance: f64) -> Result<CurbGeometry, GeometryError> {
    let source = distinct_points(line)?;
    let signed = distance * side.sign();

    let checked = parallel_offset(&source, signed)
        .map(|raw| orient_like(&source, signed, raw))
        .and_then(|offset| check_offset(&source, &offset).map(|()| offset));

    match checked {
        Ok(offset) => Ok(CurbGeometry { line: LineString::new(offset.points), degraded: false, reason: None }),
        Err(GeometryError::Invalid(reason)) => {
            tracing::debug!(%side, reason, "offset rejected, using centerline");
            Ok(CurbGeometry { line: line.clone(), degraded: true, reason: Some(reason) })
        }
        Err(err) => Err(err),
    }
}

/// Drop consecutive duplicates; require at least two distinct finite points.
fn distinct_points(line: &LineString<f64>) -> Result<Vec<Coord<f64>>, GeometryError> {
    let mut out: Vec<Coord<f64>> = Vec::with_capacity(line.0.len());
    for &c in line.coords() {
        if !is_finite(c) {
            return Err(GeometryError::Degenerate("non-finite coordinate"));
        }
        if out.last() != Some(&c) {
            out.push(c);
        }
    }
    if out.len() < 2 {
        return Err(GeometryError::Degenerate("fewer than two distinct points"));
    }
    Ok(out)
}

/// Positive `distance` offsets to the left of travel, negative to the right.
fn parallel_offset(source: &[Coord<f64>], distance: f64) -> Result<OffsetLine, GeometryError> {
    let dirs = segment_directions(source)?;
    let normals: Vec<Coord<f64>> = dirs.iter().map(|d| left_normal(*d)).collect();
    let last = source.len() - 1;

    let mut points = Vec::with_capacity(source.len() + 4);
    // (incoming index, outgoing index) per vertex
    let mut joins: Vec<(usize, usize)> = Vec::with_capacity(source.len());

    points.push(source[0] + normals[0] * distance);
    joins.push((0, 0));

    for k in 1..last {
        let (before, after) = (normals[k - 1], normals[k]);
        let miter = unit(before + after).filter(|m| dot(*m, after) >= MITER_LIMIT);
        match miter {
            Some(m) => {
                points.push(source[k] + m * (distance / dot(m, after)));
                joins.push((points.len() - 1, points.len() - 1));
            }
            None => {
                points.push(source[k] + before * distance);
                points.push(source[k] + after * distance);
                joins.push((points.len() - 2, points.len() - 1));
            }
        }
    }

    points.push(source[last] + normals[last - 1] * distance);
    joins.push((points.len() - 1, points.len() - 1));

    let spans = (0..last).map(|i| (joins[i].1, joins[i + 1].0)).collect();
    Ok(OffsetLine { points, spans })
}

fn segment_directions(source: &[Coord<f64>]) -> Result<Vec<Coord<f64>>, GeometryError> {
    source
        .windows(2)
        .map(|w| unit(w[1] - w[0]).ok_or(GeometryError::Degenerate("zero-length segment")))
        .collect()
}

/// Make `offset` run in the same direction as `source`.
///
/// The check is anchored to the input: the offset's first point must sit
/// nearer the expected start (`source[0]` shifted along the first normal) than
/// the expected end.
fn orient_like(source: &[Coord<f64>], distance: f64, mut offset: OffsetLine) -> OffsetLine {
    let Ok(dirs) = segment_directions(source) else {
        return offset;
    };
    let (Some(&s0), Some(&s1), Some(&d0), Some(&d1), Some(&o0), Some(&o1)) =
        (source.first(), source.last(), dirs.first(), dirs.last(), offset.points.first(), offset.points.last())
    else {
        return offset;
    };
    let expected_first = s0 + left_normal(d0) * distance;
    let expected_last = s1 + left_normal(d1) * distance;

    let straight = length(o0 - expected_first) + length(o1 - expected_last);
    let swapped = length(o0 - expected_last) + length(o1 - expected_first);
    if swapped < straight {
        let n = offset.points.len() - 1;
        offset.points.reverse();
        offset.spans = offset.spans.iter().map(|&(start, end)| (n - start, n - end)).collect();
    }
    offset
}

/// Reject folded, non-finite, or self-intersecting offsets.
fn check_offset(source: &[Coord<f64>], offset: &OffsetLine) -> Result<(), GeometryError> {
    if offset.points.iter().any(|p| !is_finite(*p)) {
        return Err(GeometryError::Invalid("non-finite offset coordinate"));
    }
    let dirs = segment_directions(source)?;
    for (dir, &(start, end)) in dirs.iter().zip(&offset.spans) {
        if dot(offset.points[end] - offset.points[start], *dir) <= 0.0 {
            return Err(GeometryError::Invalid("offset segment folds back against the centerline"));
        }
    }
    if self_intersects(&LineString::new(offset.points.clone())) {
        return Err(GeometryError::Invalid("offset line self-intersects"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_OFFSET_DISTANCE;

    const D: f64 = DEFAULT_OFFSET_DISTANCE;

    fn line(points: &[(f64, f64)]) -> LineString<f64> {
        LineString::from(points.to_vec())
    }

    fn eastward() -> LineString<f64> {
        line(&[(-122.4098, 37.7592), (-122.4089, 37.7592)])
    }

    fn cross_sign(source: &LineString<f64>, offset: &LineString<f64>) -> f64 {
        let dir = source.0[1] - source.0[0];
        let lateral = offset.0[0] - source.0[0];
        (dir.x * lateral.y - dir.y * lateral.x).signum()
    }

    #[test]
    fn left_is_north_and_right_is_south_for_eastward_line() {
        let src = eastward();
        let left = offset_curb(&src, Side::Left, D).unwrap();
        let right = offset_curb(&src, Side::Right, D).unwrap();
        assert!(!left.degraded && !right.degraded);

        for (s, p) in src.coords().zip(left.line.coords()) {
            assert!(p.y > s.y);
            assert!((p.y - s.y - D).abs() < 1e-12);
            assert_eq!(p.x, s.x);
        }
        for (s, p) in src.coords().zip(right.line.coords()) {
            assert!(p.y < s.y);
            assert!((s.y - p.y - D).abs() < 1e-12);
        }
    }

    #[test]
    fn both_sides_keep_source_direction() {
        let src = line(&[(-122.41, 37.76), (-122.409, 37.7612), (-122.4075, 37.7615)]);
        for side in Side::ALL {
            let curb = offset_curb(&src, side, D).unwrap();
            assert!(!curb.degraded, "{side}");
            let (first, last) = (curb.line.0[0], curb.line.0[curb.line.0.len() - 1]);
            let (src_first, src_last) = (src.0[0], src.0[2]);
            assert!(length(first - src_first) < length(first - src_last));
            assert!(length(last - src_last) < length(last - src_first));
        }
    }

    #[test]
    fn sides_land_on_opposite_lateral_sides() {
        let src = line(&[(-122.4, 37.75), (-122.401, 37.752), (-122.403, 37.7525)]);
        let left = offset_curb(&src, Side::Left, D).unwrap();
        let right = offset_curb(&src, Side::Right, D).unwrap();
        assert_eq!(cross_sign(&src, &left.line), 1.0);
        assert_eq!(cross_sign(&src, &right.line), -1.0);
    }

    #[test]
    fn reversed_primitive_output_is_normalized() {
        let source: Vec<Coord<f64>> = eastward().0;
        let mut raw = parallel_offset(&source, -D).unwrap();
        raw.points.reverse();
        raw.spans = vec![(1, 0)];
        let fixed = orient_like(&source, -D, raw);
        assert!(fixed.points[0].x < fixed.points[1].x);
        assert_eq!(fixed.spans, vec![(0, 1)]);
        assert!(check_offset(&source, &fixed).is_ok());
    }

    #[test]
    fn repeated_point_is_degenerate() {
        let p = (-122.4098, 37.7592);
        assert_eq!(
            offset_curb(&line(&[p, p, p]), Side::Left, D),
            Err(GeometryError::Degenerate("fewer than two distinct points"))
        );
        assert!(offset_curb(&LineString::new(Vec::new()), Side::Right, D).is_err());
    }

    #[test]
    fn non_finite_input_is_degenerate() {
        let src = line(&[(f64::NAN, 37.0), (-122.0, 37.0)]);
        assert!(matches!(offset_curb(&src, Side::Left, D), Err(GeometryError::Degenerate(_))));
    }

    #[test]
    fn hairpin_inner_side_degrades_to_centerline() {
        // East, a short hop north, then back west: the left side is the inside of the turn.
        let src = line(&[(0.0, 0.0), (0.001, 0.0), (0.001, 0.00002), (0.0, 0.00002)]);
        let inner = offset_curb(&src, Side::Left, D).unwrap();
        assert!(inner.degraded);
        assert_eq!(inner.line, src);
        assert!(inner.reason.is_some());

        let outer = offset_curb(&src, Side::Right, D).unwrap();
        assert!(!outer.degraded);
    }

    #[test]
    fn sharp_turn_uses_bevel_join() {
        let src = line(&[(0.0, 0.0), (0.01, 0.0), (0.0, 0.001)]);
        let outer = offset_curb(&src, Side::Right, D).unwrap();
        assert!(!outer.degraded);
        assert_eq!(outer.line.0.len(), 4);
    }

    #[test]
    fn duplicate_vertices_are_ignored() {
        let mut src = eastward();
        src.0.insert(1, src.0[0]);
        let curb = offset_curb(&src, Side::Left, D).unwrap();
        assert_eq!(curb.line.0.len(), 2);
    }

    #[test]
    fn offset_is_stable_across_calls() {
        let src = line(&[(-122.42, 37.77), (-122.419, 37.7712), (-122.417, 37.7714)]);
        assert_eq!(offset_curb(&src, Side::Right, D), offset_curb(&src, Side::Right, D));
    }
}
