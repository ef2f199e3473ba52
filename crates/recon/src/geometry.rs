//! Survey geometries and their canonical (rounded) comparison form.
//!
//! Geometries arrive as GeoJSON and are compared through [`CanonicalGeometry`]:
//! every coordinate is scaled by `10^decimals` and rounded, so sub-precision
//! jitter introduced by reprojection or file round trips does not break
//! record equality.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

/// One coordinate tuple (x, y[, z]).
pub type Position = Vec<f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum Geometry {
    Point(Position),
    MultiPoint(Vec<Position>),
    LineString(Vec<Position>),
    MultiLineString(Vec<Vec<Position>>),
    Polygon(Vec<Vec<Position>>),
    MultiPolygon(Vec<Vec<Vec<Position>>>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GeometryKind {
    Point,
    Line,
    Polygon,
}

impl std::fmt::Display for GeometryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Point => write!(f, "point"),
            Self::Line => write!(f, "line"),
            Self::Polygon => write!(f, "polygon"),
        }
    }
}

/// Structure-preserving, integer-rounded form of a geometry.
///
/// Part and ring boundaries are encoded as length prefixes so that two
/// geometries with the same coordinates but different nesting never compare
/// equal.
///
/// Rounding snaps to a grid; it is not a distance tolerance. Two coordinates
/// closer than the precision but on opposite sides of a half-unit boundary
/// still round apart. Equality stays transitive and hashable, which the
/// multiset diff relies on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CanonicalGeometry(Vec<i64>);

impl Geometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Self::Point(_) | Self::MultiPoint(_) => GeometryKind::Point,
            Self::LineString(_) | Self::MultiLineString(_) => GeometryKind::Line,
            Self::Polygon(_) | Self::MultiPolygon(_) => GeometryKind::Polygon,
        }
    }

    pub fn canonical(&self, decimals: u32) -> CanonicalGeometry {
        let scale = 10f64.powi(decimals as i32);
        let mut out = Vec::new();
        match self {
            Self::Point(p) => {
                out.push(0);
                push_position(&mut out, p, scale);
            }
            Self::MultiPoint(ps) => {
                out.push(1);
                push_positions(&mut out, ps, scale);
            }
            Self::LineString(ps) => {
                out.push(2);
                push_positions(&mut out, ps, scale);
            }
            Self::MultiLineString(lines) => {
                out.push(3);
                out.push(lines.len() as i64);
                for line in lines {
                    push_positions(&mut out, line, scale);
                }
            }
            Self::Polygon(rings) => {
                out.push(4);
                out.push(rings.len() as i64);
                for ring in rings {
                    push_positions(&mut out, ring, scale);
                }
            }
            Self::MultiPolygon(polys) => {
                out.push(5);
                out.push(polys.len() as i64);
                for rings in polys {
                    out.push(rings.len() as i64);
                    for ring in rings {
                        push_positions(&mut out, ring, scale);
                    }
                }
            }
        }
        CanonicalGeometry(out)
    }

    /// Well-known text, used for the CSV mirror column.
    pub fn to_wkt(&self) -> String {
        let mut s = String::new();
        match self {
            Self::Point(p) => {
                s.push_str("POINT (");
                write_position(&mut s, p);
                s.push(')');
            }
            Self::MultiPoint(ps) => {
                s.push_str("MULTIPOINT ");
                write_path(&mut s, ps);
            }
            Self::LineString(ps) => {
                s.push_str("LINESTRING ");
                write_path(&mut s, ps);
            }
            Self::MultiLineString(lines) => {
                s.push_str("MULTILINESTRING ");
                write_rings(&mut s, lines);
            }
            Self::Polygon(rings) => {
                s.push_str("POLYGON ");
                write_rings(&mut s, rings);
            }
            Self::MultiPolygon(polys) => {
                s.push_str("MULTIPOLYGON (");
                for (i, rings) in polys.iter().enumerate() {
                    if i > 0 {
                        s.push_str(", ");
                    }
                    write_rings(&mut s, rings);
                }
                s.push(')');
            }
        }
        s
    }
}

fn push_position(out: &mut Vec<i64>, p: &[f64], scale: f64) {
    out.push(p.len() as i64);
    // -0.0 and 0.0 both round to 0.
    out.extend(p.iter().map(|v| (v * scale).round() as i64));
}

fn push_positions(out: &mut Vec<i64>, ps: &[Position], scale: f64) {
    out.push(ps.len() as i64);
    for p in ps {
        push_position(out, p, scale);
    }
}

fn write_position(s: &mut String, p: &[f64]) {
    for (i, v) in p.iter().enumerate() {
        if i > 0 {
            s.push(' ');
        }
        let _ = write!(s, "{v}");
    }
}

fn write_path(s: &mut String, ps: &[Position]) {
    s.push('(');
    for (i, p) in ps.iter().enumerate() {
        if i > 0 {
            s.push_str(", ");
        }
        write_position(s, p);
    }
    s.push(')');
}

fn write_rings(s: &mut String, rings: &[Vec<Position>]) {
    s.push('(');
    for (i, ring) in rings.iter().enumerate() {
        if i > 0 {
            s.push_str(", ");
        }
        write_path(s, ring);
    }
    s.push(')');
}
