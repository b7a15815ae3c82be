//! Geometry descriptions that serialize to gmsh `.geo` scripts.
//!
//! The pipeline only needs the [`GeoScript`] capability: something that
//! produces script text for the engine. [`Geometry`] is a small builder for
//! the common planar cases (polygons, rectangles, circles with holes and
//! physical groups); anything else can be written as raw code or passed in as
//! a `.geo` string directly.
//!
//! # Example
//!
//! ```
//! use mesh_gen::geometry::{GeoScript, Geometry};
//! use nalgebra::Point3;
//!
//! let mut geom = Geometry::new();
//! let square = geom
//!     .add_polygon(
//!         &[
//!             Point3::new(0.0, 0.0, 0.0),
//!             Point3::new(1.0, 0.0, 0.0),
//!             Point3::new(1.0, 1.0, 0.0),
//!             Point3::new(0.0, 1.0, 0.0),
//!         ],
//!         Some(0.1),
//!     )
//!     .unwrap();
//! geom.add_physical_surface(&[square.surface], 7);
//!
//! let code = geom.get_code();
//! assert!(code.contains("Plane Surface(1) = {1};"));
//! assert!(code.contains("Physical Surface(7) = {1};"));
//! ```

use std::fmt::Write as _;

use nalgebra::{Matrix3, Point3, Unit, Vector3};

use crate::error::{MeshError, MeshResult};

/// Anything that can render itself as a gmsh geometry script.
pub trait GeoScript {
    /// The complete script text handed to the engine.
    fn get_code(&self) -> String;
}

impl GeoScript for str {
    fn get_code(&self) -> String {
        self.to_string()
    }
}

impl GeoScript for String {
    fn get_code(&self) -> String {
        self.clone()
    }
}

impl<T: GeoScript + ?Sized> GeoScript for &T {
    fn get_code(&self) -> String {
        (**self).get_code()
    }
}

/// Rotation by `theta` radians around the unit axis `u` (Rodrigues' formula).
///
/// ```
/// use mesh_gen::geometry::rotation_matrix;
/// use nalgebra::{Unit, Vector3};
///
/// let r = rotation_matrix(&Unit::new_normalize(Vector3::z()), std::f64::consts::FRAC_PI_2);
/// let v = r * Vector3::x();
/// assert!((v - Vector3::y()).norm() < 1e-12);
/// ```
pub fn rotation_matrix(u: &Unit<Vector3<f64>>, theta: f64) -> Matrix3<f64> {
    let (s, c) = theta.sin_cos();
    let u = u.into_inner();
    Matrix3::identity() * c + u.cross_matrix() * s + (u * u.transpose()) * (1.0 - c)
}

/// Tag of a geometric point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PointTag(pub u32);

/// Tag of a curve (line or circle arc); negative means reversed orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CurveTag(pub i32);

impl CurveTag {
    /// The same curve traversed backwards.
    pub fn reversed(self) -> Self {
        CurveTag(-self.0)
    }
}

/// Tag of a closed curve loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopTag(pub u32);

/// Tag of a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceTag(pub u32);

/// Entities created by [`Geometry::add_polygon`] and friends.
#[derive(Debug, Clone, PartialEq)]
pub struct Polygon {
    pub points: Vec<PointTag>,
    pub curves: Vec<CurveTag>,
    pub curve_loop: LoopTag,
    pub surface: SurfaceTag,
}

/// Entities created by [`Geometry::add_circle`].
#[derive(Debug, Clone, PartialEq)]
pub struct Circle {
    pub center: PointTag,
    pub arcs: Vec<CurveTag>,
    pub curve_loop: LoopTag,
    pub surface: SurfaceTag,
}

/// Builder for gmsh `.geo` scripts.
#[derive(Debug, Clone, Default)]
pub struct Geometry {
    code: Vec<String>,
    next_point: u32,
    next_curve: i32,
    next_loop: u32,
    next_surface: u32,
}

impl Geometry {
    /// Create an empty geometry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a point, with an optional characteristic length.
    pub fn add_point(&mut self, x: Point3<f64>, lcar: Option<f64>) -> PointTag {
        self.next_point += 1;
        let tag = PointTag(self.next_point);
        let line = match lcar {
            Some(h) => format!("Point({}) = {{{}, {}, {}, {}}};", tag.0, x.x, x.y, x.z, h),
            None => format!("Point({}) = {{{}, {}, {}}};", tag.0, x.x, x.y, x.z),
        };
        self.code.push(line);
        tag
    }

    /// Add a straight line between two points.
    pub fn add_line(&mut self, start: PointTag, end: PointTag) -> CurveTag {
        let tag = self.new_curve();
        self.code
            .push(format!("Line({}) = {{{}, {}}};", tag.0, start.0, end.0));
        tag
    }

    /// Add a circle arc (less than pi) from `start` to `end` around `center`.
    pub fn add_circle_arc(&mut self, start: PointTag, center: PointTag, end: PointTag) -> CurveTag {
        let tag = self.new_curve();
        self.code.push(format!(
            "Circle({}) = {{{}, {}, {}}};",
            tag.0, start.0, center.0, end.0
        ));
        tag
    }

    /// Close a chain of curves into a loop.
    pub fn add_curve_loop(&mut self, curves: &[CurveTag]) -> MeshResult<LoopTag> {
        if curves.is_empty() {
            return Err(MeshError::InvalidScript {
                details: "a curve loop needs at least one curve".into(),
            });
        }
        self.next_loop += 1;
        let tag = LoopTag(self.next_loop);
        self.code.push(format!(
            "Line Loop({}) = {{{}}};",
            tag.0,
            join(curves.iter().map(|c| c.0))
        ));
        Ok(tag)
    }

    /// Add a plane surface bounded by `outer`, with optional holes.
    pub fn add_plane_surface(&mut self, outer: LoopTag, holes: &[LoopTag]) -> SurfaceTag {
        self.next_surface += 1;
        let tag = SurfaceTag(self.next_surface);
        let loops = std::iter::once(outer).chain(holes.iter().copied());
        self.code.push(format!(
            "Plane Surface({}) = {{{}}};",
            tag.0,
            join(loops.map(|l| l.0))
        ));
        tag
    }

    /// Add a closed polygon and the plane surface it bounds.
    pub fn add_polygon(&mut self, corners: &[Point3<f64>], lcar: Option<f64>) -> MeshResult<Polygon> {
        self.add_polygon_with_holes(corners, lcar, &[])
    }

    /// Add a polygon whose surface has the given holes cut out.
    pub fn add_polygon_with_holes(
        &mut self,
        corners: &[Point3<f64>],
        lcar: Option<f64>,
        holes: &[LoopTag],
    ) -> MeshResult<Polygon> {
        if corners.len() < 3 {
            return Err(MeshError::InvalidScript {
                details: format!("a polygon needs at least 3 corners, got {}", corners.len()),
            });
        }
        let points: Vec<PointTag> = corners.iter().map(|&c| self.add_point(c, lcar)).collect();
        let curves: Vec<CurveTag> = (0..points.len())
            .map(|i| self.add_line(points[i], points[(i + 1) % points.len()]))
            .collect();
        let curve_loop = self.add_curve_loop(&curves)?;
        let surface = self.add_plane_surface(curve_loop, holes);
        Ok(Polygon {
            points,
            curves,
            curve_loop,
            surface,
        })
    }

    /// Add an axis-aligned rectangle at height `z`.
    pub fn add_rectangle(
        &mut self,
        x: (f64, f64),
        y: (f64, f64),
        z: f64,
        lcar: Option<f64>,
    ) -> MeshResult<Polygon> {
        self.add_polygon(
            &[
                Point3::new(x.0, y.0, z),
                Point3::new(x.1, y.0, z),
                Point3::new(x.1, y.1, z),
                Point3::new(x.0, y.1, z),
            ],
            lcar,
        )
    }

    /// Add a disk made of four quarter arcs.
    ///
    /// `orientation` rotates the circle's plane out of the xy-plane; see
    /// [`rotation_matrix`].
    pub fn add_circle(
        &mut self,
        center: Point3<f64>,
        radius: f64,
        lcar: Option<f64>,
        orientation: Option<&Matrix3<f64>>,
    ) -> MeshResult<Circle> {
        if !(radius > 0.0 && radius.is_finite()) {
            return Err(MeshError::InvalidScript {
                details: format!("circle radius must be positive, got {}", radius),
            });
        }
        let rotate = |v: Vector3<f64>| match orientation {
            Some(r) => r * v,
            None => v,
        };
        let center_tag = self.add_point(center, lcar);
        let rim: Vec<PointTag> = [
            Vector3::x(),
            Vector3::y(),
            -Vector3::x(),
            -Vector3::y(),
        ]
        .into_iter()
        .map(|dir| self.add_point(center + rotate(dir * radius), lcar))
        .collect();
        let arcs: Vec<CurveTag> = (0..4)
            .map(|i| self.add_circle_arc(rim[i], center_tag, rim[(i + 1) % 4]))
            .collect();
        let curve_loop = self.add_curve_loop(&arcs)?;
        let surface = self.add_plane_surface(curve_loop, &[]);
        Ok(Circle {
            center: center_tag,
            arcs,
            curve_loop,
            surface,
        })
    }

    /// Tag surfaces as a physical group.
    pub fn add_physical_surface(&mut self, surfaces: &[SurfaceTag], label: i32) {
        self.code.push(format!(
            "Physical Surface({}) = {{{}}};",
            label,
            join(surfaces.iter().map(|s| s.0))
        ));
    }

    /// Tag curves as a physical group.
    pub fn add_physical_curve(&mut self, curves: &[CurveTag], label: i32) {
        self.code.push(format!(
            "Physical Line({}) = {{{}}};",
            label,
            join(curves.iter().map(|c| c.0))
        ));
    }

    /// Translate surfaces by `offset`.
    pub fn translate(&mut self, surfaces: &[SurfaceTag], offset: Vector3<f64>) {
        self.code.push(format!(
            "Translate {{{}, {}, {}}} {{ Surface{{{}}}; }}",
            offset.x,
            offset.y,
            offset.z,
            join(surfaces.iter().map(|s| s.0))
        ));
    }

    /// Rotate surfaces by `angle` radians around `axis` through `origin`.
    pub fn rotate(
        &mut self,
        surfaces: &[SurfaceTag],
        origin: Point3<f64>,
        axis: Vector3<f64>,
        angle: f64,
    ) {
        self.code.push(format!(
            "Rotate {{{{{}, {}, {}}}, {{{}, {}, {}}}, {}}} {{ Surface{{{}}}; }}",
            axis.x,
            axis.y,
            axis.z,
            origin.x,
            origin.y,
            origin.z,
            angle,
            join(surfaces.iter().map(|s| s.0))
        ));
    }

    /// Append raw script code.
    ///
    /// Entities created here should use gmsh's `newp`/`newl`/`news` so their
    /// tags do not collide with the builder's own numbering.
    pub fn add_raw_code(&mut self, code: impl Into<String>) {
        self.code.push(code.into());
    }

    fn new_curve(&mut self) -> CurveTag {
        self.next_curve += 1;
        CurveTag(self.next_curve)
    }
}

impl GeoScript for Geometry {
    fn get_code(&self) -> String {
        let mut out = String::new();
        for line in &self.code {
            let _ = writeln!(out, "{}", line);
        }
        out
    }
}

fn join<T: std::fmt::Display>(items: impl Iterator<Item = T>) -> String {
    items.map(|i| i.to_string()).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_rotation_matrix_is_orthogonal() {
        let axis = Unit::new_normalize(Vector3::new(1.0, 2.0, 3.0));
        let r = rotation_matrix(&axis, 0.7);
        assert_relative_eq!(r * r.transpose(), Matrix3::identity(), epsilon = 1e-12);
        assert_relative_eq!(r.determinant(), 1.0, epsilon = 1e-12);
        // The axis is fixed by the rotation.
        assert_relative_eq!(r * axis.into_inner(), axis.into_inner(), epsilon = 1e-12);
    }

    #[test]
    fn test_polygon_code() {
        let mut geom = Geometry::new();
        let poly = geom
            .add_polygon(
                &[
                    Point3::new(0.0, 0.0, 0.0),
                    Point3::new(1.0, 0.0, 0.0),
                    Point3::new(0.0, 1.0, 0.0),
                ],
                Some(0.5),
            )
            .unwrap();
        assert_eq!(poly.points.len(), 3);
        assert_eq!(poly.curves, vec![CurveTag(1), CurveTag(2), CurveTag(3)]);

        let code = geom.get_code();
        assert!(code.contains("Point(2) = {1, 0, 0, 0.5};"));
        assert!(code.contains("Line(3) = {3, 1};"));
        assert!(code.contains("Line Loop(1) = {1, 2, 3};"));
        assert!(code.ends_with("Plane Surface(1) = {1};\n"));
    }

    #[test]
    fn test_polygon_needs_three_corners() {
        let mut geom = Geometry::new();
        let err = geom
            .add_polygon(&[Point3::origin(), Point3::new(1.0, 0.0, 0.0)], None)
            .unwrap_err();
        assert!(matches!(err, MeshError::InvalidScript { .. }));
    }

    #[test]
    fn test_rectangle_with_circular_hole() {
        let mut geom = Geometry::new();
        let hole = geom
            .add_circle(Point3::new(0.5, 0.5, 0.0), 0.2, Some(0.05), None)
            .unwrap();
        let rect = geom
            .add_polygon_with_holes(
                &[
                    Point3::new(0.0, 0.0, 0.0),
                    Point3::new(1.0, 0.0, 0.0),
                    Point3::new(1.0, 1.0, 0.0),
                    Point3::new(0.0, 1.0, 0.0),
                ],
                Some(0.1),
                &[hole.curve_loop],
            )
            .unwrap();
        let code = geom.get_code();
        assert_eq!(hole.arcs.len(), 4);
        assert!(code.contains("Circle(1) = {2, 1, 3};"));
        assert!(code.contains(&format!(
            "Plane Surface({}) = {{{}, {}}};",
            rect.surface.0, rect.curve_loop.0, hole.curve_loop.0
        )));
    }

    #[test]
    fn test_rotated_circle_leaves_plane() {
        let mut geom = Geometry::new();
        let r = rotation_matrix(&Unit::new_normalize(Vector3::x()), std::f64::consts::FRAC_PI_2);
        geom.add_circle(Point3::origin(), 1.0, None, Some(&r)).unwrap();
        // The +y rim point is rotated onto +z.
        let code = geom.get_code();
        let third = code.lines().nth(2).unwrap();
        assert!(third.starts_with("Point(3)"));
        assert!(third.ends_with(", 1};"));
    }

    #[test]
    fn test_raw_strings_are_scripts() {
        let script = "Point(1) = {0, 0, 0};";
        assert_eq!(script.get_code(), script);
        assert_eq!(String::from(script).get_code(), script);
    }

    #[test]
    fn test_reversed_curve() {
        assert_eq!(CurveTag(4).reversed(), CurveTag(-4));
    }
}
