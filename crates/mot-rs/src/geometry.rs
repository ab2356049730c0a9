use nalgebra::{Isometry3, Point2, Point3, Vector3};
use ndarray::*;
use std::f64::consts::PI;

/// Wraps an angle into `(-PI, PI]`.
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

/// Returns a planar rigid transform: rotation of `yaw` about z followed by a translation of `(x, y)`.
pub fn planar_transform(x: f64, y: f64, yaw: f64) -> Isometry3<f64> {
    Isometry3::new(Vector3::new(x, y, 0.0), Vector3::z() * yaw)
}

/// Returns true if every component of the transform is finite.
pub fn is_finite_transform(transform: &Isometry3<f64>) -> bool {
    transform.translation.vector.iter().all(|v| v.is_finite())
        && transform.rotation.coords.iter().all(|v| v.is_finite())
}

/// Pose represents the position and heading of an object.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pose {
    /// Position along the x axis (m).
    x: f64,
    /// Position along the y axis (m).
    y: f64,
    /// Position along the z axis (m).
    z: f64,
    /// Heading about the z axis (rad).
    yaw: f64,
}

impl Pose {
    /// Returns a new Pose
    ///
    /// # Parameters
    ///
    /// * `x`: Position along the x axis.
    /// * `y`: Position along the y axis.
    /// * `z`: Position along the z axis.
    /// * `yaw`: Heading about the z axis, wrapped into `(-PI, PI]`.
    pub fn new(x: f64, y: f64, z: f64, yaw: f64) -> Pose {
        Pose {
            x,
            y,
            z,
            yaw: if yaw.is_finite() { wrap_angle(yaw) } else { yaw },
        }
    }

    /// Returns the x of the pose
    pub fn x(&self) -> f64 {
        self.x
    }

    /// Returns the y of the pose
    pub fn y(&self) -> f64 {
        self.y
    }

    /// Returns the z of the pose
    pub fn z(&self) -> f64 {
        self.z
    }

    /// Returns the yaw of the pose
    pub fn yaw(&self) -> f64 {
        self.yaw
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.yaw.is_finite()
    }

    /// Planar distance between two poses.
    pub fn distance_2d(&self, other: &Pose) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }

    /// Returns the pose expressed in the frame the transform maps into.
    pub fn transformed(&self, transform: &Isometry3<f64>) -> Pose {
        let position = transform * Point3::new(self.x, self.y, self.z);
        let (_, _, yaw) = transform.rotation.euler_angles();
        Pose::new(position.x, position.y, position.z, self.yaw + yaw)
    }
}

/// Shape represents the bounding cuboid extent of an object.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Shape {
    /// Extent along the heading (m).
    length: f64,
    /// Extent across the heading (m).
    width: f64,
    /// Vertical extent (m).
    height: f64,
}

impl Shape {
    /// Returns a new Shape
    ///
    /// # Parameters
    ///
    /// * `length`: Extent along the heading.
    /// * `width`: Extent across the heading.
    /// * `height`: Vertical extent.
    pub fn new(length: f64, width: f64, height: f64) -> Shape {
        Shape {
            length,
            width,
            height,
        }
    }

    /// Returns the length of the shape
    pub fn length(&self) -> f64 {
        self.length
    }

    /// Returns the width of the shape
    pub fn width(&self) -> f64 {
        self.width
    }

    /// Returns the height of the shape
    pub fn height(&self) -> f64 {
        self.height
    }

    /// Returns the footprint area of the shape
    pub fn area(&self) -> f64 {
        self.length * self.width
    }

    /// Returns true if the footprint has a finite, strictly positive extent.
    pub fn is_valid(&self) -> bool {
        self.length.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
            && self.length > 0.0
            && self.width > 0.0
            && self.height >= 0.0
    }

    /// Blends `other` into this shape with weight `gain` in `[0, 1]`.
    pub fn blend(&self, other: &Shape, gain: f64) -> Shape {
        Shape::new(
            self.length + gain * (other.length - self.length),
            self.width + gain * (other.width - self.width),
            self.height + gain * (other.height - self.height),
        )
    }
}

/// Planar velocity in the tracking world frame.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Velocity {
    pub vx: f64,
    pub vy: f64,
}

impl Velocity {
    pub fn new(vx: f64, vy: f64) -> Velocity {
        Velocity { vx, vy }
    }

    pub fn speed(&self) -> f64 {
        self.vx.hypot(self.vy)
    }

    pub fn heading(&self) -> f64 {
        self.vy.atan2(self.vx)
    }
}

/// Returns the axis-aligned extent of the oriented footprint in top-left, bottom-right format, i.e., `(min x, min y, max x, max y)`.
pub fn footprint_tlbr(pose: &Pose, shape: &Shape) -> Array1<f64> {
    let (sin, cos) = pose.yaw().sin_cos();
    let half_x = 0.5 * (shape.length() * cos.abs() + shape.width() * sin.abs());
    let half_y = 0.5 * (shape.length() * sin.abs() + shape.width() * cos.abs());
    arr1::<f64>(&[
        pose.x() - half_x,
        pose.y() - half_y,
        pose.x() + half_x,
        pose.y() + half_y,
    ])
}

/// Returns the corners of the oriented footprint, counter-clockwise.
pub fn footprint_corners(pose: &Pose, shape: &Shape) -> [Point2<f64>; 4] {
    let (sin, cos) = pose.yaw().sin_cos();
    let (half_length, half_width) = (0.5 * shape.length(), 0.5 * shape.width());
    [
        (half_length, -half_width),
        (half_length, half_width),
        (-half_length, half_width),
        (-half_length, -half_width),
    ]
    .map(|(dx, dy)| {
        Point2::new(
            pose.x() + dx * cos - dy * sin,
            pose.y() + dx * sin + dy * cos,
        )
    })
}

/// Shoelace area of a simple polygon.
fn polygon_area(polygon: &[Point2<f64>]) -> f64 {
    0.5 * polygon
        .iter()
        .zip(polygon.iter().cycle().skip(1))
        .map(|(p, q)| p.x * q.y - q.x * p.y)
        .sum::<f64>()
        .abs()
}

/// Clips a convex polygon by a counter-clockwise convex polygon (Sutherland-Hodgman).
fn clip_convex(subject: &[Point2<f64>], clip: &[Point2<f64>]) -> Vec<Point2<f64>> {
    let mut output = subject.to_vec();

    for (a, b) in clip.iter().zip(clip.iter().cycle().skip(1)) {
        if output.is_empty() {
            break;
        }
        let edge = *b - *a;
        let side = |p: &Point2<f64>| edge.perp(&(*p - *a));
        let crossing = |p: &Point2<f64>, q: &Point2<f64>| {
            let (sp, sq) = (side(p), side(q));
            *p + (*q - *p) * (sp / (sp - sq))
        };

        let input = std::mem::take(&mut output);
        for (p, q) in input.iter().zip(input.iter().cycle().skip(1)) {
            match (side(p) >= 0.0, side(q) >= 0.0) {
                (true, true) => output.push(*q),
                (false, true) => {
                    output.push(crossing(p, q));
                    output.push(*q);
                }
                (true, false) => output.push(crossing(p, q)),
                (false, false) => {}
            }
        }
    }
    output
}

/// Intersection over union of two oriented footprints, in [0.0, 1.0].
pub fn footprint_iou(pose_a: &Pose, shape_a: &Shape, pose_b: &Pose, shape_b: &Shape) -> f64 {
    let intersection = polygon_area(&clip_convex(
        &footprint_corners(pose_a, shape_a),
        &footprint_corners(pose_b, shape_b),
    ));
    let union = shape_a.area() + shape_b.area() - intersection;
    if union > 0.0 {
        (intersection / union).clamp(0.0, 1.0)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use crate::geometry::*;
    use assert_approx_eq::assert_approx_eq;
    use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

    #[test]
    fn wrap() {
        assert_approx_eq!(wrap_angle(2.5 * PI), FRAC_PI_2);
        assert_approx_eq!(wrap_angle(-PI), PI);
        assert_approx_eq!(wrap_angle(2.0 * PI + 0.5), 0.5);
        assert_approx_eq!(wrap_angle(-FRAC_PI_2), -FRAC_PI_2);
    }

    #[test]
    fn transformed() {
        let transform = planar_transform(10.0, -2.0, FRAC_PI_2);
        let pose = Pose::new(1.0, 0.0, 0.5, 0.0).transformed(&transform);
        assert_approx_eq!(pose.x(), 10.0);
        assert_approx_eq!(pose.y(), -1.0);
        assert_approx_eq!(pose.z(), 0.5);
        assert_approx_eq!(pose.yaw(), FRAC_PI_2);
    }

    #[test]
    fn finite_transform() {
        assert!(is_finite_transform(&planar_transform(1.0, 2.0, 0.3)));
        assert!(!is_finite_transform(&planar_transform(f64::NAN, 2.0, 0.3)));
    }

    #[test]
    fn shape_validity() {
        assert!(Shape::new(4.0, 2.0, 1.5).is_valid());
        assert!(!Shape::new(0.0, 2.0, 1.5).is_valid());
        assert!(!Shape::new(4.0, f64::INFINITY, 1.5).is_valid());
    }

    #[test]
    fn to_tlbr() {
        let tlbr = footprint_tlbr(&Pose::new(1.0, 2.0, 0.0, 0.0), &Shape::new(4.0, 2.0, 1.0));
        assert_eq!(tlbr, ndarray::arr1::<f64>(&[-1.0, 1.0, 3.0, 3.0]));

        let tlbr = footprint_tlbr(
            &Pose::new(0.0, 0.0, 0.0, FRAC_PI_2),
            &Shape::new(4.0, 2.0, 1.0),
        );
        assert_approx_eq!(tlbr[0], -1.0);
        assert_approx_eq!(tlbr[1], -2.0);
        assert_approx_eq!(tlbr[2], 1.0);
        assert_approx_eq!(tlbr[3], 2.0);
    }

    #[test]
    fn oriented_iou() {
        let shape = Shape::new(4.0, 2.0, 1.0);
        let yawed = Pose::new(3.0, -1.0, 0.0, 0.7);
        assert_approx_eq!(footprint_iou(&yawed, &shape, &yawed, &shape), 1.0);

        // crossing at right angles share a 2 x 2 square
        let along = Pose::new(0.0, 0.0, 0.0, 0.0);
        let across = Pose::new(0.0, 0.0, 0.0, FRAC_PI_2);
        assert_approx_eq!(footprint_iou(&along, &shape, &across, &shape), 4.0 / 12.0);

        let corners = footprint_corners(&across, &shape);
        assert_approx_eq!(corners[0].x, 1.0);
        assert_approx_eq!(corners[0].y, 2.0);
    }

    #[test]
    fn diagonal_neighbours_do_not_overlap() {
        let shape = Shape::new(4.5, 1.9, 1.6);
        let yaw = FRAC_PI_4;
        let left = Pose::new(0.0, 0.0, 0.0, yaw);
        // side by side, 2.0 apart across the heading
        let right = Pose::new(-2.0 * yaw.sin(), 2.0 * yaw.cos(), 0.0, yaw);

        let extents = footprint_tlbr(&left, &shape);
        let other = footprint_tlbr(&right, &shape);
        assert!(extents[2] > other[0] && other[3] > extents[1]);
        assert_approx_eq!(footprint_iou(&left, &shape, &right, &shape), 0.0);
    }
}
