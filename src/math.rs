
//! Simple math utilities.
//! Rectangles in file space (top-left origin, y down)
//! and in engine space (centered origin, y up).

use crate::io::*;
use crate::error::{Result, UnitResult, i32_to_usize};


/// Simple two-dimensional vector of any numerical type.
/// Supports only few mathematical operations
/// as this is used mainly as data struct.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Vec2<T> (pub T, pub T);

impl<T> Vec2<T> {

    /// Maps all components of this vector to a new type, yielding a vector of that new type.
    pub fn map<B>(self, map: impl Fn(T) -> B) -> Vec2<B> {
        Vec2(map(self.0), map(self.1))
    }

    /// Seeing this vector as a dimension or size (width and height),
    /// this returns the area that this dimensions contains (`width * height`).
    pub fn area(self) -> T where T: std::ops::Mul<T, Output = T> {
        self.0 * self.1
    }

    /// The first component of this 2D vector.
    pub fn x(self) -> T { self.0 }

    /// The second component of this 2D vector.
    pub fn y(self) -> T { self.1 }

    /// The first component of this 2D vector.
    pub fn width(self) -> T { self.0 }

    /// The second component of this 2D vector.
    pub fn height(self) -> T { self.1 }
}

impl<T: std::ops::Add<T>> std::ops::Add<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn add(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 + other.0, self.1 + other.1)
    }
}

impl<T: std::ops::Sub<T>> std::ops::Sub<Vec2<T>> for Vec2<T> {
    type Output = Vec2<T::Output>;
    fn sub(self, other: Vec2<T>) -> Self::Output {
        Vec2(self.0 - other.0, self.1 - other.1)
    }
}

impl<T> From<(T, T)> for Vec2<T> {
    fn from((x, y): (T, T)) -> Self { Vec2(x, y) }
}


/// An integer rectangle in file space, as stored in layer records and masks.
/// Stored as top, left, bottom, right. Width and height are derived.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct Rect {

    /// Inclusive.
    pub top: i32,

    /// Inclusive.
    pub left: i32,

    /// Exclusive.
    pub bottom: i32,

    /// Exclusive.
    pub right: i32,
}

impl Rect {

    /// Create a rectangle from its top-left corner and its size.
    pub fn from_position_size(x: i32, y: i32, width: i32, height: i32) -> Self {
        Rect { top: y, left: x, bottom: y + height, right: x + width }
    }

    /// Rectangle at the origin with the given size.
    pub fn from_size(width: i32, height: i32) -> Self {
        Self::from_position_size(0, 0, width, height)
    }

    /// The horizontal extent. Negative for malformed rectangles.
    pub fn width(&self) -> i32 { self.right.saturating_sub(self.left) }

    /// The vertical extent. Negative for malformed rectangles.
    pub fn height(&self) -> i32 { self.bottom.saturating_sub(self.top) }

    /// The size of this rectangle, with negative extents clamped to zero.
    pub fn size(&self) -> Vec2<usize> {
        Vec2(self.width().max(0) as usize, self.height().max(0) as usize)
    }

    /// Whether this rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// The number of pixels in this rectangle.
    pub fn pixel_count(&self) -> usize {
        self.size().area()
    }

    /// Returns whether the point is inside this rectangle.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }

    /// Move this rectangle by the given offset.
    pub fn translated(self, x: i32, y: i32) -> Self {
        Rect {
            top: self.top.saturating_add(y), left: self.left.saturating_add(x),
            bottom: self.bottom.saturating_add(y), right: self.right.saturating_add(x),
        }
    }

    /// Validate that the extents are not negative.
    pub fn validate(&self) -> UnitResult {
        i32_to_usize(self.width(), "negative rectangle width")?;
        i32_to_usize(self.height(), "negative rectangle height")?;
        Ok(())
    }

    /// Number of bytes this rectangle occupies in a file.
    pub fn byte_size() -> usize {
        4 * i32::BYTE_SIZE
    }

    /// Read a rectangle stored as top, left, bottom, right.
    pub fn read(read: &mut impl Read) -> Result<Self> {
        let top = i32::read(read)?;
        let left = i32::read(read)?;
        let bottom = i32::read(read)?;
        let right = i32::read(read)?;
        Ok(Rect { top, left, bottom, right })
    }

    /// Write this rectangle as top, left, bottom, right.
    pub fn write(&self, write: &mut impl Write) -> UnitResult {
        self.top.write(write)?;
        self.left.write(write)?;
        self.bottom.write(write)?;
        self.right.write(write)
    }

    /// Convert to engine space: origin in the center of the document, y pointing up.
    pub fn to_engine_space(&self, document_width: usize, document_height: usize) -> FloatRect {
        FloatRect {
            x: self.left as f32,
            y: self.top as f32,
            width: self.width() as f32,
            height: self.height() as f32,
        }.to_engine_space(document_width, document_height)
    }
}


/// A floating point rectangle, used for coordinates in engine space.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct FloatRect {

    /// Left edge.
    pub x: f32,

    /// Bottom edge in engine space, top edge in file space.
    pub y: f32,

    /// Horizontal extent.
    pub width: f32,

    /// Vertical extent.
    pub height: f32,
}

impl FloatRect {

    /// Create a rectangle from its left, top, right and bottom edges.
    pub fn from_bounds(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        FloatRect {
            x: left as f32, y: top as f32,
            width: (right - left) as f32,
            height: (bottom - top) as f32,
        }
    }

    /// Convert a file space rectangle (top-left origin, y down)
    /// to engine space (centered origin, y up).
    pub fn to_engine_space(self, document_width: usize, document_height: usize) -> Self {
        FloatRect {
            x: self.x - document_width as f32 / 2.0,
            y: document_height as f32 / 2.0 - self.y - self.height,
            width: self.width,
            height: self.height,
        }
    }

    /// The inverse of `to_engine_space`.
    pub fn to_file_space(self, document_width: usize, document_height: usize) -> Self {
        FloatRect {
            x: self.x + document_width as f32 / 2.0,
            y: document_height as f32 / 2.0 - self.y - self.height,
            width: self.width,
            height: self.height,
        }
    }

    /// Round to the nearest integer rectangle.
    pub fn round(self) -> Rect {
        Rect::from_position_size(
            self.x.round() as i32, self.y.round() as i32,
            self.width.round() as i32, self.height.round() as i32,
        )
    }

    /// Move the rectangle by the given offset.
    pub fn translated(self, x: f32, y: f32) -> Self {
        FloatRect { x: self.x + x, y: self.y + y, .. self }
    }
}


/// A 3x3 matrix, addressed as `m[row][column]`.
/// Describes the projective transform of a placed layer.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Matrix3 {
    pub m: [[f32; 3]; 3],
}

impl Matrix3 {

    /// The matrix that does not transform anything.
    pub const IDENTITY: Matrix3 = Matrix3 { m: [ [1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0] ] };

    /// Compute the transform that maps the centered unit square
    /// onto the quad with the corners `p1` to `p4`.
    pub fn from_quad(p1: Vec2<f32>, p2: Vec2<f32>, p3: Vec2<f32>, p4: Vec2<f32>) -> Self {
        let j = p1.0 - p2.0 - p3.0 + p4.0;
        let k = -p1.0 - p2.0 + p3.0 + p4.0;
        let l = -p1.0 + p2.0 - p3.0 + p4.0;
        let m = p1.1 - p2.1 - p3.1 + p4.1;
        let n = -p1.1 - p2.1 + p3.1 + p4.1;
        let o = -p1.1 + p2.1 - p3.1 + p4.1;

        let m22 = 1.0;
        let mut m21 = 0.0;
        let mut m20 = 0.0;

        let denominator = m * k - j * n;
        if denominator != 0.0 { m21 = (j * o - m * l) / denominator; }
        if j != 0.0 { m20 = (k * m21 - l * m22) / j; }

        let sum = m20 + m21 + m22;

        let m12 = (p1.1 * sum + p3.1 * (-m20 - m21 + m22)) * 0.5;
        let m11 = (p1.1 * sum - p2.1 * (m20 - m21 + m22)) * 0.5;
        let m10 = p1.1 * sum - m12 - m11;

        let m02 = (p1.0 * sum + p3.0 * (-m20 - m21 + m22)) * 0.5;
        let m01 = (p1.0 * sum - p2.0 * (m20 - m21 + m22)) * 0.5;
        let m00 = p1.0 * sum - m02 - m01;

        Matrix3 { m: [ [m00, m01, m02], [m10, m11, m12], [m20, m21, m22] ] }
    }

    /// The translation part of this matrix.
    pub fn position(&self) -> Vec2<f32> {
        Vec2(self.m[0][2], self.m[1][2])
    }

    /// The length of the first two columns,
    /// negative where the column points against its axis.
    pub fn scale(&self) -> Vec2<f32> {
        let column_x = [ self.m[0][0], self.m[1][0], self.m[2][0] ];
        let column_y = [ self.m[0][1], self.m[1][1], self.m[2][1] ];

        let length = |column: [f32; 3]| (column[0] * column[0] + column[1] * column[1] + column[2] * column[2]).sqrt();
        let signed = |magnitude: f32, component: f32| if component < 0.0 { -magnitude } else { magnitude };

        Vec2(
            signed(length(column_x), column_x[0]),
            signed(length(column_y), column_y[1]),
        )
    }

    /// The rotation around the z axis, in degrees.
    pub fn rotation_degrees(&self) -> f32 {
        self.m[1][0].atan2(self.m[0][0]).to_degrees()
    }
}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rect_io(){
        let rect = Rect { top: 1, left: -2, bottom: 30, right: 40 };
        let mut bytes = Vec::new();
        rect.write(&mut bytes).unwrap();
        assert_eq!(bytes.len(), Rect::byte_size());
        assert_eq!(&bytes[.. 4], &[0, 0, 0, 1]);
        assert_eq!(Rect::read(&mut bytes.as_slice()).unwrap(), rect);
        assert_eq!(rect.width(), 42);
        assert_eq!(rect.height(), 29);
    }

    #[test]
    fn engine_space_round_trip(){
        let (width, height) = (640, 480);

        for &(x, y, w, h) in &[ (0, 0, 640, 480), (10, 20, 30, 40), (600, 1, 40, 479), (3, 470, 1, 10) ] {
            let rect = FloatRect { x: x as f32, y: y as f32, width: w as f32, height: h as f32 };
            let there = rect.to_engine_space(width, height);
            assert_eq!(there.to_file_space(width, height), rect);
            assert_eq!(rect.to_file_space(width, height).to_engine_space(width, height), rect);
        }
    }

    #[test]
    fn engine_space_flips_y(){
        let rect = Rect::from_position_size(0, 0, 10, 10).to_engine_space(100, 100);
        assert_eq!(rect, FloatRect { x: -50.0, y: 40.0, width: 10.0, height: 10.0 });
    }

    #[test]
    fn axis_aligned_quad_has_no_perspective(){
        // corners as stored in a placed layer transform:
        // top left, top right, bottom right, bottom left
        let corners = [ 10.0, 20.0,  110.0, 20.0,  110.0, 70.0,  10.0, 70.0 ];
        let point = |index: usize| Vec2(corners[index * 2], corners[index * 2 + 1]);
        let matrix = Matrix3::from_quad(point(2), point(1), point(0), point(3));

        assert_eq!(matrix.m[2], [0.0, 0.0, 1.0]);
        assert_eq!(matrix.position(), Vec2(60.0, 45.0));
        assert_eq!(matrix.scale(), Vec2(50.0, 25.0));
        assert_eq!(matrix.rotation_degrees(), 0.0);
    }
}
