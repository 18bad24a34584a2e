use glam::Vec2;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Errors from decoding a shape.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShapeError {
    #[error("invalid shape bits: {0:#04x}")]
    InvalidBits(u8),
    #[error("unknown shape name: {0:?}")]
    UnknownName(String),
}

/// One of the four sides of a cell. North is towards smaller Y.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    North,
    West,
    East,
    South,
}

impl Side {
    pub const ALL: [Side; 4] = [Side::North, Side::West, Side::East, Side::South];

    pub fn opposite(self) -> Side {
        match self {
            Side::North => Side::South,
            Side::West => Side::East,
            Side::East => Side::West,
            Side::South => Side::North,
        }
    }

    /// Offset to the neighbouring cell on this side.
    pub fn offset(self) -> glam::IVec2 {
        match self {
            Side::North => glam::IVec2::new(0, -1),
            Side::West => glam::IVec2::new(-1, 0),
            Side::East => glam::IVec2::new(1, 0),
            Side::South => glam::IVec2::new(0, 1),
        }
    }

    pub fn bit(self) -> u8 {
        match self {
            Side::North => 0x01,
            Side::West => 0x02,
            Side::East => 0x04,
            Side::South => 0x08,
        }
    }
}

/// Set of cell sides packed in the low nibble. Bit layout matches the
/// `Cell::OBSTRUCTED_FULLY_BY_*_NEIGHBOR` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Sides(pub u8);

impl Sides {
    pub const NONE: Sides = Sides(0);
    pub const N: Sides = Sides(0x01);
    pub const W: Sides = Sides(0x02);
    pub const E: Sides = Sides(0x04);
    pub const S: Sides = Sides(0x08);
    pub const ALL: Sides = Sides(0x0F);

    pub fn contains(self, side: Side) -> bool {
        self.0 & side.bit() != 0
    }

    pub fn with(self, side: Side) -> Sides {
        Sides(self.0 | side.bit())
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every side in `self` is also in `other`.
    pub fn is_subset_of(self, other: Sides) -> bool {
        self.0 & !other.0 == 0
    }

    fn hflipped(self) -> Sides {
        let w = self.0 & 0x02;
        let e = self.0 & 0x04;
        Sides((self.0 & !0x06) | (w << 1) | (e >> 1))
    }

    fn vflipped(self) -> Sides {
        let n = self.0 & 0x01;
        let s = self.0 & 0x08;
        Sides((self.0 & !0x09) | (n << 3) | (s >> 3))
    }
}

const fn s(a: [f32; 2], b: [f32; 2], sides: u8) -> RawEdge {
    RawEdge { a, b, sides }
}

#[derive(Clone, Copy)]
struct RawEdge {
    a: [f32; 2],
    b: [f32; 2],
    sides: u8,
}

const N: u8 = 0x01;
const W: u8 = 0x02;
const E: u8 = 0x04;
const S: u8 = 0x08;

/// The eight base polygons, unflipped. Coordinates are normalized to the cell (0..1,
/// Y pointing south). Each edge is tagged with the cell sides it faces; interior edges
/// face none.
static BASE_OUTLINES: [&[RawEdge]; 8] = [
    // FULL_SQUARE
    &[
        s([0.0, 0.0], [1.0, 0.0], N),
        s([1.0, 0.0], [1.0, 1.0], E),
        s([1.0, 1.0], [0.0, 1.0], S),
        s([0.0, 1.0], [0.0, 0.0], W),
    ],
    // LARGE_TRIANGLE
    &[
        s([0.0, 0.0], [1.0, 0.0], N),
        s([1.0, 0.0], [0.0, 1.0], E | S),
        s([0.0, 1.0], [0.0, 0.0], W),
    ],
    // SMALL_TRIANGLE_HOR
    &[
        s([0.0, 0.0], [1.0, 0.0], N),
        s([1.0, 0.0], [0.0, 0.5], E | S),
        s([0.0, 0.5], [0.0, 0.0], W),
    ],
    // TALL_SMALL_TRIANGLE_HOR
    &[
        s([0.0, 0.0], [1.0, 0.0], N),
        s([1.0, 0.0], [1.0, 0.5], E),
        s([1.0, 0.5], [0.0, 1.0], E | S),
        s([0.0, 1.0], [0.0, 0.0], W),
    ],
    // HALF_SQUARE_HOR
    &[
        s([0.0, 0.0], [1.0, 0.0], N),
        s([1.0, 0.0], [1.0, 0.5], E),
        s([1.0, 0.5], [0.0, 0.5], 0),
        s([0.0, 0.5], [0.0, 0.0], W),
    ],
    // SMALL_TRIANGLE_VER
    &[
        s([0.0, 0.0], [0.5, 0.0], N),
        s([0.5, 0.0], [0.0, 1.0], E | S),
        s([0.0, 1.0], [0.0, 0.0], W),
    ],
    // TALL_SMALL_TRIANGLE_VER
    &[
        s([0.0, 0.0], [1.0, 0.0], N),
        s([1.0, 0.0], [0.5, 1.0], E | S),
        s([0.5, 1.0], [0.0, 1.0], S),
        s([0.0, 1.0], [0.0, 0.0], W),
    ],
    // HALF_SQUARE_VER
    &[
        s([0.0, 0.0], [0.5, 0.0], N),
        s([0.5, 0.0], [0.5, 1.0], 0),
        s([0.5, 1.0], [0.0, 1.0], S),
        s([0.0, 1.0], [0.0, 0.0], W),
    ],
];

/// Blockage of the unflipped base shapes, in `Blockage` bit layout.
static BASE_BLOCKAGE: [u8; 8] = [
    Blockage::ALL_FULLY,
    Blockage::ALL | Blockage::NORTH_FULLY | Blockage::WEST_FULLY,
    Blockage::NORTH_FULLY | Blockage::SOUTH,
    Blockage::ALL | Blockage::NORTH_FULLY | Blockage::WEST_FULLY,
    Blockage::NORTH_FULLY | Blockage::SOUTH,
    Blockage::WEST_FULLY | Blockage::EAST,
    Blockage::ALL | Blockage::NORTH_FULLY | Blockage::WEST_FULLY,
    Blockage::WEST_FULLY | Blockage::EAST,
];

/// The eight base polygons a wall can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseShape {
    FullSquare,
    LargeTriangle,
    SmallTriangleHor,
    TallSmallTriangleHor,
    HalfSquareHor,
    SmallTriangleVer,
    TallSmallTriangleVer,
    HalfSquareVer,
}

impl BaseShape {
    pub const ALL: [BaseShape; 8] = [
        BaseShape::FullSquare,
        BaseShape::LargeTriangle,
        BaseShape::SmallTriangleHor,
        BaseShape::TallSmallTriangleHor,
        BaseShape::HalfSquareHor,
        BaseShape::SmallTriangleVer,
        BaseShape::TallSmallTriangleVer,
        BaseShape::HalfSquareVer,
    ];

    fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            BaseShape::FullSquare => "FULL_SQUARE",
            BaseShape::LargeTriangle => "LARGE_TRIANGLE",
            BaseShape::SmallTriangleHor => "SMALL_TRIANGLE_HOR",
            BaseShape::TallSmallTriangleHor => "TALL_SMALL_TRIANGLE_HOR",
            BaseShape::HalfSquareHor => "HALF_SQUARE_HOR",
            BaseShape::SmallTriangleVer => "SMALL_TRIANGLE_VER",
            BaseShape::TallSmallTriangleVer => "TALL_SMALL_TRIANGLE_VER",
            BaseShape::HalfSquareVer => "HALF_SQUARE_VER",
        }
    }
}

/// Which parts of the cell border a wall blocks. Two bits per side: the low bit of a pair
/// means "blocks partially", both bits mean "blocks fully".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Blockage(pub u8);

impl Blockage {
    pub const NORTH: u8 = 0x01;
    pub const NORTH_FULLY: u8 = 0x03;
    pub const WEST: u8 = 0x04;
    pub const WEST_FULLY: u8 = 0x0C;
    pub const EAST: u8 = 0x10;
    pub const EAST_FULLY: u8 = 0x30;
    pub const SOUTH: u8 = 0x40;
    pub const SOUTH_FULLY: u8 = 0xC0;
    pub const ALL: u8 = 0xAA;
    pub const ALL_FULLY: u8 = 0xFF;

    fn mask(side: Side) -> u8 {
        match side {
            Side::North => Self::NORTH_FULLY,
            Side::West => Self::WEST_FULLY,
            Side::East => Self::EAST_FULLY,
            Side::South => Self::SOUTH_FULLY,
        }
    }

    pub fn blocks(self, side: Side) -> bool {
        self.0 & Self::mask(side) != 0
    }

    pub fn blocks_fully(self, side: Side) -> bool {
        let m = Self::mask(side);
        self.0 & m == m
    }

    fn hflipped(self) -> Blockage {
        let b = self.0;
        Blockage((b & 0xC3) | ((b & 0x0C) << 2) | ((b & 0x30) >> 2))
    }

    fn vflipped(self) -> Blockage {
        let b = self.0;
        Blockage((b & 0x3C) | ((b & 0x03) << 6) | ((b & 0xC0) >> 6))
    }
}

/// One occlusion-relevant edge of a shape, in cell-local normalized coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlineEdge {
    pub a: Vec2,
    pub b: Vec2,
    /// Cell sides this edge faces. Empty for edges strictly inside the cell.
    pub sides: Sides,
}

/// Shape of a wall: a base polygon, optionally mirrored horizontally and/or vertically.
///
/// Encoded in one byte as `base << 2 | vflip << 1 | hflip`; only values `0x00..=0x1F`
/// are valid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Shape {
    base: BaseShape,
    hflip: bool,
    vflip: bool,
}

impl Shape {
    pub const HFLIP: u8 = 0x01;
    pub const VFLIP: u8 = 0x02;

    pub const FULL_SQUARE: Shape = Shape::new(BaseShape::FullSquare, false, false);

    pub const fn new(base: BaseShape, hflip: bool, vflip: bool) -> Self {
        Self { base, hflip, vflip }
    }

    pub fn from_bits(bits: u8) -> Result<Self, ShapeError> {
        if bits > 0x1F {
            return Err(ShapeError::InvalidBits(bits));
        }
        let base = BaseShape::ALL[(bits >> 2) as usize];
        Ok(Self::new(
            base,
            bits & Self::HFLIP != 0,
            bits & Self::VFLIP != 0,
        ))
    }

    pub fn bits(self) -> u8 {
        ((self.base.index() as u8) << 2)
            | if self.hflip { Self::HFLIP } else { 0 }
            | if self.vflip { Self::VFLIP } else { 0 }
    }

    pub fn base(self) -> BaseShape {
        self.base
    }

    pub fn is_hflipped(self) -> bool {
        self.hflip
    }

    pub fn is_vflipped(self) -> bool {
        self.vflip
    }

    /// All 32 valid shapes in encoding order.
    pub fn all() -> impl Iterator<Item = Shape> {
        (0u8..=0x1F).filter_map(|bits| Shape::from_bits(bits).ok())
    }

    pub fn blockage(self) -> Blockage {
        let mut b = Blockage(BASE_BLOCKAGE[self.base.index()]);
        if self.hflip {
            b = b.hflipped();
        }
        if self.vflip {
            b = b.vflipped();
        }
        b
    }

    /// Occlusion-relevant edges of the shape, flips applied.
    pub fn outline(self) -> impl Iterator<Item = OutlineEdge> {
        let (hflip, vflip) = (self.hflip, self.vflip);
        let flip = move |p: [f32; 2]| {
            Vec2::new(
                if hflip { 1.0 - p[0] } else { p[0] },
                if vflip { 1.0 - p[1] } else { p[1] },
            )
        };
        BASE_OUTLINES[self.base.index()].iter().map(move |raw| {
            let mut sides = Sides(raw.sides);
            if hflip {
                sides = sides.hflipped();
            }
            if vflip {
                sides = sides.vflipped();
            }
            OutlineEdge {
                a: flip(raw.a),
                b: flip(raw.b),
                sides,
            }
        })
    }

    /// Whether a cell-local normalized point lies inside (or on the border of) the shape.
    pub fn contains_local(self, p: Vec2) -> bool {
        // Every outline is convex, so the point must not be outside any edge.
        let centroid = self.centroid();
        self.outline().all(|edge| {
            let d = edge.b - edge.a;
            let normal = Vec2::new(d.y, -d.x);
            let inward = normal.dot(centroid - edge.a).signum();
            normal.dot(p - edge.a) * inward >= -1e-6
        })
    }

    /// Average of the outline vertices; always strictly inside the shape.
    pub fn centroid(self) -> Vec2 {
        let (sum, count) = self
            .outline()
            .fold((Vec2::ZERO, 0.0f32), |(sum, n), e| (sum + e.a, n + 1.0));
        sum / count
    }
}

impl TryFrom<u8> for Shape {
    type Error = ShapeError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        Shape::from_bits(bits)
    }
}

impl From<Shape> for u8 {
    fn from(shape: Shape) -> u8 {
        shape.bits()
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let flags = match (self.hflip, self.vflip) {
            (false, false) => "",
            (true, false) => "HFLIP",
            (false, true) => "VFLIP",
            (true, true) => "HFLIP,VFLIP",
        };
        write!(f, "{}({})", self.base.name(), flags)
    }
}

impl FromStr for Shape {
    type Err = ShapeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || ShapeError::UnknownName(s.to_string());
        let (name, rest) = s.split_once('(').ok_or_else(unknown)?;
        let flags = rest.strip_suffix(')').ok_or_else(unknown)?;
        let base = BaseShape::ALL
            .into_iter()
            .find(|b| b.name() == name)
            .ok_or_else(unknown)?;
        let (hflip, vflip) = match flags {
            "" => (false, false),
            "HFLIP" => (true, false),
            "VFLIP" => (false, true),
            "HFLIP,VFLIP" => (true, true),
            _ => return Err(unknown()),
        };
        Ok(Shape::new(base, hflip, vflip))
    }
}
