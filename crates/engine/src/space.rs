use glam::Vec3;

/// Absolute cell coordinate in a volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coord {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Coord {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// One cell over along `dir`.
    pub const fn step(&self, dir: Direction) -> Coord {
        let (dx, dy, dz) = dir.offset();
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub const fn offset(&self, dx: i32, dy: i32, dz: i32) -> Coord {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }

    /// The six face neighbors.
    pub const fn neighbors(&self) -> [Coord; 6] {
        [
            Self::new(self.x - 1, self.y, self.z),
            Self::new(self.x + 1, self.y, self.z),
            Self::new(self.x, self.y - 1, self.z),
            Self::new(self.x, self.y + 1, self.z),
            Self::new(self.x, self.y, self.z - 1),
            Self::new(self.x, self.y, self.z + 1),
        ]
    }

    /// Squared euclidean distance to `other`.
    pub fn distance_sq(&self, other: Coord) -> i64 {
        let dx = (self.x - other.x) as i64;
        let dy = (self.y - other.y) as i64;
        let dz = (self.z - other.z) as i64;
        dx * dx + dy * dy + dz * dz
    }

    /// Chebyshev (chessboard) distance to `other`.
    pub fn chebyshev(&self, other: Coord) -> i32 {
        (self.x - other.x)
            .abs()
            .max((self.y - other.y).abs())
            .max((self.z - other.z).abs())
    }

    /// Minimum corner of the unit cell, in world space.
    pub fn to_vec3(&self) -> Vec3 {
        Vec3::new(self.x as f32, self.y as f32, self.z as f32)
    }

    /// Center of the unit cell, in world space.
    pub fn center(&self) -> Vec3 {
        Vec3::new(
            self.x as f32 + 0.5,
            self.y as f32 + 0.5,
            self.z as f32 + 0.5,
        )
    }
}

/// Coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

/// Axis-aligned face direction.
///
/// Discriminants are the face-mask bit positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    NegX = 0,
    PosX = 1,
    NegY = 2,
    PosY = 3,
    NegZ = 4,
    PosZ = 5,
}

impl Direction {
    pub const ALL: [Direction; 6] = [
        Direction::NegX,
        Direction::PosX,
        Direction::NegY,
        Direction::PosY,
        Direction::NegZ,
        Direction::PosZ,
    ];

    /// Unit offset along this direction.
    pub const fn offset(self) -> (i32, i32, i32) {
        match self {
            Direction::NegX => (-1, 0, 0),
            Direction::PosX => (1, 0, 0),
            Direction::NegY => (0, -1, 0),
            Direction::PosY => (0, 1, 0),
            Direction::NegZ => (0, 0, -1),
            Direction::PosZ => (0, 0, 1),
        }
    }

    pub const fn reverse(self) -> Direction {
        match self {
            Direction::NegX => Direction::PosX,
            Direction::PosX => Direction::NegX,
            Direction::NegY => Direction::PosY,
            Direction::PosY => Direction::NegY,
            Direction::NegZ => Direction::PosZ,
            Direction::PosZ => Direction::NegZ,
        }
    }

    pub const fn axis(self) -> Axis {
        match self {
            Direction::NegX | Direction::PosX => Axis::X,
            Direction::NegY | Direction::PosY => Axis::Y,
            Direction::NegZ | Direction::PosZ => Axis::Z,
        }
    }

    /// Outward unit normal as a float vector.
    pub fn vector(self) -> Vec3 {
        let (x, y, z) = self.offset();
        Vec3::new(x as f32, y as f32, z as f32)
    }

    /// The direction closest to an arbitrary vector (dominant axis,
    /// ties resolved in X, Y, Z order).
    pub fn from_vector(v: Vec3) -> Direction {
        let ax = v.x.abs();
        let ay = v.y.abs();
        let az = v.z.abs();
        if ax >= ay && ax >= az {
            if v.x > 0.0 { Direction::PosX } else { Direction::NegX }
        } else if ay >= az {
            if v.y > 0.0 { Direction::PosY } else { Direction::NegY }
        } else if v.z > 0.0 {
            Direction::PosZ
        } else {
            Direction::NegZ
        }
    }
}

/// Per-face visibility bits, one per `Direction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FaceMask(pub u8);

impl FaceMask {
    pub const NONE: FaceMask = FaceMask(0);
    pub const ALL: FaceMask = FaceMask(0b11_1111);

    #[inline]
    pub fn get(&self, dir: Direction) -> bool {
        self.0 & (1 << dir as u8) != 0
    }

    #[inline]
    pub fn set(&mut self, dir: Direction, visible: bool) {
        if visible {
            self.0 |= 1 << dir as u8;
        } else {
            self.0 &= !(1 << dir as u8);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn count(&self) -> u32 {
        self.0.count_ones()
    }
}
