//! Discrete rotations in 45° steps.
//!
//! Rotations turn clockwise on screen (y grows downwards) and are always
//! applied to source coordinates by inverse nearest-neighbour sampling, so a
//! rotated frame never has holes and anything falling outside the destination
//! is clipped.

use std::{
    f32::consts::FRAC_1_SQRT_2,
    fmt::{self, Display},
    ops::Add,
};

use crate::{
    canvas::{Canvas, Geometry},
    error::Error,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Rotation {
    #[default]
    Deg0,
    Deg45,
    Deg90,
    Deg135,
    Deg180,
    Deg225,
    Deg270,
    Deg315,
}

impl Rotation {
    pub const ALL: [Rotation; 8] = [
        Rotation::Deg0,
        Rotation::Deg45,
        Rotation::Deg90,
        Rotation::Deg135,
        Rotation::Deg180,
        Rotation::Deg225,
        Rotation::Deg270,
        Rotation::Deg315,
    ];

    pub const fn degrees(self) -> u16 {
        self.steps() as u16 * 45
    }

    const fn steps(self) -> u8 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg45 => 1,
            Rotation::Deg90 => 2,
            Rotation::Deg135 => 3,
            Rotation::Deg180 => 4,
            Rotation::Deg225 => 5,
            Rotation::Deg270 => 6,
            Rotation::Deg315 => 7,
        }
    }

    const fn from_steps(steps: u8) -> Self {
        Self::ALL[(steps % 8) as usize]
    }

    /// Whether this is a multiple of 90°, i.e. maps pixel centres onto pixel centres.
    pub const fn is_quarter_turn(self) -> bool {
        self.steps() % 2 == 0
    }

    /// `(cos, sin)` of the angle, exact for every quarter turn.
    pub fn cos_sin(self) -> (f32, f32) {
        const H: f32 = FRAC_1_SQRT_2;
        match self {
            Rotation::Deg0 => (1.0, 0.0),
            Rotation::Deg45 => (H, H),
            Rotation::Deg90 => (0.0, 1.0),
            Rotation::Deg135 => (-H, H),
            Rotation::Deg180 => (-1.0, 0.0),
            Rotation::Deg225 => (-H, -H),
            Rotation::Deg270 => (0.0, -1.0),
            Rotation::Deg315 => (H, -H),
        }
    }

    /// Maps a destination pixel back to the source pixel it samples.
    ///
    /// Both grids share the same centre; `src` and `dst` are the grid sizes.
    pub fn source_of(self, (x, y): (i32, i32), src: (u32, u32), dst: (u32, u32)) -> (i32, i32) {
        if self == Rotation::Deg0 && src == dst {
            return (x, y);
        }
        let (cos, sin) = self.cos_sin();
        // doubled coordinates keep the centre of even-sized grids integral
        let dx = (2 * x - (dst.0 as i32 - 1)) as f32;
        let dy = (2 * y - (dst.1 as i32 - 1)) as f32;
        let sx = cos * dx + sin * dy;
        let sy = -sin * dx + cos * dy;
        (
            ((sx + (src.0 as f32 - 1.0)) / 2.0).round() as i32,
            ((sy + (src.1 as f32 - 1.0)) / 2.0).round() as i32,
        )
    }

    /// Bounding box of a `width`x`height` grid after rotation.
    pub fn bounding_box(self, width: u32, height: u32) -> (u32, u32) {
        if self.is_quarter_turn() {
            return if self.steps() % 4 == 0 {
                (width, height)
            } else {
                (height, width)
            };
        }
        let (cos, sin) = self.cos_sin();
        let (w, h) = (width as f32, height as f32);
        let bw = (w * cos.abs() + h * sin.abs()).round() as u32;
        let bh = (w * sin.abs() + h * cos.abs()).round() as u32;
        (bw.max(1), bh.max(1))
    }

    /// Builds a canvas of `geometry` whose pixel `(x, y)` is on when the
    /// rotated `source` is on there. `source` may answer for coordinates
    /// outside the geometry; those pixels can rotate into view.
    pub fn resample(self, geometry: Geometry, source: impl Fn(i32, i32) -> bool) -> Canvas {
        let mut canvas = Canvas::new(geometry);
        let size = (geometry.width, geometry.height);
        for y in 0..geometry.height as i32 {
            for x in 0..geometry.width as i32 {
                let (sx, sy) = self.source_of((x, y), size, size);
                if source(sx, sy) {
                    canvas.set(x, y, true);
                }
            }
        }
        canvas
    }
}

impl Add for Rotation {
    type Output = Rotation;

    fn add(self, rhs: Rotation) -> Rotation {
        Rotation::from_steps(self.steps() + rhs.steps())
    }
}

impl TryFrom<i32> for Rotation {
    type Error = Error;

    fn try_from(degrees: i32) -> Result<Self, Self::Error> {
        if (0..360).contains(&degrees) && degrees % 45 == 0 {
            Ok(Rotation::from_steps((degrees / 45) as u8))
        } else {
            Err(Error::InvalidRotation(degrees))
        }
    }
}

impl From<Rotation> for u16 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

impl Display for Rotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}
