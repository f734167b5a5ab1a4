//! Power-law convection/diffusion weighting
//!
//! Neighbour coefficient of a face with diffusion conductance `D` and mass
//! flux `F` (positive along the axis):
//!
//! `a = D·max(0, 1 - 0.1·|P|)^5 + max(∓F, 0)`, `P = F / max(D, 1e-4)`
//!
//! with `-F` for the downstream (east/north/top) neighbour and `+F` for the
//! upstream (west/south/bottom) one.
//!
//! Column assembly evaluates the coefficients in fixed-width lanes; the lane
//! mask zeroes faces that are closed (the ground face of the first free cell
//! and walls). [`neighbour_coefficient`] is the scalar reference.

/// Floor for the diffusion conductance in the Péclet number
pub const PECLET_FLOOR: f32 = 1e-4;

/// Lane width of the batched assembly
pub const LANES: usize = 8;

/// Which neighbour of the face a coefficient couples to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaceSide {
    /// East, north or top
    Downstream,
    /// West, south or bottom
    Upstream,
}

/// `max(0, 1 - 0.1·|P|)^5`
#[inline]
pub fn power_law_weight(peclet: f32) -> f32 {
    let t = (1.0 - 0.1 * peclet.abs()).max(0.0);
    let t2 = t * t;
    t2 * t2 * t
}

/// Scalar neighbour coefficient for one face
#[inline]
pub fn neighbour_coefficient(diffusion: f32, flux: f32, side: FaceSide) -> f32 {
    let peclet = flux / diffusion.max(PECLET_FLOOR);
    let convective = match side {
        FaceSide::Downstream => (-flux).max(0.0),
        FaceSide::Upstream => flux.max(0.0),
    };
    diffusion * power_law_weight(peclet) + convective
}

/// Per-face inputs of one column, indexed by row offset from the lowest solved row
#[derive(Debug, Clone, Default)]
pub struct FaceColumn {
    pub diffusion: Vec<f32>,
    pub flux: Vec<f32>,
    pub open: Vec<bool>,
}

impl FaceColumn {
    pub fn with_len(len: usize) -> Self {
        Self {
            diffusion: vec![0.0; len],
            flux: vec![0.0; len],
            open: vec![true; len],
        }
    }

    pub fn len(&self) -> usize {
        self.diffusion.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diffusion.is_empty()
    }

    #[inline]
    pub fn set(&mut self, row: usize, diffusion: f32, flux: f32, open: bool) {
        self.diffusion[row] = diffusion;
        self.flux[row] = flux;
        self.open[row] = open;
    }
}

/// Coefficients of a whole face column, `LANES` rows at a time
pub fn assemble_coefficients(faces: &FaceColumn, side: FaceSide, out: &mut [f32]) {
    debug_assert_eq!(out.len(), faces.len());
    let full = faces.len() / LANES * LANES;

    for base in (0..full).step_by(LANES) {
        let mut d = [0.0f32; LANES];
        let mut f = [0.0f32; LANES];
        let mut mask = [0.0f32; LANES];
        d.copy_from_slice(&faces.diffusion[base..base + LANES]);
        f.copy_from_slice(&faces.flux[base..base + LANES]);
        for lane in 0..LANES {
            mask[lane] = if faces.open[base + lane] { 1.0 } else { 0.0 };
        }
        let lanes = coefficient_lanes(&d, &f, &mask, side);
        out[base..base + LANES].copy_from_slice(&lanes);
    }

    for row in full..faces.len() {
        out[row] = if faces.open[row] {
            neighbour_coefficient(faces.diffusion[row], faces.flux[row], side)
        } else {
            0.0
        };
    }
}

#[inline]
fn coefficient_lanes(
    d: &[f32; LANES],
    f: &[f32; LANES],
    mask: &[f32; LANES],
    side: FaceSide,
) -> [f32; LANES] {
    let sign = match side {
        FaceSide::Downstream => -1.0,
        FaceSide::Upstream => 1.0,
    };
    let mut out = [0.0f32; LANES];
    for lane in 0..LANES {
        let peclet = f[lane] / d[lane].max(PECLET_FLOOR);
        let t = (1.0 - 0.1 * peclet.abs()).max(0.0);
        let t2 = t * t;
        let value = d[lane] * (t2 * t2 * t) + (sign * f[lane]).max(0.0);
        out[lane] = value * mask[lane];
    }
    out
}

/// Face inputs of the six neighbours of one column
#[derive(Debug, Clone, Default)]
pub struct Stencil {
    pub east: FaceColumn,
    pub west: FaceColumn,
    pub north: FaceColumn,
    pub south: FaceColumn,
    pub top: FaceColumn,
    pub bottom: FaceColumn,
}

impl Stencil {
    pub fn with_rows(rows: usize) -> Self {
        Self {
            east: FaceColumn::with_len(rows),
            west: FaceColumn::with_len(rows),
            north: FaceColumn::with_len(rows),
            south: FaceColumn::with_len(rows),
            top: FaceColumn::with_len(rows),
            bottom: FaceColumn::with_len(rows),
        }
    }

    /// Neighbour coefficients of every face
    pub fn coefficients(&self) -> Coefficients {
        let rows = self.east.len();
        let mut out = Coefficients {
            east: vec![0.0; rows],
            west: vec![0.0; rows],
            north: vec![0.0; rows],
            south: vec![0.0; rows],
            top: vec![0.0; rows],
            bottom: vec![0.0; rows],
        };
        assemble_coefficients(&self.east, FaceSide::Downstream, &mut out.east);
        assemble_coefficients(&self.west, FaceSide::Upstream, &mut out.west);
        assemble_coefficients(&self.north, FaceSide::Downstream, &mut out.north);
        assemble_coefficients(&self.south, FaceSide::Upstream, &mut out.south);
        assemble_coefficients(&self.top, FaceSide::Downstream, &mut out.top);
        assemble_coefficients(&self.bottom, FaceSide::Upstream, &mut out.bottom);
        out
    }
}

/// Neighbour coefficients of one column
#[derive(Debug, Clone, Default)]
pub struct Coefficients {
    pub east: Vec<f32>,
    pub west: Vec<f32>,
    pub north: Vec<f32>,
    pub south: Vec<f32>,
    pub top: Vec<f32>,
    pub bottom: Vec<f32>,
}

impl Coefficients {
    /// Sum of all neighbour coefficients of `row`
    #[inline]
    pub fn total(&self, row: usize) -> f32 {
        self.east[row]
            + self.west[row]
            + self.north[row]
            + self.south[row]
            + self.top[row]
            + self.bottom[row]
    }
}
