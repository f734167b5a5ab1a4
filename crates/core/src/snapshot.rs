//! Fixed-point wind snapshots
//!
//! Wind fields are stored as little-endian `i16` triplets `(U, V, W)` per cell
//! scaled by 100, which keeps every component within ±0.005 m/s of the solved
//! value for speeds up to ±327 m/s. A 13-byte header carries the layout tag
//! and the grid size `ni, nj, nk` as `u32`.
//!
//! Layouts:
//! - [`SnapshotLayout::Full`]: horizontal planes from the bottom, `i` fastest
//! - [`SnapshotLayout::ColumnCompressed`]: one column at a time, `k` fastest
//! - [`SnapshotLayout::TerrainCompressed`]: like `ColumnCompressed`, but each
//!   column starts with a `u16` first free layer and skips the cells below it
//!
//! Reading and writing files is left to the host.

use crate::error::{FlowError, FlowResult};
use crate::grid::FlowState;
use serde::{Deserialize, Serialize};

/// Fixed-point scale of stored velocities
pub const SNAPSHOT_SCALE: f32 = 100.0;

const HEADER_LEN: usize = 13;

/// Cell ordering of a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SnapshotLayout {
    Full = 0,
    ColumnCompressed = 1,
    TerrainCompressed = 2,
}

impl TryFrom<u8> for SnapshotLayout {
    type Error = FlowError;

    fn try_from(tag: u8) -> FlowResult<Self> {
        match tag {
            0 => Ok(Self::Full),
            1 => Ok(Self::ColumnCompressed),
            2 => Ok(Self::TerrainCompressed),
            other => Err(FlowError::Snapshot(format!("unknown layout tag {other}"))),
        }
    }
}

#[inline]
fn quantise(value: f32) -> i16 {
    (value * SNAPSHOT_SCALE)
        .round()
        .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

fn push_cell(buffer: &mut Vec<u8>, state: &FlowState, (i, j, k): (usize, usize, usize)) {
    for value in [state.u[(i, j, k)], state.v[(i, j, k)], state.w[(i, j, k)]] {
        buffer.extend_from_slice(&quantise(value).to_le_bytes());
    }
}

/// Encode the U/V/W faces of every interior cell
pub fn encode(state: &FlowState, layout: SnapshotLayout) -> Vec<u8> {
    let g = &state.geometry;
    let (ni, nj, nk) = (g.ni, g.nj, g.nk);
    let mut buffer = Vec::with_capacity(HEADER_LEN + ni * nj * nk * 6);

    buffer.push(layout as u8);
    for n in [ni, nj, nk] {
        buffer.extend_from_slice(&(n as u32).to_le_bytes());
    }

    match layout {
        SnapshotLayout::Full => {
            for k in 1..=nk {
                for j in 1..=nj {
                    for i in 1..=ni {
                        push_cell(&mut buffer, state, (i, j, k));
                    }
                }
            }
        }
        SnapshotLayout::ColumnCompressed => {
            for (i, j) in g.interior_columns() {
                for k in 1..=nk {
                    push_cell(&mut buffer, state, (i, j, k));
                }
            }
        }
        SnapshotLayout::TerrainCompressed => {
            for (i, j) in g.interior_columns() {
                let start = state.first_free(i, j);
                buffer.extend_from_slice(&(start as u16).to_le_bytes());
                for k in start..=nk {
                    push_cell(&mut buffer, state, (i, j, k));
                }
            }
        }
    }
    buffer
}

/// Read the layout and grid size from a snapshot header
///
/// # Errors
///
/// Fails on a short header or an unknown layout tag.
pub fn read_header(bytes: &[u8]) -> FlowResult<(SnapshotLayout, usize, usize, usize)> {
    let mut reader = Reader::new(bytes);
    let layout = SnapshotLayout::try_from(reader.u8()?)?;
    let ni = reader.u32()? as usize;
    let nj = reader.u32()? as usize;
    let nk = reader.u32()? as usize;
    Ok((layout, ni, nj, nk))
}

/// Decode a snapshot into the U/V/W faces of `state`
///
/// Cells skipped by a terrain-compressed snapshot are set to zero.
///
/// # Errors
///
/// Fails when the snapshot is truncated, has trailing bytes or was written
/// for a different grid size.
pub fn decode_into(bytes: &[u8], state: &mut FlowState) -> FlowResult<SnapshotLayout> {
    let (layout, ni, nj, nk) = read_header(bytes)?;
    let g = &state.geometry;
    if (ni, nj, nk) != (g.ni, g.nj, g.nk) {
        return Err(FlowError::Snapshot(format!(
            "snapshot grid {ni}x{nj}x{nk} does not match {}x{}x{}",
            g.ni, g.nj, g.nk
        )));
    }

    let mut reader = Reader::new(&bytes[HEADER_LEN..]);
    match layout {
        SnapshotLayout::Full => {
            for k in 1..=nk {
                for j in 1..=nj {
                    for i in 1..=ni {
                        reader.cell(state, (i, j, k))?;
                    }
                }
            }
        }
        SnapshotLayout::ColumnCompressed => {
            for i in 1..=ni {
                for j in 1..=nj {
                    for k in 1..=nk {
                        reader.cell(state, (i, j, k))?;
                    }
                }
            }
        }
        SnapshotLayout::TerrainCompressed => {
            for i in 1..=ni {
                for j in 1..=nj {
                    let start = usize::from(reader.u16()?);
                    if start == 0 || start > nk + 1 {
                        return Err(FlowError::Snapshot(format!(
                            "column ({i}, {j}) starts at invalid layer {start}"
                        )));
                    }
                    for k in 1..start {
                        state.u[(i, j, k)] = 0.0;
                        state.v[(i, j, k)] = 0.0;
                        state.w[(i, j, k)] = 0.0;
                    }
                    for k in start..=nk {
                        reader.cell(state, (i, j, k))?;
                    }
                }
            }
        }
    }

    if reader.remaining() > 0 {
        return Err(FlowError::Snapshot(format!(
            "{} trailing bytes after the last cell",
            reader.remaining()
        )));
    }
    Ok(layout)
}

/// Little-endian cursor over a byte slice
struct Reader<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    fn take<const N: usize>(&mut self) -> FlowResult<[u8; N]> {
        let end = self.position + N;
        let chunk = self
            .bytes
            .get(self.position..end)
            .ok_or_else(|| FlowError::Snapshot(format!("truncated at byte {}", self.position)))?;
        self.position = end;
        let mut out = [0; N];
        out.copy_from_slice(chunk);
        Ok(out)
    }

    fn u8(&mut self) -> FlowResult<u8> {
        Ok(self.take::<1>()?[0])
    }

    fn u16(&mut self) -> FlowResult<u16> {
        Ok(u16::from_le_bytes(self.take()?))
    }

    fn u32(&mut self) -> FlowResult<u32> {
        Ok(u32::from_le_bytes(self.take()?))
    }

    fn velocity(&mut self) -> FlowResult<f32> {
        Ok(f32::from(i16::from_le_bytes(self.take()?)) / SNAPSHOT_SCALE)
    }

    fn cell(&mut self, state: &mut FlowState, at: (usize, usize, usize)) -> FlowResult<()> {
        state.u[at] = self.velocity()?;
        state.v[at] = self.velocity()?;
        state.w[at] = self.velocity()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{GridGeometry, ObstacleMap};

    fn sheared_state() -> FlowState {
        let geometry = GridGeometry::uniform(5, 4, 6, 2.0, 2.0, 2.0).unwrap();
        let mut state = FlowState::new(geometry);
        let mut map = ObstacleMap::flat(5, 4);
        map.add_block(2, 4, 2, 3, 9.0);
        state.apply_obstacles(&map).unwrap();
        for (i, j) in state.geometry.interior_columns().collect::<Vec<_>>() {
            for k in 1..=6 {
                let x = (i * 7 + j * 3 + k) as f32;
                state.u[(i, j, k)] = 3.0 + 0.1234 * x;
                state.v[(i, j, k)] = -1.0 + 0.0567 * x;
                state.w[(i, j, k)] = 0.0031 * x - 0.1;
            }
        }
        state.enforce_obstacles();
        state
    }

    fn assert_close(a: &FlowState, b: &FlowState) {
        for (i, j) in a.geometry.interior_columns() {
            for k in 1..=a.geometry.nk {
                for (x, y) in [
                    (a.u[(i, j, k)], b.u[(i, j, k)]),
                    (a.v[(i, j, k)], b.v[(i, j, k)]),
                    (a.w[(i, j, k)], b.w[(i, j, k)]),
                ] {
                    assert!((x - y).abs() <= 0.005 + 1e-6, "({i}, {j}, {k}): {x} vs {y}");
                }
            }
        }
    }

    #[test]
    fn test_layouts_preserve_velocities() {
        let original = sheared_state();
        for layout in [
            SnapshotLayout::Full,
            SnapshotLayout::ColumnCompressed,
            SnapshotLayout::TerrainCompressed,
        ] {
            let bytes = encode(&original, layout);
            let mut restored = FlowState::new(original.geometry.clone());
            restored.u.fill(9.0);
            assert_eq!(decode_into(&bytes, &mut restored).unwrap(), layout);
            assert_close(&original, &restored);
        }
    }

    #[test]
    fn test_terrain_compressed_skips_blocked_cells() {
        let state = sheared_state();
        let full = encode(&state, SnapshotLayout::Full);
        let compressed = encode(&state, SnapshotLayout::TerrainCompressed);

        assert_eq!(full.len(), HEADER_LEN + 5 * 4 * 6 * 6);
        // Six columns blocked up to layer 4, plus a u16 start per column
        assert_eq!(compressed.len(), HEADER_LEN + 20 * 2 + (5 * 4 * 6 - 24) * 6);
        assert!(compressed.len() < full.len());
    }

    #[test]
    fn test_header() {
        let state = sheared_state();
        let bytes = encode(&state, SnapshotLayout::ColumnCompressed);
        assert_eq!(
            read_header(&bytes).unwrap(),
            (SnapshotLayout::ColumnCompressed, 5, 4, 6)
        );
        assert!(read_header(&bytes[..7]).is_err());
    }

    #[test]
    fn test_rejects_corrupt_snapshots() {
        let state = sheared_state();
        let mut bytes = encode(&state, SnapshotLayout::Full);

        let mut other = FlowState::new(GridGeometry::uniform(5, 4, 5, 2.0, 2.0, 2.0).unwrap());
        assert!(matches!(
            decode_into(&bytes, &mut other),
            Err(FlowError::Snapshot(_))
        ));

        let mut target = FlowState::new(state.geometry.clone());
        assert!(decode_into(&bytes[..bytes.len() - 1], &mut target).is_err());

        bytes.push(0);
        assert!(decode_into(&bytes, &mut target).is_err());

        bytes[0] = 7;
        assert!(decode_into(&bytes, &mut target).is_err());
    }

    #[test]
    fn test_quantise_saturates() {
        assert_eq!(quantise(1000.0), i16::MAX);
        assert_eq!(quantise(-1000.0), i16::MIN);
        assert_eq!(quantise(0.004), 0);
        assert_eq!(quantise(-0.006), -1);
    }
}
