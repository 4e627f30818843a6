//! Named, multi-component fields living on a [`Domain`].

use crate::domain::Domain;
use crate::error::{Error, Result};

/// Send/recv geometry for one neighbor, in local (including-guard) index
/// space. `start`/`extent` are per-axis; the innermost block of
/// `n_members` doubles per zone is implicit.
#[derive(Debug, Clone, Copy)]
pub struct SubarrayDescriptor {
    /// Per-axis start index of the send slab.
    pub send_start: [usize; 3],
    /// Per-axis start index of the recv slab.
    pub recv_start: [usize; 3],
    /// Per-axis extent of the slab (same for send and recv).
    pub extent: [usize; 3],
}

/// A distributed, multi-component cell-centered field on a [`Domain`].
pub struct DField<'d> {
    domain: &'d Domain,
    name: String,
    members: Vec<String>,
    data: Vec<f64>,
    stride: [usize; 3],
    descriptors: Vec<SubarrayDescriptor>,
    committed: bool,
    cursor: std::cell::Cell<usize>,
}

impl<'d> std::fmt::Debug for DField<'d> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DField")
            .field("name", &self.name)
            .field("members", &self.members)
            .field("committed", &self.committed)
            .finish()
    }
}

impl<'d> DField<'d> {
    /// Construct an uncommitted field attached to `domain`.
    #[must_use]
    pub fn new(domain: &'d Domain, name: impl Into<String>) -> Self {
        Self {
            domain,
            name: name.into(),
            members: Vec::new(),
            data: Vec::new(),
            stride: [0, 0, 0],
            descriptors: Vec::new(),
            committed: false,
            cursor: std::cell::Cell::new(0),
        }
    }

    fn guard_mutable(&self, what: &str) -> bool {
        if self.committed {
            tracing::debug!(op = what, field = %self.name, "ignored: field already committed");
            false
        } else {
            true
        }
    }

    /// Append a named component. No-op once committed.
    pub fn add_member(&mut self, name: impl Into<String>) {
        if !self.guard_mutable("add_member") {
            return;
        }
        self.members.push(name.into());
    }

    /// Rename the field. No-op once committed.
    pub fn set_name(&mut self, name: impl Into<String>) {
        if !self.guard_mutable("set_name") {
            return;
        }
        self.name = name.into();
    }

    /// Field name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of components.
    #[must_use]
    pub fn n_members(&self) -> usize {
        self.members.len()
    }

    /// The Domain this field is attached to.
    #[must_use]
    pub fn domain(&self) -> &Domain {
        self.domain
    }

    /// Allocate the buffer, compute strides, and build per-neighbor
    /// subarray descriptors. No-op if already committed.
    ///
    /// # Errors
    /// Returns [`Error::NotCommitted`] if the owning Domain has not itself
    /// been committed, or [`Error::BadArity`] if no members were added.
    pub fn commit(&mut self) -> Result<()> {
        if self.committed {
            return Ok(());
        }
        if !self.domain.is_committed() {
            return Err(Error::NotCommitted);
        }
        if self.members.is_empty() {
            return Err(Error::BadArity {
                expected: 1,
                actual: 0,
            });
        }
        let nm = self.members.len();
        let l_ntot = self.domain.l_ntot();
        let total = l_ntot[0] * l_ntot[1] * l_ntot[2] * nm;
        self.data = vec![0.0; total];
        // Row-major, components fastest: stride order z, y, x.
        self.stride = [l_ntot[1] * l_ntot[2] * nm, l_ntot[2] * nm, nm];
        self.descriptors = self
            .domain
            .neighbors()
            .iter()
            .map(|nb| subarray_for_offset(self.domain, nb.offset))
            .collect();
        self.committed = true;
        Ok(())
    }

    /// Whether `commit` has run.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Linear stride (in doubles) along `dim`.
    #[must_use]
    pub fn stride(&self, dim: usize) -> usize {
        self.stride.get(dim).copied().unwrap_or(0)
    }

    /// Raw backing buffer.
    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Mutable raw backing buffer.
    pub fn data_mut(&mut self) -> &mut [f64] {
        &mut self.data
    }

    /// Number of components in the backing buffer. Equal to `n_members()`
    /// once committed, since `commit` rejects a field with no members.
    fn n_components(&self) -> usize {
        self.members.len()
    }

    fn linear_index(&self, x: usize, y: usize, z: usize, c: usize) -> usize {
        x * self.stride[0] + y * self.stride[1] + z * self.stride[2] + c
    }

    /// Restart the member-name cursor. `next_member` walks the sequence
    /// from the beginning again.
    pub fn iterate_members(&self) {
        self.cursor.set(0);
    }

    /// Advance the member-name cursor, returning the next name or `None`
    /// once exhausted. Not safe to interleave across concurrent callers;
    /// call [`DField::iterate_members`] to restart.
    pub fn next_member(&self) -> Option<&str> {
        let i = self.cursor.get();
        if i >= self.members.len() {
            return None;
        }
        self.cursor.set(i + 1);
        Some(&self.members[i])
    }

    /// Copy the half-open interior sub-box `[i0, i1)` (interior-relative
    /// indices) into `out`, preserving component interleaving. `out` must
    /// have length `prod(i1-i0) * n_components`.
    ///
    /// # Errors
    /// Returns [`Error::NotCommitted`] if the field has not been
    /// committed.
    pub fn extract(&self, i0: [usize; 3], i1: [usize; 3], out: &mut [f64]) -> Result<()> {
        if !self.committed {
            return Err(Error::NotCommitted);
        }
        let nc = self.n_components();
        let g = self.domain.guard();
        let extent = [i1[0] - i0[0], i1[1] - i0[1], i1[2] - i0[2]];
        let mut o = 0usize;
        for x in i0[0]..i1[0] {
            for y in i0[1]..i1[1] {
                for z in i0[2]..i1[2] {
                    let base = self.linear_index(x + g, y + g, z + g, 0);
                    out[o..o + nc].copy_from_slice(&self.data[base..base + nc]);
                    o += nc;
                }
            }
        }
        debug_assert_eq!(o, extent[0] * extent[1] * extent[2] * nc);
        Ok(())
    }

    /// Inverse of [`DField::extract`].
    ///
    /// # Errors
    /// Returns [`Error::NotCommitted`] if the field has not been
    /// committed.
    pub fn replace(&mut self, i0: [usize; 3], i1: [usize; 3], input: &[f64]) -> Result<()> {
        if !self.committed {
            return Err(Error::NotCommitted);
        }
        let nc = self.n_components();
        let g = self.domain.guard();
        let mut o = 0usize;
        for x in i0[0]..i1[0] {
            for y in i0[1]..i1[1] {
                for z in i0[2]..i1[2] {
                    let base = self.linear_index(x + g, y + g, z + g, 0);
                    self.data[base..base + nc].copy_from_slice(&input[o..o + nc]);
                    o += nc;
                }
            }
        }
        Ok(())
    }

    /// Apply a pointwise kernel over every interior zone of this field,
    /// writing into `self` and reading from `args`. The kernel receives
    /// the result zone's base offset, each input zone's base offset, and
    /// the shared stride array.
    ///
    /// # Errors
    /// Returns [`Error::NotCommitted`] if this field or any input is not
    /// committed.
    pub fn transform<F>(&mut self, args: &[&DField<'_>], mut op: F) -> Result<()>
    where
        F: FnMut(&mut [f64], &[&[f64]], [usize; 3]),
    {
        if !self.committed || args.iter().any(|a| !a.committed) {
            return Err(Error::NotCommitted);
        }
        let g = self.domain.guard();
        let l_nint = self.domain.l_nint();
        let nc = self.n_components();
        let stride = self.stride;
        for x in 0..l_nint[0] {
            for y in 0..l_nint[1] {
                for z in 0..l_nint[2] {
                    let base = self.linear_index(x + g, y + g, z + g, 0);
                    let arg_slices: Vec<&[f64]> = args
                        .iter()
                        .map(|a| {
                            let ag = a.domain.guard();
                            let ab = a.linear_index(x + ag, y + ag, z + ag, 0);
                            &a.data[ab..ab + nc]
                        })
                        .collect();
                    // Safety-free: copy out, call, copy back (kernel sees
                    // owned-length slices only, no aliasing with self.data).
                    let mut result_buf = vec![0.0; nc];
                    op(&mut result_buf, &arg_slices, stride);
                    self.data[base..base + nc].copy_from_slice(&result_buf);
                }
            }
        }
        Ok(())
    }

    /// Exchange guard zones with every neighbor so each local subgrid's
    /// halo holds the owning neighbor's interior values, wrapping
    /// periodically.
    ///
    /// # Errors
    /// Returns [`Error::NotCommitted`] if the field is not committed, or
    /// [`Error::PeerFailure`] if the transport fails.
    pub fn sync_guard(&mut self) -> Result<()> {
        if !self.committed {
            return Err(Error::NotCommitted);
        }
        let Some(topology) = self.domain.topology() else {
            return Ok(());
        };
        let nc = self.n_components();
        let stride = self.stride;

        let mut send_bufs = Vec::with_capacity(self.descriptors.len());
        for d in &self.descriptors {
            send_bufs.push(pack(&self.data, &stride, d.send_start, d.extent, nc));
        }
        let mut recv_bufs: Vec<Vec<f64>> = self
            .descriptors
            .iter()
            .map(|d| vec![0.0; d.extent[0] * d.extent[1] * d.extent[2] * nc])
            .collect();

        let neighbors = self.domain.neighbors();
        let sends: Vec<(usize, i32, &[f64])> = neighbors
            .iter()
            .zip(send_bufs.iter())
            .map(|(nb, buf)| (nb.rank, nb.send_tag, buf.as_slice()))
            .collect();
        let mut recvs: Vec<(usize, i32, &mut [f64])> = neighbors
            .iter()
            .zip(recv_bufs.iter_mut())
            .map(|(nb, buf)| (nb.rank, nb.recv_tag, buf.as_mut_slice()))
            .collect();

        topology.exchange(&sends, &mut recvs)?;
        drop(sends);

        for (d, buf) in self.descriptors.iter().zip(recv_bufs.iter()) {
            unpack(&mut self.data, &stride, d.recv_start, d.extent, nc, buf);
        }
        Ok(())
    }

    /// Reserved for the out-of-scope parallel I/O subsystem.
    ///
    /// # Errors
    /// Always returns [`Error::Unimplemented`].
    pub fn write(&self, _path: &std::path::Path) -> Result<()> {
        Err(Error::Unimplemented)
    }

    /// Reserved for the out-of-scope parallel I/O subsystem.
    ///
    /// # Errors
    /// Always returns [`Error::Unimplemented`].
    pub fn read(&mut self, _path: &std::path::Path) -> Result<()> {
        Err(Error::Unimplemented)
    }
}

fn pack(data: &[f64], stride: &[usize; 3], start: [usize; 3], extent: [usize; 3], nc: usize) -> Vec<f64> {
    let mut out = Vec::with_capacity(extent[0] * extent[1] * extent[2] * nc);
    for x in 0..extent[0] {
        for y in 0..extent[1] {
            for z in 0..extent[2] {
                let base =
                    (start[0] + x) * stride[0] + (start[1] + y) * stride[1] + (start[2] + z) * stride[2];
                out.extend_from_slice(&data[base..base + nc]);
            }
        }
    }
    out
}

fn unpack(
    data: &mut [f64],
    stride: &[usize; 3],
    start: [usize; 3],
    extent: [usize; 3],
    nc: usize,
    src: &[f64],
) {
    let mut o = 0usize;
    for x in 0..extent[0] {
        for y in 0..extent[1] {
            for z in 0..extent[2] {
                let base =
                    (start[0] + x) * stride[0] + (start[1] + y) * stride[1] + (start[2] + z) * stride[2];
                data[base..base + nc].copy_from_slice(&src[o..o + nc]);
                o += nc;
            }
        }
    }
}

fn subarray_for_offset(domain: &Domain, offset: [i32; 3]) -> SubarrayDescriptor {
    let g = domain.guard();
    let l_nint = domain.l_nint();
    let mut send_start = [0usize; 3];
    let mut recv_start = [0usize; 3];
    let mut extent = [1usize; 3];
    for i in 0..3 {
        let (ss, rs, ext) = match offset[i] {
            -1 => (g, 0, g),
            1 => (l_nint[i], l_nint[i] + g, g),
            _ => (g, g, l_nint[i]),
        };
        send_start[i] = ss;
        recv_start[i] = rs;
        extent[i] = ext.max(1);
    }
    SubarrayDescriptor {
        send_start,
        recv_start,
        extent,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committed_1d(g: usize, n: usize) -> Domain {
        let mut d = Domain::new();
        d.set_ndim(1);
        d.set_guard(g);
        d.set_size(0, n);
        d.commit().unwrap();
        d
    }

    #[test]
    fn scenario_b_extract_replace_roundtrip() {
        let d = committed_1d(2, 8);
        let mut f = DField::new(&d, "f");
        f.add_member("a");
        f.add_member("b");
        f.commit().unwrap();
        for x in 0..8usize {
            let base = (x + 2) * f.stride[0];
            f.data[base] = x as f64;
            f.data[base + 1] = 2.0 * x as f64;
        }
        let before = f.data.clone();
        let mut buf = vec![0.0; (6 - 2) * 2];
        f.extract([2, 0, 0], [6, 1, 1], &mut buf).unwrap();
        assert_eq!(buf, vec![2.0, 4.0, 3.0, 6.0, 4.0, 8.0, 5.0, 10.0]);
        f.replace([2, 0, 0], [6, 1, 1], &buf).unwrap();
        assert_eq!(f.data, before);
    }

    #[test]
    fn scenario_c_guard_sync_periodic_single_process() {
        let d = committed_1d(2, 8);
        let mut f = DField::new(&d, "f");
        f.add_member("a");
        f.commit().unwrap();
        for x in 0..8usize {
            let base = (x + 2) * f.stride[0];
            f.data[base] = x as f64;
        }
        f.sync_guard().unwrap();
        let at = |i: usize| f.data[i * f.stride[0]];
        assert_eq!(at(0), 6.0);
        assert_eq!(at(1), 7.0);
        assert_eq!(at(10), 0.0);
        assert_eq!(at(11), 1.0);
    }

    #[test]
    fn commit_before_domain_commit_fails() {
        let d = Domain::new();
        let mut f = DField::new(&d, "f");
        assert!(f.commit().is_err());
    }

    #[test]
    fn commit_with_no_members_fails() {
        let d = committed_1d(1, 4);
        let mut f = DField::new(&d, "f");
        assert!(matches!(f.commit(), Err(Error::BadArity { expected: 1, actual: 0 })));
    }

    #[test]
    fn write_and_read_are_unimplemented() {
        let d = committed_1d(1, 4);
        let mut f = DField::new(&d, "f");
        f.add_member("a");
        f.commit().unwrap();
        let path = std::path::Path::new("field.dat");
        assert!(matches!(f.write(path), Err(Error::Unimplemented)));
        assert!(matches!(f.read(path), Err(Error::Unimplemented)));
    }
}
